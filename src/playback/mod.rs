//! Playback position model for coarse, fine and frame-level navigation
//!
//! Frame stepping uses the nominal frame rate only. The frame boundaries a
//! decoder reports can differ slightly (variable frame rate, edit lists), so
//! [`PlaybackPosition::step_frame`] lands on the *nominal* frame start rather
//! than a decoder-verified one.

use serde::{Deserialize, Serialize};

use crate::domain::model::{FrameRate, MediaInfo, Selection, TIME_EPSILON};
use crate::error::TrimResult;
use crate::planner::KeyframeIndex;

/// Default coarse step in seconds
pub const DEFAULT_COARSE_STEP: f64 = 3.0;
/// Default fine step in seconds
pub const DEFAULT_FINE_STEP: f64 = 0.5;

/// Step sizes used for coarse and fine movement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationSteps {
    pub coarse: f64,
    pub fine: f64,
}

impl Default for NavigationSteps {
    fn default() -> Self {
        Self {
            coarse: DEFAULT_COARSE_STEP,
            fine: DEFAULT_FINE_STEP,
        }
    }
}

/// Direction of a relative move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Backward,
    Forward,
}

impl Direction {
    fn sign(self) -> f64 {
        match self {
            Direction::Backward => -1.0,
            Direction::Forward => 1.0,
        }
    }
}

/// Bounded cursor over a media file's duration
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackPosition {
    current: f64,
    duration: f64,
    frame_rate: FrameRate,
    steps: NavigationSteps,
    mark_in: Option<f64>,
    mark_out: Option<f64>,
}

impl PlaybackPosition {
    /// Create a cursor at the start of the media
    pub fn new(duration: f64, frame_rate: FrameRate) -> Self {
        Self {
            current: 0.0,
            duration: duration.max(0.0),
            frame_rate,
            steps: NavigationSteps::default(),
            mark_in: None,
            mark_out: None,
        }
    }

    pub fn for_media(info: &MediaInfo) -> Self {
        Self::new(info.duration, info.frame_rate)
    }

    pub fn with_steps(mut self, steps: NavigationSteps) -> Self {
        self.steps = steps;
        self
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn frame_duration(&self) -> f64 {
        self.frame_rate.frame_duration()
    }

    /// Nominal index of the frame at the cursor
    pub fn frame_index(&self) -> i64 {
        self.frame_rate.seconds_to_frame(self.current)
    }

    /// Move to `t`, clamped to `[0, duration]`. A NaN target leaves the cursor unchanged.
    pub fn seek_to(&mut self, t: f64) -> f64 {
        if !t.is_nan() {
            self.current = t.clamp(0.0, self.duration);
        }
        self.current
    }

    /// Move by a signed number of seconds
    pub fn step_by(&mut self, seconds: f64) -> f64 {
        self.seek_to(self.current + seconds)
    }

    pub fn step_coarse(&mut self, direction: Direction) -> f64 {
        self.step_by(direction.sign() * self.steps.coarse)
    }

    pub fn step_fine(&mut self, direction: Direction) -> f64 {
        self.step_by(direction.sign() * self.steps.fine)
    }

    /// Move by `frames` nominal frames from the start of the current frame
    pub fn step_frame(&mut self, frames: i64) -> f64 {
        let target = self.frame_index().saturating_add(frames);
        self.seek_to(self.frame_rate.frame_to_seconds(target))
    }

    /// Jump to the keyframe at or before / at or after the cursor
    pub fn snap_to_keyframe(&mut self, index: &KeyframeIndex, direction: Direction) -> f64 {
        let target = match direction {
            Direction::Backward => index.nearest_at_or_before(self.current),
            Direction::Forward => index.nearest_at_or_after(self.current),
        };
        self.seek_to(target)
    }

    /// Jump to the previous or next keyframe strictly away from the cursor
    pub fn step_keyframe(&mut self, index: &KeyframeIndex, direction: Direction) -> f64 {
        let target = match direction {
            Direction::Backward => index.nearest_at_or_before(self.current - 2.0 * TIME_EPSILON),
            Direction::Forward => index.nearest_at_or_after(self.current + 2.0 * TIME_EPSILON),
        };
        self.seek_to(target)
    }

    /// Mark the selection start at the beginning of the current frame
    pub fn mark_in(&mut self) -> f64 {
        let aligned = self
            .frame_rate
            .frame_to_seconds(self.frame_index())
            .clamp(0.0, self.duration);
        self.mark_in = Some(aligned);
        aligned
    }

    /// Mark the selection end after the current frame
    pub fn mark_out(&mut self) -> f64 {
        let aligned = self
            .frame_rate
            .frame_to_seconds(self.frame_index() + 1)
            .clamp(0.0, self.duration);
        self.mark_out = Some(aligned);
        aligned
    }

    /// Forget both marks, selecting the whole media again
    pub fn reset_marks(&mut self) {
        self.mark_in = None;
        self.mark_out = None;
    }

    /// True when neither mark has been set
    pub fn is_full_range(&self) -> bool {
        self.mark_in.is_none() && self.mark_out.is_none()
    }

    /// Selection between the marks, defaulting to the media edges
    pub fn selection(&self) -> TrimResult<Selection> {
        let selection = Selection::new(
            self.mark_in.unwrap_or(0.0),
            self.mark_out.unwrap_or(self.duration),
        )?;
        selection.validate_within(self.duration)?;
        Ok(selection)
    }
}
