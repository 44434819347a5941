//! Opened media: probe results, keyframe index and navigation state

use std::path::Path;
use std::sync::Arc;

use tracing::{info, instrument};

use crate::domain::model::{ClipPlan, MediaInfo, PlanMode, Selection};
use crate::engine::ExportSlot;
use crate::error::{TrimError, TrimResult};
use crate::planner::{ClipPlanner, KeyframeIndex};
use crate::playback::{NavigationSteps, PlaybackPosition};
use crate::ports::ProbePort;

/// A media file opened for trimming.
///
/// Media info and the keyframe index are immutable and shared; the playback
/// position belongs to this handle alone. At most one export may run per
/// handle at a time.
#[derive(Debug)]
pub struct MediaHandle {
    info: Arc<MediaInfo>,
    keyframes: Arc<KeyframeIndex>,
    position: PlaybackPosition,
    export_slot: ExportSlot,
}

impl MediaHandle {
    /// Probe `path` and build its keyframe index
    #[instrument(skip(probe, steps), fields(path = %path.display()))]
    pub async fn open(
        path: &Path,
        probe: &dyn ProbePort,
        steps: NavigationSteps,
    ) -> TrimResult<Self> {
        if !path.is_file() {
            return Err(TrimError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Input file not found: {}", path.display()),
            )));
        }

        let info = probe.probe_media(path).await?;
        let lines = probe.probe_keyframes(path).await?;
        let keyframes = KeyframeIndex::build_from_origin(&lines, info.duration, info.start_time)?;

        info!(
            "Opened {} ({:.3}s, {} fps, {} keyframes)",
            path.display(),
            info.duration,
            info.frame_rate,
            keyframes.len()
        );

        Ok(Self::from_parts(info, keyframes).with_steps(steps))
    }

    /// Assemble a handle from already probed data
    pub fn from_parts(info: MediaInfo, keyframes: KeyframeIndex) -> Self {
        let position = PlaybackPosition::for_media(&info);
        Self {
            info: Arc::new(info),
            keyframes: Arc::new(keyframes),
            position,
            export_slot: ExportSlot::new(),
        }
    }

    pub fn with_steps(mut self, steps: NavigationSteps) -> Self {
        self.position = self.position.with_steps(steps);
        self
    }

    pub fn path(&self) -> &Path {
        &self.info.path
    }

    pub fn info(&self) -> &Arc<MediaInfo> {
        &self.info
    }

    pub fn keyframes(&self) -> &Arc<KeyframeIndex> {
        &self.keyframes
    }

    pub fn position(&self) -> &PlaybackPosition {
        &self.position
    }

    pub fn position_mut(&mut self) -> &mut PlaybackPosition {
        &mut self.position
    }

    pub fn export_slot(&self) -> &ExportSlot {
        &self.export_slot
    }

    pub fn is_exporting(&self) -> bool {
        self.export_slot.is_busy()
    }

    /// Plan `selection` against this media's keyframes
    pub fn plan(&self, selection: &Selection, mode: PlanMode) -> TrimResult<ClipPlan> {
        ClipPlanner::new().plan(selection, &self.keyframes, mode)
    }

    /// Plan the current mark in/out selection
    pub fn plan_marked(&self, mode: PlanMode) -> TrimResult<ClipPlan> {
        let selection = self.position.selection()?;
        self.plan(&selection, mode)
    }
}
