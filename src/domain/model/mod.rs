// Domain models - Core types and data structures

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{TrimError, TrimResult};

/// Tolerance used when comparing presentation timestamps.
///
/// Probe output carries microsecond precision, so two times closer than this
/// refer to the same instant.
pub const TIME_EPSILON: f64 = 1e-6;

/// Time specification with precision - represents time in seconds with fractional precision
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct TimeSpec {
    pub seconds: f64,
}

impl TimeSpec {
    /// Create a new TimeSpec from seconds
    pub fn from_seconds(seconds: f64) -> Self {
        Self { seconds }
    }

    /// Create a new TimeSpec from hours, minutes, seconds, milliseconds
    pub fn from_components(hours: u32, minutes: u32, seconds: u32, milliseconds: u32) -> Self {
        let total_seconds = hours as f64 * 3600.0
            + minutes as f64 * 60.0
            + seconds as f64
            + milliseconds as f64 / 1000.0;
        Self {
            seconds: total_seconds,
        }
    }

    /// Parse time string in `SS.mmm`, `MM:SS.mmm` or `HH:MM:SS.mmm` form
    pub fn parse(time_str: &str) -> TrimResult<Self> {
        let trimmed = time_str.trim();
        let bad = |what: &str| TrimError::invalid_selection(format!("{what} in time '{trimmed}'"));

        if let Ok(seconds) = trimmed.parse::<f64>() {
            if !seconds.is_finite() {
                return Err(bad("Non-finite value"));
            }
            if seconds < 0.0 {
                return Err(bad("Negative value"));
            }
            return Ok(Self::from_seconds(seconds));
        }

        let parts: Vec<&str> = trimmed.split(':').collect();
        let (hours, minutes, seconds_part) = match parts.as_slice() {
            [m, s] => (0u32, *m, *s),
            [h, m, s] => (
                h.parse::<u32>().map_err(|_| bad("Invalid hours"))?,
                *m,
                *s,
            ),
            _ => {
                return Err(TrimError::invalid_selection(format!(
                    "Invalid time '{trimmed}'. Supported formats: seconds (123.45), MM:SS.ms (2:30.5), HH:MM:SS.ms (1:02:30.5)"
                )))
            }
        };

        let minutes = minutes.parse::<u32>().map_err(|_| bad("Invalid minutes"))?;
        let seconds = seconds_part
            .parse::<f64>()
            .map_err(|_| bad("Invalid seconds"))?;

        if parts.len() == 3 && minutes >= 60 {
            return Err(bad("Minutes must be less than 60"));
        }
        if !(0.0..60.0).contains(&seconds) {
            return Err(bad("Seconds must be in [0, 60)"));
        }

        Ok(Self::from_seconds(
            hours as f64 * 3600.0 + minutes as f64 * 60.0 + seconds,
        ))
    }

    /// Format as HH:MM:SS.mmm
    pub fn format_hms(&self) -> String {
        let total_ms = (self.seconds.max(0.0) * 1000.0).round() as u64;
        let hours = total_ms / 3_600_000;
        let minutes = (total_ms % 3_600_000) / 60_000;
        let seconds = (total_ms % 60_000) / 1000;
        let milliseconds = total_ms % 1000;
        format!("{hours:02}:{minutes:02}:{seconds:02}.{milliseconds:03}")
    }
}

impl fmt::Display for TimeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_hms())
    }
}

/// Nominal frame rate as a rational number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRate {
    pub num: u32,
    pub den: u32,
}

impl FrameRate {
    pub fn new(num: u32, den: u32) -> TrimResult<Self> {
        if num == 0 || den == 0 {
            return Err(TrimError::parse(format!("Invalid frame rate {num}/{den}")));
        }
        Ok(Self { num, den })
    }

    /// Parse `"30000/1001"` or `"25"` as reported by ffprobe
    pub fn parse(value: &str) -> TrimResult<Self> {
        let value = value.trim();
        match value.split_once('/') {
            Some((num, den)) => {
                let num = num
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| TrimError::parse(format!("Invalid frame rate '{value}'")))?;
                let den = den
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| TrimError::parse(format!("Invalid frame rate '{value}'")))?;
                Self::new(num, den)
            }
            None => {
                let num = value
                    .parse::<u32>()
                    .map_err(|_| TrimError::parse(format!("Invalid frame rate '{value}'")))?;
                Self::new(num, 1)
            }
        }
    }

    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }

    /// Duration of one frame in seconds
    pub fn frame_duration(&self) -> f64 {
        self.den as f64 / self.num as f64
    }

    /// Start time of the given frame
    pub fn frame_to_seconds(&self, frame: i64) -> f64 {
        frame as f64 * self.den as f64 / self.num as f64
    }

    /// Index of the frame displayed at `seconds`
    pub fn seconds_to_frame(&self, seconds: f64) -> i64 {
        (seconds * self.num as f64 / self.den as f64 + TIME_EPSILON).floor() as i64
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

/// Immutable description of a probed media file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub path: PathBuf,
    /// Duration in seconds
    pub duration: f64,
    /// Container start time in seconds; seek positions are relative to it
    #[serde(default)]
    pub start_time: f64,
    pub frame_rate: FrameRate,
    pub video_codec: String,
    pub audio_codec: Option<String>,
    /// Container format name as reported by the probe
    pub container: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub pixel_format: Option<String>,
    pub video_bit_rate: Option<u64>,
    pub audio_bit_rate: Option<u64>,
}

impl MediaInfo {
    /// Create media info with the fields every export needs
    pub fn new(
        path: impl Into<PathBuf>,
        duration: f64,
        frame_rate: FrameRate,
        video_codec: impl Into<String>,
        container: impl Into<String>,
    ) -> TrimResult<Self> {
        if !duration.is_finite() || duration <= 0.0 {
            return Err(TrimError::parse(format!("Invalid media duration {duration}")));
        }
        Ok(Self {
            path: path.into(),
            duration,
            start_time: 0.0,
            frame_rate,
            video_codec: video_codec.into(),
            audio_codec: None,
            container: container.into(),
            width: None,
            height: None,
            pixel_format: None,
            video_bit_rate: None,
            audio_bit_rate: None,
        })
    }

    pub fn frame_duration(&self) -> f64 {
        self.frame_rate.frame_duration()
    }

    /// Full-length selection of this media
    pub fn full_selection(&self) -> Selection {
        Selection {
            start: 0.0,
            end: self.duration,
        }
    }

    /// Encoding profile that segment files must share to be concatenated
    pub fn stream_profile(&self) -> StreamProfile {
        StreamProfile {
            container: self.container.clone(),
            video_codec: self.video_codec.clone(),
            width: self.width,
            height: self.height,
            pixel_format: self.pixel_format.clone(),
        }
    }
}

/// Codec/container profile compared before concatenating segment files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamProfile {
    pub container: String,
    pub video_codec: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub pixel_format: Option<String>,
}

impl fmt::Display for StreamProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container, self.video_codec)?;
        if let (Some(w), Some(h)) = (self.width, self.height) {
            write!(f, " {w}x{h}")?;
        }
        if let Some(pix_fmt) = &self.pixel_format {
            write!(f, " {pix_fmt}")?;
        }
        Ok(())
    }
}

/// User-requested time range in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub start: f64,
    pub end: f64,
}

impl Selection {
    /// Create a selection, rejecting negative, non-finite or empty ranges
    pub fn new(start: f64, end: f64) -> TrimResult<Self> {
        if !start.is_finite() || !end.is_finite() {
            return Err(TrimError::invalid_selection(format!(
                "Selection bounds must be finite (start {start}, end {end})"
            )));
        }
        if start < 0.0 {
            return Err(TrimError::invalid_selection(format!(
                "Start ({start:.3}s) cannot be negative"
            )));
        }
        if start >= end {
            return Err(TrimError::invalid_selection(format!(
                "Start ({start:.3}s) must be before end ({end:.3}s)"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn from_time_specs(start: TimeSpec, end: TimeSpec) -> TrimResult<Self> {
        Self::new(start.seconds, end.seconds)
    }

    /// Build a selection from frame indices, `end_frame` exclusive
    pub fn from_frames(start_frame: u64, end_frame: u64, rate: FrameRate) -> TrimResult<Self> {
        Self::new(
            rate.frame_to_seconds(start_frame as i64),
            rate.frame_to_seconds(end_frame as i64),
        )
    }

    /// Check `0 <= start < end <= duration`
    pub fn validate_within(&self, duration: f64) -> TrimResult<()> {
        Self::new(self.start, self.end)?;
        if self.end > duration + TIME_EPSILON {
            return Err(TrimError::invalid_selection(format!(
                "End ({:.3}s) is beyond the media duration ({duration:.3}s)",
                self.end
            )));
        }
        Ok(())
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {}",
            TimeSpec::from_seconds(self.start),
            TimeSpec::from_seconds(self.end)
        )
    }
}

/// How a clip is planned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanMode {
    /// Stream copy only, widening the range to keyframes
    LosslessOnly,
    /// Exact range, re-encoding only the partial GOPs at the edges
    Accurate,
}

impl PlanMode {
    /// Parse plan mode from string
    pub fn parse(mode: &str) -> TrimResult<Self> {
        match mode.trim().to_lowercase().as_str() {
            "lossless" | "lossless-only" | "lossless_only" | "copy" => Ok(PlanMode::LosslessOnly),
            "accurate" | "exact" | "hybrid" => Ok(PlanMode::Accurate),
            other => Err(TrimError::invalid_selection(format!(
                "Unknown plan mode '{other}'. Expected 'lossless' or 'accurate'"
            ))),
        }
    }
}

impl fmt::Display for PlanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanMode::LosslessOnly => write!(f, "lossless"),
            PlanMode::Accurate => write!(f, "accurate"),
        }
    }
}

/// How a segment is realized by the external tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentMode {
    Copy,
    Reencode,
}

impl fmt::Display for SegmentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentMode::Copy => write!(f, "copy"),
            SegmentMode::Reencode => write!(f, "reencode"),
        }
    }
}

/// Half-open time range `[start, end)` with its realization mode
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub mode: SegmentMode,
}

impl Segment {
    pub fn copy(start: f64, end: f64) -> Self {
        Self {
            start,
            end,
            mode: SegmentMode::Copy,
        }
    }

    pub fn reencode(start: f64, end: f64) -> Self {
        Self {
            start,
            end,
            mode: SegmentMode::Reencode,
        }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{:.6}, {:.6})",
            self.mode, self.start, self.end
        )
    }
}

/// Ordered, gap-free list of segments realizing one selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipPlan {
    pub mode: PlanMode,
    /// The range the user asked for
    pub requested: Selection,
    pub segments: Vec<Segment>,
}

impl ClipPlan {
    /// Start of the exported range
    pub fn effective_start(&self) -> f64 {
        self.segments.first().map(|s| s.start).unwrap_or(self.requested.start)
    }

    /// End of the exported range
    pub fn effective_end(&self) -> f64 {
        self.segments.last().map(|s| s.end).unwrap_or(self.requested.end)
    }

    pub fn duration(&self) -> f64 {
        self.segments.iter().map(Segment::duration).sum()
    }

    /// True when the plan needs no concatenation step
    pub fn is_single_segment(&self) -> bool {
        self.segments.len() == 1
    }

    pub fn copy_duration(&self) -> f64 {
        self.segments
            .iter()
            .filter(|s| s.mode == SegmentMode::Copy)
            .map(Segment::duration)
            .sum()
    }
}
