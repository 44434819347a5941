//! TrimCut - frame-accurate, lossless video trimming
//!
//! Builds a keyframe index from probe output, plans a selection as stream-copied
//! GOPs with re-encoded partial GOPs at the edges, and runs the plan through
//! FFmpeg as external processes with progress, cancellation and cleanup.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use trimcut::adapters::{FfmpegAdapter, FfprobeAdapter};
//! use trimcut::app::MediaHandle;
//! use trimcut::domain::model::{PlanMode, Selection};
//! use trimcut::engine::ExportExecutor;
//! use trimcut::playback::NavigationSteps;
//!
//! # async fn demo() -> trimcut::TrimResult<()> {
//! let probe = Arc::new(FfprobeAdapter::new("ffprobe"));
//! let handle = MediaHandle::open(Path::new("in.mp4"), probe.as_ref(), NavigationSteps::default()).await?;
//! let plan = handle.plan(&Selection::new(1.0, 2.0)?, PlanMode::Accurate)?;
//!
//! let executor = ExportExecutor::new(probe, Arc::new(FfmpegAdapter::new("ffmpeg")));
//! let job = executor.submit(&handle, plan, "out.mp4")?;
//! job.wait().await?;
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod app;
pub mod cli;
pub mod domain;
pub mod engine;
pub mod error;
pub mod output;
pub mod planner;
pub mod playback;
pub mod ports;
pub mod utils;

// Re-export commonly used types
pub use app::MediaHandle;
pub use domain::model::{ClipPlan, MediaInfo, PlanMode, Segment, SegmentMode, Selection};
pub use engine::{ExportExecutor, ExportJob, JobState};
pub use error::{TrimError, TrimResult};
pub use planner::{ClipPlanner, KeyframeIndex};
pub use playback::PlaybackPosition;
