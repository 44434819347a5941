// Ports - Interface definitions (contracts)

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::watch;

use crate::domain::model::*;
use crate::error::TrimResult;

/// Port for media file probing
#[async_trait]
pub trait ProbePort: Send + Sync {
    /// Probe container and primary streams of a media file
    async fn probe_media(&self, path: &Path) -> TrimResult<MediaInfo>;

    /// Per-frame `timestamp,flag` records for the primary video stream.
    ///
    /// Lines are returned as the tool produced them; validation is left to
    /// the keyframe index.
    async fn probe_keyframes(&self, path: &Path) -> TrimResult<Vec<String>>;
}

/// Parameters a re-encoded segment should match
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReencodeParams {
    pub video_codec: String,
    pub pixel_format: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub video_bit_rate: Option<u64>,
    pub audio_codec: Option<String>,
    pub audio_bit_rate: Option<u64>,
}

impl ReencodeParams {
    /// Parameters matching the probed source
    pub fn matching(info: &MediaInfo) -> Self {
        Self {
            video_codec: info.video_codec.clone(),
            pixel_format: info.pixel_format.clone(),
            width: info.width,
            height: info.height,
            video_bit_rate: info.video_bit_rate,
            audio_codec: info.audio_codec.clone(),
            audio_bit_rate: info.audio_bit_rate,
        }
    }
}

/// One external tool invocation
#[derive(Debug, Clone, PartialEq)]
pub enum ToolRequest {
    /// Repackage encoded data over `[start, end)` without decoding
    StreamCopy {
        source: PathBuf,
        start: f64,
        end: f64,
        output: PathBuf,
    },
    /// Decode and re-encode `[start, end)` matching the source parameters
    Reencode {
        source: PathBuf,
        start: f64,
        end: f64,
        params: ReencodeParams,
        output: PathBuf,
    },
    /// Join codec-compatible files in order without re-encoding
    Concat {
        inputs: Vec<PathBuf>,
        output: PathBuf,
        /// Scratch directory for tool-specific helper files
        work_dir: PathBuf,
    },
}

impl ToolRequest {
    /// Build the request realizing one plan segment
    pub fn for_segment(info: &MediaInfo, segment: &Segment, output: PathBuf) -> Self {
        match segment.mode {
            SegmentMode::Copy => ToolRequest::StreamCopy {
                source: info.path.clone(),
                start: segment.start,
                end: segment.end,
                output,
            },
            SegmentMode::Reencode => ToolRequest::Reencode {
                source: info.path.clone(),
                start: segment.start,
                end: segment.end,
                params: ReencodeParams::matching(info),
                output,
            },
        }
    }

    pub fn output(&self) -> &Path {
        match self {
            ToolRequest::StreamCopy { output, .. }
            | ToolRequest::Reencode { output, .. }
            | ToolRequest::Concat { output, .. } => output,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ToolRequest::StreamCopy { .. } => "copy",
            ToolRequest::Reencode { .. } => "reencode",
            ToolRequest::Concat { .. } => "concat",
        }
    }
}

/// Receiving side of a job's cancellation flag
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    /// A signal that never fires
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation has been requested
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                // sender gone: nobody can cancel any more
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Progress sink receiving seconds of output written so far
pub type ProgressSink<'a> = &'a (dyn Fn(f64) + Send + Sync);

/// Port for running external media tool invocations
#[async_trait]
pub trait ExecutePort: Send + Sync {
    /// Run one request to completion.
    ///
    /// Reports processed seconds through `progress`, kills the tool and
    /// returns [`crate::error::TrimError::Cancelled`] when `cancel` fires, and
    /// returns [`crate::error::TrimError::ExportFailed`] carrying the tool's
    /// diagnostics when it exits unsuccessfully.
    async fn run(
        &self,
        request: &ToolRequest,
        progress: ProgressSink<'_>,
        cancel: CancelSignal,
    ) -> TrimResult<()>;
}
