//! Plan execution through external tools
//!
//! An export runs on its own task. Segments are produced one after another
//! into a staging directory beside the output, joined when there is more than
//! one, and the result is renamed onto the requested path. Until that rename
//! the destination is never touched, and on failure or cancellation the
//! staging directory is removed with everything in it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn, Instrument};

use crate::app::MediaHandle;
use crate::domain::model::{ClipPlan, MediaInfo};
use crate::domain::rules::{PlanValidator, SegmentCompatibility};
use crate::engine::progress::ProgressTracker;
use crate::engine::{ExportJob, JobState, SlotGuard};
use crate::error::{TrimError, TrimResult};
use crate::output::writer::ensure_non_empty;
use crate::output::{ensure_distinct_from_source, extension_of, StagingArea};
use crate::ports::{CancelSignal, ExecutePort, ProbePort, ToolRequest};

/// Behavior switches for exports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Probe segment files and refuse to join mismatched ones
    pub verify_segments: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            verify_segments: true,
        }
    }
}

/// Runs clip plans as background export jobs
#[derive(Clone)]
pub struct ExportExecutor {
    probe: Arc<dyn ProbePort>,
    execute: Arc<dyn ExecutePort>,
    options: ExportOptions,
}

impl ExportExecutor {
    pub fn new(probe: Arc<dyn ProbePort>, execute: Arc<dyn ExecutePort>) -> Self {
        Self {
            probe,
            execute,
            options: ExportOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ExportOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> ExportOptions {
        self.options
    }

    /// Start exporting `plan` from `handle` to `output`.
    ///
    /// Returns immediately with a job handle. Fails with `Busy`, without any
    /// side effect, while another export of the same handle is active.
    pub fn submit(
        &self,
        handle: &MediaHandle,
        plan: ClipPlan,
        output: impl Into<PathBuf>,
    ) -> TrimResult<ExportJob> {
        let output = output.into();
        PlanValidator::validate(&plan, handle.keyframes())?;
        ensure_distinct_from_source(&output, handle.path())?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TrimError::export_failed(format!("No async runtime available: {e}")))?;

        let guard = handle.export_slot().try_acquire(handle.path())?;
        let job = ExportJob::new(plan, output);
        info!(
            job = job.id(),
            "Submitting export of {} to {} ({} segments)",
            handle.path().display(),
            job.output().display(),
            job.plan().segments.len()
        );

        let task = JobTask {
            info: Arc::clone(handle.info()),
            probe: Arc::clone(&self.probe),
            execute: Arc::clone(&self.execute),
            options: self.options,
            job: job.clone(),
        };
        let span = tracing::info_span!("export", job = job.id());
        runtime.spawn(task.run(guard).instrument(span));

        Ok(job)
    }
}

/// Everything one export task needs, owned by the task
struct JobTask {
    info: Arc<MediaInfo>,
    probe: Arc<dyn ProbePort>,
    execute: Arc<dyn ExecutePort>,
    options: ExportOptions,
    job: ExportJob,
}

impl JobTask {
    async fn run(self, guard: SlotGuard) {
        self.job.mark_running();
        let outcome = self.export().await;

        let terminal = match outcome {
            Ok(()) => {
                info!("Export finished: {}", self.job.output().display());
                JobState::Succeeded
            }
            Err(TrimError::Cancelled) => {
                info!("Export cancelled");
                JobState::Cancelled
            }
            Err(e) => {
                error!("{}", e);
                let message = match e {
                    TrimError::ExportFailed { message } => message,
                    other => other.to_string(),
                };
                JobState::Failed { message }
            }
        };
        self.job.finish(terminal, Some(guard));
    }

    async fn export(&self) -> TrimResult<()> {
        let plan = self.job.plan();
        let output = self.job.output();
        let cancel = self.job.cancel_signal();
        let tracker = ProgressTracker::new(plan, self.job.progress_sender());

        let staging = StagingArea::beside(output, &extension_of(&self.info.path))?;
        let assembled = staging.assembled_path();

        if plan.is_single_segment() {
            self.run_segment(0, &assembled, &tracker, &cancel).await?;
        } else {
            let mut parts = Vec::with_capacity(plan.segments.len());
            for index in 0..plan.segments.len() {
                let part = staging.segment_path(index);
                self.run_segment(index, &part, &tracker, &cancel).await?;
                parts.push(part);
            }

            if self.options.verify_segments {
                self.verify_compatible(&parts).await?;
            }
            check_cancelled(&cancel)?;

            let request = ToolRequest::Concat {
                inputs: parts,
                output: assembled.clone(),
                work_dir: staging.path().to_path_buf(),
            };
            debug!("Joining {} segments", plan.segments.len());
            self.execute
                .run(&request, &|_seconds: f64| {}, cancel.clone())
                .await?;
        }

        ensure_non_empty(&assembled)?;
        check_cancelled(&cancel)?;
        staging.promote(&assembled, output)?;
        tracker.complete();
        Ok(())
    }

    async fn run_segment(
        &self,
        index: usize,
        destination: &Path,
        tracker: &ProgressTracker,
        cancel: &CancelSignal,
    ) -> TrimResult<()> {
        check_cancelled(cancel)?;
        let segment = &self.job.plan().segments[index];
        let request = ToolRequest::for_segment(&self.info, segment, destination.to_path_buf());
        debug!("Segment {}: {}", index, segment);

        let report = |seconds: f64| tracker.segment_progress(index, seconds);
        self.execute.run(&request, &report, cancel.clone()).await?;

        ensure_non_empty(destination)?;
        tracker.segment_finished(index);
        Ok(())
    }

    async fn verify_compatible(&self, parts: &[PathBuf]) -> TrimResult<()> {
        let mut profiles = Vec::with_capacity(parts.len());
        for part in parts {
            let info = self.probe.probe_media(part).await.map_err(|e| {
                TrimError::export_failed(format!("Cannot verify segment {}: {}", part.display(), e))
            })?;
            profiles.push((part.clone(), info.stream_profile()));
        }
        SegmentCompatibility::check(&profiles).map_err(|e| {
            warn!("Segment verification failed: {}", e);
            e
        })
    }
}

fn check_cancelled(cancel: &CancelSignal) -> TrimResult<()> {
    if cancel.is_cancelled() {
        Err(TrimError::Cancelled)
    } else {
        Ok(())
    }
}
