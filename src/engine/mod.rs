//! Export engine: jobs, per-media export slots and plan execution

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use crate::domain::model::ClipPlan;
use crate::error::{TrimError, TrimResult};
use crate::ports::CancelSignal;

pub mod executor;
pub mod progress;

pub use executor::{ExportExecutor, ExportOptions};
pub use progress::ProgressTracker;

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle of an export job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed { message: String },
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed { .. } | JobState::Cancelled
        )
    }
}

/// Per-media guard allowing at most one active export.
///
/// A job hands its [`SlotGuard`] back when it publishes its terminal state,
/// under the same lock, so the slot reads free exactly when the job reads
/// finished.
#[derive(Debug, Clone, Default)]
pub struct ExportSlot {
    busy: Arc<AtomicBool>,
}

impl ExportSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot, failing with `Busy` when an export is already active
    pub fn try_acquire(&self, media: &Path) -> TrimResult<SlotGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| TrimError::Busy {
                path: media.display().to_string(),
            })?;
        Ok(SlotGuard {
            busy: Arc::clone(&self.busy),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Releases the export slot when dropped
#[derive(Debug)]
pub struct SlotGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Summary of a finished job
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job_id: u64,
    pub output: PathBuf,
    pub state: JobState,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub segments: usize,
    pub copied_seconds: f64,
    pub total_seconds: f64,
}

#[derive(Debug)]
struct JobShared {
    id: u64,
    output: PathBuf,
    plan: ClipPlan,
    started_at: DateTime<Utc>,
    finished_at: watch::Sender<Option<DateTime<Utc>>>,
    state: watch::Sender<JobState>,
    progress: Arc<watch::Sender<f64>>,
    cancel: watch::Sender<bool>,
}

/// Handle to one asynchronous export.
///
/// Clones observe the same job. Only the job's own task writes the terminal
/// state; [`ExportJob::cancel`] merely raises a flag that the task honors.
#[derive(Debug, Clone)]
pub struct ExportJob {
    shared: Arc<JobShared>,
}

impl ExportJob {
    pub(crate) fn new(plan: ClipPlan, output: PathBuf) -> Self {
        let (state, _) = watch::channel(JobState::Pending);
        let (progress, _) = watch::channel(0.0);
        let (cancel, _) = watch::channel(false);
        let (finished_at, _) = watch::channel(None);
        Self {
            shared: Arc::new(JobShared {
                id: NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed),
                output,
                plan,
                started_at: Utc::now(),
                finished_at,
                state,
                progress: Arc::new(progress),
                cancel,
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn output(&self) -> &Path {
        &self.shared.output
    }

    pub fn plan(&self) -> &ClipPlan {
        &self.shared.plan
    }

    pub fn state(&self) -> JobState {
        self.shared.state.borrow().clone()
    }

    /// Latest published progress in percent
    pub fn progress(&self) -> f64 {
        *self.shared.progress.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<JobState> {
        self.shared.state.subscribe()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<f64> {
        self.shared.progress.subscribe()
    }

    /// Request cancellation. Idempotent, and a no-op once the job is terminal.
    pub fn cancel(&self) {
        if self.state().is_terminal() {
            return;
        }
        self.shared.cancel.send_if_modified(|requested| {
            let changed = !*requested;
            *requested = true;
            changed
        });
    }

    pub fn is_cancel_requested(&self) -> bool {
        *self.shared.cancel.borrow()
    }

    /// Wait for the terminal state, returning the output path on success
    pub async fn wait(&self) -> TrimResult<PathBuf> {
        let mut rx = self.subscribe_state();
        loop {
            let state = rx.borrow_and_update().clone();
            match state {
                JobState::Succeeded => return Ok(self.shared.output.clone()),
                JobState::Failed { message } => return Err(TrimError::ExportFailed { message }),
                JobState::Cancelled => return Err(TrimError::Cancelled),
                JobState::Pending | JobState::Running => {}
            }
            if rx.changed().await.is_err() {
                return Err(TrimError::export_failed("export job was dropped"));
            }
        }
    }

    pub fn report(&self) -> JobReport {
        JobReport {
            job_id: self.shared.id,
            output: self.shared.output.clone(),
            state: self.state(),
            started_at: self.shared.started_at,
            finished_at: *self.shared.finished_at.borrow(),
            segments: self.shared.plan.segments.len(),
            copied_seconds: self.shared.plan.copy_duration(),
            total_seconds: self.shared.plan.duration(),
        }
    }

    pub(crate) fn cancel_signal(&self) -> CancelSignal {
        CancelSignal::new(self.shared.cancel.subscribe())
    }

    pub(crate) fn progress_sender(&self) -> Arc<watch::Sender<f64>> {
        Arc::clone(&self.shared.progress)
    }

    pub(crate) fn mark_running(&self) {
        self.shared.state.send_if_modified(|state| {
            if *state == JobState::Pending {
                *state = JobState::Running;
                true
            } else {
                false
            }
        });
    }

    /// Publish the terminal state and release `slot` with it. Later calls are ignored.
    pub(crate) fn finish(&self, terminal: JobState, slot: Option<SlotGuard>) {
        let now = Utc::now();
        let published = self.shared.state.send_if_modified(move |state| {
            // readers of the state wait on this lock, so nobody sees a free
            // slot next to a running job or a finished job holding the slot
            drop(slot);
            if state.is_terminal() {
                false
            } else {
                *state = terminal;
                true
            }
        });
        if published {
            self.shared.finished_at.send_replace(Some(now));
        }
    }
}
