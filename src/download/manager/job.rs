//! Caller-side handle of a running download job.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::control::PauseGate;
use crate::state::{DownloadJobState, JobId, StateReporter};

/// Handle to a spawned job: state stream, cancel, and resume.
///
/// Dropping the handle does not stop the job.
#[derive(Debug, Clone)]
pub struct DownloadJob {
    job_id: JobId,
    reporter: Arc<StateReporter>,
    gate: PauseGate,
    cancel: CancellationToken,
    finished: CancellationToken,
}

impl DownloadJob {
    pub(super) fn new(
        job_id: JobId,
        reporter: Arc<StateReporter>,
        gate: PauseGate,
        cancel: CancellationToken,
        finished: CancellationToken,
    ) -> Self {
        Self {
            job_id,
            reporter,
            gate,
            cancel,
            finished,
        }
    }

    /// Caller-assigned identity.
    #[must_use]
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Latest published state.
    #[must_use]
    pub fn state(&self) -> DownloadJobState {
        self.reporter.current()
    }

    /// Watches the state slot. Slow readers only ever see the newest state.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<DownloadJobState> {
        self.reporter.subscribe()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            info!(job_id = self.job_id, "cancellation requested");
        }
        self.cancel.cancel();
    }

    /// Reopens the pause gate. A no-op unless the job is paused.
    pub fn resume(&self) {
        self.gate.resume();
    }

    /// Returns true while the job waits for [`resume`](Self::resume).
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.gate.is_paused()
    }

    /// Returns true once the job task finished, cleanup included.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished.is_cancelled()
    }

    /// Waits until the job task finished, cleanup included, and returns its terminal state.
    pub async fn wait(&self) -> DownloadJobState {
        self.finished.cancelled().await;
        self.state()
    }
}
