use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::JobError;

/// Suspend/resume switch for one job.
///
/// The job closes the gate with [`pause`](Self::pause) and parks in
/// [`await_resumed`](Self::await_resumed); an operator reopens it with
/// [`resume`](Self::resume). Repeated pause/resume cycles are allowed.
#[derive(Debug, Clone)]
pub struct PauseGate {
    paused: Arc<watch::Sender<bool>>,
}

impl Default for PauseGate {
    fn default() -> Self {
        Self::new()
    }
}

impl PauseGate {
    /// Creates an open gate.
    #[must_use]
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            paused: Arc::new(paused),
        }
    }

    /// Closes the gate and notifies observers.
    pub fn pause(&self) {
        self.paused.send_replace(true);
        info!("job paused, awaiting resume");
    }

    /// Reopens the gate. No-op when the gate is not closed.
    pub fn resume(&self) {
        let resumed = self.paused.send_if_modified(|paused| {
            if *paused {
                *paused = false;
                true
            } else {
                false
            }
        });
        if resumed {
            info!("job resumed");
        } else {
            debug!("resume ignored, job not paused");
        }
    }

    /// Returns true while the gate is closed.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Watches the paused flag.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.paused.subscribe()
    }

    /// Waits until the gate is open.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Cancelled`] if `cancel` fires first.
    pub async fn await_resumed(&self, cancel: &CancellationToken) -> Result<(), JobError> {
        let mut paused = self.paused.subscribe();
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(JobError::Cancelled),
            result = paused.wait_for(|paused| !*paused) => result
                .map(|_| ())
                .map_err(|_| JobError::internal("pause gate closed unexpectedly")),
        }
    }
}
