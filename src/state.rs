//! Job lifecycle states and the latest-value-wins state channel.
//!
//! A job moves `Queued → Preparing → Progress* → PostProcessing → Done`.
//! `Paused` is entered only from inside a fetch step and is always left by
//! restoring the snapshot that preceded it. `Error` and `Cancelled` may
//! follow any non-terminal state. Exactly one terminal state is published
//! per job; [`StateReporter`] drops anything published after it.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::JobError;
use crate::model::{Cover, LocalItem, WorkItem};

/// Caller-assigned job identity.
pub type JobId = u32;

/// Snapshot of a job's lifecycle.
#[derive(Debug, Clone)]
pub enum DownloadJobState {
    /// Initial state.
    Queued {
        job_id: JobId,
        item: Arc<WorkItem>,
        cover: Option<Cover>,
    },
    /// Lock and permit acquired, metadata resolution in progress.
    Preparing {
        job_id: JobId,
        item: Arc<WorkItem>,
        cover: Option<Cover>,
    },
    /// Emitted after each page completes.
    Progress {
        job_id: JobId,
        item: Arc<WorkItem>,
        cover: Option<Cover>,
        total_chapters: usize,
        current_chapter: usize,
        total_pages: usize,
        current_page: usize,
    },
    /// Retry budget exhausted; waiting for an operator to resume.
    Paused {
        job_id: JobId,
        item: Arc<WorkItem>,
        cover: Option<Cover>,
        error: Arc<JobError>,
    },
    /// Unrecoverable failure. Terminal.
    Error {
        job_id: JobId,
        item: Arc<WorkItem>,
        cover: Option<Cover>,
        error: Arc<JobError>,
    },
    /// All pages fetched, archive being finalized.
    PostProcessing {
        job_id: JobId,
        item: Arc<WorkItem>,
        cover: Option<Cover>,
    },
    /// Terminal success.
    Done {
        job_id: JobId,
        item: Arc<WorkItem>,
        cover: Option<Cover>,
        result: Arc<LocalItem>,
    },
    /// Terminal, caller-initiated.
    Cancelled {
        job_id: JobId,
        item: Arc<WorkItem>,
        cover: Option<Cover>,
    },
}

impl DownloadJobState {
    /// Job identity carried by every state.
    #[must_use]
    pub fn job_id(&self) -> JobId {
        match self {
            Self::Queued { job_id, .. }
            | Self::Preparing { job_id, .. }
            | Self::Progress { job_id, .. }
            | Self::Paused { job_id, .. }
            | Self::Error { job_id, .. }
            | Self::PostProcessing { job_id, .. }
            | Self::Done { job_id, .. }
            | Self::Cancelled { job_id, .. } => *job_id,
        }
    }

    /// Item snapshot carried by every state.
    #[must_use]
    pub fn item(&self) -> &Arc<WorkItem> {
        match self {
            Self::Queued { item, .. }
            | Self::Preparing { item, .. }
            | Self::Progress { item, .. }
            | Self::Paused { item, .. }
            | Self::Error { item, .. }
            | Self::PostProcessing { item, .. }
            | Self::Done { item, .. }
            | Self::Cancelled { item, .. } => item,
        }
    }

    /// Cover thumbnail, when one was loaded.
    #[must_use]
    pub fn cover(&self) -> Option<&Cover> {
        match self {
            Self::Queued { cover, .. }
            | Self::Preparing { cover, .. }
            | Self::Progress { cover, .. }
            | Self::Paused { cover, .. }
            | Self::Error { cover, .. }
            | Self::PostProcessing { cover, .. }
            | Self::Done { cover, .. }
            | Self::Cancelled { cover, .. } => cover.as_ref(),
        }
    }

    /// Short lowercase state name for logs and UIs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Queued { .. } => "queued",
            Self::Preparing { .. } => "preparing",
            Self::Progress { .. } => "progress",
            Self::Paused { .. } => "paused",
            Self::Error { .. } => "error",
            Self::PostProcessing { .. } => "post_processing",
            Self::Done { .. } => "done",
            Self::Cancelled { .. } => "cancelled",
        }
    }

    /// True for `Done`, `Error`, and `Cancelled`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Done { .. } | Self::Error { .. } | Self::Cancelled { .. }
        )
    }

    /// True for `Paused`, the only retryable error state.
    #[must_use]
    pub fn can_retry(&self) -> bool {
        matches!(self, Self::Paused { .. })
    }

    /// The error carried by `Paused` or `Error`.
    #[must_use]
    pub fn error(&self) -> Option<&Arc<JobError>> {
        match self {
            Self::Paused { error, .. } | Self::Error { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Overall completion in `0.0..=1.0` for `Progress`, otherwise `None`.
    ///
    /// Assumes every chapter has the current chapter's page count.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn percent(&self) -> Option<f64> {
        match self {
            Self::Progress {
                total_chapters,
                current_chapter,
                total_pages,
                current_page,
                ..
            } => {
                let total = total_pages * total_chapters;
                if total == 0 {
                    return Some(0.0);
                }
                let done = total_pages * current_chapter + current_page + 1;
                Some((done as f64 / total as f64).min(1.0))
            }
            _ => None,
        }
    }

    /// Builds a `Paused` state from this snapshot.
    #[must_use]
    pub fn to_paused(&self, error: Arc<JobError>) -> Self {
        Self::Paused {
            job_id: self.job_id(),
            item: Arc::clone(self.item()),
            cover: self.cover().cloned(),
            error,
        }
    }

    /// Builds an `Error` state from this snapshot.
    #[must_use]
    pub fn to_error(&self, error: Arc<JobError>) -> Self {
        Self::Error {
            job_id: self.job_id(),
            item: Arc::clone(self.item()),
            cover: self.cover().cloned(),
            error,
        }
    }

    /// Builds a `Cancelled` state from this snapshot.
    #[must_use]
    pub fn to_cancelled(&self) -> Self {
        Self::Cancelled {
            job_id: self.job_id(),
            item: Arc::clone(self.item()),
            cover: self.cover().cloned(),
        }
    }
}

/// Synchronous hook called with every accepted state, in publish order.
///
/// Unlike the watch channel, an observer sees every transition. It runs on
/// the job task and must not block.
pub trait StateObserver: Send + Sync {
    /// Called after `state` became the current state.
    fn on_state(&self, state: &DownloadJobState);
}

/// Single-writer, multi-reader slot holding a job's latest state.
///
/// Readers never see a backlog, only the freshest value.
pub struct StateReporter {
    tx: watch::Sender<DownloadJobState>,
    observer: Option<Arc<dyn StateObserver>>,
}

impl fmt::Debug for StateReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateReporter")
            .field("current", &self.tx.borrow().name())
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl StateReporter {
    /// Creates a reporter holding `initial`.
    #[must_use]
    pub fn new(initial: DownloadJobState) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx, observer: None }
    }

    /// Creates a reporter that also forwards every accepted state to `observer`.
    #[must_use]
    pub fn with_observer(initial: DownloadJobState, observer: Arc<dyn StateObserver>) -> Self {
        observer.on_state(&initial);
        let (tx, _) = watch::channel(initial);
        Self {
            tx,
            observer: Some(observer),
        }
    }

    /// Replaces the current state. Ignored once a terminal state was published.
    pub fn publish(&self, state: DownloadJobState) {
        let mut next = Some(state);
        self.tx.send_if_modified(|current| {
            if current.is_terminal() {
                return false;
            }
            if let Some(next) = next.take() {
                *current = next;
            }
            true
        });
        if let Some(dropped) = next {
            warn!(
                job_id = dropped.job_id(),
                state = dropped.name(),
                "ignoring state published after terminal state"
            );
        } else {
            let current = self.current();
            debug!(job_id = current.job_id(), state = current.name(), "state published");
            if let Some(observer) = &self.observer {
                observer.on_state(&current);
            }
        }
    }

    /// Returns a copy of the current state.
    #[must_use]
    pub fn current(&self) -> DownloadJobState {
        self.tx.borrow().clone()
    }

    /// Watches the state slot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<DownloadJobState> {
        self.tx.subscribe()
    }
}
