//! Download manager: spawns one task per job and shares the global limits.
//!
//! # Overview
//!
//! [`DownloadManager::start`] returns a [`DownloadJob`] handle immediately
//! and runs the job on the Tokio runtime. Every job passes through the same
//! [`PermitPool`] and [`ResourceLocks`], so at most `max_concurrent_jobs`
//! jobs are past preparation at once and no two jobs write the same item.
//!
//! # Concurrency Model
//!
//! - Each job runs in its own Tokio task
//! - The item lock is taken before the permit; both are released in cleanup
//! - Cleanup runs after the terminal state is published and is not cancellable
//! - [`DownloadJob::wait`] returns only after cleanup completed

mod job;
mod pipeline;

pub use job::DownloadJob;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span, instrument};

use super::{FailsafePolicy, HttpClient};
use crate::archive::{ArchiveFactory, CbzArchiveFactory};
use crate::cache::{NoCache, PageCache};
use crate::config::{ConfigError, DownloadSettings};
use crate::control::{PauseGate, PermitPool, ResourceLocks};
use crate::library::{DirectoryLibrary, LocalLibrary};
use crate::model::WorkItem;
use crate::source::{ManifestSource, RemoteSource, SourceRegistry};
use crate::state::{DownloadJobState, JobId, StateObserver, StateReporter};

use pipeline::JobContext;

/// External collaborators used by every job of a [`DownloadManager`].
#[derive(Clone)]
pub struct Collaborators {
    client: HttpClient,
    sources: SourceRegistry,
    cache: Arc<dyn PageCache>,
    archives: Arc<dyn ArchiveFactory>,
    library: Arc<dyn LocalLibrary>,
    observer: Option<Arc<dyn StateObserver>>,
}

impl Collaborators {
    /// Default collaborators writing `.cbz` archives into `output_dir`.
    ///
    /// Registers [`ManifestSource`], uses no page cache, and a default [`HttpClient`].
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        let mut sources = SourceRegistry::new();
        sources.register(Arc::new(ManifestSource::new()));
        Self {
            client: HttpClient::new(),
            sources,
            cache: Arc::new(NoCache),
            archives: Arc::new(CbzArchiveFactory),
            library: Arc::new(DirectoryLibrary::new([output_dir.into()])),
            observer: None,
        }
    }

    /// Replaces the page fetcher.
    #[must_use]
    pub fn with_client(mut self, client: HttpClient) -> Self {
        self.client = client;
        self
    }

    /// Adds or replaces a remote source.
    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn RemoteSource>) -> Self {
        self.sources.register(source);
        self
    }

    /// Replaces the whole source registry.
    #[must_use]
    pub fn with_sources(mut self, sources: SourceRegistry) -> Self {
        self.sources = sources;
        self
    }

    /// Replaces the page cache.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn PageCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Replaces the archive factory.
    #[must_use]
    pub fn with_archive_factory(mut self, archives: Arc<dyn ArchiveFactory>) -> Self {
        self.archives = archives;
        self
    }

    /// Replaces the local library.
    #[must_use]
    pub fn with_library(mut self, library: Arc<dyn LocalLibrary>) -> Self {
        self.library = library;
        self
    }

    /// Forwards every state of every job to `observer`.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn StateObserver>) -> Self {
        self.observer = Some(observer);
        self
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("client", &self.client)
            .field("sources", &self.sources)
            .field("observer", &self.observer.is_some())
            .finish_non_exhaustive()
    }
}

/// State shared by the manager and its running jobs.
#[derive(Debug)]
struct Shared {
    policy: FailsafePolicy,
    slowdown: Option<Duration>,
    permits: PermitPool,
    locks: ResourceLocks,
    collaborators: Collaborators,
}

/// Starts download jobs and enforces the global concurrency cap.
///
/// Cloning is cheap and shares limits and collaborators.
#[derive(Debug, Clone)]
pub struct DownloadManager {
    shared: Arc<Shared>,
}

impl DownloadManager {
    /// Creates a manager from validated settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::OutOfRange`] if any setting is out of range.
    pub fn new(
        settings: DownloadSettings,
        collaborators: Collaborators,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;
        info!(
            max_concurrent_jobs = settings.max_concurrent_jobs,
            retry_budget = settings.retry_budget,
            slowdown = settings.slowdown,
            "download manager ready"
        );
        Ok(Self {
            shared: Arc::new(Shared {
                policy: settings.failsafe_policy(),
                slowdown: settings.slowdown_delay(),
                permits: PermitPool::new(settings.max_concurrent_jobs),
                locks: ResourceLocks::new(),
                collaborators,
            }),
        })
    }

    /// Maximum number of jobs past preparation at once.
    #[must_use]
    pub fn max_concurrent_jobs(&self) -> usize {
        self.shared.permits.capacity()
    }

    /// Number of jobs currently holding a permit.
    #[must_use]
    pub fn active_jobs(&self) -> usize {
        self.shared.permits.in_use()
    }

    /// Returns true while a job holds the lock for `item_id`.
    #[must_use]
    pub fn is_item_locked(&self, item_id: u64) -> bool {
        self.shared.locks.is_locked(item_id)
    }

    /// Spawns a job downloading `chapter_ids` of `item` (all chapters when empty).
    ///
    /// Must be called from within a Tokio runtime.
    #[instrument(skip(self, item, chapter_ids), fields(item_id = item.id, chapters = chapter_ids.len()))]
    pub fn start(&self, item: WorkItem, chapter_ids: Vec<u64>, job_id: JobId) -> DownloadJob {
        let item = Arc::new(item);
        let initial = DownloadJobState::Queued {
            job_id,
            item: Arc::clone(&item),
            cover: None,
        };
        let reporter = Arc::new(match &self.shared.collaborators.observer {
            Some(observer) => StateReporter::with_observer(initial, Arc::clone(observer)),
            None => StateReporter::new(initial),
        });
        let gate = PauseGate::new();
        let cancel = CancellationToken::new();
        let finished = CancellationToken::new();

        let context = JobContext {
            shared: Arc::clone(&self.shared),
            job_id,
            reporter: Arc::clone(&reporter),
            gate: gate.clone(),
            cancel: cancel.clone(),
        };
        let span = info_span!("download_job", job_id, item_id = item.id);
        let done = finished.clone().drop_guard();
        tokio::spawn(
            async move {
                let _done = done;
                context.run(item, chapter_ids).await;
            }
            .instrument(span),
        );

        DownloadJob::new(job_id, reporter, gate, cancel, finished)
    }
}
