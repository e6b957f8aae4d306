//! Shared fixtures for integration tests: a scripted remote source, state
//! observers, and wiremock page servers.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tomefetch_core::source::{RemoteSource, SourceError};
use tomefetch_core::{
    Chapter, Collaborators, DownloadJobState, DownloadManager, DownloadSettings, JobId, Page,
    SourceId, StateObserver, WorkItem,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Registry name of [`FakeSource`].
pub const FAKE_SOURCE: &str = "fake";

/// Chapter ids of [`book`], in order.
pub const CHAPTER_IDS: [u64; 2] = [11, 12];

/// Pages per chapter served by [`FakeSource`].
pub const PAGES_PER_CHAPTER: usize = 3;

/// Source whose pages live on a wiremock server at `/c{chapter}/p{n}.png`.
pub struct FakeSource {
    base: String,
    page_list_calls: AtomicUsize,
    page_list_timeouts: usize,
    panic_on_page_list: bool,
}

impl FakeSource {
    pub fn new(base: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::build(base.into(), 0, false))
    }

    /// Source whose first `timeouts` page-list requests time out.
    pub fn flaky_page_lists(base: impl Into<String>, timeouts: usize) -> Arc<Self> {
        Arc::new(Self::build(base.into(), timeouts, false))
    }

    /// Source that panics when asked for a page list.
    pub fn panicking(base: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::build(base.into(), 0, true))
    }

    fn build(base: String, page_list_timeouts: usize, panic_on_page_list: bool) -> Self {
        Self {
            base,
            page_list_calls: AtomicUsize::new(0),
            page_list_timeouts,
            panic_on_page_list,
        }
    }

    /// Number of `get_pages` calls so far.
    pub fn page_list_calls(&self) -> usize {
        self.page_list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteSource for FakeSource {
    fn name(&self) -> &str {
        FAKE_SOURCE
    }

    async fn get_details(&self, item: &WorkItem) -> Result<WorkItem, SourceError> {
        Ok(item.clone().with_chapters(chapters()))
    }

    async fn get_pages(&self, chapter: &Chapter) -> Result<Vec<Page>, SourceError> {
        let call = self.page_list_calls.fetch_add(1, Ordering::SeqCst);
        if self.panic_on_page_list {
            panic!("page list of chapter {} is corrupt", chapter.id);
        }
        if call < self.page_list_timeouts {
            return Err(SourceError::Timeout {
                url: format!("{}/{}", self.base, chapter.url),
            });
        }
        Ok((1..=PAGES_PER_CHAPTER)
            .map(|n| Page::new(n as u64, page_url(&self.base, chapter.id, n), ""))
            .collect())
    }

    async fn get_page_url(&self, page: &Page) -> Result<String, SourceError> {
        Ok(page.url.clone())
    }
}

pub fn chapters() -> Vec<Chapter> {
    CHAPTER_IDS
        .iter()
        .zip(1..)
        .map(|(id, number)| Chapter::new(*id, number, format!("chapters/{id}")))
        .collect()
}

/// A two-chapter item served by [`FakeSource`].
pub fn book(id: u64, base: &str) -> WorkItem {
    WorkItem::new(id, SourceId::remote(FAKE_SOURCE), "Test Book", format!("{base}/book/{id}"))
        .with_chapters(chapters())
}

pub fn page_path(chapter_id: u64, n: usize) -> String {
    format!("/c{chapter_id}/p{n}.png")
}

pub fn page_url(base: &str, chapter_id: u64, n: usize) -> String {
    format!("{base}{}", page_path(chapter_id, n))
}

pub fn page_body(chapter_id: u64, n: usize) -> Vec<u8> {
    format!("chapter {chapter_id} page {n}").into_bytes()
}

/// Serves every page of every chapter, optionally delayed.
pub async fn mount_pages(server: &MockServer, delay: Option<Duration>) {
    for chapter_id in CHAPTER_IDS {
        for n in 1..=PAGES_PER_CHAPTER {
            let mut response = ResponseTemplate::new(200).set_body_bytes(page_body(chapter_id, n));
            if let Some(delay) = delay {
                response = response.set_delay(delay);
            }
            Mock::given(method("GET"))
                .and(path(page_path(chapter_id, n)))
                .respond_with(response)
                .mount(server)
                .await;
        }
    }
}

/// Makes one page answer `status` for its first `times` requests.
pub async fn mount_failures(server: &MockServer, chapter_id: u64, n: usize, status: u16, times: u64) {
    Mock::given(method("GET"))
        .and(path(page_path(chapter_id, n)))
        .respond_with(ResponseTemplate::new(status))
        .with_priority(1)
        .up_to_n_times(times)
        .mount(server)
        .await;
}

/// Settings with no retry delay, suitable for tests.
pub fn fast_settings(max_concurrent_jobs: usize) -> DownloadSettings {
    DownloadSettings {
        max_concurrent_jobs,
        retry_delay_ms: 0,
        ..DownloadSettings::default()
    }
}

/// [`fast_settings`] with a per-page throttle.
pub fn slow_settings(max_concurrent_jobs: usize, slowdown: Duration) -> DownloadSettings {
    DownloadSettings {
        slowdown: true,
        slowdown_delay_ms: u64::try_from(slowdown.as_millis()).unwrap(),
        ..fast_settings(max_concurrent_jobs)
    }
}

pub fn collaborators(base: &str, output_dir: &Path, observer: Arc<dyn StateObserver>) -> Collaborators {
    Collaborators::new(output_dir)
        .with_source(FakeSource::new(base))
        .with_observer(observer)
}

pub fn manager(
    base: &str,
    output_dir: &Path,
    observer: Arc<dyn StateObserver>,
    max_concurrent_jobs: usize,
) -> DownloadManager {
    DownloadManager::new(
        fast_settings(max_concurrent_jobs),
        collaborators(base, output_dir, observer),
    )
    .expect("valid settings")
}

/// Manager over a caller-built [`FakeSource`].
pub fn manager_with_source(
    source: Arc<FakeSource>,
    output_dir: &Path,
    observer: Arc<dyn StateObserver>,
    max_concurrent_jobs: usize,
) -> DownloadManager {
    DownloadManager::new(
        fast_settings(max_concurrent_jobs),
        Collaborators::new(output_dir)
            .with_source(source)
            .with_observer(observer),
    )
    .expect("valid settings")
}

/// Records every state of every job, in publication order.
#[derive(Default)]
pub struct Recorder {
    states: Mutex<Vec<DownloadJobState>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn states(&self, job_id: JobId) -> Vec<DownloadJobState> {
        self.states
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.job_id() == job_id)
            .cloned()
            .collect()
    }

    pub fn names(&self, job_id: JobId) -> Vec<&'static str> {
        self.states(job_id).iter().map(DownloadJobState::name).collect()
    }

    /// `(chapter, page)` of every `Progress` state of `job_id`.
    pub fn progress(&self, job_id: JobId) -> Vec<(usize, usize)> {
        self.states(job_id)
            .iter()
            .filter_map(|s| match s {
                DownloadJobState::Progress {
                    current_chapter,
                    current_page,
                    ..
                } => Some((*current_chapter, *current_page)),
                _ => None,
            })
            .collect()
    }
}

impl StateObserver for Recorder {
    fn on_state(&self, state: &DownloadJobState) {
        self.states.lock().unwrap().push(state.clone());
    }
}

/// Tracks how many jobs are between `Preparing` and a terminal state at once.
#[derive(Default)]
pub struct ConcurrencyProbe {
    inner: Mutex<(HashSet<JobId>, usize)>,
}

impl ConcurrencyProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn max_active(&self) -> usize {
        self.inner.lock().unwrap().1
    }
}

impl StateObserver for ConcurrencyProbe {
    fn on_state(&self, state: &DownloadJobState) {
        let mut inner = self.inner.lock().unwrap();
        let (active, max) = &mut *inner;
        match state {
            DownloadJobState::Queued { .. } => {}
            s if s.is_terminal() => {
                active.remove(&s.job_id());
            }
            s => {
                active.insert(s.job_id());
                *max = (*max).max(active.len());
            }
        }
    }
}

/// Entry names of a zip archive in storage order.
pub fn archive_entries(path: &Path) -> Vec<String> {
    let file = std::fs::File::open(path).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}

pub fn archive_entry(path: &Path, name: &str) -> Vec<u8> {
    use std::io::Read;

    let file = std::fs::File::open(path).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    let mut entry = archive.by_name(name).unwrap();
    let mut bytes = Vec::new();
    entry.read_to_end(&mut bytes).unwrap();
    bytes
}

/// Names in `dir`, sorted.
pub fn dir_listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
