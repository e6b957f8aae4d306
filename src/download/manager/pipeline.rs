//! The per-job download algorithm and its cleanup.

use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::Shared;
use crate::archive::ArchiveWriter;
use crate::control::{PauseGate, PoolPermit, ResourceGuard, cancel};
use crate::download::Failsafe;
use crate::download::filename::extension_hint;
use crate::error::JobError;
use crate::model::{Chapter, Cover, LocalItem, Page, SourceId, WorkItem};
use crate::source::RemoteSource;
use crate::state::{DownloadJobState, JobId, StateReporter};

/// Everything one job task needs.
pub(super) struct JobContext {
    pub(super) shared: Arc<Shared>,
    pub(super) job_id: JobId,
    pub(super) reporter: Arc<StateReporter>,
    pub(super) gate: PauseGate,
    pub(super) cancel: CancellationToken,
}

/// Resources acquired by a job, released by [`JobContext::cleanup`].
#[derive(Default)]
struct Held {
    lock: Option<ResourceGuard>,
    permit: Option<PoolPermit>,
    archive: Option<Box<dyn ArchiveWriter>>,
    temp_file: Option<PathBuf>,
}

impl JobContext {
    /// Runs the job to a terminal state, then releases everything it holds.
    pub(super) async fn run(self, item: Arc<WorkItem>, chapter_ids: Vec<u64>) {
        let mut held = Held::default();
        let outcome = AssertUnwindSafe(self.execute(&item, &chapter_ids, &mut held))
            .catch_unwind()
            .await;

        let current = self.reporter.current();
        let terminal = match outcome {
            Ok(Ok(result)) => {
                info!(path = %result.path.display(), "download complete");
                DownloadJobState::Done {
                    job_id: self.job_id,
                    item: Arc::clone(current.item()),
                    cover: current.cover().cloned(),
                    result: Arc::new(result),
                }
            }
            Ok(Err(error)) if error.is_cancelled() => {
                info!("download cancelled");
                current.to_cancelled()
            }
            Ok(Err(error)) => {
                error!(error = %error, kind = ?error.kind(), "download failed");
                current.to_error(Arc::new(error))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(panic = %message, "download job panicked");
                current.to_error(Arc::new(JobError::internal(message)))
            }
        };
        self.reporter.publish(terminal);
        self.cleanup(held).await;
    }

    async fn execute(
        &self,
        item: &Arc<WorkItem>,
        chapter_ids: &[u64],
        held: &mut Held,
    ) -> Result<LocalItem, JobError> {
        let collaborators = &self.shared.collaborators;

        let cover = self.load_cover(item).await?;
        if cover.is_some() {
            self.reporter.publish(DownloadJobState::Queued {
                job_id: self.job_id,
                item: Arc::clone(item),
                cover: cover.clone(),
            });
        }

        held.lock = Some(
            self.shared
                .locks
                .try_lock(item.id)
                .ok_or(JobError::AlreadyLocked { item_id: item.id })?,
        );
        held.permit = Some(self.shared.permits.acquire(&self.cancel).await?);

        self.reporter.publish(DownloadJobState::Preparing {
            job_id: self.job_id,
            item: Arc::clone(item),
            cover: cover.clone(),
        });

        let destination = collaborators
            .library
            .output_dir()
            .await
            .ok_or(JobError::StorageUnavailable)?;

        let mut work = if item.source.is_local() {
            collaborators
                .library
                .remote_counterpart(item)
                .await
                .ok_or(JobError::RemoteCounterpartMissing { item_id: item.id })?
        } else {
            WorkItem::clone(item)
        };
        if item.source.is_local() {
            self.reporter.publish(DownloadJobState::Preparing {
                job_id: self.job_id,
                item: Arc::new(work.clone()),
                cover: cover.clone(),
            });
        }
        let source = self.source_for(&work)?;

        let temp_name = format!("{}_{}.tmp", item.id, self.job_id);
        held.temp_file = Some(destination.join(&temp_name));
        let archive = held
            .archive
            .insert(collaborators.archives.open(&destination, &work).await?);

        let failsafe = Failsafe::new(
            self.shared.policy,
            &self.gate,
            &self.reporter,
            &self.cancel,
        );

        if !work.has_chapters() {
            let source = source.as_ref();
            let unresolved = &work;
            let resolved = failsafe
                .run(move || async move {
                    Ok::<_, JobError>(source.get_details(unresolved).await?)
                })
                .await?;
            work = resolved;
            debug!(
                chapters = work.chapters.as_ref().map_or(0, Vec::len),
                "item details resolved"
            );
        }

        if let Some(cover_url) = work.archive_cover_url() {
            let client = &collaborators.client;
            let (referer, dest, name) = (work.url.as_str(), destination.as_path(), temp_name.as_str());
            let fetched = failsafe
                .run(move || async move {
                    Ok::<_, JobError>(
                        client
                            .fetch_with_content_type(cover_url, referer, dest, name)
                            .await?,
                    )
                })
                .await;
            match fetched {
                Ok((file, content_type)) => {
                    let extension = extension_hint(cover_url, content_type.as_deref());
                    archive.add_cover(&file, extension.as_deref()).await?;
                }
                Err(error) if error.is_cancelled() => return Err(error),
                Err(error) => {
                    warn!(url = cover_url, error = %error, "archive cover unavailable, skipping");
                }
            }
        }

        let chapters = work.chapters.as_deref().ok_or(JobError::MissingChapters)?;
        let selected = select_chapters(chapters, chapter_ids)?;
        let state_item = Arc::new(work.clone());
        let total_chapters = selected.len();

        for (chapter_index, chapter) in selected.into_iter().enumerate() {
            let pages = match &chapter.pages {
                Some(pages) => pages.clone(),
                None => {
                    let source = source.as_ref();
                    failsafe
                        .run(move || async move {
                            Ok::<_, JobError>(source.get_pages(chapter).await?)
                        })
                        .await?
                }
            };
            if pages.is_empty() {
                return Err(JobError::EmptyPages {
                    chapter_id: chapter.id,
                });
            }
            let total_pages = pages.len();

            for (page_index, page) in pages.iter().enumerate() {
                let source = source.as_ref();
                let (dest, name) = (destination.as_path(), temp_name.as_str());
                let (file, extension) = failsafe
                    .run(move || self.fetch_page(source, page, dest, name))
                    .await?;
                archive
                    .add_page(chapter, &file, page_index, extension.as_deref())
                    .await?;

                debug!(chapter = chapter_index, page = page_index, "page stored");
                self.reporter.publish(DownloadJobState::Progress {
                    job_id: self.job_id,
                    item: Arc::clone(&state_item),
                    cover: cover.clone(),
                    total_chapters,
                    current_chapter: chapter_index,
                    total_pages,
                    current_page: page_index,
                });

                if let Some(delay) = self.shared.slowdown {
                    cancel::sleep(&self.cancel, delay).await?;
                }
            }
        }

        self.reporter.publish(DownloadJobState::PostProcessing {
            job_id: self.job_id,
            item: Arc::clone(&state_item),
            cover,
        });
        archive.merge_with_existing().await?;
        let path = archive.finalize().await?;
        Ok(collaborators.library.open_result(&path).await?)
    }

    /// Best-effort thumbnail for display. Only cancellation is propagated.
    async fn load_cover(&self, item: &WorkItem) -> Result<Option<Cover>, JobError> {
        let Some(url) = item.cover_url.as_deref() else {
            return Ok(None);
        };
        let client = &self.shared.collaborators.client;
        let fetched = cancel::cancellable(&self.cancel, async {
            Ok(client.fetch_bytes(url, &item.url).await)
        })
        .await?;
        match fetched {
            Ok((bytes, content_type)) => Ok(Some(Cover::new(bytes, content_type))),
            Err(error) => {
                debug!(url, error = %error, "cover thumbnail unavailable");
                Ok(None)
            }
        }
    }

    fn source_for(&self, work: &WorkItem) -> Result<Arc<dyn RemoteSource>, JobError> {
        let SourceId::Remote(name) = &work.source else {
            return Err(JobError::RemoteCounterpartMissing { item_id: work.id });
        };
        self.shared
            .collaborators
            .sources
            .get(name)
            .ok_or_else(|| JobError::UnknownSource {
                source_name: name.clone(),
            })
    }

    /// Resolves, looks up, and if needed fetches one page.
    async fn fetch_page(
        &self,
        source: &dyn RemoteSource,
        page: &Page,
        destination: &Path,
        temp_name: &str,
    ) -> Result<(PathBuf, Option<String>), JobError> {
        let collaborators = &self.shared.collaborators;
        let url = source.get_page_url(page).await?;
        if let Some(cached) = collaborators.cache.lookup(&url).await {
            debug!(url = %url, "page served from cache");
            return Ok((cached, extension_hint(&url, None)));
        }
        let (file, content_type) = collaborators
            .client
            .fetch_with_content_type(&url, &page.referer, destination, temp_name)
            .await?;
        Ok((file, extension_hint(&url, content_type.as_deref())))
    }

    /// Archive cleanup, then temp file removal, then permit and lock release.
    async fn cleanup(&self, mut held: Held) {
        if let Some(mut archive) = held.archive.take()
            && let Err(error) = archive.cleanup().await
        {
            warn!(error = %error, "archive cleanup failed");
        }
        if let Some(path) = held.temp_file.take() {
            match tokio::fs::remove_file(&path).await {
                Err(error) if error.kind() != std::io::ErrorKind::NotFound => {
                    warn!(path = %path.display(), error = %error, "cannot delete temporary file");
                }
                _ => {}
            }
        }
        if let Some(permit) = held.permit.take() {
            permit.release();
        }
        if let Some(lock) = held.lock.take() {
            lock.release();
        }
        debug!(job_id = self.job_id, "job resources released");
    }
}

/// Working chapter set: all chapters, or those whose id is in `ids`.
///
/// Chapter numbers must be unique within the set.
fn select_chapters<'a>(chapters: &'a [Chapter], ids: &[u64]) -> Result<Vec<&'a Chapter>, JobError> {
    let selected: Vec<&Chapter> = if ids.is_empty() {
        chapters.iter().collect()
    } else {
        let wanted: HashSet<u64> = ids.iter().copied().collect();
        let selected: Vec<&Chapter> = chapters.iter().filter(|c| wanted.contains(&c.id)).collect();
        let found: HashSet<u64> = selected.iter().map(|c| c.id).collect();
        let missing = wanted.len() - found.len();
        if missing > 0 {
            return Err(JobError::ChaptersNotFound {
                missing,
                requested: wanted.len(),
            });
        }
        selected
    };
    if selected.is_empty() {
        return Err(JobError::EmptyChapters);
    }
    let mut numbers = HashSet::with_capacity(selected.len());
    if let Some(duplicate) = selected.iter().find(|c| !numbers.insert(c.number)) {
        return Err(JobError::DuplicateChapterNumber {
            number: duplicate.number,
        });
    }
    Ok(selected)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn chapters() -> Vec<Chapter> {
        vec![Chapter::new(1, 1, "c1"), Chapter::new(2, 2, "c2"), Chapter::new(3, 3, "c3")]
    }

    #[test]
    fn test_select_all_when_no_ids() {
        let chapters = chapters();
        let selected = select_chapters(&chapters, &[]).unwrap();
        assert_eq!(selected.len(), 3);
    }

    #[test]
    fn test_select_subset_keeps_item_order() {
        let chapters = chapters();
        let selected = select_chapters(&chapters, &[3, 1, 3]).unwrap();
        assert_eq!(selected.iter().map(|c| c.id).collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn test_select_reports_missing_ids() {
        let chapters = chapters();
        let error = select_chapters(&chapters, &[2, 5, 6]).unwrap_err();
        assert!(matches!(
            error,
            JobError::ChaptersNotFound {
                missing: 2,
                requested: 3
            }
        ));
    }

    #[test]
    fn test_select_from_empty_list() {
        assert!(matches!(select_chapters(&[], &[]), Err(JobError::EmptyChapters)));
        assert!(matches!(
            select_chapters(&[], &[5]),
            Err(JobError::ChaptersNotFound { missing: 1, .. })
        ));
    }

    #[test]
    fn test_select_rejects_duplicate_chapter_numbers() {
        let chapters = vec![Chapter::new(1, 1, "c1"), Chapter::new(2, 2, "c2"), Chapter::new(3, 2, "c2b")];
        assert!(matches!(
            select_chapters(&chapters, &[]),
            Err(JobError::DuplicateChapterNumber { number: 2 })
        ));
        // Only the working set must be unique.
        assert_eq!(select_chapters(&chapters, &[1, 3]).unwrap().len(), 2);
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
        let boxed: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }
}
