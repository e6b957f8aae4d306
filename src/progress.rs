//! Progress bar driven by a job's state stream.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tomefetch_core::{DownloadJob, DownloadJobState};

/// Spawns the progress UI. Returns when the job reaches a terminal state.
pub(crate) fn spawn_progress_ui(job: &DownloadJob, enabled: bool) -> tokio::task::JoinHandle<()> {
    let mut states = job.subscribe();
    tokio::spawn(async move {
        let bar = if enabled {
            ProgressBar::new(0)
        } else {
            ProgressBar::hidden()
        };
        bar.set_style(
            ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.enable_steady_tick(Duration::from_millis(100));

        loop {
            let state = states.borrow_and_update().clone();
            if let Some((position, length)) = page_position(&state) {
                bar.set_length(length);
                bar.set_position(position);
            }
            if state.can_retry() {
                bar.println(status_message(&state));
            }
            bar.set_message(status_message(&state));
            if state.is_terminal() || states.changed().await.is_err() {
                break;
            }
        }

        bar.finish_and_clear();
    })
}

/// `(pages done, estimated total pages)` for `Progress`.
fn page_position(state: &DownloadJobState) -> Option<(u64, u64)> {
    let DownloadJobState::Progress {
        total_chapters,
        current_chapter,
        total_pages,
        current_page,
        ..
    } = state
    else {
        return None;
    };
    let done = total_pages * current_chapter + current_page + 1;
    let total = (total_pages * total_chapters).max(done);
    Some((
        u64::try_from(done).unwrap_or(u64::MAX),
        u64::try_from(total).unwrap_or(u64::MAX),
    ))
}

fn status_message(state: &DownloadJobState) -> String {
    let title = &state.item().title;
    match state {
        DownloadJobState::Queued { .. } => format!("{title}: queued"),
        DownloadJobState::Preparing { .. } => format!("{title}: preparing"),
        DownloadJobState::Progress {
            total_chapters,
            current_chapter,
            ..
        } => format!("{title}: chapter {}/{total_chapters}", current_chapter + 1),
        DownloadJobState::Paused { error, .. } => {
            format!("{title}: paused ({error}). Press Enter to resume, Ctrl-C to cancel")
        }
        DownloadJobState::Error { error, .. } => format!("{title}: failed ({error})"),
        DownloadJobState::PostProcessing { .. } => format!("{title}: finalizing archive"),
        DownloadJobState::Done { .. } => format!("{title}: done"),
        DownloadJobState::Cancelled { .. } => format!("{title}: cancelled"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use tomefetch_core::{JobError, SourceId, WorkItem};

    fn progress(chapter: usize, page: usize) -> DownloadJobState {
        DownloadJobState::Progress {
            job_id: 1,
            item: Arc::new(WorkItem::new(1, SourceId::remote("manifest"), "Book", "u")),
            cover: None,
            total_chapters: 2,
            current_chapter: chapter,
            total_pages: 3,
            current_page: page,
        }
    }

    #[test]
    fn test_page_position() {
        assert_eq!(page_position(&progress(0, 0)), Some((1, 6)));
        assert_eq!(page_position(&progress(1, 2)), Some((6, 6)));
        assert_eq!(page_position(&progress(0, 0).to_cancelled()), None);
    }

    #[test]
    fn test_status_messages() {
        assert_eq!(status_message(&progress(1, 0)), "Book: chapter 2/2");
        let paused = progress(0, 1).to_paused(Arc::new(JobError::internal("net down")));
        assert!(status_message(&paused).contains("Press Enter to resume"));
        assert_eq!(status_message(&progress(0, 0).to_cancelled()), "Book: cancelled");
    }
}
