//! Local library: where archives are written and how they are read back.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::archive::{ArchiveError, read_index};
use crate::model::{LocalItem, SourceId, WorkItem};

/// Storage side of the download manager.
#[async_trait]
pub trait LocalLibrary: Send + Sync {
    /// First writable output directory, or `None` when no storage is available.
    async fn output_dir(&self) -> Option<PathBuf>;

    /// Maps a [`SourceId::Local`] item back to the remote item it was downloaded from.
    async fn remote_counterpart(&self, item: &WorkItem) -> Option<WorkItem>;

    /// Builds the result handle for a finalized archive.
    async fn open_result(&self, path: &Path) -> Result<LocalItem, ArchiveError>;
}

/// Library backed by an ordered list of candidate directories.
#[derive(Debug, Clone)]
pub struct DirectoryLibrary {
    directories: Vec<PathBuf>,
}

impl DirectoryLibrary {
    /// Creates a library over `directories`, tried in order.
    pub fn new(directories: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            directories: directories.into_iter().collect(),
        }
    }

    /// Candidate directories.
    #[must_use]
    pub fn directories(&self) -> &[PathBuf] {
        &self.directories
    }
}

async fn is_writable_dir(dir: &Path) -> bool {
    if let Err(error) = tokio::fs::create_dir_all(dir).await {
        debug!(dir = %dir.display(), error = %error, "output directory unavailable");
        return false;
    }
    match tokio::fs::metadata(dir).await {
        Ok(meta) => meta.is_dir() && !meta.permissions().readonly(),
        Err(_) => false,
    }
}

#[async_trait]
impl LocalLibrary for DirectoryLibrary {
    async fn output_dir(&self) -> Option<PathBuf> {
        for dir in &self.directories {
            if is_writable_dir(dir).await {
                return Some(dir.clone());
            }
        }
        None
    }

    async fn remote_counterpart(&self, item: &WorkItem) -> Option<WorkItem> {
        if !item.source.is_local() {
            return Some(item.clone());
        }
        match read_index(Path::new(&item.url)).await {
            Ok(stored) if !stored.source.is_local() => Some(WorkItem {
                chapters: None,
                ..stored
            }),
            Ok(_) => None,
            Err(error) => {
                warn!(item_id = item.id, path = %item.url, error = %error, "cannot read archive index");
                None
            }
        }
    }

    async fn open_result(&self, path: &Path) -> Result<LocalItem, ArchiveError> {
        let item = read_index(path).await?;
        Ok(LocalItem {
            path: path.to_path_buf(),
            item: WorkItem {
                source: SourceId::Local,
                url: path.display().to_string(),
                ..item
            },
        })
    }
}
