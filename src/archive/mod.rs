//! Archive writers that receive a job's cover and pages.
//!
//! A writer is opened per job, fed files in chapter and page order, then
//! merged with any earlier archive of the same item and finalized.
//! [`ArchiveWriter::cleanup`] runs on every exit path and must tolerate
//! being called on a writer that was never finalized, or more than once.

mod cbz;

pub use cbz::{CbzArchive, CbzArchiveFactory, INDEX_ENTRY, archive_stem, read_index};

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use crate::error::ErrorKind;
use crate::model::{Chapter, WorkItem};

/// Errors raised by archive writers.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Filesystem failure.
    #[error("archive IO error at {path}: {source}")]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The container could not be read or written.
    #[error("invalid archive {path}: {source}")]
    Zip {
        /// Archive path.
        path: PathBuf,
        /// Underlying zip error.
        #[source]
        source: zip::result::ZipError,
    },

    /// The embedded index could not be encoded or decoded.
    #[error("invalid archive index in {path}: {source}")]
    Index {
        /// Archive path.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A write was attempted after `finalize`.
    #[error("archive {path} is already finalized")]
    Finalized {
        /// Final archive path.
        path: PathBuf,
    },

    /// A blocking archive task panicked or was cancelled.
    #[error("archive task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ArchiveError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a zip container error.
    pub fn zip(path: impl Into<PathBuf>, source: zip::result::ZipError) -> Self {
        Self::Zip {
            path: path.into(),
            source,
        }
    }

    /// Classifies the failure. Disk problems are resource errors, corrupt data is integrity.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io { .. } => ErrorKind::ResourceUnavailable,
            Self::Zip { .. } | Self::Index { .. } => ErrorKind::DataIntegrity,
            Self::Finalized { .. } | Self::Task(_) => ErrorKind::Unclassified,
        }
    }
}

/// Per-job sink for downloaded files.
#[async_trait]
pub trait ArchiveWriter: Send {
    /// Stores `file` as the archive cover.
    async fn add_cover(&mut self, file: &Path, extension: Option<&str>) -> Result<(), ArchiveError>;

    /// Stores `file` as page `page_index` (zero-based) of `chapter`.
    async fn add_page(
        &mut self,
        chapter: &Chapter,
        file: &Path,
        page_index: usize,
        extension: Option<&str>,
    ) -> Result<(), ArchiveError>;

    /// Carries over content of a previous archive of the same item that this run did not replace.
    async fn merge_with_existing(&mut self) -> Result<(), ArchiveError>;

    /// Commits the archive and returns its final path.
    async fn finalize(&mut self) -> Result<PathBuf, ArchiveError>;

    /// Discards uncommitted state. Idempotent.
    async fn cleanup(&mut self) -> Result<(), ArchiveError>;
}

/// Opens archive writers bound to a destination and an item.
#[async_trait]
pub trait ArchiveFactory: Send + Sync {
    /// Opens a writer for `item` inside `destination`.
    async fn open(
        &self,
        destination: &Path,
        item: &WorkItem,
    ) -> Result<Box<dyn ArchiveWriter>, ArchiveError>;
}
