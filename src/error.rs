//! Job-level error type and failure taxonomy.
//!
//! Every fallible step of a download job returns [`JobError`]. Branching on
//! "was this a cancellation, a flaky network, or a dead end" is done by
//! inspecting [`JobError::kind`], never by downcasting.

use thiserror::Error;

use crate::archive::ArchiveError;
use crate::download::{DownloadError, FailureType, classify_error};
use crate::source::SourceError;

/// Failure taxonomy that drives retry and reporting decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network/transport failure. Retried locally, then escalated to a pause.
    TransientIo,
    /// Storage missing or item locked by another job.
    ResourceUnavailable,
    /// Missing or inconsistent chapter/page data.
    DataIntegrity,
    /// Caller-initiated cancellation. Not a failure.
    Cancellation,
    /// Anything else, including panics inside the job.
    Unclassified,
}

/// Errors produced while running a download job.
#[derive(Debug, Error)]
pub enum JobError {
    /// The job observed its cancellation signal.
    #[error("download cancelled")]
    Cancelled,

    /// Fetching a page or cover failed.
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// The remote source failed to resolve metadata, pages, or page URLs.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// The archive writer failed.
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// No writable destination directory is available.
    #[error("cannot find available storage")]
    StorageUnavailable,

    /// Another job holds the lock for this item.
    #[error("item {item_id} is already being downloaded by another job")]
    AlreadyLocked {
        /// Identity of the locked item.
        item_id: u64,
    },

    /// No remote source is registered under the item's source name.
    #[error("no remote source registered as '{source_name}'")]
    UnknownSource {
        /// The unmatched source name.
        source_name: String,
    },

    /// A local item could not be mapped back to its remote counterpart.
    #[error("cannot obtain remote instance of local item {item_id}")]
    RemoteCounterpartMissing {
        /// Identity of the local item.
        item_id: u64,
    },

    /// Chapter list is still absent after resolving details.
    #[error("chapters list must not be null")]
    MissingChapters,

    /// The working chapter set is empty.
    #[error("chapters list must not be empty")]
    EmptyChapters,

    /// Some requested chapter ids are not among the item's chapters.
    #[error("{missing} of {requested} requested chapters not found")]
    ChaptersNotFound {
        /// Number of requested ids with no matching chapter.
        missing: usize,
        /// Number of ids requested.
        requested: usize,
    },

    /// A chapter resolved to an empty page list.
    #[error("chapter {chapter_id} has no pages")]
    EmptyPages {
        /// Identity of the chapter.
        chapter_id: u64,
    },

    /// Two chapters of the working set share a number.
    #[error("chapter number {number} appears more than once")]
    DuplicateChapterNumber {
        /// The repeated chapter number.
        number: u32,
    },

    /// Unexpected failure, e.g. a panic inside the job body.
    #[error("download job failed unexpectedly: {message}")]
    Internal {
        /// Description of the failure.
        message: String,
    },
}

impl JobError {
    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Classifies this error for retry and reporting.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Cancelled => ErrorKind::Cancellation,
            Self::Download(error) => match (classify_error(error), error) {
                (FailureType::Transient, _) => ErrorKind::TransientIo,
                (FailureType::Permanent, DownloadError::Io { .. }) => {
                    ErrorKind::ResourceUnavailable
                }
                (FailureType::Permanent, _) => ErrorKind::DataIntegrity,
            },
            Self::Source(error) => error.kind(),
            Self::Archive(error) => error.kind(),
            Self::StorageUnavailable
            | Self::AlreadyLocked { .. }
            | Self::UnknownSource { .. } => ErrorKind::ResourceUnavailable,
            Self::RemoteCounterpartMissing { .. }
            | Self::MissingChapters
            | Self::EmptyChapters
            | Self::ChaptersNotFound { .. }
            | Self::EmptyPages { .. }
            | Self::DuplicateChapterNumber { .. } => ErrorKind::DataIntegrity,
            Self::Internal { .. } => ErrorKind::Unclassified,
        }
    }

    /// Returns true when the failsafe retrier may retry this error.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::TransientIo
    }

    /// Returns true for [`JobError::Cancelled`].
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
