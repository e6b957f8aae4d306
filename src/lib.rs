//! Tomefetch Core Library
//!
//! Concurrency-bounded, resumable download orchestration: a work item's
//! chapters and pages are fetched over HTTP into a single archive while the
//! job's lifecycle is published on a latest-value-wins state stream.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`download`] - download manager, job pipeline, page fetcher, failsafe retry
//! - [`control`] - permit pool, per-item locks, pause gate, cancellation helpers
//! - [`state`] - job states and the state reporter
//! - [`source`] - remote source trait, registry, and JSON manifest source
//! - [`cache`] - page cache consulted before fetching
//! - [`archive`] - archive writer trait and the `.cbz` writer
//! - [`library`] - output directory selection and result handles
//! - [`config`] - download settings and TOML loading
//! - [`model`] - work item, chapter, and page types
//! - [`error`] - job error type and failure taxonomy

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod archive;
pub mod cache;
pub mod config;
pub mod control;
pub mod download;
pub mod error;
pub mod library;
pub mod model;
pub mod source;
pub mod state;
mod user_agent;

// Re-export commonly used types
pub use config::{ConfigError, DownloadSettings};
pub use download::{
    Collaborators, DownloadError, DownloadJob, DownloadManager, FailsafePolicy, HttpClient,
};
pub use error::{ErrorKind, JobError};
pub use model::{Chapter, Cover, LocalItem, Page, SourceId, WorkItem};
pub use state::{DownloadJobState, JobId, StateObserver, StateReporter};
