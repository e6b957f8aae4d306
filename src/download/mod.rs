//! Download orchestration: fetching pages into archives under concurrency,
//! retry, and pause control.
//!
//! # Features
//!
//! - Streaming page fetches into a per-job temporary file
//! - Global cap on concurrently active jobs, per-item mutual exclusion
//! - Bounded transient retry that escalates to an operator-resumable pause
//! - Cooperative cancellation at every suspension point
//! - Latest-value-wins job state stream
//!
//! # Example
//!
//! ```no_run
//! use tomefetch_core::config::DownloadSettings;
//! use tomefetch_core::download::{Collaborators, DownloadManager};
//! use tomefetch_core::model::{SourceId, WorkItem};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = DownloadManager::new(DownloadSettings::default(), Collaborators::new("./library"))?;
//! let item = WorkItem::new(1, SourceId::remote("manifest"), "Title", "https://example.com/1.json");
//! let job = manager.start(item, Vec::new(), 1);
//! let terminal = job.wait().await;
//! println!("finished as {}", terminal.name());
//! # Ok(())
//! # }
//! ```

mod client;
pub mod constants;
mod error;
mod failsafe;
pub mod filename;
mod manager;
mod retry;

pub use client::HttpClient;
pub use error::DownloadError;
pub use failsafe::Failsafe;
pub use manager::{Collaborators, DownloadJob, DownloadManager};
pub use retry::{
    DEFAULT_RETRY_BUDGET, DEFAULT_RETRY_DELAY, FailsafePolicy, FailureType, RetryDecision,
    classify_error,
};

// Note: we do NOT define module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.
