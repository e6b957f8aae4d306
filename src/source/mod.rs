//! Remote sources: turning item, chapter, and page references into data.
//!
//! # Architecture
//!
//! - [`RemoteSource`] - async trait individual sources implement
//! - [`SourceRegistry`] - name-keyed lookup used by the download manager
//! - [`ManifestSource`] - JSON manifest over HTTP
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tomefetch_core::source::{ManifestSource, SourceRegistry};
//!
//! let mut registry = SourceRegistry::new();
//! registry.register(Arc::new(ManifestSource::new()));
//! assert!(registry.get("manifest").is_some());
//! ```

mod error;
mod manifest;

pub use error::SourceError;
pub use manifest::{MANIFEST_SOURCE_NAME, ManifestSource};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::model::{Chapter, Page, WorkItem};

/// A catalog the download manager can pull items from.
///
/// Uses `async_trait` so sources can live behind `Arc<dyn RemoteSource>`.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Registry key, matched against [`SourceId::Remote`](crate::model::SourceId::Remote).
    fn name(&self) -> &str;

    /// Returns the item with its chapter list resolved.
    async fn get_details(&self, item: &WorkItem) -> Result<WorkItem, SourceError>;

    /// Returns the ordered page references of `chapter`.
    async fn get_pages(&self, chapter: &Chapter) -> Result<Vec<Page>, SourceError>;

    /// Resolves a page reference to the URL its payload is fetched from.
    async fn get_page_url(&self, page: &Page) -> Result<String, SourceError>;
}

/// Name-keyed collection of remote sources.
#[derive(Default, Clone)]
pub struct SourceRegistry {
    sources: HashMap<String, Arc<dyn RemoteSource>>,
}

impl SourceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `source` under its name, replacing any previous entry.
    pub fn register(&mut self, source: Arc<dyn RemoteSource>) {
        let name = source.name().to_string();
        debug!(source = %name, "registering remote source");
        self.sources.insert(name, source);
    }

    /// Looks up a source by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn RemoteSource>> {
        self.sources.get(name).cloned()
    }

    /// Number of registered sources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Returns true when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.sources.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("SourceRegistry")
            .field("sources", &names)
            .finish()
    }
}
