//! Content-addressed page cache consulted before every page fetch.
//!
//! Entries are keyed by the resolved page URL. A hit means the page is
//! copied into the archive from disk and no request is made.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, trace};

/// Errors raised while writing to a cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Filesystem failure under the cache root.
    #[error("cache IO error at {path}: {source}")]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl CacheError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Read side of a page cache.
#[async_trait]
pub trait PageCache: Send + Sync {
    /// Returns the cached file for `url`, if any.
    async fn lookup(&self, url: &str) -> Option<PathBuf>;
}

/// Cache that never hits.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

#[async_trait]
impl PageCache for NoCache {
    async fn lookup(&self, _url: &str) -> Option<PathBuf> {
        None
    }
}

/// Cache storing one file per URL under `<root>/<sha256(url)>`.
#[derive(Debug, Clone)]
pub struct DiskPageCache {
    root: PathBuf,
}

impl DiskPageCache {
    /// Creates a cache rooted at `root`. The directory is created on first insert.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Cache root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location an entry for `url` is stored at.
    #[must_use]
    pub fn entry_path(&self, url: &str) -> PathBuf {
        self.root.join(cache_key(url))
    }

    /// Copies `file` into the cache as the entry for `url`.
    ///
    /// The copy lands under a temporary name first so concurrent readers
    /// never observe a partial entry.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Io`] when the root cannot be created or the copy fails.
    pub async fn insert(&self, url: &str, file: &Path) -> Result<PathBuf, CacheError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| CacheError::io(&self.root, e))?;

        let target = self.entry_path(url);
        let staging = target.with_extension("partial");
        tokio::fs::copy(file, &staging)
            .await
            .map_err(|e| CacheError::io(&staging, e))?;
        tokio::fs::rename(&staging, &target)
            .await
            .map_err(|e| CacheError::io(&target, e))?;

        debug!(url, path = %target.display(), "page cached");
        Ok(target)
    }
}

#[async_trait]
impl PageCache for DiskPageCache {
    async fn lookup(&self, url: &str) -> Option<PathBuf> {
        let path = self.entry_path(url);
        match tokio::fs::try_exists(&path).await {
            Ok(true) => {
                trace!(url, "page cache hit");
                Some(path)
            }
            _ => None,
        }
    }
}

/// Lowercase hex SHA-256 of `url`.
fn cache_key(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
