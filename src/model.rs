//! Work item, chapter, and page types passed into download jobs.
//!
//! A [`WorkItem`] is an immutable snapshot of a remote collection. Chapters
//! and pages may be absent until the owning [`RemoteSource`](crate::source::RemoteSource)
//! resolves them.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Identity of the source a work item belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    /// Item known only in already-downloaded form.
    Local,
    /// Item served by the named remote source.
    Remote(String),
}

impl SourceId {
    /// Creates a remote source identity.
    pub fn remote(name: impl Into<String>) -> Self {
        Self::Remote(name.into())
    }

    /// Returns true for [`SourceId::Local`].
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local)
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Remote(name) => f.write_str(name),
        }
    }
}

/// Top-level downloadable collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Stable identity, also the resource lock key.
    pub id: u64,
    /// Source the item was obtained from.
    pub source: SourceId,
    /// Display title.
    pub title: String,
    /// Public URL of the item. Used as referer for cover requests; for
    /// local items this is the path of the downloaded archive.
    pub url: String,
    /// Thumbnail cover URL.
    #[serde(default)]
    pub cover_url: Option<String>,
    /// Full-size cover URL, preferred for the archive cover.
    #[serde(default)]
    pub large_cover_url: Option<String>,
    /// Ordered chapters, absent until resolved.
    #[serde(default)]
    pub chapters: Option<Vec<Chapter>>,
    /// Arbitrary display metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl WorkItem {
    /// Creates a remote item with no chapters resolved yet.
    pub fn new(
        id: u64,
        source: SourceId,
        title: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            id,
            source,
            title: title.into(),
            url: url.into(),
            cover_url: None,
            large_cover_url: None,
            chapters: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Returns a copy with the given chapter list attached.
    #[must_use]
    pub fn with_chapters(mut self, chapters: Vec<Chapter>) -> Self {
        self.chapters = Some(chapters);
        self
    }

    /// Returns true when a non-empty chapter list is attached.
    #[must_use]
    pub fn has_chapters(&self) -> bool {
        self.chapters.as_ref().is_some_and(|c| !c.is_empty())
    }

    /// Cover URL to store in the archive: the large cover when known.
    #[must_use]
    pub fn archive_cover_url(&self) -> Option<&str> {
        self.large_cover_url
            .as_deref()
            .or(self.cover_url.as_deref())
    }
}

/// One ordered sub-unit of a work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    /// Stable identity used for chapter-subset selection.
    pub id: u64,
    /// Ordering index among siblings.
    pub number: u32,
    /// Display title.
    #[serde(default)]
    pub title: String,
    /// Location of the page list.
    #[serde(default)]
    pub url: String,
    /// Inline page list; when present the source is not consulted.
    #[serde(default)]
    pub pages: Option<Vec<Page>>,
}

impl Chapter {
    /// Creates a chapter whose pages are fetched lazily.
    pub fn new(id: u64, number: u32, url: impl Into<String>) -> Self {
        Self {
            id,
            number,
            title: String::new(),
            url: url.into(),
            pages: None,
        }
    }
}

/// Opaque page reference, resolvable to a fetch URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Page identity within its source.
    pub id: u64,
    /// Reference passed to the source for URL resolution.
    pub url: String,
    /// Referer header required when fetching the page.
    #[serde(default)]
    pub referer: String,
}

impl Page {
    /// Creates a page reference.
    pub fn new(id: u64, url: impl Into<String>, referer: impl Into<String>) -> Self {
        Self {
            id,
            url: url.into(),
            referer: referer.into(),
        }
    }
}

/// In-memory cover thumbnail shown alongside job state.
#[derive(Clone, PartialEq, Eq)]
pub struct Cover {
    bytes: Arc<[u8]>,
    content_type: Option<String>,
}

impl Cover {
    /// Wraps downloaded thumbnail bytes.
    pub fn new(bytes: impl Into<Arc<[u8]>>, content_type: Option<String>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type,
        }
    }

    /// Raw image bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Content type reported by the server, if any.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }
}

impl fmt::Debug for Cover {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cover")
            .field("len", &self.bytes.len())
            .field("content_type", &self.content_type)
            .finish()
    }
}

/// Result handle for a finished job: the finalized archive and its contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalItem {
    /// Path of the finalized archive.
    pub path: PathBuf,
    /// Item as stored in the archive index.
    pub item: WorkItem,
}
