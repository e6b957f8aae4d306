//! JSON manifest source.
//!
//! The item URL points at a manifest document:
//!
//! ```json
//! {
//!   "id": 42,
//!   "title": "Example",
//!   "cover_url": "cover.jpg",
//!   "chapters": [
//!     { "id": 1, "number": 1, "url": "ch1/pages.json" },
//!     { "id": 2, "number": 2, "pages": [{ "id": 1, "url": "ch2/001.png" }] }
//!   ]
//! }
//! ```
//!
//! Chapter `url`s point at a JSON array of pages. Relative URLs are resolved
//! against the document they appear in. Page URLs are fetched as-is.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use super::{RemoteSource, SourceError};
use crate::download::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use crate::model::{Chapter, Page, SourceId, WorkItem};
use crate::user_agent;

/// Registry name of [`ManifestSource`].
pub const MANIFEST_SOURCE_NAME: &str = "manifest";

#[derive(Debug, Deserialize)]
struct ManifestDocument {
    id: u64,
    title: String,
    #[serde(default)]
    cover_url: Option<String>,
    #[serde(default)]
    large_cover_url: Option<String>,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
    chapters: Vec<ManifestChapter>,
}

#[derive(Debug, Deserialize)]
struct ManifestChapter {
    id: u64,
    number: u32,
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    pages: Option<Vec<ManifestPage>>,
}

#[derive(Debug, Deserialize)]
struct ManifestPage {
    id: u64,
    url: String,
    #[serde(default)]
    referer: Option<String>,
}

/// Reads items from JSON manifests served over HTTP.
#[derive(Debug, Clone)]
pub struct ManifestSource {
    client: Client,
}

impl Default for ManifestSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ManifestSource {
    /// Creates a source with its own HTTP client.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(READ_TIMEOUT_SECS))
            .gzip(true)
            .user_agent(user_agent::default_source_user_agent())
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self { client }
    }

    /// Creates a source sharing an existing client.
    #[must_use]
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Builds an unresolved item pointing at `manifest_url`.
    #[must_use]
    pub fn item_for(manifest_url: &str) -> WorkItem {
        WorkItem::new(
            0,
            SourceId::remote(MANIFEST_SOURCE_NAME),
            manifest_url,
            manifest_url,
        )
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, SourceError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SourceError::transport(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::http_status(url, status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| SourceError::transport(url, e))?;
        serde_json::from_slice(&body).map_err(|e| SourceError::malformed(url, e.to_string()))
    }
}

fn resolve_url(base: &Url, reference: &str) -> Result<String, SourceError> {
    base.join(reference)
        .map(String::from)
        .map_err(|e| SourceError::malformed(base.as_str(), format!("bad url '{reference}': {e}")))
}

fn parse_base(url: &str) -> Result<Url, SourceError> {
    Url::parse(url).map_err(|e| SourceError::malformed(url, e.to_string()))
}

fn convert_pages(base: &Url, pages: Vec<ManifestPage>) -> Result<Vec<Page>, SourceError> {
    pages
        .into_iter()
        .map(|page| {
            let referer = match page.referer {
                Some(referer) => referer,
                None => base.to_string(),
            };
            Ok(Page::new(page.id, resolve_url(base, &page.url)?, referer))
        })
        .collect()
}

#[async_trait]
impl RemoteSource for ManifestSource {
    fn name(&self) -> &'static str {
        MANIFEST_SOURCE_NAME
    }

    #[instrument(skip(self, item), fields(source = MANIFEST_SOURCE_NAME, url = %item.url))]
    async fn get_details(&self, item: &WorkItem) -> Result<WorkItem, SourceError> {
        if item.source.is_local() {
            return Err(SourceError::unsupported(
                MANIFEST_SOURCE_NAME,
                "local items have no manifest",
            ));
        }
        let base = parse_base(&item.url)?;
        let document: ManifestDocument = self.get_json(&item.url).await?;

        let chapters = document
            .chapters
            .into_iter()
            .map(|chapter| {
                let url = if chapter.url.is_empty() {
                    String::new()
                } else {
                    resolve_url(&base, &chapter.url)?
                };
                let pages = match chapter.pages {
                    Some(pages) => Some(convert_pages(&base, pages)?),
                    None => None,
                };
                Ok(Chapter {
                    id: chapter.id,
                    number: chapter.number,
                    title: chapter.title,
                    url,
                    pages,
                })
            })
            .collect::<Result<Vec<_>, SourceError>>()?;

        debug!(item_id = document.id, chapters = chapters.len(), "manifest resolved");

        let cover_url = document
            .cover_url
            .map(|u| resolve_url(&base, &u))
            .transpose()?;
        let large_cover_url = document
            .large_cover_url
            .map(|u| resolve_url(&base, &u))
            .transpose()?;

        Ok(WorkItem {
            id: document.id,
            source: SourceId::remote(MANIFEST_SOURCE_NAME),
            title: document.title,
            url: item.url.clone(),
            cover_url,
            large_cover_url,
            chapters: Some(chapters),
            metadata: document.metadata,
        })
    }

    #[instrument(skip(self, chapter), fields(source = MANIFEST_SOURCE_NAME, chapter = chapter.id))]
    async fn get_pages(&self, chapter: &Chapter) -> Result<Vec<Page>, SourceError> {
        if let Some(pages) = &chapter.pages {
            return Ok(pages.clone());
        }
        if chapter.url.is_empty() {
            return Err(SourceError::malformed(
                format!("chapter:{}", chapter.id),
                "chapter has neither pages nor a page list url",
            ));
        }
        let base = parse_base(&chapter.url)?;
        let pages: Vec<ManifestPage> = self.get_json(&chapter.url).await?;
        convert_pages(&base, pages)
    }

    async fn get_page_url(&self, page: &Page) -> Result<String, SourceError> {
        Ok(page.url.clone())
    }
}
