//! HTTP client wrapper for fetching pages and covers.
//!
//! This module provides the `HttpClient` struct which performs single GET
//! requests with a caller-supplied referer, streams the body to a named
//! temporary file, and maps failures onto [`DownloadError`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE, REFERER};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use super::error::DownloadError;
use crate::user_agent;

/// Cache-Control value that disables intermediary and client caching.
const CACHE_CONTROL_DISABLED: &str = "no-cache, no-store";

/// HTTP client for page and cover downloads.
///
/// This client is designed to be created once and shared by every job,
/// taking advantage of connection pooling.
///
/// # Example
///
/// ```no_run
/// use tomefetch_core::download::HttpClient;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpClient::new();
/// let path = client
///     .fetch("https://cdn.example.com/001.jpg", "https://example.com/", Path::new("./out"), "1_1.tmp")
///     .await?;
/// println!("Fetched to: {}", path.display());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a new HTTP client with default timeouts.
    ///
    /// Default configuration:
    /// - Connect timeout: 30 seconds
    /// - Read timeout: 5 minutes
    /// - Gzip decompression: enabled
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    pub fn new() -> Self {
        Self::new_with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a new HTTP client with explicit timeout values.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the supplied
    /// timeout configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new_with_timeouts(connect_timeout_secs: u64, read_timeout_secs: u64) -> Self {
        let client = build_client(connect_timeout_secs, read_timeout_secs)
            .expect("failed to build HTTP client with static configuration");
        Self { client }
    }

    /// Fetches `url` into `destination/temp_name`, overwriting any previous content.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if:
    /// - The URL is invalid
    /// - The request fails (network error, timeout)
    /// - The server returns an error status (4xx, 5xx)
    /// - The response has no body
    /// - Writing to disk fails
    #[must_use = "fetch result contains the path to the downloaded file"]
    #[instrument(skip(self, destination), fields(url = %url))]
    pub async fn fetch(
        &self,
        url: &str,
        referer: &str,
        destination: &Path,
        temp_name: &str,
    ) -> Result<PathBuf, DownloadError> {
        let (file_path, _) = self
            .fetch_with_content_type(url, referer, destination, temp_name)
            .await?;
        Ok(file_path)
    }

    /// Like [`fetch`](Self::fetch), also returning the response content type.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`fetch`](Self::fetch).
    #[instrument(skip(self, destination), fields(url = %url))]
    pub async fn fetch_with_content_type(
        &self,
        url: &str,
        referer: &str,
        destination: &Path,
        temp_name: &str,
    ) -> Result<(PathBuf, Option<String>), DownloadError> {
        let response = self.send_get(url, referer).await?;
        let content_type = content_type_of(&response);
        let file_path = destination.join(temp_name);

        let file = File::create(&file_path)
            .await
            .map_err(|e| DownloadError::io(file_path.clone(), e))?;

        let bytes_written = stream_to_file(file, response, url, &file_path).await?;
        if bytes_written == 0 {
            return Err(DownloadError::empty_body(url));
        }

        debug!(path = %file_path.display(), bytes = bytes_written, "fetch complete");
        Ok((file_path, content_type))
    }

    /// Fetches `url` into memory, returning the body and its content type.
    ///
    /// Used for small cosmetic payloads such as cover thumbnails.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`fetch`](Self::fetch), except disk errors.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch_bytes(
        &self,
        url: &str,
        referer: &str,
    ) -> Result<(Vec<u8>, Option<String>), DownloadError> {
        let response = self.send_get(url, referer).await?;
        let content_type = content_type_of(&response);
        let body = response
            .bytes()
            .await
            .map_err(|e| map_transport_error(url, e))?;
        if body.is_empty() {
            return Err(DownloadError::empty_body(url));
        }
        Ok((body.to_vec(), content_type))
    }

    async fn send_get(&self, url: &str, referer: &str) -> Result<reqwest::Response, DownloadError> {
        Url::parse(url).map_err(|_| DownloadError::invalid_url(url.to_string()))?;

        let mut request = self.client.get(url).header(CACHE_CONTROL, CACHE_CONTROL_DISABLED);
        if !referer.is_empty() {
            request = request.header(REFERER, referer);
        }

        let response = request
            .send()
            .await
            .map_err(|e| map_transport_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(url, status.as_u16()));
        }
        Ok(response)
    }

    /// Returns a reference to the underlying reqwest client.
    ///
    /// This can be used for advanced operations not covered by this wrapper.
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

fn content_type_of(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
}

fn map_transport_error(url: &str, error: reqwest::Error) -> DownloadError {
    if error.is_timeout() {
        DownloadError::timeout(url)
    } else {
        DownloadError::network(url, error)
    }
}

/// Streams response body to file, returning bytes written.
async fn stream_to_file(
    file: File,
    response: reqwest::Response,
    url: &str,
    file_path: &Path,
) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| map_transport_error(url, e))?;

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(file_path.to_path_buf(), e))?;

        bytes_written += chunk.len() as u64;
    }

    // Ensure all data is flushed to disk
    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(file_path.to_path_buf(), e))?;

    Ok(bytes_written)
}

fn build_client(connect_timeout_secs: u64, read_timeout_secs: u64) -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(Duration::from_secs(connect_timeout_secs))
        .timeout(Duration::from_secs(read_timeout_secs))
        .gzip(true)
        .user_agent(user_agent::default_download_user_agent())
        .build()
}
