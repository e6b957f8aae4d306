//! Shared User-Agent strings for page and manifest HTTP traffic.

/// Project URL advertised in the User-Agent.
const PROJECT_UA_URL: &str = "https://github.com/tomefetch/tomefetch";

/// User-Agent for page and cover fetches.
#[must_use]
pub(crate) fn default_download_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("tomefetch/{version} (archive-downloader; +{PROJECT_UA_URL})")
}

/// User-Agent for manifest and page-list requests made by remote sources.
#[must_use]
pub(crate) fn default_source_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("tomefetch/{version} (catalog-client; +{PROJECT_UA_URL})")
}
