//! Error types for remote source operations.

use thiserror::Error;

use crate::error::ErrorKind;

/// Errors raised while resolving item details, page lists, or page URLs.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Transport failure talking to the source.
    #[error("source request to {url} failed: {source}")]
    Network {
        /// Requested URL.
        url: String,
        /// Underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The source did not answer in time.
    #[error("source request to {url} timed out")]
    Timeout {
        /// Requested URL.
        url: String,
    },

    /// The source answered with an error status.
    #[error("source returned HTTP {status} for {url}")]
    HttpStatus {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// The response body could not be interpreted.
    #[error("malformed response from {url}: {reason}")]
    Malformed {
        /// Requested URL.
        url: String,
        /// Parse failure description.
        reason: String,
    },

    /// The source cannot serve this request at all.
    #[error("{source_name} cannot handle: {reason}")]
    Unsupported {
        /// Source name.
        source_name: String,
        /// Why the request is unsupported.
        reason: String,
    },
}

impl SourceError {
    /// Maps a reqwest transport error, separating timeouts.
    pub fn transport(url: impl Into<String>, error: reqwest::Error) -> Self {
        let url = url.into();
        if error.is_timeout() {
            Self::Timeout { url }
        } else {
            Self::Network { url, source: error }
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a malformed-response error.
    pub fn malformed(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates an unsupported-request error.
    pub fn unsupported(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unsupported {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    /// Classifies the failure. Server-side 5xx, 408 and 429 are transient.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network { .. } | Self::Timeout { .. } => ErrorKind::TransientIo,
            Self::HttpStatus { status, .. } => match status {
                408 | 429 | 500..=599 => ErrorKind::TransientIo,
                _ => ErrorKind::DataIntegrity,
            },
            Self::Malformed { .. } => ErrorKind::DataIntegrity,
            Self::Unsupported { .. } => ErrorKind::ResourceUnavailable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            SourceError::Timeout { url: "u".into() }.kind(),
            ErrorKind::TransientIo
        );
        assert_eq!(SourceError::http_status("u", 503).kind(), ErrorKind::TransientIo);
        assert_eq!(SourceError::http_status("u", 429).kind(), ErrorKind::TransientIo);
        assert_eq!(SourceError::http_status("u", 404).kind(), ErrorKind::DataIntegrity);
        assert_eq!(SourceError::malformed("u", "eof").kind(), ErrorKind::DataIntegrity);
        assert_eq!(
            SourceError::unsupported("demo", "local").kind(),
            ErrorKind::ResourceUnavailable
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(
            SourceError::http_status("https://x.test/m.json", 404).to_string(),
            "source returned HTTP 404 for https://x.test/m.json"
        );
    }
}
