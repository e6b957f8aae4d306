//! Failure classification and the failsafe retry budget.
//!
//! This module provides the [`FailsafePolicy`] and [`FailureType`] types for
//! classifying download errors and determining what the failsafe retrier
//! does next.
//!
//! # Overview
//!
//! When an operation fails, the error is classified into a [`FailureType`]:
//! - [`FailureType::Transient`] - Network/transport failures that may succeed on retry
//! - [`FailureType::Permanent`] - Failures that won't succeed regardless of retries
//!
//! The [`FailsafePolicy`] then decides between an immediate retry after a
//! fixed delay, escalating to a pause, or giving up.
//!
//! # Example
//!
//! ```
//! use tomefetch_core::download::{DownloadError, FailsafePolicy, RetryDecision, classify_error};
//!
//! let policy = FailsafePolicy::default();
//! let error = DownloadError::http_status("https://example.com/page.jpg", 503);
//!
//! match policy.should_retry(classify_error(&error), policy.budget()) {
//!     RetryDecision::Retry { delay } => println!("retrying in {delay:?}"),
//!     RetryDecision::Pause => println!("asking the operator to resume"),
//!     RetryDecision::DoNotRetry { reason } => println!("giving up: {reason}"),
//! }
//! ```

use std::time::Duration;

use tracing::{debug, instrument};

use super::DownloadError;

/// Default number of immediate retries before a job pauses.
pub const DEFAULT_RETRY_BUDGET: u32 = 2;

/// Default delay between immediate retries (500ms).
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Classification of download failure types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Temporary failure that may succeed on retry.
    ///
    /// Examples: network timeout, connection reset, 5xx server errors.
    Transient,

    /// Permanent failure that won't succeed regardless of retries.
    ///
    /// Examples: 404 Not Found, invalid URL, local disk errors, empty body.
    Permanent,
}

/// Decision on what to do after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay without changing job state.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
    },

    /// Budget exhausted: pause the job until an operator resumes it.
    Pause,

    /// Do not retry; surface the error.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Retry budget and delay used by the failsafe retrier.
///
/// # Default Values
///
/// - `budget`: 2 immediate retries
/// - `delay`: 500 milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailsafePolicy {
    /// Immediate retries allowed before pausing.
    budget: u32,

    /// Fixed delay between immediate retries.
    delay: Duration,
}

impl Default for FailsafePolicy {
    fn default() -> Self {
        Self {
            budget: DEFAULT_RETRY_BUDGET,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl FailsafePolicy {
    /// Creates a policy with a custom budget and delay.
    #[must_use]
    pub fn new(budget: u32, delay: Duration) -> Self {
        Self { budget, delay }
    }

    /// Returns the number of immediate retries before pausing.
    #[must_use]
    pub fn budget(&self) -> u32 {
        self.budget
    }

    /// Returns the delay between immediate retries.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Decides what to do after a failure.
    ///
    /// # Arguments
    ///
    /// * `failure_type` - Classification of the failure
    /// * `remaining` - Immediate retries left in the current budget
    #[instrument(skip(self), fields(budget = self.budget))]
    pub fn should_retry(&self, failure_type: FailureType, remaining: u32) -> RetryDecision {
        if failure_type == FailureType::Permanent {
            return RetryDecision::DoNotRetry {
                reason: "permanent failure - retry would not help".to_string(),
            };
        }

        if remaining == 0 {
            debug!("retry budget exhausted");
            return RetryDecision::Pause;
        }

        debug!(remaining, delay_ms = self.delay.as_millis(), "will retry");
        RetryDecision::Retry { delay: self.delay }
    }
}

/// Classifies a download error into a failure type for retry decisions.
///
/// # HTTP Status Code Classification
///
/// | Status | Type | Rationale |
/// |--------|------|-----------|
/// | 408 | Transient | Request timeout - may succeed |
/// | 429 | Transient | Rate limited - may succeed later |
/// | other 4xx | Permanent | Client error - won't succeed on retry |
/// | 5xx | Transient | Server error - may be temporary |
///
/// # Non-HTTP Errors
///
/// | Error | Type | Rationale |
/// |-------|------|-----------|
/// | Timeout | Transient | Network may recover |
/// | Network | Transient | Server may come back |
/// | EmptyBody | Permanent | Response is unusable |
/// | IO | Permanent | Local file system issue |
/// | InvalidUrl | Permanent | Won't succeed |
#[instrument]
pub fn classify_error(error: &DownloadError) -> FailureType {
    match error {
        DownloadError::HttpStatus { status, .. } => classify_http_status(*status),

        DownloadError::Timeout { .. } | DownloadError::Network { .. } => FailureType::Transient,

        DownloadError::EmptyBody { .. }
        | DownloadError::Io { .. }
        | DownloadError::InvalidUrl { .. } => FailureType::Permanent,
    }
}

/// Classifies an HTTP status code into a failure type.
#[allow(clippy::match_same_arms)]
fn classify_http_status(status: u16) -> FailureType {
    match status {
        408 => FailureType::Transient, // Request Timeout
        429 => FailureType::Transient, // Too Many Requests
        status if (400..500).contains(&status) => FailureType::Permanent,
        status if (500..600).contains(&status) => FailureType::Transient,
        _ => FailureType::Permanent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failsafe_policy_default_values() {
        let policy = FailsafePolicy::default();
        assert_eq!(policy.budget(), 2);
        assert_eq!(policy.delay(), Duration::from_millis(500));
    }

    #[test]
    fn test_should_retry_permanent_does_not_retry() {
        let policy = FailsafePolicy::default();
        let decision = policy.should_retry(FailureType::Permanent, 2);
        assert!(matches!(decision, RetryDecision::DoNotRetry { .. }));
        if let RetryDecision::DoNotRetry { reason } = decision {
            assert!(reason.contains("permanent"));
        }
    }

    #[test]
    fn test_should_retry_transient_with_budget_retries() {
        let policy = FailsafePolicy::new(2, Duration::from_millis(10));
        assert_eq!(
            policy.should_retry(FailureType::Transient, 1),
            RetryDecision::Retry {
                delay: Duration::from_millis(10)
            }
        );
    }

    #[test]
    fn test_should_retry_transient_exhausted_pauses() {
        let policy = FailsafePolicy::default();
        assert_eq!(
            policy.should_retry(FailureType::Transient, 0),
            RetryDecision::Pause
        );
    }

    #[test]
    fn test_zero_budget_pauses_on_first_failure() {
        let policy = FailsafePolicy::new(0, Duration::ZERO);
        assert_eq!(
            policy.should_retry(FailureType::Transient, policy.budget()),
            RetryDecision::Pause
        );
    }

    #[test]
    fn test_classify_http_404_permanent() {
        let error = DownloadError::http_status("http://example.com", 404);
        assert_eq!(classify_error(&error), FailureType::Permanent);
    }

    #[test]
    fn test_classify_http_403_permanent() {
        let error = DownloadError::http_status("http://example.com", 403);
        assert_eq!(classify_error(&error), FailureType::Permanent);
    }

    #[test]
    fn test_classify_http_408_and_429_transient() {
        for status in [408, 429] {
            let error = DownloadError::http_status("http://example.com", status);
            assert_eq!(classify_error(&error), FailureType::Transient, "status {status}");
        }
    }

    #[test]
    fn test_classify_http_5xx_transient() {
        for status in [500, 502, 503, 504, 599] {
            let error = DownloadError::http_status("http://example.com", status);
            assert_eq!(classify_error(&error), FailureType::Transient, "status {status}");
        }
    }

    #[test]
    fn test_classify_timeout_transient() {
        let error = DownloadError::timeout("http://example.com");
        assert_eq!(classify_error(&error), FailureType::Transient);
    }

    #[test]
    fn test_classify_empty_body_permanent() {
        let error = DownloadError::empty_body("http://example.com");
        assert_eq!(classify_error(&error), FailureType::Permanent);
    }

    #[test]
    fn test_classify_io_error_permanent() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let error = DownloadError::io("/path/to/file", io_err);
        assert_eq!(classify_error(&error), FailureType::Permanent);
    }

    #[test]
    fn test_classify_invalid_url_permanent() {
        let error = DownloadError::invalid_url("not-a-url");
        assert_eq!(classify_error(&error), FailureType::Permanent);
    }
}
