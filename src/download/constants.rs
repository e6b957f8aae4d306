//! Constants for the download module (timeouts, delays).

use std::time::Duration;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Default throttle inserted after each page when slowdown is enabled.
pub const DEFAULT_SLOWDOWN_DELAY: Duration = Duration::from_millis(200);

/// Default number of concurrently active download jobs.
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 2;

/// Upper bound for the concurrent job limit.
pub const MAX_CONCURRENT_JOBS: usize = 16;
