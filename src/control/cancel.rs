use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::JobError;

/// Runs `future` unless `cancel` fires first.
///
/// # Errors
///
/// Returns [`JobError::Cancelled`] on cancellation, otherwise the future's own error.
pub async fn cancellable<T, F>(cancel: &CancellationToken, future: F) -> Result<T, JobError>
where
    F: Future<Output = Result<T, JobError>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(JobError::Cancelled),
        result = future => result,
    }
}

/// Sleeps for `duration` unless `cancel` fires first.
///
/// # Errors
///
/// Returns [`JobError::Cancelled`] on cancellation.
pub async fn sleep(cancel: &CancellationToken, duration: Duration) -> Result<(), JobError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(JobError::Cancelled),
        () = tokio::time::sleep(duration) => Ok(()),
    }
}
