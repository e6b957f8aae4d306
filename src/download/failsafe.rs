//! Bounded retry that escalates to an operator-driven pause.
//!
//! Transient failures are retried after a fixed delay without touching the
//! published job state. Once the budget is spent the job publishes `Paused`,
//! waits on its [`PauseGate`], restores the snapshot it paused from, and
//! starts over with a fresh budget. Non-transient failures surface at once.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::retry::{FailsafePolicy, FailureType, RetryDecision};
use crate::control::{PauseGate, cancel};
use crate::error::JobError;
use crate::state::StateReporter;

/// Failsafe runner bound to one job's gate, state slot, and cancel signal.
#[derive(Debug, Clone, Copy)]
pub struct Failsafe<'a> {
    policy: FailsafePolicy,
    gate: &'a PauseGate,
    reporter: &'a StateReporter,
    cancel: &'a CancellationToken,
}

impl<'a> Failsafe<'a> {
    /// Binds a runner to a job's collaborators.
    #[must_use]
    pub fn new(
        policy: FailsafePolicy,
        gate: &'a PauseGate,
        reporter: &'a StateReporter,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            policy,
            gate,
            reporter,
            cancel,
        }
    }

    /// Runs `operation` until it succeeds, fails permanently, or the job is cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Cancelled`] if the job is cancelled at any
    /// suspension point, or the first non-transient error of `operation`.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, JobError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, JobError>>,
    {
        let mut remaining = self.policy.budget();
        loop {
            let error = match cancel::cancellable(self.cancel, operation()).await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_cancelled() => return Err(error),
                Err(error) => error,
            };

            let failure_type = if error.is_transient() {
                FailureType::Transient
            } else {
                FailureType::Permanent
            };

            match self.policy.should_retry(failure_type, remaining) {
                RetryDecision::Retry { delay } => {
                    remaining -= 1;
                    warn!(
                        error = %error,
                        remaining,
                        delay_ms = delay.as_millis(),
                        "transient failure, retrying"
                    );
                    cancel::sleep(self.cancel, delay).await?;
                }
                RetryDecision::Pause => {
                    let snapshot = self.reporter.current();
                    warn!(
                        job_id = snapshot.job_id(),
                        error = %error,
                        "retry budget exhausted, pausing job"
                    );
                    // Gate must be closed before Paused is observable.
                    self.gate.pause();
                    self.reporter.publish(snapshot.to_paused(Arc::new(error)));
                    remaining = self.policy.budget();
                    self.gate.await_resumed(self.cancel).await?;
                    self.reporter.publish(snapshot);
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(error = %error, %reason, "not retrying");
                    return Err(error);
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::download::DownloadError;
    use crate::model::{SourceId, WorkItem};
    use crate::state::DownloadJobState;

    fn reporter() -> StateReporter {
        StateReporter::new(DownloadJobState::Preparing {
            job_id: 1,
            item: Arc::new(WorkItem::new(
                1,
                SourceId::remote("demo"),
                "T",
                "https://x.test",
            )),
            cover: None,
        })
    }

    fn fast_policy() -> FailsafePolicy {
        FailsafePolicy::new(2, Duration::from_millis(1))
    }

    fn failing_n_times(
        calls: &AtomicUsize,
        failures: usize,
    ) -> impl FnMut() -> std::future::Ready<Result<usize, JobError>> + '_ {
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(if n < failures {
                Err(JobError::from(DownloadError::timeout("https://x.test/p")))
            } else {
                Ok(n)
            })
        }
    }

    #[tokio::test]
    async fn test_succeeds_within_budget_without_pausing() {
        let gate = PauseGate::new();
        let reporter = reporter();
        let cancel = CancellationToken::new();
        let failsafe = Failsafe::new(fast_policy(), &gate, &reporter, &cancel);
        let calls = AtomicUsize::new(0);

        let value = failsafe.run(failing_n_times(&calls, 2)).await.unwrap();

        assert_eq!(value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(!gate.is_paused());
        assert_eq!(reporter.current().name(), "preparing");
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let gate = PauseGate::new();
        let reporter = reporter();
        let cancel = CancellationToken::new();
        let failsafe = Failsafe::new(fast_policy(), &gate, &reporter, &cancel);
        let calls = AtomicUsize::new(0);

        let result: Result<(), JobError> = failsafe
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                std::future::ready(Err(JobError::EmptyChapters))
            })
            .await;

        assert!(matches!(result, Err(JobError::EmptyChapters)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_budget_pauses_then_restores_state_on_resume() {
        let gate = PauseGate::new();
        let reporter = reporter();
        let cancel = CancellationToken::new();
        let calls = AtomicUsize::new(0);
        let mut states = reporter.subscribe();

        let run = async {
            Failsafe::new(fast_policy(), &gate, &reporter, &cancel)
                .run(failing_n_times(&calls, 3))
                .await
        };
        let operator = async {
            states
                .wait_for(|s| matches!(s, DownloadJobState::Paused { .. }))
                .await
                .unwrap();
            gate.resume();
        };

        let (result, ()) = tokio::join!(run, operator);
        assert_eq!(result.unwrap(), 3);
        assert_eq!(reporter.current().name(), "preparing");
        assert!(!gate.is_paused());
    }

    #[tokio::test]
    async fn test_cancel_while_paused_returns_cancelled() {
        let gate = PauseGate::new();
        let reporter = reporter();
        let cancel = CancellationToken::new();
        let calls = AtomicUsize::new(0);
        let mut states = reporter.subscribe();

        let run = async {
            Failsafe::new(fast_policy(), &gate, &reporter, &cancel)
                .run(failing_n_times(&calls, usize::MAX))
                .await
        };
        let operator = async {
            states
                .wait_for(|s| matches!(s, DownloadJobState::Paused { .. }))
                .await
                .unwrap();
            cancel.cancel();
        };

        let (result, ()) = tokio::join!(run, operator);
        assert!(matches!(result, Err(JobError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
