use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::JobError;

/// Counting limiter for jobs past the preparation point.
///
/// Cloning shares the underlying slots. Fairness between waiters is not
/// guaranteed.
#[derive(Debug, Clone)]
pub struct PermitPool {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// A held slot. Dropping it returns the slot to the pool.
#[derive(Debug)]
pub struct PoolPermit {
    _permit: OwnedSemaphorePermit,
}

impl PoolPermit {
    /// Returns the slot to the pool.
    pub fn release(self) {
        drop(self);
    }
}

impl PermitPool {
    /// Creates a pool with `capacity` slots (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Returns the fixed number of slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of slots currently held.
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.capacity - self.semaphore.available_permits()
    }

    /// Waits for a free slot.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Cancelled`] if `cancel` fires first.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<PoolPermit, JobError> {
        if self.semaphore.available_permits() == 0 {
            debug!(capacity = self.capacity, "permit pool exhausted, waiting");
        }
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(JobError::Cancelled),
            permit = Arc::clone(&self.semaphore).acquire_owned() => permit
                .map(|permit| PoolPermit { _permit: permit })
                .map_err(|_| JobError::internal("permit pool closed unexpectedly")),
        }
    }
}
