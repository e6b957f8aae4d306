use std::sync::Arc;

use dashmap::DashSet;
use tracing::debug;

/// Set of item identities currently owned by a job.
///
/// Acquisition never blocks: a second job targeting a held identity is
/// rejected immediately.
#[derive(Debug, Clone, Default)]
pub struct ResourceLocks {
    held: Arc<DashSet<u64>>,
}

/// Ownership of one item identity. Dropping it unlocks the identity.
#[derive(Debug)]
pub struct ResourceGuard {
    held: Arc<DashSet<u64>>,
    id: u64,
}

impl ResourceLocks {
    /// Creates an empty lock set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks `id`, or returns `None` when another job holds it.
    #[must_use]
    pub fn try_lock(&self, id: u64) -> Option<ResourceGuard> {
        if self.held.insert(id) {
            debug!(item_id = id, "resource locked");
            Some(ResourceGuard {
                held: Arc::clone(&self.held),
                id,
            })
        } else {
            debug!(item_id = id, "resource already locked");
            None
        }
    }

    /// Returns true when `id` is held by some job.
    #[must_use]
    pub fn is_locked(&self, id: u64) -> bool {
        self.held.contains(&id)
    }

    /// Number of identities currently held.
    #[must_use]
    pub fn held_count(&self) -> usize {
        self.held.len()
    }
}

impl ResourceGuard {
    /// Identity this guard holds.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Unlocks the identity.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for ResourceGuard {
    fn drop(&mut self) {
        self.held.remove(&self.id);
        debug!(item_id = self.id, "resource unlocked");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_second_lock_on_same_id_fails_fast() {
        let locks = ResourceLocks::new();
        let guard = locks.try_lock(42).unwrap();
        assert!(locks.try_lock(42).is_none());
        assert!(locks.is_locked(42));
        assert_eq!(guard.id(), 42);
    }

    #[test]
    fn test_distinct_ids_lock_independently() {
        let locks = ResourceLocks::new();
        let _a = locks.try_lock(1).unwrap();
        let _b = locks.try_lock(2).unwrap();
        assert_eq!(locks.held_count(), 2);
    }

    #[test]
    fn test_release_allows_relock() {
        let locks = ResourceLocks::new();
        locks.try_lock(7).unwrap().release();
        assert!(!locks.is_locked(7));
        assert!(locks.try_lock(7).is_some());
    }

    #[test]
    fn test_clones_share_state() {
        let locks = ResourceLocks::new();
        let other = locks.clone();
        let _guard = locks.try_lock(9).unwrap();
        assert!(other.try_lock(9).is_none());
    }

    #[test]
    fn test_concurrent_lock_has_single_winner() {
        use std::thread;

        let locks = ResourceLocks::new();
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let locks = locks.clone();
                thread::spawn(move || locks.try_lock(5).map(std::mem::forget).is_some())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
