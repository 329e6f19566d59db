//! Per-target-path mutual exclusion.
//!
//! Publish and unpublish both query the mount table and then act on the
//! answer. [`TargetLocks`] serializes those check-then-act sequences for a
//! single target path while leaving different paths fully parallel.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Async mutexes keyed by target path, created on demand.
#[derive(Debug, Default)]
pub struct TargetLocks {
    inner: DashMap<String, Arc<Mutex<()>>>,
}

/// Holds the lock for one target path. Released on drop.
#[derive(Debug)]
pub struct TargetGuard<'a> {
    locks: &'a TargetLocks,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl TargetLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `target`.
    pub async fn lock(&self, target: &str) -> TargetGuard<'_> {
        let mutex = Arc::clone(self.inner.entry(target.to_owned()).or_default().value());
        let guard = mutex.lock_owned().await;
        TargetGuard {
            locks: self,
            key: target.to_owned(),
            guard: Some(guard),
        }
    }

    /// Number of target paths with a live lock entry.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Drop for TargetGuard<'_> {
    fn drop(&mut self) {
        // Release the mutex first so the map holds the only reference unless
        // another task is waiting on it.
        self.guard.take();
        self.locks
            .inner
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn entry_removed_after_release() {
        let locks = TargetLocks::new();
        {
            let _g = locks.lock("/mnt/t1").await;
            assert_eq!(locks.len(), 1);
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn same_target_is_serialized() {
        let locks = Arc::new(TargetLocks::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let first = locks.lock("/mnt/t1").await;

        let waiter = {
            let locks = Arc::clone(&locks);
            let order = Arc::clone(&order);
            tokio::spawn(async move {
                let _g = locks.lock("/mnt/t1").await;
                order.lock().await.push("second");
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        order.lock().await.push("first");
        drop(first);

        waiter.await.unwrap();
        assert_eq!(*order.lock().await, vec!["first", "second"]);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn different_targets_do_not_block() {
        let locks = TargetLocks::new();
        let _a = locks.lock("/mnt/a").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock("/mnt/b")).await;
        assert!(b.is_ok());
        assert_eq!(locks.len(), 2);
    }
}
