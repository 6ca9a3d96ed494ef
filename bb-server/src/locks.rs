//! Per-key async mutual exclusion
//!
//! Reconciliation of one `(lab, name)` pair is a lookup followed by a
//! create; two requests uploading the same capture must not interleave
//! there. Different keys never wait on each other.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Default)]
pub struct KeyedLocks {
    inflight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key for one image name within a lab
    pub fn image_key(lab_id: i64, name: &str) -> String {
        format!("{}/{}", lab_id, name)
    }

    /// Wait for exclusive use of `key`; released when the guard drops
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut inflight = self.inflight.lock().await;
            // Entries only the map still references are idle
            inflight.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(
                inflight
                    .entry(key.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        lock.lock_owned().await
    }

    /// Number of keys currently tracked
    #[cfg(test)]
    async fn tracked(&self) -> usize {
        self.inflight.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = Arc::new(KeyedLocks::new());
        let guard = locks.acquire("1/shot_A").await;

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.acquire("1/shot_A").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_block() {
        let locks = KeyedLocks::new();
        let _a = locks.acquire(&KeyedLocks::image_key(1, "shot_A")).await;
        let b = tokio::time::timeout(
            Duration::from_secs(1),
            locks.acquire(&KeyedLocks::image_key(1, "shot_B")),
        )
        .await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_idle_keys_are_pruned() {
        let locks = KeyedLocks::new();
        drop(locks.acquire("1/a").await);
        drop(locks.acquire("1/b").await);
        let _c = locks.acquire("1/c").await;
        assert_eq!(locks.tracked().await, 1);
    }
}
