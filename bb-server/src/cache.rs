//! Short-lived cache of list response bodies
//!
//! Image and run listings are read far more often than the catalog changes.
//! Bodies are kept for a TTL and the whole cache is dropped on any write.
//!
//! Each invalidation bumps a generation counter. A reader captures the
//! generation before touching the database and hands it back on insert, so a
//! body built from data older than the last write is never stored.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const MAX_ENTRIES: usize = 256;

#[derive(Clone)]
struct CachedBody {
    body: Value,
    created_at: Instant,
}

pub struct ListCache {
    ttl: Duration,
    max_entries: usize,
    generation: AtomicU64,
    entries: Mutex<HashMap<String, CachedBody>>,
}

impl ListCache {
    /// A zero TTL disables caching
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            max_entries: MAX_ENTRIES,
            generation: AtomicU64::new(0),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    /// Current generation; capture it before reading the rows a body is built from
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        if !self.enabled() {
            return None;
        }
        let mut entries = self.entries.lock().await;
        entries.retain(|_, v| v.created_at.elapsed() <= self.ttl);
        entries.get(key).map(|entry| entry.body.clone())
    }

    /// Store `body` unless the cache was invalidated since `generation`
    pub async fn insert(&self, key: String, body: Value, generation: u64) {
        if !self.enabled() {
            return;
        }
        let mut entries = self.entries.lock().await;
        if self.generation.load(Ordering::Acquire) != generation {
            tracing::debug!("Dropping stale list body for {}", key);
            return;
        }
        entries.retain(|_, v| v.created_at.elapsed() <= self.ttl);
        if entries.len() >= self.max_entries {
            if let Some(victim) = entries
                .iter()
                .min_by_key(|(_, v)| v.created_at)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&victim);
            }
        }
        entries.insert(
            key,
            CachedBody {
                body,
                created_at: Instant::now(),
            },
        );
    }

    /// Drop every entry and start a new generation
    pub async fn invalidate(&self) {
        let mut entries = self.entries.lock().await;
        self.generation.fetch_add(1, Ordering::AcqRel);
        if !entries.is_empty() {
            tracing::debug!("List cache cleared ({} entries)", entries.len());
            entries.clear();
        }
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}
