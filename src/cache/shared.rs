//! Shared Cache Module
//!
//! Concurrent handle over the cache store: a single reader/writer lock plus
//! the access discipline every caller goes through.
//!
//! Writes (`insert`, `clear`) take the exclusive lock. A lookup is trickier,
//! because a hit must promote the entry, and promotion is a mutation:
//!
//! 1. take the shared lock and probe the index;
//! 2. on a miss, release and return nothing; the store is untouched;
//! 3. on a hit, release the shared lock and take the exclusive lock;
//! 4. re-probe: another task may have evicted the entry between the locks;
//! 5. if the entry survived, promote it and copy the payload out.
//!
//! The shared lock is never held across promotion and the re-probe is never
//! skipped; there is no atomic upgrade, the re-probe is what restores
//! correctness. No I/O happens while either lock is held.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::cache::stats::StatsSnapshot;
use crate::cache::CacheStore;

// == Shared Cache ==
/// Cloneable, thread-safe handle to the cache store.
#[derive(Debug, Clone)]
pub struct SharedCache {
    inner: Arc<RwLock<CacheStore>>,
}

impl SharedCache {
    // == Constructor ==
    /// Wraps a store for shared access.
    pub fn new(store: CacheStore) -> Self {
        Self {
            inner: Arc::new(RwLock::new(store)),
        }
    }

    // == Lookup ==
    /// Looks up `key`, returning an owned copy of the payload on a hit.
    ///
    /// On return the entry, if present, is the most-recently-used. The copy
    /// is always whole: concurrent inserts can replace the entry between the
    /// optimistic probe and the exclusive re-probe, but a caller sees either
    /// the full old payload, the full new payload, or a miss.
    pub async fn lookup(&self, key: &str) -> Option<Vec<u8>> {
        {
            let store = self.inner.read().await;
            if !store.contains(key) {
                store.stats().record_miss();
                return None;
            }
        }

        // The shared lock is released; take the exclusive lock and re-probe.
        // get() promotes and copies out, or records the miss if the entry
        // was evicted while we were between locks.
        let mut store = self.inner.write().await;
        store.get(key)
    }

    // == Insert ==
    /// Stores `payload` under `key` under the exclusive lock.
    ///
    /// Oversize and empty payloads are dropped silently by the store.
    pub async fn insert(&self, key: &str, payload: &[u8]) {
        let mut store = self.inner.write().await;
        store.insert(key, payload);
    }

    // == Clear ==
    /// Releases every entry. Used at shutdown.
    pub async fn clear(&self) {
        let mut store = self.inner.write().await;
        store.clear();
    }

    // == Introspection ==
    /// Current number of entries.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Sum of payload sizes over all live entries.
    pub async fn current_bytes(&self) -> usize {
        self.inner.read().await.current_bytes()
    }

    /// All live keys in recency order, most recent first.
    pub async fn recency_keys(&self) -> Vec<String> {
        self.inner
            .read()
            .await
            .recency_keys()
            .into_iter()
            .map(String::from)
            .collect()
    }

    /// Point-in-time copy of the performance counters.
    pub async fn stats(&self) -> StatsSnapshot {
        self.inner.read().await.stats().snapshot()
    }
}
