//! Cache Store Module
//!
//! Main cache engine combining a hash index with a byte-budgeted recency
//! list. Lookup is expected O(1) through the index; promotion and eviction
//! are O(1) through the recency list.
//!
//! The store itself is single-threaded; concurrent access goes through
//! [`SharedCache`](crate::cache::SharedCache), which wraps it in a
//! reader/writer lock.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::cache::entry::{CacheEntry, SlotIndex};
use crate::cache::lru::EntryList;
use crate::cache::stats::CacheStats;
use crate::error::{ProxyError, Result};

// == Cache Store ==
/// Byte-budgeted LRU store of response payloads keyed by request fingerprint.
///
/// Two invariants hold whenever no operation is in flight: the index and the
/// recency list agree on membership, and `current_bytes` equals the sum of
/// all live payload sizes and never exceeds `max_total_bytes`.
#[derive(Debug)]
pub struct CacheStore {
    /// Fingerprint to arena-slot index
    index: HashMap<String, SlotIndex>,
    /// Recency-ordered entry arena
    entries: EntryList,
    /// Sum of payload sizes over all live entries
    current_bytes: usize,
    /// Total byte budget, fixed at construction
    max_total_bytes: usize,
    /// Largest admissible single payload, fixed at construction
    max_entry_bytes: usize,
    /// Performance counters
    stats: CacheStats,
}

impl CacheStore {
    // == Constructor ==
    /// Creates a new CacheStore with the given byte budgets.
    ///
    /// # Arguments
    /// * `max_total_bytes` - Total byte budget across all entries
    /// * `max_entry_bytes` - Largest single payload the store will admit
    ///
    /// # Errors
    /// Returns [`ProxyError::Config`] if either budget is zero.
    pub fn new(max_total_bytes: usize, max_entry_bytes: usize) -> Result<Self> {
        if max_total_bytes == 0 || max_entry_bytes == 0 {
            return Err(ProxyError::Config(
                "cache byte budgets must be positive".to_string(),
            ));
        }

        Ok(Self {
            index: HashMap::new(),
            entries: EntryList::new(),
            current_bytes: 0,
            max_total_bytes,
            max_entry_bytes,
            stats: CacheStats::new(),
        })
    }

    // == Contains ==
    /// Pure membership probe. Never mutates the store and never touches the
    /// counters; the read phase of the lookup protocol relies on both.
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    // == Get ==
    /// Looks up `key`, promoting the entry to most-recently-used on a hit.
    ///
    /// Returns a freshly allocated copy of the payload. The caller owns the
    /// copy outright; later mutations of the store cannot reach it, and
    /// mutations of the copy cannot reach the store. If the copy-out buffer
    /// cannot be allocated, the lookup degrades to a miss and the store is
    /// left unchanged; the caller never sees partial bytes.
    pub fn get(&mut self, key: &str) -> Option<Vec<u8>> {
        let slot = match self.index.get(key) {
            Some(&slot) => slot,
            None => {
                self.stats.record_miss();
                return None;
            }
        };

        // The copy-out buffer is reserved before the entry is promoted, so a
        // failed allocation mutates nothing.
        let size = self
            .entries
            .get(slot)
            .expect("indexed slot is vacant")
            .size();
        let mut copy = Vec::new();
        if copy.try_reserve_exact(size).is_err() {
            debug!("cache miss (copy-out allocation failed): {}", key);
            self.stats.record_miss();
            return None;
        }

        self.entries.promote(slot);
        copy.extend_from_slice(
            &self
                .entries
                .get(slot)
                .expect("indexed slot is vacant")
                .payload,
        );
        self.stats.record_hit();
        Some(copy)
    }

    // == Insert ==
    /// Stores `payload` under `key` as the most-recently-used entry.
    ///
    /// An existing entry is updated in place: the old bytes are released, the
    /// byte counter is adjusted, and the entry is promoted. A new entry first
    /// evicts from the tail until it fits the total budget.
    ///
    /// Payloads larger than `max_entry_bytes`, and empty payloads, are
    /// silently dropped and leave the store unchanged. Eviction is
    /// best-effort: if the store empties before the budget is satisfied, the
    /// entry is admitted anyway as long as it respects the per-entry cap.
    pub fn insert(&mut self, key: &str, payload: &[u8]) {
        let size = payload.len();
        if size == 0 || size > self.max_entry_bytes {
            debug!("cache skip (size {} outside bounds): {}", size, key);
            return;
        }

        // The store's own copy is allocated before anything is touched, so a
        // failed allocation leaves the store unchanged.
        let mut owned = Vec::new();
        if owned.try_reserve_exact(size).is_err() {
            debug!("cache skip (allocation failed): {}", key);
            return;
        }
        owned.extend_from_slice(payload);

        if let Some(&slot) = self.index.get(key) {
            // Update in place: swap payload, fix the byte counter, promote.
            let entry = self.entries.get_mut(slot).expect("indexed slot is vacant");
            self.current_bytes -= entry.size();
            entry.payload = owned;
            self.current_bytes += size;
            self.entries.promote(slot);

            // The update may have grown past the budget; shrink back.
            self.evict_to_fit(0);
            self.stats.record_insertion();
            info!(
                "cache update: {} ({} bytes, {} total)",
                key, size, self.current_bytes
            );
            return;
        }

        self.evict_to_fit(size);

        let slot = self.entries.insert_front(CacheEntry::new(key, owned));
        self.index.insert(key.to_string(), slot);
        self.current_bytes += size;
        self.stats.record_insertion();
        info!(
            "cache insert: {} ({} bytes, {} total)",
            key, size, self.current_bytes
        );
    }

    // == Eviction ==
    /// Evicts tail entries until `incoming` more bytes fit the total budget
    /// or the store is empty. The tail is always the unique victim.
    fn evict_to_fit(&mut self, incoming: usize) {
        while self.current_bytes + incoming > self.max_total_bytes && !self.entries.is_empty() {
            let evicted = self.entries.pop_back().expect("non-empty list has a tail");
            self.index.remove(&evicted.key);
            self.current_bytes -= evicted.size();
            self.stats.record_eviction();
            info!("cache evict: {} ({} bytes)", evicted.key, evicted.size());
        }
    }

    // == Clear ==
    /// Releases every entry and resets the byte counter.
    pub fn clear(&mut self) {
        self.index.clear();
        self.entries.clear();
        self.current_bytes = 0;
    }

    // == Accessors ==
    /// Current number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of payload sizes over all live entries.
    pub fn current_bytes(&self) -> usize {
        self.current_bytes
    }

    /// Total byte budget.
    pub fn max_total_bytes(&self) -> usize {
        self.max_total_bytes
    }

    /// Largest admissible single payload.
    pub fn max_entry_bytes(&self) -> usize {
        self.max_entry_bytes
    }

    /// Key of the most-recently-used entry.
    pub fn head_key(&self) -> Option<&str> {
        self.entries.head().and_then(|slot| self.entries.get(slot)).map(|e| e.key.as_str())
    }

    /// Key of the least-recently-used entry (the next eviction victim).
    pub fn tail_key(&self) -> Option<&str> {
        self.entries
            .peek_back()
            .and_then(|slot| self.entries.get(slot))
            .map(|e| e.key.as_str())
    }

    /// All live keys in recency order, most recent first.
    pub fn recency_keys(&self) -> Vec<&str> {
        self.entries.keys()
    }

    /// Performance counters.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

#[cfg(test)]
impl CacheStore {
    /// Number of keys in the hash index, for index/sequence agreement checks.
    pub(crate) fn index_len(&self) -> usize {
        self.index.len()
    }
}
