//! Cache Module
//!
//! In-memory response cache: a byte-budgeted LRU store behind a
//! reader/writer lock. Lookups return owned copies of the cached bytes;
//! inserts evict from the least-recently-used tail until the new entry fits.

mod entry;
mod lru;
mod shared;
mod stats;
mod store;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use entry::CacheEntry;
pub use lru::EntryList;
pub use shared::SharedCache;
pub use stats::{CacheStats, StatsSnapshot};
pub use store::CacheStore;
