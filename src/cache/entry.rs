//! Cache Entry Module
//!
//! Defines the structure for individual cached responses.

// == Slot Index ==
/// Index of an entry's slot in the arena backing the recency list.
pub type SlotIndex = usize;

// == Cache Entry ==
/// A single cached response, owned exclusively by the store.
///
/// The entry carries its key exactly once; the store's index maps the same
/// key string to the entry's arena slot. `prev`/`next` are slot indices into
/// the recency list rather than pointers, which keeps the entry addressable
/// both by key and by recency position without any aliasing.
#[derive(Debug)]
pub struct CacheEntry {
    /// Fingerprint this response was stored under
    pub key: String,
    /// The response bytes, immutable except for whole-payload replacement
    pub payload: Vec<u8>,
    /// Slot of the next-more-recent entry, None when this entry is the head
    pub prev: Option<SlotIndex>,
    /// Slot of the next-less-recent entry, None when this entry is the tail
    pub next: Option<SlotIndex>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a detached entry holding an owned copy of `payload`.
    pub fn new(key: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            payload,
            prev: None,
            next: None,
        }
    }

    // == Size ==
    /// Byte length of the stored payload.
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}
