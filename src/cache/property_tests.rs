//! Property-Based Tests for the Cache Module
//!
//! Uses proptest to verify the store's structural guarantees over arbitrary
//! operation sequences, plus concurrency checks over the shared handle.

use proptest::prelude::*;
use std::collections::{HashMap, VecDeque};

use crate::cache::{CacheStore, SharedCache};

// == Test Configuration ==
const TEST_MAX_TOTAL: usize = 100;
const TEST_MAX_ENTRY: usize = 40;

fn test_store() -> CacheStore {
    CacheStore::new(TEST_MAX_TOTAL, TEST_MAX_ENTRY).unwrap()
}

// == Strategies ==
/// Generates cache keys from a small alphabet so operations collide often.
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-f]{1,3}".prop_map(|s| s)
}

/// Generates payloads within the per-entry cap.
fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..=TEST_MAX_ENTRY)
}

/// A single cache operation for sequence testing.
#[derive(Debug, Clone)]
enum CacheOp {
    Insert { key: String, payload: Vec<u8> },
    Lookup { key: String },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        (key_strategy(), payload_strategy())
            .prop_map(|(key, payload)| CacheOp::Insert { key, payload }),
        key_strategy().prop_map(|key| CacheOp::Lookup { key }),
    ]
}

// == Structural Invariants ==
/// Checks the store against a shadow map of the payloads it should hold:
/// byte counter equals the payload sum, the total budget holds, the index
/// and the recency sequence agree, and no key appears twice.
fn assert_invariants(store: &CacheStore, shadow: &HashMap<String, Vec<u8>>) {
    let live = store.recency_keys();

    let mut seen = std::collections::HashSet::new();
    for key in &live {
        assert!(seen.insert(*key), "key {} appears twice in sequence", key);
        assert!(store.contains(key), "sequence key {} missing from index", key);
    }
    assert_eq!(store.index_len(), live.len(), "index and sequence disagree");
    assert_eq!(store.len(), live.len());

    let expected_bytes: usize = live
        .iter()
        .map(|key| shadow.get(*key).map(Vec::len).unwrap_or(0))
        .sum();
    assert_eq!(store.current_bytes(), expected_bytes, "byte counter drifted");
    assert!(
        store.current_bytes() <= TEST_MAX_TOTAL,
        "total budget exceeded at quiescence"
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    // For any sequence of inserts and lookups, the byte counter equals the
    // sum of live payload sizes, the total budget holds at every quiescent
    // point, and the index and recency sequence agree on membership.
    #[test]
    fn prop_accounting_and_agreement(ops in prop::collection::vec(cache_op_strategy(), 1..80)) {
        let mut store = test_store();
        // Shadow of the last admissible payload per key; eviction is read
        // back from the store itself.
        let mut shadow: HashMap<String, Vec<u8>> = HashMap::new();

        for op in ops {
            match op {
                CacheOp::Insert { key, payload } => {
                    store.insert(&key, &payload);
                    if !payload.is_empty() && payload.len() <= TEST_MAX_ENTRY {
                        shadow.insert(key, payload);
                    }
                }
                CacheOp::Lookup { key } => {
                    let _ = store.get(&key);
                }
            }
            assert_invariants(&store, &shadow);
        }
    }

    // A successful lookup leaves its key at the head of the recency sequence.
    #[test]
    fn prop_hit_makes_mru(
        ops in prop::collection::vec(cache_op_strategy(), 0..40),
        key in key_strategy(),
        payload in payload_strategy()
    ) {
        let mut store = test_store();
        for op in ops {
            match op {
                CacheOp::Insert { key, payload } => store.insert(&key, &payload),
                CacheOp::Lookup { key } => { let _ = store.get(&key); }
            }
        }
        store.insert(&key, &payload);

        if store.get(&key).is_some() {
            prop_assert_eq!(store.head_key(), Some(key.as_str()));
        }
    }

    // A successful insert leaves its key at the head of the recency sequence.
    #[test]
    fn prop_insert_makes_mru(
        ops in prop::collection::vec(cache_op_strategy(), 0..40),
        key in key_strategy(),
        payload in payload_strategy()
    ) {
        let mut store = test_store();
        for op in ops {
            match op {
                CacheOp::Insert { key, payload } => store.insert(&key, &payload),
                CacheOp::Lookup { key } => { let _ = store.get(&key); }
            }
        }

        store.insert(&key, &payload);
        prop_assert_eq!(store.head_key(), Some(key.as_str()));
    }

    // With distinct keys and no intervening reads, the survivors of a series
    // of inserts are exactly the suffix of the insertion order that fits the
    // budget; the earliest inserts are evicted first.
    #[test]
    fn prop_eviction_takes_insertion_order_suffix(
        sizes in prop::collection::vec(1..=TEST_MAX_ENTRY, 2..12)
    ) {
        let mut store = test_store();

        // Reference model: a queue evicted strictly from the front.
        let mut model: VecDeque<(String, usize)> = VecDeque::new();
        let mut model_bytes = 0usize;

        for (i, &size) in sizes.iter().enumerate() {
            let key = format!("key{}", i);
            store.insert(&key, &vec![i as u8; size]);

            while model_bytes + size > TEST_MAX_TOTAL {
                let (_, freed) = model.pop_front().expect("model emptied before fitting");
                model_bytes -= freed;
            }
            model.push_back((key, size));
            model_bytes += size;
        }

        let expected: Vec<&str> = model.iter().rev().map(|(k, _)| k.as_str()).collect();
        prop_assert_eq!(store.recency_keys(), expected);
        prop_assert_eq!(store.current_bytes(), model_bytes);
    }

    // A lookup returns exactly the bytes most recently inserted for the key.
    #[test]
    fn prop_lookup_returns_last_inserted(
        key in key_strategy(),
        first in payload_strategy(),
        second in payload_strategy()
    ) {
        let mut store = test_store();

        store.insert(&key, &first);
        store.insert(&key, &second);

        prop_assert_eq!(store.get(&key), Some(second));
    }

    // Mutating the buffer a lookup returned does not affect later lookups.
    #[test]
    fn prop_copy_out_isolation(key in key_strategy(), payload in payload_strategy()) {
        let mut store = test_store();
        store.insert(&key, &payload);

        let mut copy = store.get(&key).unwrap();
        for byte in copy.iter_mut() {
            *byte = byte.wrapping_add(1);
        }
        drop(copy);

        prop_assert_eq!(store.get(&key), Some(payload));
    }

    // An insert above the per-entry cap leaves the store unchanged.
    #[test]
    fn prop_oversize_insert_is_noop(
        ops in prop::collection::vec(cache_op_strategy(), 0..30),
        key in key_strategy(),
        excess in 1..64usize
    ) {
        let mut store = test_store();
        for op in ops {
            match op {
                CacheOp::Insert { key, payload } => store.insert(&key, &payload),
                CacheOp::Lookup { key } => { let _ = store.get(&key); }
            }
        }

        let keys_before: Vec<String> =
            store.recency_keys().into_iter().map(String::from).collect();
        let bytes_before = store.current_bytes();

        store.insert(&key, &vec![0u8; TEST_MAX_ENTRY + excess]);

        prop_assert_eq!(
            store.recency_keys().into_iter().map(String::from).collect::<Vec<_>>(),
            keys_before
        );
        prop_assert_eq!(store.current_bytes(), bytes_before);
    }
}

// == Concurrency Properties ==
// Random concurrent operations through the shared handle must preserve the
// structural invariants, and racing readers must never observe torn bytes.

proptest! {
    #![proptest_config(ProptestConfig::with_cases(30))]

    // Under concurrent lookups and inserts the store stays structurally
    // sound: byte accounting, budget, index/sequence agreement, and the
    // oversize no-op all hold once the tasks are drained.
    #[test]
    fn prop_concurrent_ops_preserve_invariants(
        ops in prop::collection::vec(cache_op_strategy(), 10..50)
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();

        rt.block_on(async {
            let cache = SharedCache::new(test_store());

            // Payload sizes are a pure function of the key, so racing
            // same-key inserts cannot change an entry's expected size.
            fn size_for(key: &str) -> usize {
                (key.bytes().map(usize::from).sum::<usize>() % TEST_MAX_ENTRY) + 1
            }

            let mut handles = Vec::new();
            for op in ops.clone() {
                let cache = cache.clone();
                handles.push(tokio::spawn(async move {
                    match op {
                        CacheOp::Insert { key, .. } => {
                            let payload = vec![key.len() as u8; size_for(&key)];
                            cache.insert(&key, &payload).await;
                        }
                        CacheOp::Lookup { key } => {
                            let _ = cache.lookup(&key).await;
                        }
                    }
                }));
            }
            // An oversize insert racing everything else must stay invisible.
            {
                let cache = cache.clone();
                handles.push(tokio::spawn(async move {
                    cache.insert("oversized", &[0u8; TEST_MAX_ENTRY + 1]).await;
                }));
            }
            for handle in handles {
                handle.await.expect("cache task panicked");
            }

            let live = cache.recency_keys().await;
            let mut unique = std::collections::HashSet::new();
            for key in &live {
                assert!(unique.insert(key.clone()), "duplicate key in sequence");
            }
            assert!(!unique.contains("oversized"));

            let expected_bytes: usize = live.iter().map(|k| size_for(k)).sum();
            assert_eq!(cache.current_bytes().await, expected_bytes);
            assert!(cache.current_bytes().await <= TEST_MAX_TOTAL);
            assert_eq!(cache.len().await, live.len());
        });
    }
}

// == Upgrade Race ==
#[cfg(test)]
mod race_tests {
    use super::*;

    /// Readers racing a same-key writer and eviction churn must observe the
    /// whole old payload, the whole new payload, or a miss, never a tear.
    /// The writer alternates two recognizable payloads while churn inserts
    /// force the key in and out of the store between the reader's optimistic
    /// probe and its exclusive re-probe.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_upgrade_race_returns_whole_payloads_only() {
        let cache = SharedCache::new(CacheStore::new(120, 60).unwrap());

        const OLD: [u8; 48] = [0xAA; 48];
        const NEW: [u8; 52] = [0xBB; 52];

        let writer = {
            let cache = cache.clone();
            tokio::spawn(async move {
                for round in 0..400 {
                    if round % 2 == 0 {
                        cache.insert("hot", &OLD).await;
                    } else {
                        cache.insert("hot", &NEW).await;
                    }
                    tokio::task::yield_now().await;
                }
            })
        };

        // Churn fills the small budget with other keys, evicting "hot"
        // between the reader's two lock phases.
        let churn = {
            let cache = cache.clone();
            tokio::spawn(async move {
                for round in 0..400u32 {
                    let key = format!("churn{}", round % 3);
                    cache.insert(&key, &[round as u8; 55]).await;
                    tokio::task::yield_now().await;
                }
            })
        };

        let mut readers = Vec::new();
        for _ in 0..4 {
            let cache = cache.clone();
            readers.push(tokio::spawn(async move {
                for _ in 0..400 {
                    match cache.lookup("hot").await {
                        None => {}
                        Some(payload) => {
                            let whole_old = payload[..] == OLD[..];
                            let whole_new = payload[..] == NEW[..];
                            assert!(
                                whole_old || whole_new,
                                "torn payload: {} bytes, first byte {:#x}",
                                payload.len(),
                                payload.first().copied().unwrap_or(0)
                            );
                        }
                    }
                    tokio::task::yield_now().await;
                }
            }));
        }

        writer.await.unwrap();
        churn.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
    }
}
