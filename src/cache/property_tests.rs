//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check store semantics over arbitrary operation sequences.

use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;

use crate::cache::CacheStore;

// == Test Configuration ==
const TEST_TTL: Duration = Duration::from_secs(300);

// == Strategies ==
fn valid_key_strategy() -> impl Strategy<Value = String> {
    "/api/[a-z]{1,6}:[a-zA-Z0-9_]{0,16}".prop_map(|s| s)
}

fn valid_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(|n| json!(n)),
        "[a-zA-Z0-9 ]{0,32}".prop_map(|s| json!(s)),
        prop::collection::vec(any::<u16>(), 0..8).prop_map(|v| json!(v)),
    ]
}

#[derive(Debug, Clone)]
enum CacheOp {
    Set { key: String, value: Value },
    Get { key: String },
    Delete { key: String },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        (valid_key_strategy(), valid_value_strategy())
            .prop_map(|(key, value)| CacheOp::Set { key, value }),
        valid_key_strategy().prop_map(|key| CacheOp::Get { key }),
        valid_key_strategy().prop_map(|key| CacheOp::Delete { key }),
    ]
}

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Within TTL the store behaves exactly like a map, and stats agree.
    #[test]
    fn prop_store_matches_model(ops in prop::collection::vec(cache_op_strategy(), 1..60)) {
        let mut store = CacheStore::new();
        let mut model: HashMap<String, Value> = HashMap::new();
        let mut expected_hits: u64 = 0;
        let mut expected_misses: u64 = 0;

        for op in ops {
            match op {
                CacheOp::Set { key, value } => {
                    store.set(key.clone(), value.clone(), TEST_TTL);
                    model.insert(key, value);
                }
                CacheOp::Get { key } => {
                    let got = store.get(&key);
                    prop_assert_eq!(&got, &model.get(&key).cloned());
                    if got.is_some() { expected_hits += 1 } else { expected_misses += 1 }
                }
                CacheOp::Delete { key } => {
                    prop_assert_eq!(store.delete(&key), model.remove(&key).is_some());
                }
            }
        }

        let stats = store.stats();
        prop_assert_eq!(stats.hits, expected_hits);
        prop_assert_eq!(stats.misses, expected_misses);
        prop_assert_eq!(stats.total_entries, model.len());
    }

    // Every key returned for a prefix starts with it, and no stored key with
    // that prefix is left out.
    #[test]
    fn prop_keys_by_prefix_is_exact(
        keys in prop::collection::hash_set(valid_key_strategy(), 0..30),
        prefix in "/api/[a-z]{0,2}",
    ) {
        let mut store = CacheStore::new();
        for key in &keys {
            store.set(key.clone(), json!(null), TEST_TTL);
        }

        let found = store.keys_by_prefix(&prefix);
        let expected = keys.iter().filter(|k| k.starts_with(&prefix)).count();
        prop_assert_eq!(found.len(), expected);
        prop_assert!(found.iter().all(|k| k.starts_with(&prefix)));
    }

    // Live while elapsed <= ttl, gone right after; get and has agree.
    #[test]
    fn prop_ttl_expiration_behavior(
        key in valid_key_strategy(),
        value in valid_value_strategy(),
        ttl_ms in 1u64..10_000,
    ) {
        let rt = paused_runtime();
        rt.block_on(async {
            let ttl = Duration::from_millis(ttl_ms);
            let mut store = CacheStore::new();
            store.set(key.clone(), value.clone(), ttl);

            tokio::time::advance(ttl).await;
            prop_assert!(store.has(&key));
            prop_assert_eq!(store.get(&key), Some(value));

            tokio::time::advance(Duration::from_millis(1)).await;
            prop_assert!(!store.has(&key));
            prop_assert_eq!(store.get(&key), None);
            prop_assert!(store.is_empty());
            Ok(())
        })?;
    }
}
