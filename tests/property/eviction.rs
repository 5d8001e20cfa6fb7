use analytica_cache::{CacheConfig, CacheEngine, Priority, SetOptions};
use proptest::prelude::*;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn priority_strategy() -> impl Strategy<Value = Priority> {
    prop_oneof![
        Just(Priority::Low),
        Just(Priority::Medium),
        Just(Priority::High),
        Just(Priority::Critical),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// With insert-only workloads, every entry that survives size pressure
    /// ranks at least as high as every entry that was evicted for it.
    #[test]
    fn remaining_entries_outrank_evicted_ones(
        priorities in proptest::collection::vec(priority_strategy(), 1..40),
        max_size in 1usize..8,
    ) {
        let evicted = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = Arc::clone(&evicted);
        let cache: CacheEngine<u32> = CacheEngine::new(
            CacheConfig::builder()
                .name("prop-eviction")
                .max_size(max_size)
                .default_ttl(Duration::from_secs(600))
                .cleanup_interval(None)
                .on_eviction(move |_ns, key| sink.lock().unwrap().push(key.to_string()))
                .build(),
        );

        let keyed: Vec<(String, Priority)> = priorities
            .iter()
            .enumerate()
            .map(|(i, p)| (format!("k{i}"), *p))
            .collect();
        for (key, priority) in &keyed {
            cache.set("ns", key, 0, SetOptions::new().priority(*priority));
        }

        let lookup: std::collections::HashMap<&str, Priority> =
            keyed.iter().map(|(k, p)| (k.as_str(), *p)).collect();
        let evicted = evicted.lock().unwrap();
        let max_evicted = evicted.iter().map(|k| lookup[k.as_str()]).max();
        if let Some(max_evicted) = max_evicted {
            for (key, priority) in &keyed {
                if cache.has("ns", key) {
                    prop_assert!(
                        *priority >= max_evicted,
                        "remaining {key} ({priority:?}) outranked by evicted ({max_evicted:?})"
                    );
                }
            }
        }
        prop_assert!(cache.len() <= max_size);
    }
}
