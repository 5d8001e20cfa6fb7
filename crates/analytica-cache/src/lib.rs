//! Multi-tier cache engine for the analytica tool server.
//!
//! One engine holds many **namespaces**; a key is unique only within its
//! namespace, and every namespace keeps independent statistics. Entries
//! carry a TTL, a priority (`Low` .. `Critical`), a frozen tag set, and
//! optionally a refresh callback and a semantic fingerprint.
//!
//! - **Expiry**: a `get` at or past `creation + ttl` removes the entry and
//!   reports a miss; a periodic sweeper does the same in the background.
//! - **Eviction**: size pressure removes the minimum-priority entry, ties
//!   broken by oldest last access. `Critical` entries are never evicted to
//!   admit new data; when only protected victims remain the incoming `set`
//!   is dropped silently.
//! - **Stale-while-revalidate**: a `get` past the refresh threshold returns
//!   the current value immediately and runs the entry's callback in the
//!   background, single-flighted per key.
//! - **Tags**: `get_by_tags` / `invalidate_by_tags` operate with OR
//!   semantics across the given tags.
//! - **Fingerprints**: `find_similar` returns entries whose
//!   [`SemanticFingerprint`] similarity passes a caller-supplied threshold.
//! - **Persistence**: namespaces marked persistent write one file per entry
//!   (best-effort, asynchronous); `preload` restores whatever is still
//!   valid after a restart.
//!
//! Cache operations never propagate internal failures to callers; they
//! degrade to misses and record the incident.
//!
//! ```
//! use analytica_cache::{CacheConfig, CacheEngine, Priority, SetOptions};
//! use std::time::Duration;
//!
//! let cache: CacheEngine<String> = CacheEngine::new(
//!     CacheConfig::builder()
//!         .name("docs")
//!         .max_size(100)
//!         .default_ttl(Duration::from_secs(60))
//!         .build(),
//! );
//!
//! cache.set(
//!     "reports",
//!     "q3",
//!     "ready".to_string(),
//!     SetOptions::new().priority(Priority::High).tag("quarterly"),
//! );
//! assert_eq!(cache.get("reports", "q3"), Some("ready".to_string()));
//! assert_eq!(cache.invalidate_by_tags(&["quarterly"]), 1);
//! assert_eq!(cache.get("reports", "q3"), None);
//! ```

mod config;
mod engine;
mod entry;
mod events;
mod fingerprint;
mod persist;
mod stats;

pub use config::{CacheConfig, CacheConfigBuilder};
pub use engine::{CacheEngine, SimilarEntry, TaggedEntry};
pub use entry::{Priority, RefreshFn, SetOptions};
pub use events::{CacheEvent, EvictionReason};
pub use fingerprint::{ScalarKind, SemanticFingerprint, TypeHistogram};
pub use stats::CacheStats;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::sleep;

    fn engine(max_size: usize) -> CacheEngine<String> {
        CacheEngine::new(
            CacheConfig::builder()
                .name("test")
                .max_size(max_size)
                .default_ttl(Duration::from_secs(60))
                .cleanup_interval(None)
                .build(),
        )
    }

    #[test]
    fn set_then_get_round_trips() {
        let cache = engine(10);
        cache.set("ns", "k", "v".into(), SetOptions::new());
        assert_eq!(cache.get("ns", "k"), Some("v".into()));
        assert!(cache.has("ns", "k"));
    }

    #[test]
    fn namespaces_do_not_collide() {
        let cache = engine(10);
        cache.set("a", "k", "va".into(), SetOptions::new());
        cache.set("b", "k", "vb".into(), SetOptions::new());
        assert_eq!(cache.get("a", "k"), Some("va".into()));
        assert_eq!(cache.get("b", "k"), Some("vb".into()));
        cache.clear_namespace("a");
        assert_eq!(cache.get("a", "k"), None);
        assert_eq!(cache.get("b", "k"), Some("vb".into()));
    }

    #[test]
    fn expired_entries_miss_and_are_removed() {
        let cache = engine(10);
        cache.set(
            "ns",
            "k",
            "v".into(),
            SetOptions::new().ttl(Duration::from_millis(20)),
        );
        assert_eq!(cache.get("ns", "k"), Some("v".into()));
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.get("ns", "k"), None);
        // Idempotent: a second get after expiry is a plain miss.
        assert_eq!(cache.get("ns", "k"), None);
        let stats = cache.stats("ns").unwrap();
        assert_eq!(stats.size, 0);
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.misses, 2);
    }

    #[test]
    fn eviction_prefers_low_priority_then_oldest_access() {
        let cache = engine(3);
        cache.set("ns", "k1", "a".into(), SetOptions::new().priority(Priority::Low));
        cache.set("ns", "k2", "b".into(), SetOptions::new().priority(Priority::Medium));
        cache.set("ns", "k3", "c".into(), SetOptions::new().priority(Priority::High));
        cache.set("ns", "k4", "d".into(), SetOptions::new().priority(Priority::Critical));
        assert_eq!(cache.get("ns", "k1"), None);
        assert_eq!(cache.get("ns", "k2"), Some("b".into()));
        assert_eq!(cache.get("ns", "k3"), Some("c".into()));
        assert_eq!(cache.get("ns", "k4"), Some("d".into()));
    }

    #[test]
    fn critical_entries_block_admission_when_full() {
        let cache = engine(2);
        cache.set("ns", "c1", "x".into(), SetOptions::new().priority(Priority::Critical));
        cache.set("ns", "c2", "y".into(), SetOptions::new().priority(Priority::Critical));
        cache.set("ns", "new", "z".into(), SetOptions::new().priority(Priority::High));
        assert_eq!(cache.get("ns", "new"), None);
        assert_eq!(cache.get("ns", "c1"), Some("x".into()));
        assert_eq!(cache.get("ns", "c2"), Some("y".into()));
        assert_eq!(cache.stats("ns").unwrap().rejected_sets, 1);
    }

    #[test]
    fn lower_priority_set_cannot_displace_higher() {
        let cache = engine(1);
        cache.set("ns", "high", "x".into(), SetOptions::new().priority(Priority::High));
        cache.set("ns", "low", "y".into(), SetOptions::new().priority(Priority::Low));
        assert_eq!(cache.get("ns", "high"), Some("x".into()));
        assert_eq!(cache.get("ns", "low"), None);
    }

    #[test]
    fn replacing_a_key_does_not_evict() {
        let cache = engine(2);
        cache.set("ns", "a", "1".into(), SetOptions::new());
        cache.set("ns", "b", "2".into(), SetOptions::new());
        cache.set("ns", "a", "3".into(), SetOptions::new());
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("ns", "a"), Some("3".into()));
        assert_eq!(cache.get("ns", "b"), Some("2".into()));
    }

    #[test]
    fn tag_invalidation_is_or_across_tags() {
        let cache = engine(10);
        cache.set("ns", "a", "1".into(), SetOptions::new().tags(["user", "profile"]));
        cache.set("ns", "b", "2".into(), SetOptions::new().tags(["user", "admin"]));
        cache.set("ns", "c", "3".into(), SetOptions::new().tag("post"));
        assert_eq!(cache.get_by_tags(&["user"]).len(), 2);
        assert_eq!(cache.invalidate_by_tags(&["user"]), 2);
        assert_eq!(cache.get("ns", "a"), None);
        assert_eq!(cache.get("ns", "b"), None);
        assert_eq!(cache.get("ns", "c"), Some("3".into()));
    }

    #[test]
    fn find_similar_filters_by_threshold() {
        let cache = engine(10);
        let base = SemanticFingerprint::for_text("the quick brown fox jumps over the lazy dog");
        cache.set(
            "ns",
            "close",
            "1".into(),
            SetOptions::new()
                .fingerprint(SemanticFingerprint::for_text("the quick brown fox sits by the lazy dog")),
        );
        cache.set(
            "ns",
            "far",
            "2".into(),
            SetOptions::new().fingerprint(SemanticFingerprint::for_text(
                "x ".repeat(400).as_str(),
            )),
        );
        let matches = cache.find_similar("ns", &base, 0.9);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].key, "close");
        assert!(matches[0].similarity >= 0.9);
    }

    #[test]
    fn sweep_removes_expired_entries() {
        let cache = engine(10);
        cache.set("ns", "short", "1".into(), SetOptions::new().ttl(Duration::from_millis(10)));
        cache.set("ns", "long", "2".into(), SetOptions::new().ttl(Duration::from_secs(60)));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats("ns").unwrap().evictions, 1);
    }

    #[tokio::test]
    async fn background_refresh_returns_stale_then_updates() {
        let cache: CacheEngine<String> = CacheEngine::new(
            CacheConfig::builder()
                .name("swr")
                .default_ttl(Duration::from_millis(1000))
                .refresh_threshold(0.5)
                .cleanup_interval(None)
                .build(),
        );
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        cache.set(
            "r",
            "q",
            "v1".into(),
            SetOptions::new().refresh(move || {
                let counter = Arc::clone(&counter);
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok("v2".to_string())
                })
            }),
        );

        sleep(Duration::from_millis(600)).await;
        // Stale value is returned immediately; the refresh runs behind it.
        assert_eq!(cache.get("r", "q"), Some("v1".into()));
        sleep(Duration::from_millis(200)).await;
        assert_eq!(cache.get("r", "q"), Some("v2".into()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refresh_is_single_flighted_per_key() {
        let cache: CacheEngine<String> = CacheEngine::new(
            CacheConfig::builder()
                .name("swr")
                .default_ttl(Duration::from_millis(500))
                .refresh_threshold(0.1)
                .cleanup_interval(None)
                .build(),
        );
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        cache.set(
            "r",
            "q",
            "v1".into(),
            SetOptions::new().refresh(move || {
                let counter = Arc::clone(&counter);
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    sleep(Duration::from_millis(100)).await;
                    Ok("v2".to_string())
                })
            }),
        );
        sleep(Duration::from_millis(100)).await;
        for _ in 0..10 {
            let _ = cache.get("r", "q");
        }
        sleep(Duration::from_millis(200)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_stale_entry() {
        let cache: CacheEngine<String> = CacheEngine::new(
            CacheConfig::builder()
                .name("swr")
                .default_ttl(Duration::from_millis(1000))
                .refresh_threshold(0.1)
                .cleanup_interval(None)
                .build(),
        );
        cache.set(
            "r",
            "q",
            "v1".into(),
            SetOptions::new().refresh(|| {
                Box::pin(async {
                    Err(analytica_core::AnalyticalError::new(
                        analytica_core::ErrorCode::ApiServiceUnavailable,
                        "upstream down",
                    ))
                })
            }),
        );
        sleep(Duration::from_millis(150)).await;
        assert_eq!(cache.get("r", "q"), Some("v1".into()));
        sleep(Duration::from_millis(100)).await;
        assert_eq!(cache.get("r", "q"), Some("v1".into()));
        assert!(cache.stats("r").unwrap().refresh_failures >= 1);
    }

    #[tokio::test]
    async fn persistence_round_trips_through_preload() {
        let dir = tempfile::tempdir().unwrap();
        let build = |persist: bool| {
            let mut builder = CacheConfig::builder()
                .name("persist")
                .default_ttl(Duration::from_secs(60))
                .cleanup_interval(None);
            if persist {
                builder = builder
                    .persist_dir(dir.path())
                    .persistent_namespace("research");
            }
            CacheEngine::<serde_json::Value>::new(builder.build())
        };

        let cache = build(true);
        cache.set(
            "research",
            "query-1",
            serde_json::json!({"answer": 42}),
            SetOptions::new()
                .priority(Priority::High)
                .tags(["research", "q1"]),
        );
        // Writes are asynchronous; give them a beat.
        sleep(Duration::from_millis(100)).await;

        let restored = build(true);
        assert_eq!(restored.preload().await, 1);
        let value = restored.get("research", "query-1").unwrap();
        assert_eq!(value["answer"], 42);
        let reloaded = restored.get_by_tags(&["q1"]);
        assert_eq!(reloaded.len(), 1);
    }

    #[tokio::test]
    async fn preload_skips_malformed_and_expired_files() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("cache_ns_deadbeef.json"), b"{broken")
            .await
            .unwrap();
        let expired = serde_json::json!({
            "data": "old",
            "timestamp": 1000,
            "ttl": 1,
            "priority": 1,
            "tags": [],
            "namespace": "ns",
            "key": "old"
        });
        tokio::fs::write(
            dir.path().join("cache_ns_00ff.json"),
            serde_json::to_vec(&expired).unwrap(),
        )
        .await
        .unwrap();

        let cache = CacheEngine::<serde_json::Value>::new(
            CacheConfig::builder()
                .name("persist")
                .persist_dir(dir.path())
                .cleanup_interval(None)
                .build(),
        );
        assert_eq!(cache.preload().await, 0);
        assert!(cache.is_empty());
    }
}
