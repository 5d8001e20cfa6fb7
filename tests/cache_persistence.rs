//! Durable entries survive a restart through `preload`.

use analytica_cache::{CacheConfig, CacheEngine, Priority, SetOptions};
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;

fn persistent_cache(dir: &Path) -> CacheEngine<serde_json::Value> {
    CacheEngine::new(
        CacheConfig::builder()
            .name("durable")
            .default_ttl(Duration::from_secs(120))
            .cleanup_interval(None)
            .persist_dir(dir)
            .persistent_namespace("research")
            .build(),
    )
}

#[tokio::test]
async fn preload_restores_namespace_priority_and_tags() {
    let dir = tempfile::tempdir().unwrap();

    let first = persistent_cache(dir.path());
    first.set(
        "research",
        "question-1",
        json!({"sources": 3}),
        SetOptions::new()
            .ttl(Duration::from_secs(90))
            .priority(Priority::High)
            .tags(["research", "batch-1"]),
    );
    first.set(
        "research",
        "question-2",
        json!({"sources": 5}),
        SetOptions::new().priority(Priority::Critical).tag("batch-1"),
    );
    // Durable writes are asynchronous best-effort.
    sleep(Duration::from_millis(150)).await;
    drop(first);

    let restarted = persistent_cache(dir.path());
    assert_eq!(restarted.preload().await, 2);
    assert_eq!(
        restarted.get("research", "question-1").unwrap()["sources"],
        3
    );
    let stats = restarted.stats("research").unwrap();
    assert_eq!(stats.size, 2);
    assert_eq!(stats.priority_counts[Priority::High as usize], 1);
    assert_eq!(stats.priority_counts[Priority::Critical as usize], 1);
    // Tag index is rebuilt too.
    assert_eq!(restarted.invalidate_by_tags(&["batch-1"]), 2);
}

#[tokio::test]
async fn non_persistent_namespaces_leave_no_files() {
    let dir = tempfile::tempdir().unwrap();
    let cache = persistent_cache(dir.path());
    cache.set("scratch", "k", json!(1), SetOptions::new());
    sleep(Duration::from_millis(100)).await;

    let restarted = persistent_cache(dir.path());
    assert_eq!(restarted.preload().await, 0);
    assert_eq!(restarted.get("scratch", "k"), None);
}

#[tokio::test]
async fn removal_deletes_the_durable_file() {
    let dir = tempfile::tempdir().unwrap();
    let cache = persistent_cache(dir.path());
    cache.set("research", "gone", json!(1), SetOptions::new());
    sleep(Duration::from_millis(100)).await;
    assert!(cache.remove("research", "gone"));
    sleep(Duration::from_millis(100)).await;

    let restarted = persistent_cache(dir.path());
    assert_eq!(restarted.preload().await, 0);
}

#[tokio::test]
async fn expired_files_are_discarded_on_preload() {
    let dir = tempfile::tempdir().unwrap();
    let cache = persistent_cache(dir.path());
    cache.set(
        "research",
        "shortlived",
        json!(1),
        SetOptions::new().ttl(Duration::from_millis(50)),
    );
    sleep(Duration::from_millis(150)).await;

    let restarted = persistent_cache(dir.path());
    assert_eq!(restarted.preload().await, 0);
    assert_eq!(restarted.get("research", "shortlived"), None);
}
