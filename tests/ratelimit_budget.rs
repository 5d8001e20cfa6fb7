//! Sliding-window endpoint budgets: admission, suspension, fairness.

use analytica_ratelimit::{ExecuteOptions, RateLimitManager};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn manager() -> Arc<RateLimitManager> {
    let manager = Arc::new(RateLimitManager::builder().name("budget-test").build());
    manager.register_keys("prov", vec!["k1".into()]);
    manager
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn third_caller_waits_for_the_window() {
    let manager = manager();
    manager.configure_endpoint("search", 2, Duration::from_millis(1000));
    let started = Instant::now();

    let mut handles = Vec::new();
    for _ in 0..3 {
        let manager = Arc::clone(&manager);
        handles.push(tokio::spawn(async move {
            let opts = ExecuteOptions::new("prov", "search");
            manager
                .execute(&opts, |_key| async move { Ok(Instant::now()) })
                .await
                .unwrap()
        }));
    }

    let mut admitted: Vec<Duration> = Vec::new();
    for handle in handles {
        admitted.push(handle.await.unwrap().duration_since(started));
    }
    admitted.sort();

    // Two proceed immediately, the third suspends until the window slides.
    assert!(admitted[0] < Duration::from_millis(250), "{admitted:?}");
    assert!(admitted[1] < Duration::from_millis(250), "{admitted:?}");
    assert!(admitted[2] >= Duration::from_millis(950), "{admitted:?}");
    // No call is dropped.
    assert_eq!(admitted.len(), 3);
}

#[tokio::test]
async fn window_usage_never_exceeds_the_limit() {
    let manager = manager();
    manager.configure_endpoint("probe", 3, Duration::from_millis(200));
    for _ in 0..10 {
        let opts = ExecuteOptions::new("prov", "probe");
        manager
            .execute(&opts, |_key| async move { Ok(()) })
            .await
            .unwrap();
        let usage = manager.endpoint_usage("probe").unwrap();
        assert!(usage <= 3, "in-window usage {usage} exceeded the budget");
    }
}

#[tokio::test]
async fn unconfigured_endpoints_are_unrestricted() {
    let manager = manager();
    let started = Instant::now();
    for _ in 0..20 {
        let opts = ExecuteOptions::new("prov", "free-for-all");
        manager
            .execute(&opts, |_key| async move { Ok(()) })
            .await
            .unwrap();
    }
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn distinct_endpoints_do_not_block_each_other() {
    let manager = manager();
    manager.configure_endpoint("slow", 1, Duration::from_secs(5));
    manager.configure_endpoint("fast", 100, Duration::from_secs(1));

    // Exhaust the slow endpoint.
    let opts = ExecuteOptions::new("prov", "slow");
    manager.execute(&opts, |_k| async move { Ok(()) }).await.unwrap();

    // A waiter parks on "slow"...
    let blocked = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            let opts = ExecuteOptions::new("prov", "slow");
            manager.execute(&opts, |_k| async move { Ok(()) }).await
        })
    };

    // ...while "fast" remains immediately usable.
    let started = Instant::now();
    let opts = ExecuteOptions::new("prov", "fast");
    manager.execute(&opts, |_k| async move { Ok(()) }).await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(200));

    blocked.abort();
}
