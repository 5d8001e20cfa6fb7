//! Key rotation when a provider reports rate limits.

use analytica_core::{AnalyticalError, ErrorCode};
use analytica_ratelimit::{ExecuteOptions, RateLimitManager};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn manager_with_keys(keys: &[&str]) -> Arc<RateLimitManager> {
    let manager = Arc::new(RateLimitManager::builder().name("rotation-test").build());
    manager.register_keys("prov", keys.iter().map(|k| k.to_string()));
    manager
}

#[tokio::test]
async fn rate_limited_key_rotates_to_the_next() {
    let manager = manager_with_keys(&["k1", "k2"]);
    let seen = Arc::new(Mutex::new(Vec::<String>::new()));
    let recorder = Arc::clone(&seen);

    let opts = ExecuteOptions::new("prov", "search")
        .rotate_keys_on_rate_limit(true)
        .initial_delay(Duration::from_millis(1));
    let result = manager
        .execute(&opts, move |key| {
            let recorder = Arc::clone(&recorder);
            async move {
                recorder.lock().unwrap().push(key.clone());
                if key == "k1" {
                    Err(AnalyticalError::new(ErrorCode::ApiRateLimit, "429 from provider"))
                } else {
                    Ok(format!("ok via {key}"))
                }
            }
        })
        .await
        .unwrap();

    assert_eq!(result, "ok via k2");
    assert_eq!(*seen.lock().unwrap(), vec!["k1".to_string(), "k2".to_string()]);
    assert_eq!(manager.stats().key_rotations, 1);
}

#[tokio::test]
async fn cooled_key_is_skipped_on_subsequent_calls() {
    let manager = manager_with_keys(&["k1", "k2"]);
    let opts = ExecuteOptions::new("prov", "search")
        .rotate_keys_on_rate_limit(true)
        .initial_delay(Duration::from_millis(1));
    let _ = manager
        .execute(&opts, |key| async move {
            if key == "k1" {
                Err(AnalyticalError::new(ErrorCode::ApiRateLimit, "limited"))
            } else {
                Ok(key)
            }
        })
        .await
        .unwrap();

    // k1 is cooling down; the next call goes straight to k2.
    let key = manager
        .execute(&opts, |key| async move { Ok(key) })
        .await
        .unwrap();
    assert_eq!(key, "k2");
}

#[tokio::test]
async fn without_rotation_no_key_enters_cooldown() {
    let manager = manager_with_keys(&["k1", "k2"]);

    let opts = ExecuteOptions::new("prov", "search")
        .rotate_keys_on_rate_limit(false)
        .max_retries(1)
        .initial_delay(std::time::Duration::from_millis(1));
    let err = manager
        .execute(&opts, |_key| async move {
            Err::<(), _>(AnalyticalError::new(ErrorCode::ApiRateLimit, "limited"))
        })
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::ApiRateLimit);
    assert_eq!(manager.stats().key_rotations, 0);
    // Both keys stayed available: the least-recently-used one serves next.
    let key = manager
        .execute(&opts, |key| async move { Ok(key) })
        .await
        .unwrap();
    assert_eq!(key, "k1");
}
