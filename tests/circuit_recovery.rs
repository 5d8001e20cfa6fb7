//! Circuit breaker: opening, fast rejection, half-open probing, recovery.

use analytica_core::{AnalyticalError, ErrorCode, RecoveryTable};
use analytica_resilience::{CircuitState, Resilience};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

fn guard() -> Resilience {
    // Auth failures are non-recoverable, so each execute records exactly one
    // circuit failure.
    Resilience::builder()
        .name("recovery-test")
        .failure_threshold(3)
        .reset_timeout(Duration::from_millis(1000))
        .success_threshold(2)
        .recovery(Arc::new(RecoveryTable::standard()))
        .build()
}

async fn fail_once(guard: &Resilience) {
    let _ = guard
        .execute(|| async { Err::<(), _>(AnalyticalError::new(ErrorCode::ApiAuthFailed, "no")) })
        .await;
}

#[tokio::test]
async fn opens_after_threshold_and_recovers_through_half_open() {
    let guard = guard();

    for _ in 0..3 {
        fail_once(&guard).await;
    }
    assert_eq!(guard.state(), CircuitState::Open);

    // Open circuit rejects without invoking the callable.
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let err = guard
        .execute(|| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ApiServiceUnavailable);
    assert_eq!(err.context()["circuitOpen"], true);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(guard.metrics().rejected, 1);

    // After the reset timeout the breaker probes.
    sleep(Duration::from_millis(1050)).await;
    assert!(guard.execute(|| async { Ok(1u32) }).await.is_ok());
    assert_eq!(guard.state(), CircuitState::HalfOpen);
    assert!(guard.execute(|| async { Ok(2u32) }).await.is_ok());
    assert_eq!(guard.state(), CircuitState::Closed);
}

#[tokio::test]
async fn half_open_failure_reopens_immediately() {
    let guard = Resilience::builder()
        .name("reopen-test")
        .failure_threshold(1)
        .reset_timeout(Duration::from_millis(100))
        .success_threshold(2)
        .build();

    fail_once(&guard).await;
    assert_eq!(guard.state(), CircuitState::Open);
    sleep(Duration::from_millis(150)).await;

    fail_once(&guard).await;
    assert_eq!(guard.state(), CircuitState::Open);
}

#[tokio::test]
async fn failures_outside_monitoring_window_do_not_trip() {
    let guard = Resilience::builder()
        .name("window-test")
        .failure_threshold(2)
        .monitoring_window(Duration::from_millis(100))
        .build();

    fail_once(&guard).await;
    sleep(Duration::from_millis(150)).await;
    fail_once(&guard).await;
    // The first failure aged out of the window before the second landed.
    assert_eq!(guard.state(), CircuitState::Closed);
}
