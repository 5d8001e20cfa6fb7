//! Resilience wrapper: jittered retry, circuit breaking and per-call
//! timeouts around external operations.
//!
//! A [`Resilience`] instance guards one named endpoint. Each
//! [`Resilience::execute`] call is:
//!
//! 1. admitted by the circuit breaker (an open circuit rejects immediately
//!    with `API_SERVICE_UNAVAILABLE` and `circuitOpen: true` context);
//! 2. bounded by the configured timeout (expiry counts as `API_TIMEOUT`);
//! 3. retried when the observed error code is recoverable, with the delay
//!    taken from the recovery table for that code (or the conservative
//!    default of 3 attempts / 500 ms / base 2 / 10 s cap / 100 ms jitter).
//!
//! Circuit rejections are never retried by this layer; they surface to the
//! caller, who may fall back to stale cache data instead.
//!
//! ## States
//! - **Closed**: calls pass through, failures within the monitoring window
//!   are counted.
//! - **Open**: calls are rejected; after the reset timeout the breaker
//!   probes in HalfOpen.
//! - **HalfOpen**: consecutive successes close the circuit, any failure
//!   reopens it.
//!
//! ```no_run
//! use analytica_resilience::Resilience;
//! use std::time::Duration;
//!
//! # async fn example() -> analytica_core::Result<()> {
//! let guard = Resilience::builder()
//!     .name("search-api")
//!     .failure_threshold(3)
//!     .reset_timeout(Duration::from_secs(10))
//!     .call_timeout(Duration::from_secs(5))
//!     .build();
//!
//! let body: String = guard
//!     .execute(|| async {
//!         // perform the network call
//!         Ok("ok".to_string())
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

use analytica_core::{AnalyticalError, ErrorCode, Result};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;
use tokio::time::{sleep, timeout};

pub use circuit::{CircuitSnapshot, CircuitState};
pub use config::{ResilienceConfig, ResilienceConfigBuilder};
pub use events::ResilienceEvent;

mod circuit;
mod config;
mod events;

use circuit::Circuit;
use events::ResilienceEvent as Event;

/// Per-instance counter snapshot plus the circuit view.
#[derive(Debug, Clone)]
pub struct ResilienceMetrics {
    pub name: String,
    pub circuit: CircuitSnapshot,
    pub total_calls: u64,
    pub successes: u64,
    pub failures: u64,
    pub rejected: u64,
    pub timeouts: u64,
    pub retries: u64,
}

#[derive(Default)]
struct Counters {
    total_calls: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    rejected: AtomicU64,
    timeouts: AtomicU64,
    retries: AtomicU64,
}

/// Guards one named operation with timeout, circuit breaker and retry.
pub struct Resilience {
    config: ResilienceConfig,
    circuit: Mutex<Circuit>,
    counters: Counters,
}

impl Resilience {
    pub fn builder() -> ResilienceConfigBuilder {
        ResilienceConfigBuilder::new()
    }

    pub(crate) fn new(config: ResilienceConfig) -> Self {
        Self {
            config,
            circuit: Mutex::new(Circuit::new()),
            counters: Counters::default(),
        }
    }

    /// Runs `f` under the breaker, the timeout and the retry policy.
    pub async fn execute<T, F, Fut>(&self, f: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            self.counters.total_calls.fetch_add(1, Ordering::Relaxed);

            let permitted = self.circuit.lock().unwrap().try_acquire(&self.config);
            if !permitted {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                self.config.listeners.emit(&Event::CallRejected {
                    name: self.config.name.clone(),
                    timestamp: Instant::now(),
                });
                #[cfg(feature = "metrics")]
                metrics::counter!("resilience_calls_total", "name" => self.config.name.clone(), "outcome" => "rejected").increment(1);
                // Rejections are not retried here; the caller decides
                // whether stale cache data can stand in.
                return Err(AnalyticalError::api(
                    ErrorCode::ApiServiceUnavailable,
                    format!("circuit '{}' is open", self.config.name),
                )
                .with_context("circuitOpen", true)
                .with_endpoint(self.config.name.clone()));
            }

            let started = Instant::now();
            let result = match timeout(self.config.call_timeout, f()).await {
                Ok(inner) => inner,
                Err(_) => {
                    self.counters.timeouts.fetch_add(1, Ordering::Relaxed);
                    self.config.listeners.emit(&Event::CallTimedOut {
                        name: self.config.name.clone(),
                        timestamp: Instant::now(),
                        timeout: self.config.call_timeout,
                    });
                    Err(AnalyticalError::api(
                        ErrorCode::ApiTimeout,
                        format!(
                            "call timed out after {} ms",
                            self.config.call_timeout.as_millis()
                        ),
                    )
                    .with_context("timeoutMs", self.config.call_timeout.as_millis() as u64)
                    .with_endpoint(self.config.name.clone()))
                }
            };
            let duration = started.elapsed();

            match result {
                Ok(value) => {
                    self.circuit.lock().unwrap().record_success(&self.config);
                    self.counters.successes.fetch_add(1, Ordering::Relaxed);
                    self.config.listeners.emit(&Event::CallSucceeded {
                        name: self.config.name.clone(),
                        timestamp: Instant::now(),
                        duration,
                    });
                    #[cfg(feature = "metrics")]
                    {
                        metrics::counter!("resilience_calls_total", "name" => self.config.name.clone(), "outcome" => "success").increment(1);
                        metrics::histogram!("resilience_call_duration_seconds", "name" => self.config.name.clone()).record(duration.as_secs_f64());
                    }
                    return Ok(value);
                }
                Err(err) => {
                    self.circuit.lock().unwrap().record_failure(&self.config);
                    self.counters.failures.fetch_add(1, Ordering::Relaxed);
                    self.config.listeners.emit(&Event::CallFailed {
                        name: self.config.name.clone(),
                        timestamp: Instant::now(),
                        duration,
                        code: err.code(),
                    });
                    #[cfg(feature = "metrics")]
                    metrics::counter!("resilience_calls_total", "name" => self.config.name.clone(), "outcome" => "failure").increment(1);

                    let Some(policy) = self.config.recovery.retry_policy_for(&err) else {
                        return Err(err);
                    };
                    if attempt + 1 >= policy.attempts {
                        return Err(err);
                    }
                    let delay = policy.delay_for(attempt);
                    self.counters.retries.fetch_add(1, Ordering::Relaxed);
                    self.config.listeners.emit(&Event::RetryScheduled {
                        name: self.config.name.clone(),
                        timestamp: Instant::now(),
                        attempt,
                        delay,
                    });
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        name = %self.config.name,
                        attempt,
                        ?delay,
                        code = err.code().as_str(),
                        "retrying recoverable failure"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Current circuit state.
    pub fn state(&self) -> CircuitState {
        self.circuit.lock().unwrap().state()
    }

    /// When the most recent failure was recorded.
    pub fn last_failure(&self) -> Option<Instant> {
        self.circuit.lock().unwrap().last_failure()
    }

    /// Counter snapshot plus circuit view.
    pub fn metrics(&self) -> ResilienceMetrics {
        ResilienceMetrics {
            name: self.config.name.clone(),
            circuit: self.circuit.lock().unwrap().snapshot(),
            total_calls: self.counters.total_calls.load(Ordering::Relaxed),
            successes: self.counters.successes.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            timeouts: self.counters.timeouts.load(Ordering::Relaxed),
            retries: self.counters.retries.load(Ordering::Relaxed),
        }
    }

    /// Forces the breaker back to Closed and clears its bookkeeping.
    pub fn reset(&self) {
        self.circuit.lock().unwrap().reset(&self.config);
    }
}
