use crate::budget::EndpointBudget;
use crate::events::RateLimitEvent;
use crate::key::KeyPool;
use analytica_core::{
    AnalyticalError, ErrorCode, EventListeners, FnListener, RecoveryTable, Result, RetryPolicy,
};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// Options for one [`RateLimitManager::execute`] call.
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    pub(crate) provider: String,
    pub(crate) endpoint: String,
    pub(crate) max_retries: u32,
    pub(crate) initial_delay: Option<Duration>,
    pub(crate) rotate_keys_on_rate_limit: bool,
    pub(crate) fail_fast: bool,
}

impl ExecuteOptions {
    pub fn new(provider: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            endpoint: endpoint.into(),
            max_retries: 3,
            initial_delay: None,
            rotate_keys_on_rate_limit: false,
            fail_fast: false,
        }
    }

    /// Retries after the initial attempt. Default: 3.
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    /// Overrides the recovery strategy's initial backoff delay.
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }

    /// Place the current key into cooldown and move to the next one when a
    /// call fails with a rate-limit error. Default: false.
    pub fn rotate_keys_on_rate_limit(mut self, rotate: bool) -> Self {
        self.rotate_keys_on_rate_limit = rotate;
        self
    }

    /// Disables retries entirely. Default: false.
    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }
}

/// Counter snapshot for the metrics surface.
#[derive(Debug, Clone, Copy, Default)]
pub struct RateLimitStats {
    pub admitted: u64,
    pub budget_waits: u64,
    pub key_rotations: u64,
    pub keys_invalidated: u64,
    pub retries: u64,
    pub exhausted: u64,
}

#[derive(Default)]
struct Counters {
    admitted: AtomicU64,
    budget_waits: AtomicU64,
    key_rotations: AtomicU64,
    keys_invalidated: AtomicU64,
    retries: AtomicU64,
    exhausted: AtomicU64,
}

/// Rate-limit manager: per-provider key pools, per-endpoint sliding-window
/// budgets, and a recoverable-only retry loop around external calls.
///
/// Distinct endpoints and providers are independently locked; a stalled
/// endpoint never blocks callers of another.
pub struct RateLimitManager {
    name: String,
    pools: RwLock<HashMap<String, Arc<Mutex<KeyPool>>>>,
    budgets: RwLock<HashMap<String, Arc<Endpoint>>>,
    recovery: Arc<RecoveryTable>,
    listeners: EventListeners<RateLimitEvent>,
    counters: Counters,
}

/// Budget state plus a turn-taking queue.
///
/// Waiters hold `queue` across their sleep, so admission hands out slots in
/// arrival order; `state` is a plain mutex so reconfiguration and stats
/// never wait behind a sleeping caller.
struct Endpoint {
    queue: tokio::sync::Mutex<()>,
    state: Mutex<EndpointBudget>,
}

impl RateLimitManager {
    pub fn builder() -> RateLimitManagerBuilder {
        RateLimitManagerBuilder::new()
    }

    /// Installs (or extends) the key pool for a provider.
    pub fn register_keys(&self, provider: impl Into<String>, keys: impl IntoIterator<Item = String>) {
        let provider = provider.into();
        let pool = {
            let mut pools = self.pools.write().unwrap();
            Arc::clone(
                pools
                    .entry(provider.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(KeyPool::new()))),
            )
        };
        pool.lock().unwrap().merge(&provider, keys);
    }

    /// Sets (or replaces) the sliding-window budget for an endpoint.
    ///
    /// Reconfiguring keeps the existing usage log, so lowering a limit can
    /// never let in a burst past the new ceiling.
    pub fn configure_endpoint(&self, endpoint: impl Into<String>, max_requests: usize, window: Duration) {
        let endpoint = endpoint.into();
        let mut budgets = self.budgets.write().unwrap();
        match budgets.get(&endpoint) {
            Some(existing) => {
                existing.state.lock().unwrap().reconfigure(max_requests, window);
            }
            None => {
                budgets.insert(
                    endpoint,
                    Arc::new(Endpoint {
                        queue: tokio::sync::Mutex::new(()),
                        state: Mutex::new(EndpointBudget::new(max_requests, window)),
                    }),
                );
            }
        }
    }

    /// Runs `call(api_key)` under the endpoint budget and provider key pool.
    ///
    /// Only recoverable error codes are retried; `fail_fast` disables retry
    /// entirely. On exhaustion the error carries the original failure in its
    /// context under `"cause"`.
    pub async fn execute<T, F, Fut>(&self, opts: &ExecuteOptions, mut call: F) -> Result<T>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            self.admit(&opts.endpoint).await;
            let secret = self.select_key(opts).await?;
            self.counters.admitted.fetch_add(1, Ordering::Relaxed);
            #[cfg(feature = "metrics")]
            metrics::counter!("ratelimit_calls_total", "endpoint" => opts.endpoint.clone())
                .increment(1);

            let err = match call(secret.clone()).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let rate_limited = err.code() == ErrorCode::ApiRateLimit;
            if err.code() == ErrorCode::ApiAuthFailed {
                self.invalidate_key(&opts.provider, &secret);
            }
            if rate_limited && opts.rotate_keys_on_rate_limit {
                let cooldown = self
                    .recovery
                    .retry_policy_for(&err)
                    .unwrap_or_else(RetryPolicy::conservative)
                    .delay_for(attempt);
                self.cooldown_key(&opts.provider, &secret, cooldown);
            }

            if opts.fail_fast || !self.recovery.is_recoverable(&err) {
                return Err(err);
            }
            if attempt >= opts.max_retries {
                self.counters.exhausted.fetch_add(1, Ordering::Relaxed);
                self.listeners.emit(&RateLimitEvent::Exhausted {
                    manager: self.name.clone(),
                    timestamp: Instant::now(),
                    endpoint: opts.endpoint.clone(),
                    attempts: attempt + 1,
                });
                return Err(Self::exhausted_error(err, attempt + 1, &opts.endpoint));
            }

            let delay = self.retry_delay(&err, opts, attempt);
            self.counters.retries.fetch_add(1, Ordering::Relaxed);
            self.listeners.emit(&RateLimitEvent::RetryScheduled {
                manager: self.name.clone(),
                timestamp: Instant::now(),
                endpoint: opts.endpoint.clone(),
                attempt,
                delay,
            });
            #[cfg(feature = "tracing")]
            tracing::debug!(
                endpoint = %opts.endpoint,
                attempt,
                ?delay,
                code = err.code().as_str(),
                "retrying after recoverable failure"
            );
            sleep(delay).await;
            attempt += 1;
        }
    }

    /// Counter snapshot.
    pub fn stats(&self) -> RateLimitStats {
        RateLimitStats {
            admitted: self.counters.admitted.load(Ordering::Relaxed),
            budget_waits: self.counters.budget_waits.load(Ordering::Relaxed),
            key_rotations: self.counters.key_rotations.load(Ordering::Relaxed),
            keys_invalidated: self.counters.keys_invalidated.load(Ordering::Relaxed),
            retries: self.counters.retries.load(Ordering::Relaxed),
            exhausted: self.counters.exhausted.load(Ordering::Relaxed),
        }
    }

    /// Current in-window usage for an endpoint, if configured.
    pub fn endpoint_usage(&self, endpoint: &str) -> Option<usize> {
        let ep = {
            let budgets = self.budgets.read().unwrap();
            budgets.get(endpoint).cloned()
        }?;
        let usage = ep.state.lock().unwrap().in_window(Instant::now());
        Some(usage)
    }

    /// Suspends until the endpoint budget admits a request. Unconfigured
    /// endpoints are unrestricted.
    async fn admit(&self, endpoint: &str) {
        let ep = {
            let budgets = self.budgets.read().unwrap();
            budgets.get(endpoint).cloned()
        };
        let Some(ep) = ep else { return };
        // The queue lock is held across the sleep: tokio's mutex wakes
        // waiters in arrival order, so callers that found the budget full
        // are admitted FIFO.
        let _turn = ep.queue.lock().await;
        loop {
            let wait = match ep.state.lock().unwrap().try_admit(Instant::now()) {
                Ok(()) => return,
                Err(wait) => wait,
            };
            self.counters.budget_waits.fetch_add(1, Ordering::Relaxed);
            self.listeners.emit(&RateLimitEvent::BudgetWait {
                manager: self.name.clone(),
                timestamp: Instant::now(),
                endpoint: endpoint.to_string(),
                wait,
            });
            #[cfg(feature = "metrics")]
            metrics::counter!("ratelimit_budget_waits_total", "endpoint" => endpoint.to_string())
                .increment(1);
            #[cfg(feature = "tracing")]
            tracing::trace!(endpoint, ?wait, "endpoint budget full, waiting");
            sleep(wait).await;
        }
    }

    /// Picks a key from the provider pool, suspending through cooldowns.
    async fn select_key(&self, opts: &ExecuteOptions) -> Result<String> {
        loop {
            let pool = {
                let pools = self.pools.read().unwrap();
                pools.get(&opts.provider).cloned()
            };
            let Some(pool) = pool else {
                return Err(AnalyticalError::new(
                    ErrorCode::ConfigMissing,
                    format!("no API keys registered for provider '{}'", opts.provider),
                ));
            };
            let next_available = {
                let mut guard = pool.lock().unwrap();
                let now = Instant::now();
                if let Some(secret) = guard.checkout(now) {
                    return Ok(secret);
                }
                if guard.is_empty() || guard.is_exhausted() {
                    return Err(AnalyticalError::new(
                        ErrorCode::ApiAuthFailed,
                        format!("all keys for provider '{}' are invalidated", opts.provider),
                    ));
                }
                guard.next_available_at(now)
            };
            match next_available {
                Some(at) => {
                    let wait = at.saturating_duration_since(Instant::now());
                    #[cfg(feature = "tracing")]
                    tracing::trace!(provider = %opts.provider, ?wait, "all keys cooling down");
                    sleep(wait.max(Duration::from_millis(1))).await;
                }
                // Raced with another caller freeing a key; loop again.
                None => continue,
            }
        }
    }

    fn cooldown_key(&self, provider: &str, secret: &str, cooldown: Duration) {
        let pool = {
            let pools = self.pools.read().unwrap();
            pools.get(provider).cloned()
        };
        if let Some(pool) = pool {
            pool.lock().unwrap().cooldown(secret, Instant::now() + cooldown);
            self.counters.key_rotations.fetch_add(1, Ordering::Relaxed);
            self.listeners.emit(&RateLimitEvent::KeyRotated {
                manager: self.name.clone(),
                timestamp: Instant::now(),
                provider: provider.to_string(),
                cooldown,
            });
            #[cfg(feature = "metrics")]
            metrics::counter!("ratelimit_key_rotations_total", "provider" => provider.to_string())
                .increment(1);
        }
    }

    fn invalidate_key(&self, provider: &str, secret: &str) {
        let pool = {
            let pools = self.pools.read().unwrap();
            pools.get(provider).cloned()
        };
        if let Some(pool) = pool {
            pool.lock().unwrap().invalidate(secret);
            self.counters.keys_invalidated.fetch_add(1, Ordering::Relaxed);
            self.listeners.emit(&RateLimitEvent::KeyInvalidated {
                manager: self.name.clone(),
                timestamp: Instant::now(),
                provider: provider.to_string(),
            });
        }
    }

    fn retry_delay(&self, err: &AnalyticalError, opts: &ExecuteOptions, attempt: u32) -> Duration {
        let mut policy = self
            .recovery
            .retry_policy_for(err)
            .unwrap_or_else(RetryPolicy::conservative);
        if let Some(initial) = opts.initial_delay {
            policy.initial_delay = initial;
        }
        policy.delay_for(attempt)
    }

    fn exhausted_error(last: AnalyticalError, attempts: u32, endpoint: &str) -> AnalyticalError {
        // API_RATE_LIMIT when the last cause was a limit; otherwise the last
        // underlying code. Either way the original rides along as context.
        AnalyticalError::new(
            last.code(),
            format!("attempts exhausted after {attempts} tries: {}", last.message()),
        )
        .with_context("cause", last.to_wire())
        .with_context("attempts", attempts)
        .with_endpoint(endpoint)
    }
}

/// Builder for [`RateLimitManager`].
pub struct RateLimitManagerBuilder {
    name: String,
    recovery: Arc<RecoveryTable>,
    listeners: EventListeners<RateLimitEvent>,
}

impl RateLimitManagerBuilder {
    pub fn new() -> Self {
        Self {
            name: String::from("<unnamed>"),
            recovery: Arc::new(RecoveryTable::standard()),
            listeners: EventListeners::new(),
        }
    }

    /// Human-readable name used in events and logs. Default: `<unnamed>`.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Recovery table consulted for retry policies. Default: the standard
    /// table.
    pub fn recovery(mut self, recovery: Arc<RecoveryTable>) -> Self {
        self.recovery = recovery;
        self
    }

    /// Registers a callback for key rotations.
    pub fn on_key_rotated<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.listeners.add(FnListener::new(move |event: &RateLimitEvent| {
            if let RateLimitEvent::KeyRotated { provider, .. } = event {
                f(provider);
            }
        }));
        self
    }

    /// Registers a callback for budget waits.
    pub fn on_budget_wait<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, Duration) + Send + Sync + 'static,
    {
        self.listeners.add(FnListener::new(move |event: &RateLimitEvent| {
            if let RateLimitEvent::BudgetWait { endpoint, wait, .. } = event {
                f(endpoint, *wait);
            }
        }));
        self
    }

    pub fn build(self) -> RateLimitManager {
        RateLimitManager {
            name: self.name,
            pools: RwLock::new(HashMap::new()),
            budgets: RwLock::new(HashMap::new()),
            recovery: self.recovery,
            listeners: self.listeners,
            counters: Counters::default(),
        }
    }
}

impl Default for RateLimitManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
