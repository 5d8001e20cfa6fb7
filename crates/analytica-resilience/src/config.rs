use crate::circuit::CircuitState;
use crate::events::ResilienceEvent;
use analytica_core::{EventListeners, FnListener, RecoveryTable};
use std::sync::Arc;
use std::time::Duration;

/// Configuration for one [`crate::Resilience`] instance.
pub struct ResilienceConfig {
    pub(crate) name: String,
    pub(crate) failure_threshold: usize,
    pub(crate) monitoring_window: Duration,
    pub(crate) reset_timeout: Duration,
    pub(crate) success_threshold: usize,
    pub(crate) call_timeout: Duration,
    pub(crate) recovery: Arc<RecoveryTable>,
    pub(crate) listeners: EventListeners<ResilienceEvent>,
}

impl ResilienceConfig {
    pub fn builder() -> ResilienceConfigBuilder {
        ResilienceConfigBuilder::new()
    }
}

/// Builder for [`ResilienceConfig`].
pub struct ResilienceConfigBuilder {
    name: String,
    failure_threshold: usize,
    monitoring_window: Duration,
    reset_timeout: Duration,
    success_threshold: usize,
    call_timeout: Duration,
    recovery: Arc<RecoveryTable>,
    listeners: EventListeners<ResilienceEvent>,
}

impl ResilienceConfigBuilder {
    pub fn new() -> Self {
        Self {
            name: String::from("<unnamed>"),
            failure_threshold: 5,
            monitoring_window: Duration::from_secs(60),
            reset_timeout: Duration::from_secs(30),
            success_threshold: 2,
            call_timeout: Duration::from_secs(30),
            recovery: Arc::new(RecoveryTable::standard()),
            listeners: EventListeners::new(),
        }
    }

    /// Failures within the monitoring window that open the circuit.
    ///
    /// Default: 5
    pub fn failure_threshold(mut self, n: usize) -> Self {
        self.failure_threshold = n.max(1);
        self
    }

    /// Window over which failures are counted.
    ///
    /// Default: 60 seconds
    pub fn monitoring_window(mut self, window: Duration) -> Self {
        self.monitoring_window = window;
        self
    }

    /// How long the circuit stays open before probing (half-open).
    ///
    /// Default: 30 seconds
    pub fn reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    /// Consecutive half-open successes that close the circuit.
    ///
    /// Default: 2
    pub fn success_threshold(mut self, n: usize) -> Self {
        self.success_threshold = n.max(1);
        self
    }

    /// Upper bound on each wrapped call; expiry counts as an `API_TIMEOUT`
    /// failure.
    ///
    /// Default: 30 seconds
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Recovery table driving the retry loop. Default: the standard table.
    pub fn recovery(mut self, recovery: Arc<RecoveryTable>) -> Self {
        self.recovery = recovery;
        self
    }

    /// Human-readable name used in events, logs and metrics labels.
    ///
    /// Default: `<unnamed>`
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback for state transitions.
    pub fn on_state_transition<F>(mut self, f: F) -> Self
    where
        F: Fn(CircuitState, CircuitState) + Send + Sync + 'static,
    {
        self.listeners.add(FnListener::new(move |event: &ResilienceEvent| {
            if let ResilienceEvent::StateTransition { from, to, .. } = event {
                f(*from, *to);
            }
        }));
        self
    }

    /// Registers a callback for rejected (circuit-open) calls.
    pub fn on_call_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.listeners.add(FnListener::new(move |event: &ResilienceEvent| {
            if matches!(event, ResilienceEvent::CallRejected { .. }) {
                f();
            }
        }));
        self
    }

    /// Registers a callback for scheduled retries.
    pub fn on_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(u32, Duration) + Send + Sync + 'static,
    {
        self.listeners.add(FnListener::new(move |event: &ResilienceEvent| {
            if let ResilienceEvent::RetryScheduled { attempt, delay, .. } = event {
                f(*attempt, *delay);
            }
        }));
        self
    }

    pub fn build(self) -> crate::Resilience {
        crate::Resilience::new(self.into_config())
    }

    pub(crate) fn into_config(self) -> ResilienceConfig {
        ResilienceConfig {
            name: self.name,
            failure_threshold: self.failure_threshold,
            monitoring_window: self.monitoring_window,
            reset_timeout: self.reset_timeout,
            success_threshold: self.success_threshold,
            call_timeout: self.call_timeout,
            recovery: self.recovery,
            listeners: self.listeners,
        }
    }
}

impl Default for ResilienceConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
