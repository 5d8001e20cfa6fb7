use crate::config::ResilienceConfig;
use crate::events::ResilienceEvent;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// State of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls pass through; failures are counted.
    Closed,
    /// Calls are rejected immediately.
    Open,
    /// A probe period: successes promote back to Closed, any failure
    /// reopens.
    HalfOpen,
}

/// Point-in-time view of the breaker, for the metrics surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub failures_in_window: usize,
    pub consecutive_successes: usize,
    pub time_since_transition: Duration,
}

pub(crate) struct Circuit {
    state: CircuitState,
    // Failure timestamps within the monitoring window.
    failure_log: VecDeque<Instant>,
    half_open_successes: usize,
    last_failure: Option<Instant>,
    last_transition: Instant,
}

impl Circuit {
    pub(crate) fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_log: VecDeque::new(),
            half_open_successes: 0,
            last_failure: None,
            last_transition: Instant::now(),
        }
    }

    pub(crate) fn state(&self) -> CircuitState {
        self.state
    }

    pub(crate) fn last_failure(&self) -> Option<Instant> {
        self.last_failure
    }

    pub(crate) fn snapshot(&self) -> CircuitSnapshot {
        CircuitSnapshot {
            state: self.state,
            failures_in_window: self.failure_log.len(),
            consecutive_successes: self.half_open_successes,
            time_since_transition: self.last_transition.elapsed(),
        }
    }

    /// Whether a call may proceed. An Open circuit flips to HalfOpen once
    /// the reset timeout has elapsed.
    pub(crate) fn try_acquire(&mut self, config: &ResilienceConfig) -> bool {
        match self.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                if self.last_transition.elapsed() >= config.reset_timeout {
                    self.transition_to(CircuitState::HalfOpen, config);
                    true
                } else {
                    false
                }
            }
        }
    }

    pub(crate) fn record_success(&mut self, config: &ResilienceConfig) {
        match self.state {
            CircuitState::HalfOpen => {
                self.half_open_successes += 1;
                if self.half_open_successes >= config.success_threshold {
                    self.transition_to(CircuitState::Closed, config);
                }
            }
            CircuitState::Closed => {
                // A success clears the failure count, not total-call stats.
                self.failure_log.clear();
            }
            CircuitState::Open => {}
        }
    }

    pub(crate) fn record_failure(&mut self, config: &ResilienceConfig) {
        let now = Instant::now();
        self.last_failure = Some(now);
        match self.state {
            CircuitState::HalfOpen => {
                self.transition_to(CircuitState::Open, config);
            }
            CircuitState::Closed => {
                self.prune(now, config.monitoring_window);
                self.failure_log.push_back(now);
                if self.failure_log.len() >= config.failure_threshold {
                    self.transition_to(CircuitState::Open, config);
                }
            }
            CircuitState::Open => {}
        }
    }

    pub(crate) fn reset(&mut self, config: &ResilienceConfig) {
        self.transition_to(CircuitState::Closed, config);
        self.last_failure = None;
    }

    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&front) = self.failure_log.front() {
            if now.duration_since(front) > window {
                self.failure_log.pop_front();
            } else {
                break;
            }
        }
    }

    fn transition_to(&mut self, state: CircuitState, config: &ResilienceConfig) {
        if self.state == state {
            // reset() re-enters Closed; still clear the bookkeeping.
            self.failure_log.clear();
            self.half_open_successes = 0;
            return;
        }
        let from = self.state;
        config.listeners.emit(&ResilienceEvent::StateTransition {
            name: config.name.clone(),
            timestamp: Instant::now(),
            from,
            to: state,
        });
        #[cfg(feature = "tracing")]
        tracing::info!(breaker = %config.name, ?from, to = ?state, "circuit state transition");
        #[cfg(feature = "metrics")]
        metrics::counter!(
            "resilience_transitions_total",
            "breaker" => config.name.clone(),
            "to" => match state {
                CircuitState::Closed => "closed",
                CircuitState::Open => "open",
                CircuitState::HalfOpen => "half_open",
            }
        )
        .increment(1);

        self.state = state;
        self.last_transition = Instant::now();
        self.failure_log.clear();
        self.half_open_successes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResilienceConfig;

    fn config(threshold: usize) -> ResilienceConfig {
        ResilienceConfig::builder()
            .failure_threshold(threshold)
            .reset_timeout(Duration::from_millis(50))
            .success_threshold(2)
            .name("test")
            .into_config()
    }

    #[test]
    fn opens_at_failure_threshold() {
        let config = config(3);
        let mut circuit = Circuit::new();
        circuit.record_failure(&config);
        circuit.record_failure(&config);
        assert_eq!(circuit.state(), CircuitState::Closed);
        circuit.record_failure(&config);
        assert_eq!(circuit.state(), CircuitState::Open);
    }

    #[test]
    fn success_in_closed_resets_failure_count() {
        let config = config(3);
        let mut circuit = Circuit::new();
        circuit.record_failure(&config);
        circuit.record_failure(&config);
        circuit.record_success(&config);
        circuit.record_failure(&config);
        circuit.record_failure(&config);
        assert_eq!(circuit.state(), CircuitState::Closed);
    }

    #[test]
    fn open_rejects_until_reset_timeout() {
        let config = config(1);
        let mut circuit = Circuit::new();
        circuit.record_failure(&config);
        assert_eq!(circuit.state(), CircuitState::Open);
        assert!(!circuit.try_acquire(&config));
        std::thread::sleep(Duration::from_millis(60));
        assert!(circuit.try_acquire(&config));
        assert_eq!(circuit.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn half_open_promotes_after_consecutive_successes() {
        let config = config(1);
        let mut circuit = Circuit::new();
        circuit.record_failure(&config);
        std::thread::sleep(Duration::from_millis(60));
        assert!(circuit.try_acquire(&config));
        circuit.record_success(&config);
        assert_eq!(circuit.state(), CircuitState::HalfOpen);
        circuit.record_success(&config);
        assert_eq!(circuit.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens() {
        let config = config(1);
        let mut circuit = Circuit::new();
        circuit.record_failure(&config);
        std::thread::sleep(Duration::from_millis(60));
        assert!(circuit.try_acquire(&config));
        circuit.record_failure(&config);
        assert_eq!(circuit.state(), CircuitState::Open);
    }
}
