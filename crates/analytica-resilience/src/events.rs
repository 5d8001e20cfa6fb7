use crate::circuit::CircuitState;
use analytica_core::{ErrorCode, InfraEvent};
use std::time::{Duration, Instant};

/// Events emitted by a [`crate::Resilience`] instance.
#[derive(Debug, Clone)]
pub enum ResilienceEvent {
    StateTransition {
        name: String,
        timestamp: Instant,
        from: CircuitState,
        to: CircuitState,
    },
    /// A call was rejected because the circuit is open.
    CallRejected { name: String, timestamp: Instant },
    CallTimedOut {
        name: String,
        timestamp: Instant,
        timeout: Duration,
    },
    CallSucceeded {
        name: String,
        timestamp: Instant,
        duration: Duration,
    },
    CallFailed {
        name: String,
        timestamp: Instant,
        duration: Duration,
        code: ErrorCode,
    },
    RetryScheduled {
        name: String,
        timestamp: Instant,
        attempt: u32,
        delay: Duration,
    },
}

impl InfraEvent for ResilienceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ResilienceEvent::StateTransition { .. } => "state_transition",
            ResilienceEvent::CallRejected { .. } => "call_rejected",
            ResilienceEvent::CallTimedOut { .. } => "call_timed_out",
            ResilienceEvent::CallSucceeded { .. } => "call_succeeded",
            ResilienceEvent::CallFailed { .. } => "call_failed",
            ResilienceEvent::RetryScheduled { .. } => "retry_scheduled",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            ResilienceEvent::StateTransition { timestamp, .. }
            | ResilienceEvent::CallRejected { timestamp, .. }
            | ResilienceEvent::CallTimedOut { timestamp, .. }
            | ResilienceEvent::CallSucceeded { timestamp, .. }
            | ResilienceEvent::CallFailed { timestamp, .. }
            | ResilienceEvent::RetryScheduled { timestamp, .. } => *timestamp,
        }
    }

    fn source(&self) -> &str {
        match self {
            ResilienceEvent::StateTransition { name, .. }
            | ResilienceEvent::CallRejected { name, .. }
            | ResilienceEvent::CallTimedOut { name, .. }
            | ResilienceEvent::CallSucceeded { name, .. }
            | ResilienceEvent::CallFailed { name, .. }
            | ResilienceEvent::RetryScheduled { name, .. } => name,
        }
    }
}
