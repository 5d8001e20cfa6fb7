use analytica_core::InfraEvent;
use std::time::{Duration, Instant};

/// Events emitted by a [`crate::RateLimitManager`].
#[derive(Debug, Clone)]
pub enum RateLimitEvent {
    /// A caller is suspended waiting for budget headroom on an endpoint.
    BudgetWait {
        manager: String,
        timestamp: Instant,
        endpoint: String,
        wait: Duration,
    },
    /// A key hit a rate limit and was placed into cooldown.
    KeyRotated {
        manager: String,
        timestamp: Instant,
        provider: String,
        cooldown: Duration,
    },
    /// A key was permanently invalidated after an auth failure.
    KeyInvalidated {
        manager: String,
        timestamp: Instant,
        provider: String,
    },
    /// A recoverable failure scheduled a retry.
    RetryScheduled {
        manager: String,
        timestamp: Instant,
        endpoint: String,
        attempt: u32,
        delay: Duration,
    },
    /// All attempts were used up.
    Exhausted {
        manager: String,
        timestamp: Instant,
        endpoint: String,
        attempts: u32,
    },
}

impl InfraEvent for RateLimitEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RateLimitEvent::BudgetWait { .. } => "budget_wait",
            RateLimitEvent::KeyRotated { .. } => "key_rotated",
            RateLimitEvent::KeyInvalidated { .. } => "key_invalidated",
            RateLimitEvent::RetryScheduled { .. } => "retry_scheduled",
            RateLimitEvent::Exhausted { .. } => "exhausted",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RateLimitEvent::BudgetWait { timestamp, .. }
            | RateLimitEvent::KeyRotated { timestamp, .. }
            | RateLimitEvent::KeyInvalidated { timestamp, .. }
            | RateLimitEvent::RetryScheduled { timestamp, .. }
            | RateLimitEvent::Exhausted { timestamp, .. } => *timestamp,
        }
    }

    fn source(&self) -> &str {
        match self {
            RateLimitEvent::BudgetWait { manager, .. }
            | RateLimitEvent::KeyRotated { manager, .. }
            | RateLimitEvent::KeyInvalidated { manager, .. }
            | RateLimitEvent::RetryScheduled { manager, .. }
            | RateLimitEvent::Exhausted { manager, .. } => manager,
        }
    }
}
