//! Jittered exponential backoff shared by the rate limiter and the
//! resilience wrapper.

use rand::Rng;
use std::time::Duration;

/// Delay before retry `attempt` (0-indexed):
/// `min(max_delay, initial * multiplier^attempt) + U(0, jitter)`.
pub fn jittered_delay(
    initial: Duration,
    multiplier: f64,
    max_delay: Duration,
    jitter: Duration,
    attempt: u32,
) -> Duration {
    let base = initial.as_millis() as f64 * multiplier.powi(attempt as i32);
    let capped = Duration::from_millis(base.min(max_delay.as_millis() as f64) as u64);
    capped + random_jitter(jitter)
}

fn random_jitter(jitter: Duration) -> Duration {
    let ms = jitter.as_millis() as u64;
    if ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=ms))
}
