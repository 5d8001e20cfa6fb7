use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Sliding-log budget for one named endpoint.
///
/// Stores the timestamp of each admitted request and counts those within
/// `[now - window, now]`. Invariant: the in-window count never exceeds
/// `max_requests`.
#[derive(Debug)]
pub(crate) struct EndpointBudget {
    max_requests: usize,
    window: Duration,
    log: VecDeque<Instant>,
}

impl EndpointBudget {
    pub(crate) fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            log: VecDeque::with_capacity(max_requests),
        }
    }

    /// Attempts to admit a request at `now`.
    ///
    /// `Ok(())` records the admission. `Err(wait)` is how long until the
    /// oldest in-window timestamp expires and admission can be retried.
    pub(crate) fn try_admit(&mut self, now: Instant) -> Result<(), Duration> {
        self.prune(now);
        if self.log.len() < self.max_requests {
            self.log.push_back(now);
            return Ok(());
        }
        // Full window; the front entry is the one that frees a slot first.
        match self.log.front() {
            Some(&oldest) => {
                let wait = (oldest + self.window).saturating_duration_since(now);
                Err(wait.max(Duration::from_millis(1)))
            }
            None => {
                self.log.push_back(now);
                Ok(())
            }
        }
    }

    pub(crate) fn in_window(&mut self, now: Instant) -> usize {
        self.prune(now);
        self.log.len()
    }

    /// Replaces the limits, keeping the existing usage log.
    pub(crate) fn reconfigure(&mut self, max_requests: usize, window: Duration) {
        self.max_requests = max_requests.max(1);
        self.window = window;
    }

    fn prune(&mut self, now: Instant) {
        while let Some(&front) = self.log.front() {
            if now.duration_since(front) >= self.window {
                self.log.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_max_then_reports_wait() {
        let mut budget = EndpointBudget::new(2, Duration::from_secs(1));
        let now = Instant::now();
        assert!(budget.try_admit(now).is_ok());
        assert!(budget.try_admit(now).is_ok());
        let wait = budget.try_admit(now).unwrap_err();
        assert!(wait <= Duration::from_secs(1));
        assert!(wait > Duration::ZERO);
    }

    #[test]
    fn window_slides() {
        let mut budget = EndpointBudget::new(1, Duration::from_millis(100));
        let t0 = Instant::now();
        assert!(budget.try_admit(t0).is_ok());
        assert!(budget.try_admit(t0 + Duration::from_millis(50)).is_err());
        assert!(budget.try_admit(t0 + Duration::from_millis(150)).is_ok());
    }

    #[test]
    fn in_window_count_never_exceeds_max() {
        let mut budget = EndpointBudget::new(3, Duration::from_millis(100));
        let t0 = Instant::now();
        for i in 0..20u64 {
            let now = t0 + Duration::from_millis(i * 10);
            let _ = budget.try_admit(now);
            assert!(budget.in_window(now) <= 3);
        }
    }
}
