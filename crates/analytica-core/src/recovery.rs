use crate::backoff::jittered_delay;
use crate::error::{AnalyticalError, ErrorCode};
use std::collections::HashMap;
use std::time::Duration;

/// Declarative retry parameters for one error code.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the initial one.
    pub attempts: u32,
    pub initial_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
    pub jitter: Duration,
}

impl RetryPolicy {
    /// The conservative default applied when no strategy exists for a code:
    /// 3 attempts, 500 ms initial, base 2, 10 s cap, 100 ms jitter.
    pub fn conservative() -> Self {
        Self {
            attempts: 3,
            initial_delay: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(10),
            jitter: Duration::from_millis(100),
        }
    }

    /// Jittered delay before retry `attempt` (0-indexed).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        jittered_delay(
            self.initial_delay,
            self.backoff_multiplier,
            self.max_delay,
            self.jitter,
            attempt,
        )
    }
}

/// Recovery behavior for one error code.
#[derive(Debug, Clone, Default)]
pub struct RecoveryStrategy {
    pub retry: Option<RetryPolicy>,
    /// Serve a stale cache entry instead of surfacing the failure.
    pub cache_stale_on_failure: bool,
    /// Rotate to a different API key before retrying.
    pub rotate_key: bool,
}

/// Process-wide, read-only mapping from error codes to recovery strategies.
///
/// Built once at initialization and injected into the components that need
/// it; the same error code gets identical treatment no matter which tool
/// produced it.
#[derive(Debug, Clone, Default)]
pub struct RecoveryTable {
    strategies: HashMap<ErrorCode, RecoveryStrategy>,
}

impl RecoveryTable {
    pub fn builder() -> RecoveryTableBuilder {
        RecoveryTableBuilder::default()
    }

    /// The standard policy set for the recoverable external-API codes plus
    /// the transient processing timeout.
    pub fn standard() -> Self {
        Self::builder()
            .strategy(
                ErrorCode::ApiRateLimit,
                RecoveryStrategy {
                    retry: Some(RetryPolicy {
                        attempts: 5,
                        initial_delay: Duration::from_secs(1),
                        backoff_multiplier: 2.0,
                        max_delay: Duration::from_secs(30),
                        jitter: Duration::from_millis(250),
                    }),
                    cache_stale_on_failure: true,
                    rotate_key: true,
                },
            )
            .strategy(
                ErrorCode::ApiTimeout,
                RecoveryStrategy {
                    retry: Some(RetryPolicy::conservative()),
                    cache_stale_on_failure: true,
                    rotate_key: false,
                },
            )
            .strategy(
                ErrorCode::ApiServiceUnavailable,
                RecoveryStrategy {
                    retry: Some(RetryPolicy {
                        attempts: 3,
                        initial_delay: Duration::from_secs(1),
                        backoff_multiplier: 2.0,
                        max_delay: Duration::from_secs(15),
                        jitter: Duration::from_millis(250),
                    }),
                    cache_stale_on_failure: true,
                    rotate_key: false,
                },
            )
            .strategy(
                ErrorCode::ApiRequestFailed,
                RecoveryStrategy {
                    retry: Some(RetryPolicy::conservative()),
                    cache_stale_on_failure: true,
                    rotate_key: false,
                },
            )
            .strategy(
                ErrorCode::ProcessingTimeout,
                RecoveryStrategy {
                    retry: Some(RetryPolicy {
                        attempts: 2,
                        initial_delay: Duration::from_millis(250),
                        backoff_multiplier: 2.0,
                        max_delay: Duration::from_secs(5),
                        jitter: Duration::from_millis(50),
                    }),
                    cache_stale_on_failure: false,
                    rotate_key: false,
                },
            )
            .build()
    }

    pub fn strategy_for(&self, code: ErrorCode) -> Option<&RecoveryStrategy> {
        self.strategies.get(&code)
    }

    /// Whether the retry machinery may act on this error.
    ///
    /// Consults only the explicit flag; message wording never changes
    /// behavior.
    pub fn is_recoverable(&self, err: &AnalyticalError) -> bool {
        err.is_recoverable()
    }

    /// Retry policy for a code, falling back to the conservative default
    /// when the error is recoverable but no strategy is registered.
    pub fn retry_policy_for(&self, err: &AnalyticalError) -> Option<RetryPolicy> {
        if !self.is_recoverable(err) {
            return None;
        }
        match self.strategy_for(err.code()) {
            Some(strategy) => strategy.retry.clone(),
            None => Some(RetryPolicy::conservative()),
        }
    }
}

#[derive(Debug, Default)]
pub struct RecoveryTableBuilder {
    strategies: HashMap<ErrorCode, RecoveryStrategy>,
}

impl RecoveryTableBuilder {
    pub fn strategy(mut self, code: ErrorCode, strategy: RecoveryStrategy) -> Self {
        self.strategies.insert(code, strategy);
        self
    }

    pub fn build(self) -> RecoveryTable {
        RecoveryTable {
            strategies: self.strategies,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_table_covers_recoverable_api_codes() {
        let table = RecoveryTable::standard();
        for code in [
            ErrorCode::ApiRateLimit,
            ErrorCode::ApiTimeout,
            ErrorCode::ApiServiceUnavailable,
            ErrorCode::ApiRequestFailed,
            ErrorCode::ProcessingTimeout,
        ] {
            assert!(table.strategy_for(code).is_some(), "{:?}", code);
        }
        assert!(table.strategy_for(ErrorCode::ApiAuthFailed).is_none());
        assert!(table.strategy_for(ErrorCode::InvalidInput).is_none());
    }

    #[test]
    fn rate_limit_rotates_keys() {
        let table = RecoveryTable::standard();
        let strategy = table.strategy_for(ErrorCode::ApiRateLimit).unwrap();
        assert!(strategy.rotate_key);
        assert!(strategy.cache_stale_on_failure);
    }

    #[test]
    fn unrecoverable_errors_get_no_policy() {
        let table = RecoveryTable::standard();
        let err = AnalyticalError::new(ErrorCode::ApiAuthFailed, "bad key");
        assert!(table.retry_policy_for(&err).is_none());
    }

    #[test]
    fn recoverable_without_strategy_falls_back_to_conservative() {
        let table = RecoveryTable::builder().build();
        let err = AnalyticalError::new(ErrorCode::ApiTimeout, "slow upstream");
        assert_eq!(table.retry_policy_for(&err), Some(RetryPolicy::conservative()));
    }

    #[test]
    fn recoverable_flag_override_is_honored() {
        let table = RecoveryTable::standard();
        let err = AnalyticalError::new(ErrorCode::ApiTimeout, "slow").with_recoverable(false);
        assert!(!table.is_recoverable(&err));
        assert!(table.retry_policy_for(&err).is_none());
    }
}
