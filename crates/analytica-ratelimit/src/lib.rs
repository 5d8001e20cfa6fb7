//! Rate limiting for external API calls, with key pools and sliding-window
//! endpoint budgets.
//!
//! The [`RateLimitManager`] owns one key pool per provider and one budget per
//! named endpoint. [`RateLimitManager::execute`] runs a call under both:
//!
//! 1. Admission: the endpoint's sliding window is checked; when the budget is
//!    full the caller suspends until the oldest in-window timestamp expires.
//!    Admission is FIFO-fair among waiters on the same endpoint.
//! 2. Key selection: round-robin among keys that are neither cooling down
//!    nor invalidated, ties broken by earliest last use. When no key is
//!    available the caller suspends until the earliest cooldown elapses.
//! 3. Retry: only recoverable error codes are retried, with jittered
//!    exponential backoff taken from the recovery table. A rate-limit
//!    failure can additionally rotate the current key into cooldown.
//!
//! ```no_run
//! use analytica_core::RecoveryTable;
//! use analytica_ratelimit::{ExecuteOptions, RateLimitManager};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> analytica_core::Result<()> {
//! let manager = RateLimitManager::builder()
//!     .name("research")
//!     .recovery(Arc::new(RecoveryTable::standard()))
//!     .build();
//!
//! manager.register_keys("exa", ["key-a".into(), "key-b".into()]);
//! manager.configure_endpoint("search", 10, Duration::from_secs(1));
//!
//! let opts = ExecuteOptions::new("exa", "search").rotate_keys_on_rate_limit(true);
//! let body: String = manager
//!     .execute(&opts, |api_key| async move {
//!         // call the provider with `api_key`
//!         Ok(format!("result for {}", api_key.len()))
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod budget;
mod events;
mod key;
mod manager;

pub use events::RateLimitEvent;
pub use key::{ApiKey, KeyPool};
pub use manager::{
    ExecuteOptions, RateLimitManager, RateLimitManagerBuilder, RateLimitStats,
};
