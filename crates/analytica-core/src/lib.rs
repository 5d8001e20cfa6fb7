//! Shared foundation for the analytica tool server.
//!
//! This crate defines the pieces every other component leans on:
//!
//! - [`ErrorCode`] / [`AnalyticalError`]: a closed, numerically partitioned
//!   error taxonomy with a stable string identifier per code and an explicit
//!   recoverability flag. The rate limiter and the resilience wrapper decide
//!   retry behavior from codes and flags alone, never from message text.
//! - [`RecoveryTable`] / [`RecoveryStrategy`]: a read-only, table-driven
//!   recovery policy established at startup and injected where needed.
//! - [`backoff`]: the jittered exponential delay formula shared by the rate
//!   limiter and the resilience wrapper.
//! - [`EventListeners`] / [`FnListener`]: observability callbacks with
//!   panic isolation, used by every pattern crate.
//!
//! ## Translating foreign errors
//!
//! ```
//! use analytica_core::{translate, ErrorCode};
//!
//! let err = translate(Box::from("request timed out after 30s"));
//! assert_eq!(err.code(), ErrorCode::ApiTimeout);
//!
//! // Translation is idempotent: an AnalyticalError passes through unchanged.
//! let again = translate(Box::new(err.clone()));
//! assert_eq!(again.code(), err.code());
//! ```
//!
//! ## Recovery policy
//!
//! ```
//! use analytica_core::{ErrorCode, RecoveryTable};
//!
//! let table = RecoveryTable::standard();
//! let strategy = table.strategy_for(ErrorCode::ApiRateLimit).unwrap();
//! assert!(strategy.rotate_key);
//! assert!(strategy.retry.is_some());
//! ```

pub mod backoff;
mod error;
mod events;
mod recovery;

pub use error::{translate, AnalyticalError, ErrorCategory, ErrorCode};
pub use events::{EventListener, EventListeners, FnListener, InfraEvent};
pub use recovery::{RecoveryStrategy, RecoveryTable, RecoveryTableBuilder, RetryPolicy};

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, AnalyticalError>;
