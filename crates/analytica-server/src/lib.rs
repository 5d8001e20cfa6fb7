//! Analytical tool server.
//!
//! Exposes schema-validated analytical tools over newline-delimited
//! JSON-RPC on stdio, with every externally-dependent call threaded through
//! the shared infrastructure: the rate-limit manager (key pools + endpoint
//! budgets), the resilience wrapper (retry + circuit breaker + timeout) and
//! the multi-tier cache. A loopback HTTP surface exposes metrics and a
//! health ping.
//!
//! Component wiring for a tool call:
//!
//! ```text
//! transport ─▶ shell ─▶ validate ─▶ cache.get ─▶ ratelimit ─▶ resilience ─▶ handler
//!                                      │                                       │
//!                                      ◀──────────────── cache.set ◀───────────┘
//! ```

pub mod canonical;
pub mod client;
pub mod config;
pub mod registry;
pub mod shell;
pub mod surface;
pub mod tools;
pub mod transport;

pub use config::{RunMode, ServerConfig};
pub use registry::{CachePolicy, ExternalDeps, ToolContext, ToolHandler, ToolRegistry, ToolSpec};
pub use shell::InvocationShell;
