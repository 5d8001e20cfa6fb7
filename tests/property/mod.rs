//! Property test organization:
//! - eviction.rs: eviction never removes better-ranked entries first
//! - fingerprint.rs: similarity is bounded, symmetric and reflexive
//! - translation.rs: error translation is total and idempotent

mod eviction;
mod fingerprint;
mod translation;
