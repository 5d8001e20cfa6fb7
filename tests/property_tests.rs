//! Property-based tests for the infrastructure invariants.
//!
//! Run with: cargo test --test property_tests

mod property;
