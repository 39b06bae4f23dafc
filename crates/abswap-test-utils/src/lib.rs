//! Shared test utilities for abswap
//!
//! Helpers for the `#[ignore]`d integration tests that talk to real AWS.
//! Kept in their own crate so they never leak into the deployer binary.
//!
//! ## Modules
//!
//! - [`aws`]: Region/bucket discovery and unique environment names

pub mod aws;

pub use aws::{get_test_region, test_environment_name, test_lock_bucket};
