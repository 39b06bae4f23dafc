//! AWS test utilities
//!
//! Provides region detection, lock bucket discovery and unique environment
//! names for live integration tests.

use chrono::Utc;

/// Environment variable naming a scratch S3 bucket for lock tests
pub const TEST_LOCK_BUCKET_VAR: &str = "ABSWAP_TEST_LOCK_BUCKET";

/// Get the AWS region for tests.
///
/// Checks environment variables in order:
/// 1. AWS_REGION
/// 2. AWS_DEFAULT_REGION
/// 3. Falls back to us-east-2
pub fn get_test_region() -> String {
    std::env::var("AWS_REGION")
        .or_else(|_| std::env::var("AWS_DEFAULT_REGION"))
        .unwrap_or_else(|_| "us-east-2".to_string())
}

/// Scratch bucket for lock tests, if the operator provided one.
pub fn test_lock_bucket() -> Option<String> {
    std::env::var(TEST_LOCK_BUCKET_VAR)
        .ok()
        .filter(|b| !b.trim().is_empty())
}

/// Generate a unique environment name for test resources.
///
/// Format: `abswap-test-{timestamp_ms}-{counter}` so tests started in the
/// same millisecond still get distinct lock keys.
///
/// # Example
///
/// ```
/// use abswap_test_utils::aws::test_environment_name;
///
/// let env = test_environment_name();
/// assert!(env.starts_with("abswap-test-"));
/// ```
pub fn test_environment_name() -> String {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let ts = Utc::now().timestamp_millis();
    let counter = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("abswap-test-{}-{}", ts, counter)
}

/// Lock key the deployer will use for a test environment.
pub fn test_lock_key(environment: &str) -> String {
    abswap_common::lock_key(environment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_name_format() {
        let env = test_environment_name();
        let rest = env.strip_prefix("abswap-test-").unwrap();
        let parts: Vec<&str> = rest.split('-').collect();
        assert_eq!(parts.len(), 2);
        parts[0].parse::<i64>().expect("Should be valid timestamp");
        parts[1].parse::<u32>().expect("Should be valid counter");
    }

    #[test]
    fn test_environment_name_unique() {
        let a = test_environment_name();
        let b = test_environment_name();
        assert_ne!(a, b);
    }

    #[test]
    fn test_lock_key_for_test_environment() {
        let env = test_environment_name();
        assert_eq!(test_lock_key(&env), format!("{env}.lock"));
    }
}
