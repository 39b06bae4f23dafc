//! abswap-common - Shared types and constants
//!
//! This crate holds the vocabulary shared by the deployer and its test
//! helpers, without any AWS SDK dependencies to keep it lightweight.
//!
//! ## Modules
//!
//! - [`defaults`]: Default CLI/configuration values
//! - [`exit`]: Process exit status families
//! - [`slot`]: The `a`/`b` fleet slots of an environment
//! - [`state`]: Instance lifecycle and balancer health states

pub mod defaults;
pub mod exit;
pub mod slot;
pub mod state;

pub use exit::ErrorFamily;
pub use slot::Slot;
pub use state::{LifecycleState, TargetState};

/// Suffix appended to an environment name to form its lock object key.
pub const LOCK_KEY_SUFFIX: &str = ".lock";

/// Lock object key for an environment (e.g. `svc` -> `svc.lock`).
#[inline]
pub fn lock_key(environment: &str) -> String {
    format!("{environment}{LOCK_KEY_SUFFIX}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_key() {
        assert_eq!(lock_key("svc"), "svc.lock");
        assert_eq!(lock_key("prod-api"), "prod-api.lock");
    }
}
