//! Terminal errors for a swap run
//!
//! Every error here ends the run: nothing is retried beyond the polling a
//! phase already does. Each variant carries enough context (fleet, stage,
//! elapsed time) for an operator to clean up by hand, and belongs to an
//! [`ErrorFamily`] that decides the process exit code.

use crate::wait::WaitError;
use abswap_common::ErrorFamily;
use std::time::Duration;
use thiserror::Error;

/// Which half of the fleet health wait was running when it gave up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum FleetWaitStage {
    /// Waiting for the member count to reach the target
    Membership,
    /// Waiting for every member to be `InService`
    Lifecycle,
}

/// Lock store operation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum LockOperation {
    Check,
    Acquire,
    Release,
    Read,
}

#[derive(Debug, Error)]
pub enum DeployError {
    /// Invalid flags or an impossible request for the observed fleet state
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Both A/B fleets have nonzero desired capacity
    #[error(
        "Both {fleet_a} (desired {desired_a}) and {fleet_b} (desired {desired_b}) are active; manual intervention required"
    )]
    BothFleetsActive {
        fleet_a: String,
        desired_a: u32,
        fleet_b: String,
        desired_b: u32,
    },

    /// A fleet with zero desired capacity still has members
    #[error("{fleet} is still draining ({members} instances left); retry once it is empty")]
    DrainInProgress { fleet: String, members: usize },

    /// Another run holds the environment lock
    #[error("Environment {environment} is locked (s3 key {key}); unable to proceed")]
    LockContention { environment: String, key: String },

    /// The lock object could not be read, written or deleted
    #[error("Failed to {operation} lock for environment {environment}")]
    LockStore {
        environment: String,
        operation: LockOperation,
        #[source]
        source: anyhow::Error,
    },

    /// A capacity increase produced no scaling activity
    #[error("No scaling activity appeared for {fleet} after raising capacity to {desired}")]
    NoActivity { fleet: String, desired: u32 },

    #[error(
        "Scaling activities for {fleet} (desired {desired}) did not complete within {elapsed:?}; a manual clean up is likely"
    )]
    ScalingTimeout {
        fleet: String,
        desired: u32,
        elapsed: Duration,
    },

    #[error(
        "{fleet} did not become healthy within {elapsed:?} (stuck in {stage} wait for {expected} instances); a manual clean up is likely"
    )]
    FleetHealthTimeout {
        fleet: String,
        stage: FleetWaitStage,
        expected: u32,
        elapsed: Duration,
    },

    #[error(
        "Load balancer {balancer} did not report {instances} instances InService within {elapsed:?}; a manual clean up is likely"
    )]
    BalancerHealthTimeout {
        balancer: String,
        instances: usize,
        elapsed: Duration,
    },

    /// Operator interrupted the run
    #[error("Interrupted while waiting for {what}")]
    Interrupted { what: String },

    /// Control-plane API failure
    #[error(transparent)]
    Aws(#[from] anyhow::Error),
}

impl DeployError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn lock_store(
        environment: impl Into<String>,
        operation: LockOperation,
        source: anyhow::Error,
    ) -> Self {
        Self::LockStore {
            environment: environment.into(),
            operation,
            source,
        }
    }

    /// Exit status family for this error
    pub fn family(&self) -> ErrorFamily {
        match self {
            Self::Configuration(_)
            | Self::BothFleetsActive { .. }
            | Self::DrainInProgress { .. }
            | Self::LockContention { .. } => ErrorFamily::Validation,
            Self::NoActivity { .. }
            | Self::ScalingTimeout { .. }
            | Self::FleetHealthTimeout { .. }
            | Self::BalancerHealthTimeout { .. } => ErrorFamily::Timeout,
            Self::Interrupted { .. } => ErrorFamily::Interrupted,
            Self::LockStore { .. } | Self::Aws(_) => ErrorFamily::Runtime,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.family().exit_code()
    }

    /// Map a polling failure, building the phase-specific timeout from the
    /// elapsed time.
    pub(crate) fn from_wait(
        err: WaitError<DeployError>,
        on_timeout: impl FnOnce(Duration) -> DeployError,
    ) -> Self {
        match err {
            WaitError::Timeout { elapsed, .. } => on_timeout(elapsed),
            WaitError::Cancelled { what } => Self::Interrupted { what },
            WaitError::Check(e) => e,
        }
    }
}
