//! Configuration types for a swap run

use crate::error::DeployError;
use abswap_common::defaults::{
    DEFAULT_INSTANCE_COUNT, DEFAULT_INSTANCE_COUNT_STEP, DEFAULT_PHASE_TIMEOUT_SECS,
    DEFAULT_POLL_INTERVAL_SECS,
};
use serde::Serialize;
use std::time::Duration;

/// What a run does to the environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RunMode {
    /// Bring up the inactive fleet and drain the active one
    Deploy,
    /// Drain the active fleet
    Zero,
}

/// Scale-up sizing
#[derive(Debug, Clone)]
pub struct CapacityConfig {
    /// Desired capacity of the new fleet once the run completes
    pub total: u32,
    /// Capacity added per scale-up step
    pub step: u32,
}

/// Polling cadence and per-phase budgets
#[derive(Debug, Clone)]
pub struct TimingConfig {
    pub poll_interval: Duration,
    /// Wall-clock budget for each scaling or health phase
    pub phase_timeout: Duration,
}

/// AWS resources and credentials
#[derive(Debug, Clone, Default)]
pub struct AwsConfig {
    /// AWS region (falls back to the SDK's provider chain)
    pub region: Option<String>,
    /// AWS profile name (overrides default credential resolution)
    pub aws_profile: Option<String>,
    /// Classic ELB in front of the fleets; balancer checks are skipped without one
    pub elb_name: Option<String>,
    /// S3 bucket holding environment locks; runs are unlocked without one
    pub lock_bucket: Option<String>,
}

/// Runtime behavior flags
#[derive(Debug, Clone)]
pub struct RuntimeFlags {
    pub mode: RunMode,
    /// Manage one group named after the environment instead of an A/B pair
    pub single_fleet: bool,
    /// Detect and report without locking or changing capacity
    pub dry_run: bool,
}

/// Configuration for a swap run
///
/// Built once from the command line and passed by reference; nothing
/// mutates it during a run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub environment: String,
    pub capacity: CapacityConfig,
    pub timing: TimingConfig,
    pub aws: AwsConfig,
    pub flags: RuntimeFlags,
}

impl RunConfig {
    /// Config for `environment` with default sizing and timing
    pub fn new(environment: impl Into<String>, mode: RunMode) -> Self {
        Self {
            environment: environment.into(),
            capacity: CapacityConfig {
                total: DEFAULT_INSTANCE_COUNT,
                step: DEFAULT_INSTANCE_COUNT_STEP,
            },
            timing: TimingConfig {
                poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
                phase_timeout: Duration::from_secs(DEFAULT_PHASE_TIMEOUT_SECS),
            },
            aws: AwsConfig::default(),
            flags: RuntimeFlags {
                mode,
                single_fleet: false,
                dry_run: false,
            },
        }
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }
    pub fn total(&self) -> u32 {
        self.capacity.total
    }
    pub fn step(&self) -> u32 {
        self.capacity.step
    }

    pub fn poll_interval(&self) -> Duration {
        self.timing.poll_interval
    }
    pub fn phase_timeout(&self) -> Duration {
        self.timing.phase_timeout
    }

    pub fn region(&self) -> Option<&str> {
        self.aws.region.as_deref()
    }
    pub fn aws_profile(&self) -> Option<&str> {
        self.aws.aws_profile.as_deref()
    }
    pub fn elb_name(&self) -> Option<&str> {
        self.aws.elb_name.as_deref()
    }
    pub fn lock_bucket(&self) -> Option<&str> {
        self.aws.lock_bucket.as_deref()
    }

    pub fn mode(&self) -> RunMode {
        self.flags.mode
    }
    pub fn single_fleet(&self) -> bool {
        self.flags.single_fleet
    }
    pub fn dry_run(&self) -> bool {
        self.flags.dry_run
    }

    /// Reject configurations no run could satisfy.
    ///
    /// Called before the lock is taken, so a bad flag never touches the
    /// environment.
    pub fn validate(&self) -> Result<(), DeployError> {
        if self.environment.trim().is_empty() {
            return Err(DeployError::configuration("environment name is empty"));
        }
        if self.timing.poll_interval.is_zero() {
            return Err(DeployError::configuration("poll interval must be positive"));
        }
        if self.timing.phase_timeout.is_zero() {
            return Err(DeployError::configuration("phase timeout must be positive"));
        }

        if self.flags.mode == RunMode::Deploy {
            let (total, step) = (self.capacity.total, self.capacity.step);
            if total == 0 {
                return Err(DeployError::configuration("instance count must be positive"));
            }
            if step == 0 {
                return Err(DeployError::configuration(
                    "instance count step must be positive",
                ));
            }
            if total % step != 0 {
                return Err(DeployError::configuration(format!(
                    "instance count step {step} must evenly divide instance count {total}"
                )));
            }
        }

        Ok(())
    }

    /// Cumulative scale-up targets: `step, 2*step, ..., total`
    pub fn step_targets(&self) -> Vec<u32> {
        let (total, step) = (self.capacity.total, self.capacity.step);
        if step == 0 {
            return Vec::new();
        }
        (1..=total / step).map(|i| i * step).collect()
    }
}
