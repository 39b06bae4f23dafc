//! Auto Scaling group access
//!
//! The three calls a swap needs from the compute control plane: read a
//! group, change its desired capacity, and list its scaling activities.

use crate::aws::context::AwsContext;
use crate::aws::error::{AwsError, classify_sdk_error};
use crate::fleet::{FleetInstance, FleetSnapshot, ScalingActivity};
use abswap_common::LifecycleState;
use abswap_common::defaults::SCALING_ACTIVITY_PAGE_SIZE;
use anyhow::{Context, Result};
use aws_sdk_autoscaling::Client;
use tracing::debug;

/// Trait for Auto Scaling operations that can be mocked in tests.
///
/// Abstracts the control plane so the capacity controller, the fleet
/// probe and the orchestrator can be exercised without real AWS.
#[allow(async_fn_in_trait)] // Internal use only, Send+Sync bounds on trait are sufficient
#[cfg_attr(test, mockall::automock)]
pub trait AutoScalingOperations: Send + Sync {
    /// Desired capacity and members of a group
    async fn describe_fleet(&self, fleet: &str) -> Result<FleetSnapshot>;

    /// Set a group's desired capacity
    async fn set_desired_capacity(&self, fleet: &str, capacity: u32) -> Result<()>;

    /// Most recent scaling activities for a group, newest first
    async fn describe_scaling_activities(&self, fleet: &str) -> Result<Vec<ScalingActivity>>;
}

/// Auto Scaling client for managing A/B fleets
pub struct AutoScalingClient {
    client: Client,
}

impl AutoScalingClient {
    /// Create an Auto Scaling client from a pre-loaded AWS context
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.autoscaling_client(),
        }
    }
}

/// Members the model marks required come back bare, optional ones wrapped
/// in `Option`; accept either shape.
fn optional<T>(value: impl Into<Option<T>>) -> Option<T> {
    value.into()
}

impl AutoScalingOperations for AutoScalingClient {
    async fn describe_fleet(&self, fleet: &str) -> Result<FleetSnapshot> {
        let response = self
            .client
            .describe_auto_scaling_groups()
            .auto_scaling_group_names(fleet)
            .max_records(1)
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))
            .with_context(|| format!("Failed to describe Auto Scaling group {fleet}"))?;

        let group = response
            .auto_scaling_groups()
            .first()
            .ok_or_else(|| AwsError::NotFound(format!("Auto Scaling group {fleet}")))?;

        let desired = optional::<i32>(group.desired_capacity()).unwrap_or(0);
        let members = group
            .instances()
            .iter()
            .filter_map(|instance| {
                let id = optional::<&str>(instance.instance_id())?;
                let lifecycle = optional::<&aws_sdk_autoscaling::types::LifecycleState>(
                    instance.lifecycle_state(),
                )
                .map(|s| LifecycleState::parse(s.as_str()))
                .unwrap_or(LifecycleState::Unknown);
                Some(FleetInstance::new(id, lifecycle))
            })
            .collect::<Vec<_>>();

        debug!(
            fleet = %fleet,
            desired,
            members = members.len(),
            "Described Auto Scaling group"
        );

        Ok(FleetSnapshot {
            name: fleet.to_string(),
            desired_capacity: u32::try_from(desired).unwrap_or(0),
            members,
        })
    }

    async fn set_desired_capacity(&self, fleet: &str, capacity: u32) -> Result<()> {
        let capacity = i32::try_from(capacity)
            .with_context(|| format!("Desired capacity {capacity} out of range"))?;

        self.client
            .set_desired_capacity()
            .auto_scaling_group_name(fleet)
            .desired_capacity(capacity)
            .honor_cooldown(false)
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))
            .with_context(|| format!("Failed to set desired capacity of {fleet} to {capacity}"))?;

        Ok(())
    }

    async fn describe_scaling_activities(&self, fleet: &str) -> Result<Vec<ScalingActivity>> {
        let response = self
            .client
            .describe_scaling_activities()
            .auto_scaling_group_name(fleet)
            .max_records(SCALING_ACTIVITY_PAGE_SIZE)
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))
            .with_context(|| format!("Failed to describe scaling activities of {fleet}"))?;

        let activities = response
            .activities()
            .iter()
            .filter_map(|activity| {
                let activity_id = optional::<&str>(activity.activity_id())?;
                let progress = optional::<i32>(activity.progress()).unwrap_or(0);
                let status = optional::<&aws_sdk_autoscaling::types::ScalingActivityStatusCode>(
                    activity.status_code(),
                )
                .map(|s| s.as_str().to_string());
                Some(ScalingActivity {
                    activity_id: activity_id.to_string(),
                    progress: progress.clamp(0, 100) as u8,
                    status,
                })
            })
            .collect();

        Ok(activities)
    }
}
