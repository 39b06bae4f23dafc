//! Desired-capacity changes and the scaling activities they start
//!
//! A capacity change is asynchronous: Auto Scaling accepts the new desired
//! count and then launches or terminates instances through scaling
//! activities. [`CapacityController::scale_to`] waits for exactly the
//! activities the change started, identified by diffing against the
//! activity ids that existed before the call.

use crate::aws::AutoScalingOperations;
use crate::error::DeployError;
use crate::fleet::ScalingActivity;
use crate::wait::{Deadline, PollConfig, poll_until, sleep_or_cancel};
use std::collections::HashSet;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Drives desired capacity of one fleet at a time
pub struct CapacityController<'a, A> {
    autoscaling: &'a A,
    poll_interval: Duration,
    cancel: Option<&'a CancellationToken>,
}

impl<'a, A: AutoScalingOperations> CapacityController<'a, A> {
    pub fn new(
        autoscaling: &'a A,
        poll_interval: Duration,
        cancel: Option<&'a CancellationToken>,
    ) -> Self {
        Self {
            autoscaling,
            poll_interval,
            cancel,
        }
    }

    /// Set `fleet` to `desired` and wait for the resulting scaling
    /// activities to reach 100% progress before `deadline`.
    ///
    /// A change that starts no activity is only an error when it raised
    /// capacity: lowering capacity or re-applying the current value can
    /// legitimately be a no-op.
    pub async fn scale_to(
        &self,
        fleet: &str,
        desired: u32,
        deadline: Deadline,
    ) -> Result<(), DeployError> {
        let before = self.autoscaling.describe_fleet(fleet).await?;
        let baseline: HashSet<String> = self
            .autoscaling
            .describe_scaling_activities(fleet)
            .await?
            .into_iter()
            .map(|activity| activity.activity_id)
            .collect();

        info!(
            fleet = %fleet,
            from = before.desired_capacity,
            to = desired,
            "Setting desired capacity"
        );
        self.autoscaling.set_desired_capacity(fleet, desired).await?;

        let what = format!("{fleet} scaling activities");

        // Give the service one interval to register the activity
        let settle = self.poll_interval.min(deadline.remaining());
        if !sleep_or_cancel(settle, self.cancel).await {
            return Err(DeployError::Interrupted { what });
        }

        let started = self.new_activities(fleet, &baseline).await?;
        if started.is_empty() {
            if desired > before.desired_capacity {
                return Err(DeployError::NoActivity {
                    fleet: fleet.to_string(),
                    desired,
                });
            }
            info!(fleet = %fleet, desired, "No scaling activity needed");
            return Ok(());
        }

        info!(
            fleet = %fleet,
            activities = started.len(),
            "Waiting for scaling activities"
        );

        let autoscaling = self.autoscaling;
        let baseline = &baseline;
        poll_until(
            PollConfig::new(self.poll_interval, deadline),
            self.cancel,
            move || async move {
                let activities = Self::fetch_new(autoscaling, fleet, baseline).await?;
                Ok::<_, DeployError>(all_complete(fleet, &activities))
            },
            &what,
        )
        .await
        .map_err(|e| {
            DeployError::from_wait(e, |elapsed| DeployError::ScalingTimeout {
                fleet: fleet.to_string(),
                desired,
                elapsed,
            })
        })?;

        info!(fleet = %fleet, desired, elapsed = ?deadline.elapsed(), "Scaling complete");
        Ok(())
    }

    /// Set `fleet` to zero without waiting for instances to terminate.
    ///
    /// The balancer's connection draining handles in-flight requests.
    pub async fn drain(&self, fleet: &str) -> Result<(), DeployError> {
        info!(fleet = %fleet, "Draining fleet");
        self.autoscaling.set_desired_capacity(fleet, 0).await?;
        Ok(())
    }

    async fn new_activities(
        &self,
        fleet: &str,
        baseline: &HashSet<String>,
    ) -> Result<Vec<ScalingActivity>, DeployError> {
        Self::fetch_new(self.autoscaling, fleet, baseline).await
    }

    async fn fetch_new(
        autoscaling: &A,
        fleet: &str,
        baseline: &HashSet<String>,
    ) -> Result<Vec<ScalingActivity>, DeployError> {
        Ok(autoscaling
            .describe_scaling_activities(fleet)
            .await?
            .into_iter()
            .filter(|activity| !baseline.contains(&activity.activity_id))
            .collect())
    }
}

fn all_complete(fleet: &str, activities: &[ScalingActivity]) -> bool {
    for activity in activities.iter().filter(|a| a.is_failed()) {
        warn!(
            fleet = %fleet,
            activity = %activity.activity_id,
            status = activity.status.as_deref().unwrap_or("unknown"),
            progress = activity.progress,
            "Scaling activity reports failure"
        );
    }

    let complete = activities.iter().filter(|a| a.is_complete()).count();
    debug!(
        fleet = %fleet,
        complete,
        total = activities.len(),
        "Scaling activity progress"
    );
    complete == activities.len()
}
