//! Fleet-state detection
//!
//! Desired capacity decides which fleet is active. A fleet with zero
//! desired capacity that still has members is mid-drain, and a run started
//! on top of it would race the terminations, so detection refuses it.

use super::types::Detection;
use crate::aws::AutoScalingOperations;
use crate::error::DeployError;
use crate::fleet::{FleetId, FleetSnapshot};
use abswap_common::Slot;
use tracing::{debug, info};

fn ensure_settled(snapshot: &FleetSnapshot) -> Result<(), DeployError> {
    if !snapshot.is_active() && !snapshot.members.is_empty() {
        return Err(DeployError::DrainInProgress {
            fleet: snapshot.name.clone(),
            members: snapshot.members.len(),
        });
    }
    Ok(())
}

/// Detect which side of an A/B environment is active.
pub async fn detect_pair<A: AutoScalingOperations>(
    autoscaling: &A,
    environment: &str,
) -> Result<Detection, DeployError> {
    let fleet_a = FleetId::slot(environment, Slot::A);
    let fleet_b = FleetId::slot(environment, Slot::B);
    let a = autoscaling.describe_fleet(&fleet_a.name()).await?;
    let b = autoscaling.describe_fleet(&fleet_b.name()).await?;

    debug!(
        fleet_a = %a.name,
        desired_a = a.desired_capacity,
        members_a = a.members.len(),
        fleet_b = %b.name,
        desired_b = b.desired_capacity,
        members_b = b.members.len(),
        "Described A/B fleets"
    );

    if a.is_active() && b.is_active() {
        return Err(DeployError::BothFleetsActive {
            fleet_a: a.name,
            desired_a: a.desired_capacity,
            fleet_b: b.name,
            desired_b: b.desired_capacity,
        });
    }
    ensure_settled(&a)?;
    ensure_settled(&b)?;

    let detection = if a.is_active() {
        Detection::Active {
            fleet: fleet_a,
            desired: a.desired_capacity,
        }
    } else if b.is_active() {
        Detection::Active {
            fleet: fleet_b,
            desired: b.desired_capacity,
        }
    } else {
        Detection::NoActiveFleet
    };

    info!(environment = %environment, detected = %detection, "Detected fleet state");
    Ok(detection)
}

/// Detect the state of an environment managed as one group.
pub async fn detect_single<A: AutoScalingOperations>(
    autoscaling: &A,
    environment: &str,
) -> Result<Detection, DeployError> {
    let fleet = FleetId::single(environment);
    let snapshot = autoscaling.describe_fleet(&fleet.name()).await?;
    ensure_settled(&snapshot)?;

    let detection = if snapshot.is_active() {
        Detection::Active {
            fleet,
            desired: snapshot.desired_capacity,
        }
    } else {
        Detection::NoActiveFleet
    };

    info!(environment = %environment, detected = %detection, "Detected single fleet state");
    Ok(detection)
}
