//! Fleet data model
//!
//! Plain snapshots of what the control planes report. The deployer never
//! creates or destroys instances itself; it only reads these and changes
//! desired capacity.

use abswap_common::{LifecycleState, Slot, TargetState};
use serde::Serialize;

/// Identity of an Auto Scaling group managed by a swap
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FleetId {
    environment: String,
    slot: Option<Slot>,
}

impl FleetId {
    /// One side of an A/B environment (`<environment>-<slot>`)
    pub fn slot(environment: &str, slot: Slot) -> Self {
        Self {
            environment: environment.to_string(),
            slot: Some(slot),
        }
    }

    /// The single group of an environment without an A/B pair
    pub fn single(environment: &str) -> Self {
        Self {
            environment: environment.to_string(),
            slot: None,
        }
    }

    /// Auto Scaling group name
    pub fn name(&self) -> String {
        match self.slot {
            Some(slot) => slot.fleet_name(&self.environment),
            None => self.environment.clone(),
        }
    }

    pub fn slot_id(&self) -> Option<Slot> {
        self.slot
    }
}

impl std::fmt::Display for FleetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}

/// One member of a fleet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetInstance {
    pub instance_id: String,
    pub lifecycle: LifecycleState,
}

impl FleetInstance {
    pub fn new(instance_id: impl Into<String>, lifecycle: LifecycleState) -> Self {
        Self {
            instance_id: instance_id.into(),
            lifecycle,
        }
    }
}

/// Point-in-time view of an Auto Scaling group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetSnapshot {
    pub name: String,
    pub desired_capacity: u32,
    pub members: Vec<FleetInstance>,
}

impl FleetSnapshot {
    pub fn is_active(&self) -> bool {
        self.desired_capacity > 0
    }

    pub fn in_service_count(&self) -> usize {
        self.members
            .iter()
            .filter(|m| m.lifecycle.is_in_service())
            .count()
    }

    /// Every member is `InService` and there are exactly `expected` of them
    pub fn is_healthy_at(&self, expected: u32) -> bool {
        self.members.len() == expected as usize
            && self.members.iter().all(|m| m.lifecycle.is_in_service())
    }

    pub fn instance_ids(&self) -> Vec<String> {
        self.members.iter().map(|m| m.instance_id.clone()).collect()
    }
}

/// An asynchronous capacity change tracked by the Auto Scaling service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalingActivity {
    pub activity_id: String,
    /// Percent complete, 0-100
    pub progress: u8,
    /// Platform status code (e.g. `Successful`, `Failed`), if reported
    pub status: Option<String>,
}

impl ScalingActivity {
    pub fn is_complete(&self) -> bool {
        self.progress >= 100
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status.as_deref(), Some("Failed") | Some("Cancelled"))
    }
}

/// Load balancer view of one instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetHealth {
    pub instance_id: String,
    pub state: TargetState,
}
