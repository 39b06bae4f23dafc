//! Run report types

use crate::config::RunMode;
use crate::fleet::FleetId;
use crate::lock::LockMarker;
use serde::Serialize;
use std::fmt;

/// Observed A/B state at the start of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Detection {
    /// No fleet has desired capacity
    NoActiveFleet,
    /// Exactly one fleet has desired capacity
    Active { fleet: FleetId, desired: u32 },
}

impl Detection {
    pub fn active_fleet(&self) -> Option<&FleetId> {
        match self {
            Self::NoActiveFleet => None,
            Self::Active { fleet, .. } => Some(fleet),
        }
    }
}

impl fmt::Display for Detection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoActiveFleet => f.write_str("no active fleet"),
            Self::Active { fleet, desired } => write!(f, "{fleet} active (desired {desired})"),
        }
    }
}

/// Orchestrator state machine phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeployPhase {
    Validate,
    Lock,
    Detect,
    ScalingUp,
    FleetHealth,
    BalancerHealth,
    Draining,
    Done,
    Failed,
}

/// One entered phase, in order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseLog {
    pub phase: DeployPhase,
    /// Fleet or balancer the phase acted on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Cumulative capacity target of the scale-up step, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<u32>,
    /// Seconds since the run started when the phase was entered
    pub at_secs: f64,
}

/// Outcome of a successful (or dry) run
#[derive(Debug, Clone, Serialize)]
pub struct DeployReport {
    pub run_id: String,
    pub environment: String,
    pub mode: RunMode,
    pub dry_run: bool,
    pub detection: Detection,
    /// Fleet that was scaled up
    pub target_fleet: Option<String>,
    /// Fleet that was set to zero
    pub drained_fleet: Option<String>,
    /// Step targets the run would apply
    pub planned_steps: Vec<u32>,
    /// Step targets that were applied and verified
    pub completed_steps: Vec<u32>,
    /// Whether another run holds the environment lock (dry runs only)
    pub locked: bool,
    /// Marker left by the current holder, if readable (dry runs only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_holder: Option<LockMarker>,
    pub phases: Vec<PhaseLog>,
    pub elapsed_secs: f64,
}

impl fmt::Display for DeployReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let heading = if self.dry_run { "Plan" } else { "Result" };
        writeln!(f, "{heading} for {} ({}):", self.environment, self.mode)?;
        writeln!(f, "  detected:  {}", self.detection)?;

        if let Some(target) = &self.target_fleet {
            let steps = if self.dry_run {
                &self.planned_steps
            } else {
                &self.completed_steps
            };
            let steps = steps
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(" -> ");
            writeln!(f, "  scale up:  {target} [{steps}]")?;
        }
        if let Some(drained) = &self.drained_fleet {
            writeln!(f, "  drain:     {drained} -> 0")?;
        }
        if self.dry_run {
            match (&self.lock_holder, self.locked) {
                (Some(marker), _) => writeln!(
                    f,
                    "  lock:      held by {} (run {}, since {})",
                    marker.holder, marker.run_id, marker.acquired_at
                )?,
                (None, true) => writeln!(f, "  lock:      held")?,
                (None, false) => writeln!(f, "  lock:      not held")?,
            }
        }
        write!(f, "  elapsed:   {:.1}s", self.elapsed_secs)
    }
}
