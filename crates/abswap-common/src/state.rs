//! Instance lifecycle and balancer health states
//!
//! String forms match what the Auto Scaling and Classic ELB APIs return.
//! Values the APIs may add later parse to `Unknown` instead of failing.

/// Lifecycle state of an Auto Scaling group member
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::AsRefStr,
)]
pub enum LifecycleState {
    #[strum(serialize = "Pending")]
    Pending,
    #[strum(serialize = "Pending:Wait")]
    PendingWait,
    #[strum(serialize = "Pending:Proceed")]
    PendingProceed,
    #[strum(serialize = "Quarantined")]
    Quarantined,
    #[strum(serialize = "InService")]
    InService,
    #[strum(serialize = "EnteringStandby")]
    EnteringStandby,
    #[strum(serialize = "Standby")]
    Standby,
    #[strum(serialize = "Detaching")]
    Detaching,
    #[strum(serialize = "Detached")]
    Detached,
    #[strum(serialize = "Terminating")]
    Terminating,
    #[strum(serialize = "Terminating:Wait")]
    TerminatingWait,
    #[strum(serialize = "Terminating:Proceed")]
    TerminatingProceed,
    #[strum(serialize = "Terminated")]
    Terminated,
    #[strum(serialize = "Unknown")]
    Unknown,
}

impl LifecycleState {
    /// Parse an API string, mapping unrecognised values to `Unknown`
    pub fn parse(s: &str) -> Self {
        s.parse().unwrap_or(Self::Unknown)
    }

    pub fn is_in_service(self) -> bool {
        self == Self::InService
    }

    /// Instance is on its way out of the group
    pub fn is_leaving(self) -> bool {
        matches!(
            self,
            Self::Terminating
                | Self::TerminatingWait
                | Self::TerminatingProceed
                | Self::Terminated
                | Self::Detaching
                | Self::Detached
        )
    }
}

/// Instance health as reported by the load balancer
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
pub enum TargetState {
    #[strum(serialize = "InService")]
    InService,
    #[strum(serialize = "OutOfService")]
    OutOfService,
    #[default]
    #[strum(serialize = "Unknown")]
    Unknown,
}

impl TargetState {
    /// Parse an API string, mapping unrecognised values to `Unknown`
    pub fn parse(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }

    pub fn is_in_service(self) -> bool {
        self == Self::InService
    }
}
