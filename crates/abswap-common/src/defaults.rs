//! Default configuration values
//!
//! These match the defaults operators have been deploying with, so pipelines
//! that pass no tuning flags keep their behaviour.

/// Default total capacity for the incoming fleet
pub const DEFAULT_INSTANCE_COUNT: u32 = 8;

/// Default capacity increment per scale-up step
pub const DEFAULT_INSTANCE_COUNT_STEP: u32 = 8;

/// Default delay between control-plane polls, in seconds
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Default wall-clock budget for each phase (scaling, fleet health,
/// balancer health), in seconds
pub const DEFAULT_PHASE_TIMEOUT_SECS: u64 = 600;

/// Maximum number of recent scaling activities fetched per poll
pub const SCALING_ACTIVITY_PAGE_SIZE: i32 = 50;
