//! Fleet slots
//!
//! An A/B environment `svc` is made of two Auto Scaling groups, `svc-a`
//! and `svc-b`. At most one of them carries traffic at a time.

use serde::{Deserialize, Serialize};

/// One side of an A/B environment
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum Slot {
    #[strum(serialize = "a")]
    A,
    #[strum(serialize = "b")]
    B,
}

impl Slot {
    /// The opposite slot
    pub fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }

    /// Auto Scaling group name for this slot of `environment`
    pub fn fleet_name(self, environment: &str) -> String {
        format!("{environment}-{self}")
    }
}
