//! abswap-deployer - blue/green Auto Scaling group swaps
//!
//! This crate provides the `abswap` binary that brings up the inactive
//! fleet of an A/B environment step by step, verifies it at the fleet and
//! load balancer level, and drains the previously active fleet.

pub mod aws;
pub mod capacity;
pub mod config;
pub mod error;
pub mod fleet;
pub mod health;
pub mod lock;
pub mod orchestrator;
pub mod wait;

pub use config::{RunConfig, RunMode};
pub use error::DeployError;
pub use orchestrator::{DeployReport, Orchestrator};
