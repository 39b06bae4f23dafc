//! AWS client modules for the deployer
//!
//! This module provides wrappers around AWS SDK clients for:
//! - Auto Scaling: fleet state, desired capacity and scaling activities
//! - Classic ELB: per-instance health
//! - S3: environment lock objects

pub mod autoscaling;
pub mod context;
pub mod elb;
pub mod error;
pub mod s3;

// Core clients
pub use autoscaling::{AutoScalingClient, AutoScalingOperations};
pub use context::AwsContext;
pub use elb::{ElbClient, LoadBalancerOperations};
pub use s3::S3LockStore;

// Error handling
pub use error::{AwsError, classify_aws_error, classify_sdk_error, find_aws_error};
