//! AWS error classification
//!
//! Classifies SDK failures by their error code (via `ProvideErrorMetadata`)
//! instead of string matching on Debug output, so adapters can tell
//! "not there yet" apart from real failures.

use aws_sdk_s3::error::ProvideErrorMetadata;
use thiserror::Error;

/// AWS error categories the adapters act on
#[derive(Debug, Error)]
pub enum AwsError {
    /// Object or group does not exist
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Classic ELB rejected an instance it does not have registered
    #[error("Instance not registered with load balancer: {0}")]
    InstanceNotRegistered(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded")]
    Throttled,

    /// Credentials lack permission for the call
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Generic AWS SDK error with code and message
    #[error("AWS error: {message}")]
    Sdk {
        code: Option<String>,
        message: String,
    },
}

impl AwsError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, AwsError::NotFound(_))
    }

    pub fn is_instance_not_registered(&self) -> bool {
        matches!(self, AwsError::InstanceNotRegistered(_))
    }

    /// A user-facing hint for resolving this error, if one is known.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            AwsError::AccessDenied(_) => Some(
                "Check that the credentials allow autoscaling:*Describe*, autoscaling:SetDesiredCapacity, \
                 elasticloadbalancing:DescribeInstanceHealth and s3 Get/Put/Delete/ListBucket on the lock bucket.",
            ),
            AwsError::Throttled => {
                Some("Increase --poll-interval to reduce API call volume.")
            }
            _ => None,
        }
    }
}

const NOT_FOUND_CODES: &[&str] = &["NoSuchKey", "NoSuchBucket", "NotFound", "LoadBalancerNotFound"];

const THROTTLING_CODES: &[&str] = &["Throttling", "ThrottlingException", "RequestLimitExceeded"];

const ACCESS_DENIED_CODES: &[&str] = &["AccessDenied", "AccessDeniedException", "UnauthorizedOperation"];

/// Classify an AWS error by its code and message.
pub fn classify_aws_error(code: Option<&str>, message: Option<&str>) -> AwsError {
    let message = message.unwrap_or("Unknown error").to_string();

    match code {
        Some(c) if NOT_FOUND_CODES.contains(&c) => AwsError::NotFound(message),
        Some("InvalidInstance") => AwsError::InstanceNotRegistered(message),
        Some(c) if THROTTLING_CODES.contains(&c) => AwsError::Throttled,
        Some(c) if ACCESS_DENIED_CODES.contains(&c) => AwsError::AccessDenied(message),
        _ => AwsError::Sdk {
            code: code.map(|s| s.to_string()),
            message,
        },
    }
}

/// Classify any SDK error that exposes error metadata.
pub fn classify_sdk_error<E: ProvideErrorMetadata>(error: &E) -> AwsError {
    classify_aws_error(error.code(), error.message())
}

/// Find a classified `AwsError` in an anyhow error chain.
pub fn find_aws_error(error: &anyhow::Error) -> Option<&AwsError> {
    error.chain().find_map(|cause| cause.downcast_ref::<AwsError>())
}
