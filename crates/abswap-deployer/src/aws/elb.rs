//! Classic Load Balancer instance health

use crate::aws::context::AwsContext;
use crate::aws::error::classify_sdk_error;
use crate::fleet::TargetHealth;
use abswap_common::TargetState;
use anyhow::{Context, Result};
use aws_sdk_elasticloadbalancing::Client;
use aws_sdk_elasticloadbalancing::types::Instance;
use tracing::debug;

/// Trait for load balancer operations that can be mocked in tests.
#[allow(async_fn_in_trait)] // Internal use only, Send+Sync bounds on trait are sufficient
#[cfg_attr(test, mockall::automock)]
pub trait LoadBalancerOperations: Send + Sync {
    /// Health of the given instances as seen by `balancer`.
    ///
    /// Instances the balancer does not know about are left out of the
    /// result rather than reported as an error.
    async fn describe_instance_health(
        &self,
        balancer: &str,
        instance_ids: &[String],
    ) -> Result<Vec<TargetHealth>>;
}

/// Classic ELB client
pub struct ElbClient {
    client: Client,
}

impl ElbClient {
    /// Create an ELB client from a pre-loaded AWS context
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.elb_client(),
        }
    }
}

impl LoadBalancerOperations for ElbClient {
    async fn describe_instance_health(
        &self,
        balancer: &str,
        instance_ids: &[String],
    ) -> Result<Vec<TargetHealth>> {
        let instances = instance_ids
            .iter()
            .map(|id| Instance::builder().instance_id(id).build())
            .collect::<Vec<_>>();

        let response = match self
            .client
            .describe_instance_health()
            .load_balancer_name(balancer)
            .set_instances(Some(instances))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let classified = classify_sdk_error(&e);
                // Newly launched instances are rejected until the group
                // registers them with the balancer
                if classified.is_instance_not_registered() {
                    debug!(balancer = %balancer, error = %classified, "Instances not registered yet");
                    return Ok(Vec::new());
                }
                return Err(classified).with_context(|| {
                    format!("Failed to describe instance health on load balancer {balancer}")
                });
            }
        };

        let states = response
            .instance_states()
            .iter()
            .filter_map(|state| {
                Some(TargetHealth {
                    instance_id: state.instance_id()?.to_string(),
                    state: state
                        .state()
                        .map(TargetState::parse)
                        .unwrap_or_default(),
                })
            })
            .collect();

        Ok(states)
    }
}
