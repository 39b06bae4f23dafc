//! Fleet-level and balancer-level health probes
//!
//! Both probes are thin adapters over [`poll_until`]: each supplies a check
//! and maps a timeout to its own error.

use crate::aws::{AutoScalingOperations, LoadBalancerOperations};
use crate::error::{DeployError, FleetWaitStage};
use crate::wait::{Deadline, PollConfig, poll_until};
use abswap_common::TargetState;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Waits for a fleet's members to exist and reach `InService`
pub struct FleetHealthProbe<'a, A> {
    autoscaling: &'a A,
    poll_interval: Duration,
    cancel: Option<&'a CancellationToken>,
}

impl<'a, A: AutoScalingOperations> FleetHealthProbe<'a, A> {
    pub fn new(
        autoscaling: &'a A,
        poll_interval: Duration,
        cancel: Option<&'a CancellationToken>,
    ) -> Self {
        Self {
            autoscaling,
            poll_interval,
            cancel,
        }
    }

    /// Wait until `fleet` has exactly `expected` members, all `InService`.
    ///
    /// Membership and lifecycle are waited for in turn, sharing `deadline`.
    pub async fn wait(
        &self,
        fleet: &str,
        expected: u32,
        deadline: Deadline,
    ) -> Result<(), DeployError> {
        let config = PollConfig::new(self.poll_interval, deadline);
        let autoscaling = self.autoscaling;
        let timeout = move |stage: FleetWaitStage| {
            move |elapsed: Duration| DeployError::FleetHealthTimeout {
                fleet: fleet.to_string(),
                stage,
                expected,
                elapsed,
            }
        };

        poll_until(
            config,
            self.cancel,
            move || async move {
                let snapshot = autoscaling.describe_fleet(fleet).await?;
                debug!(
                    fleet = %fleet,
                    members = snapshot.members.len(),
                    expected,
                    "Checking fleet membership"
                );
                Ok::<_, DeployError>(snapshot.members.len() == expected as usize)
            },
            &format!("{fleet} membership"),
        )
        .await
        .map_err(|e| DeployError::from_wait(e, timeout(FleetWaitStage::Membership)))?;

        poll_until(
            config,
            self.cancel,
            move || async move {
                let snapshot = autoscaling.describe_fleet(fleet).await?;
                debug!(
                    fleet = %fleet,
                    in_service = snapshot.in_service_count(),
                    leaving = snapshot.members.iter().filter(|m| m.lifecycle.is_leaving()).count(),
                    expected,
                    "Checking fleet lifecycle"
                );
                Ok::<_, DeployError>(snapshot.is_healthy_at(expected))
            },
            &format!("{fleet} lifecycle"),
        )
        .await
        .map_err(|e| DeployError::from_wait(e, timeout(FleetWaitStage::Lifecycle)))?;

        info!(fleet = %fleet, expected, elapsed = ?deadline.elapsed(), "Fleet healthy");
        Ok(())
    }
}

/// Waits for a balancer to report a set of instances `InService`
pub struct BalancerHealthProbe<'a, B> {
    balancer: &'a B,
    poll_interval: Duration,
    cancel: Option<&'a CancellationToken>,
}

impl<'a, B: LoadBalancerOperations> BalancerHealthProbe<'a, B> {
    pub fn new(
        balancer: &'a B,
        poll_interval: Duration,
        cancel: Option<&'a CancellationToken>,
    ) -> Self {
        Self {
            balancer,
            poll_interval,
            cancel,
        }
    }

    /// Wait until every instance in `instance_ids` is `InService` on
    /// `balancer`. Instances missing from the balancer's answer count as
    /// not yet healthy.
    pub async fn wait(
        &self,
        balancer: &str,
        instance_ids: &[String],
        deadline: Deadline,
    ) -> Result<(), DeployError> {
        if instance_ids.is_empty() {
            // An empty describe would report every registered instance
            debug!(balancer = %balancer, "No instances to check");
            return Ok(());
        }

        let elb = self.balancer;
        poll_until(
            PollConfig::new(self.poll_interval, deadline),
            self.cancel,
            move || async move {
                let states = elb.describe_instance_health(balancer, instance_ids).await?;
                let by_id: HashMap<&str, TargetState> = states
                    .iter()
                    .map(|t| (t.instance_id.as_str(), t.state))
                    .collect();
                let in_service = instance_ids
                    .iter()
                    .filter(|id| by_id.get(id.as_str()).is_some_and(|s| s.is_in_service()))
                    .count();
                debug!(
                    balancer = %balancer,
                    in_service,
                    expected = instance_ids.len(),
                    "Checking balancer health"
                );
                Ok::<_, DeployError>(in_service == instance_ids.len())
            },
            &format!("{balancer} instance health"),
        )
        .await
        .map_err(|e| {
            DeployError::from_wait(e, |elapsed| DeployError::BalancerHealthTimeout {
                balancer: balancer.to_string(),
                instances: instance_ids.len(),
                elapsed,
            })
        })?;

        info!(
            balancer = %balancer,
            instances = instance_ids.len(),
            elapsed = ?deadline.elapsed(),
            "Balancer reports all instances InService"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::autoscaling::MockAutoScalingOperations;
    use crate::aws::elb::MockLoadBalancerOperations;
    use crate::fleet::{FleetInstance, FleetSnapshot, TargetHealth};
    use abswap_common::LifecycleState;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn snapshot(states: &[LifecycleState]) -> FleetSnapshot {
        FleetSnapshot {
            name: "svc-a".into(),
            desired_capacity: 2,
            members: states
                .iter()
                .enumerate()
                .map(|(i, s)| FleetInstance::new(format!("i-{i}"), *s))
                .collect(),
        }
    }

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("i-{i}")).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_fleet_probe_waits_for_members_then_lifecycle() {
        use LifecycleState::*;
        let sequence = vec![
            snapshot(&[]),
            snapshot(&[Pending]),
            snapshot(&[Pending, Pending]),
            snapshot(&[InService, Pending]),
            snapshot(&[InService, InService]),
        ];
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let mut mock = MockAutoScalingOperations::new();
        mock.expect_describe_fleet().returning(move |_| {
            let n = counter.fetch_add(1, Ordering::SeqCst) as usize;
            Ok(sequence[n.min(sequence.len() - 1)].clone())
        });

        let probe = FleetHealthProbe::new(&mock, Duration::from_secs(5), None);
        probe
            .wait("svc-a", 2, Deadline::after(Duration::from_secs(60)))
            .await
            .unwrap();

        // three membership checks, then lifecycle from the third snapshot on
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fleet_probe_membership_timeout() {
        let mut mock = MockAutoScalingOperations::new();
        mock.expect_describe_fleet()
            .returning(|_| Ok(snapshot(&[LifecycleState::InService])));

        let probe = FleetHealthProbe::new(&mock, Duration::from_secs(5), None);
        let err = probe
            .wait("svc-a", 2, Deadline::after(Duration::from_secs(20)))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DeployError::FleetHealthTimeout {
                stage: FleetWaitStage::Membership,
                expected: 2,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fleet_probe_lifecycle_timeout_shares_deadline() {
        let mut mock = MockAutoScalingOperations::new();
        mock.expect_describe_fleet().returning(|_| {
            Ok(snapshot(&[LifecycleState::InService, LifecycleState::Pending]))
        });

        let probe = FleetHealthProbe::new(&mock, Duration::from_secs(5), None);
        let err = probe
            .wait("svc-a", 2, Deadline::after(Duration::from_secs(20)))
            .await
            .unwrap_err();

        match err {
            DeployError::FleetHealthTimeout { stage, elapsed, .. } => {
                assert_eq!(stage, FleetWaitStage::Lifecycle);
                assert_eq!(elapsed, Duration::from_secs(20));
            }
            other => panic!("Expected FleetHealthTimeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fleet_probe_rejects_extra_members() {
        use LifecycleState::*;
        let mut mock = MockAutoScalingOperations::new();
        mock.expect_describe_fleet()
            .returning(|_| Ok(snapshot(&[InService, InService, InService])));

        let probe = FleetHealthProbe::new(&mock, Duration::from_secs(5), None);
        let err = probe
            .wait("svc-a", 2, Deadline::after(Duration::from_secs(10)))
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::FleetHealthTimeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_balancer_probe_treats_missing_as_unhealthy() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let mut mock = MockLoadBalancerOperations::new();
        mock.expect_describe_instance_health()
            .withf(|balancer, ids| balancer == "svc-elb" && ids.len() == 2)
            .returning(move |_, _| {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let mut states = vec![TargetHealth {
                    instance_id: "i-0".into(),
                    state: TargetState::InService,
                }];
                if n >= 2 {
                    states.push(TargetHealth {
                        instance_id: "i-1".into(),
                        state: TargetState::InService,
                    });
                }
                Ok(states)
            });

        let probe = BalancerHealthProbe::new(&mock, Duration::from_secs(5), None);
        probe
            .wait("svc-elb", &ids(2), Deadline::after(Duration::from_secs(60)))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_balancer_probe_timeout() {
        let mut mock = MockLoadBalancerOperations::new();
        mock.expect_describe_instance_health().returning(|_, ids| {
            Ok(ids
                .iter()
                .map(|id| TargetHealth {
                    instance_id: id.clone(),
                    state: TargetState::OutOfService,
                })
                .collect())
        });

        let probe = BalancerHealthProbe::new(&mock, Duration::from_secs(5), None);
        let err = probe
            .wait("svc-elb", &ids(4), Deadline::after(Duration::from_secs(30)))
            .await
            .unwrap_err();

        match err {
            DeployError::BalancerHealthTimeout {
                balancer,
                instances,
                elapsed,
            } => {
                assert_eq!(balancer, "svc-elb");
                assert_eq!(instances, 4);
                assert_eq!(elapsed, Duration::from_secs(30));
            }
            other => panic!("Expected BalancerHealthTimeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_balancer_probe_empty_set_is_healthy() {
        let mut mock = MockLoadBalancerOperations::new();
        mock.expect_describe_instance_health().never();

        let probe = BalancerHealthProbe::new(&mock, Duration::from_secs(5), None);
        probe
            .wait("svc-elb", &[], Deadline::after(Duration::from_secs(30)))
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_balancer_probe_cancelled() {
        let mut mock = MockLoadBalancerOperations::new();
        mock.expect_describe_instance_health().returning(|_, _| Ok(Vec::new()));

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(12)).await;
            canceller.cancel();
        });

        let probe = BalancerHealthProbe::new(&mock, Duration::from_secs(5), Some(&token));
        let err = probe
            .wait("svc-elb", &ids(1), Deadline::after(Duration::from_secs(600)))
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::Interrupted { .. }));
    }
}
