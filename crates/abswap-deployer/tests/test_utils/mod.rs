//! Shared test utilities for integration tests
//!
//! An in-memory stand-in for Auto Scaling, Classic ELB and the S3 lock
//! bucket. Instances move through their lifecycle as the deployer observes
//! them, so runs progress in a few poll cycles of virtual time.

#![allow(dead_code)]

use abswap_common::{LifecycleState, TargetState, lock_key};
use abswap_deployer::aws::{AutoScalingOperations, AwsError, LoadBalancerOperations};
use abswap_deployer::config::{CapacityConfig, RunConfig, RunMode};
use abswap_deployer::fleet::{FleetInstance, FleetSnapshot, ScalingActivity, TargetHealth};
use abswap_deployer::lock::{LockMarker, LockStore};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Progress an in-flight activity gains per describe call
const PROGRESS_PER_OBSERVATION: u8 = 50;

/// How the fake load balancer reports registered instances
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalancerBehavior {
    /// InService once the fleet reports the instance InService
    Healthy,
    /// Always OutOfService
    NeverHealthy,
}

#[derive(Debug)]
struct FakeMember {
    instance_id: String,
    lifecycle: LifecycleState,
    observations: u32,
}

#[derive(Debug)]
struct FakeActivity {
    activity_id: String,
    progress: u8,
    /// Instances to launch once the activity completes
    launches: u32,
}

#[derive(Debug, Default)]
struct FakeFleet {
    desired: u32,
    members: Vec<FakeMember>,
    /// Oldest first
    activities: Vec<FakeActivity>,
}

#[derive(Debug)]
struct CloudState {
    fleets: HashMap<String, FakeFleet>,
    next_id: u32,
    capacity_calls: Vec<(String, u32)>,
    describe_calls: u32,
    balancer_calls: u32,
    balancer: BalancerBehavior,
    stall_activities: bool,
    suppress_activities: bool,
    stuck_pending: bool,
}

/// In-memory Auto Scaling and Classic ELB
pub struct FakeCloud {
    state: Mutex<CloudState>,
}

impl Default for FakeCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeCloud {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CloudState {
                fleets: HashMap::new(),
                next_id: 0,
                capacity_calls: Vec::new(),
                describe_calls: 0,
                balancer_calls: 0,
                balancer: BalancerBehavior::Healthy,
                stall_activities: false,
                suppress_activities: false,
                stuck_pending: false,
            }),
        }
    }

    /// Add a group with `desired` capacity and `members` InService instances
    pub fn with_fleet(self, name: &str, desired: u32, members: u32) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let mut fleet = FakeFleet {
                desired,
                ..Default::default()
            };
            for _ in 0..members {
                state.next_id += 1;
                fleet.members.push(FakeMember {
                    instance_id: format!("i-{:08x}", state.next_id),
                    lifecycle: LifecycleState::InService,
                    observations: 0,
                });
            }
            state.fleets.insert(name.to_string(), fleet);
        }
        self
    }

    /// Add `svc-a` and `svc-b` with fully launched members
    pub fn ab(desired_a: u32, desired_b: u32) -> Self {
        Self::new()
            .with_fleet("svc-a", desired_a, desired_a)
            .with_fleet("svc-b", desired_b, desired_b)
    }

    pub fn with_balancer(self, behavior: BalancerBehavior) -> Self {
        self.state.lock().unwrap().balancer = behavior;
        self
    }

    /// Activities start but never progress
    pub fn with_stalled_activities(self) -> Self {
        self.state.lock().unwrap().stall_activities = true;
        self
    }

    /// Capacity changes start no activity at all
    pub fn with_suppressed_activities(self) -> Self {
        self.state.lock().unwrap().suppress_activities = true;
        self
    }

    /// Launched instances never leave Pending
    pub fn with_stuck_pending(self) -> Self {
        self.state.lock().unwrap().stuck_pending = true;
        self
    }

    /// Every desired-capacity change, in order
    pub fn capacity_calls(&self) -> Vec<(String, u32)> {
        self.state.lock().unwrap().capacity_calls.clone()
    }

    pub fn describe_calls(&self) -> u32 {
        self.state.lock().unwrap().describe_calls
    }

    pub fn balancer_calls(&self) -> u32 {
        self.state.lock().unwrap().balancer_calls
    }

    pub fn desired(&self, fleet: &str) -> u32 {
        self.state.lock().unwrap().fleets[fleet].desired
    }

    pub fn member_count(&self, fleet: &str) -> usize {
        self.state.lock().unwrap().fleets[fleet].members.len()
    }

    pub fn all_in_service(&self, fleet: &str) -> bool {
        self.state.lock().unwrap().fleets[fleet]
            .members
            .iter()
            .all(|m| m.lifecycle == LifecycleState::InService)
    }
}

fn not_found(fleet: &str) -> anyhow::Error {
    AwsError::NotFound(format!("Auto Scaling group {fleet}")).into()
}

impl AutoScalingOperations for FakeCloud {
    async fn describe_fleet(&self, fleet: &str) -> Result<FleetSnapshot> {
        let mut state = self.state.lock().unwrap();
        state.describe_calls += 1;
        let stuck = state.stuck_pending;
        let group = state.fleets.get_mut(fleet).ok_or_else(|| not_found(fleet))?;

        for member in &mut group.members {
            if member.lifecycle == LifecycleState::Pending {
                member.observations += 1;
                if member.observations >= 2 && !stuck {
                    member.lifecycle = LifecycleState::InService;
                }
            }
        }

        Ok(FleetSnapshot {
            name: fleet.to_string(),
            desired_capacity: group.desired,
            members: group
                .members
                .iter()
                .map(|m| FleetInstance::new(&m.instance_id, m.lifecycle))
                .collect(),
        })
    }

    async fn set_desired_capacity(&self, fleet: &str, capacity: u32) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.capacity_calls.push((fleet.to_string(), capacity));
        state.next_id += 1;
        let activity_id = format!("act-{}", state.next_id);
        let suppress = state.suppress_activities;
        let group = state.fleets.get_mut(fleet).ok_or_else(|| not_found(fleet))?;

        let current = group.members.len() as u32;
        group.desired = capacity;

        if suppress {
            return Ok(());
        }
        if capacity > current {
            group.activities.push(FakeActivity {
                activity_id,
                progress: 0,
                launches: capacity - current,
            });
        } else if capacity < current {
            group.members.truncate(capacity as usize);
            group.activities.push(FakeActivity {
                activity_id,
                progress: 100,
                launches: 0,
            });
        }
        Ok(())
    }

    async fn describe_scaling_activities(&self, fleet: &str) -> Result<Vec<ScalingActivity>> {
        let mut state = self.state.lock().unwrap();
        let stall = state.stall_activities;
        let mut next_id = state.next_id;
        let group = state.fleets.get_mut(fleet).ok_or_else(|| not_found(fleet))?;

        let mut launched = Vec::new();
        for activity in &mut group.activities {
            if activity.progress >= 100 || stall {
                continue;
            }
            activity.progress = activity
                .progress
                .saturating_add(PROGRESS_PER_OBSERVATION)
                .min(100);
            if activity.progress == 100 {
                for _ in 0..activity.launches {
                    next_id += 1;
                    launched.push(FakeMember {
                        instance_id: format!("i-{next_id:08x}"),
                        lifecycle: LifecycleState::Pending,
                        observations: 0,
                    });
                }
            }
        }
        group.members.extend(launched);

        let activities = group
            .activities
            .iter()
            .rev()
            .map(|a| ScalingActivity {
                activity_id: a.activity_id.clone(),
                progress: a.progress,
                status: Some(if a.progress >= 100 { "Successful" } else { "InProgress" }.into()),
            })
            .collect();

        state.next_id = next_id;
        Ok(activities)
    }
}

impl LoadBalancerOperations for FakeCloud {
    async fn describe_instance_health(
        &self,
        _balancer: &str,
        instance_ids: &[String],
    ) -> Result<Vec<TargetHealth>> {
        let mut state = self.state.lock().unwrap();
        state.balancer_calls += 1;

        let in_service: Vec<&str> = state
            .fleets
            .values()
            .flat_map(|f| f.members.iter())
            .filter(|m| m.lifecycle == LifecycleState::InService)
            .map(|m| m.instance_id.as_str())
            .collect();

        Ok(instance_ids
            .iter()
            .filter(|id| in_service.contains(&id.as_str()))
            .map(|id| TargetHealth {
                instance_id: id.clone(),
                state: match state.balancer {
                    BalancerBehavior::Healthy => TargetState::InService,
                    BalancerBehavior::NeverHealthy => TargetState::OutOfService,
                },
            })
            .collect())
    }
}

/// In-memory lock bucket that counts writes and deletes
#[derive(Default)]
pub struct FakeLockStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    puts: AtomicU32,
    deletes: AtomicU32,
}

impl FakeLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend another run already holds `environment`
    pub fn held_by(environment: &str, run_id: &str) -> Self {
        let store = Self::new();
        let body = serde_json::to_vec(&LockMarker::new(run_id)).unwrap();
        store
            .objects
            .lock()
            .unwrap()
            .insert(lock_key(environment), body);
        store
    }

    pub fn puts(&self) -> u32 {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> u32 {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }
}

impl LockStore for FakeLockStore {
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.objects.lock().unwrap().insert(key.to_string(), body);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.objects.lock().unwrap().get(key).cloned())
    }
}

/// Deploy config for environment `svc` with a balancer and short timeouts
pub fn deploy_config(total: u32, step: u32) -> RunConfig {
    let mut config = RunConfig::new("svc", RunMode::Deploy);
    config.capacity = CapacityConfig { total, step };
    config.timing.poll_interval = Duration::from_secs(5);
    config.timing.phase_timeout = Duration::from_secs(120);
    config.aws.elb_name = Some("svc-elb".to_string());
    config.aws.lock_bucket = Some("locks".to_string());
    config
}

pub fn zero_config() -> RunConfig {
    let mut config = deploy_config(8, 8);
    config.flags.mode = RunMode::Zero;
    config
}
