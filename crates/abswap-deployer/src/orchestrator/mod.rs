//! Swap orchestration
//!
//! Drives one run end to end: validate, lock, detect, scale the target
//! fleet up step by step with fleet and balancer health checks after each
//! step, drain the source fleet, unlock. Every failure is terminal; the
//! environment is left as the last successful step set it.

pub mod detect;
pub mod types;

pub use detect::{detect_pair, detect_single};
pub use types::{DeployPhase, DeployReport, Detection, PhaseLog};

use crate::aws::{AutoScalingOperations, LoadBalancerOperations};
use crate::capacity::CapacityController;
use crate::config::{RunConfig, RunMode};
use crate::error::DeployError;
use crate::fleet::FleetId;
use crate::health::{BalancerHealthProbe, FleetHealthProbe};
use crate::lock::{LockManager, LockMarker, LockStore};
use crate::wait::Deadline;
use abswap_common::{Slot, lock_key};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Fleets a run acts on, decided from the detected state
#[derive(Debug, Clone)]
struct Plan {
    detection: Detection,
    /// Fleet to scale up, if any
    target: Option<FleetId>,
    /// Fleet to set to zero afterwards, if any
    drain: Option<FleetId>,
}

/// Phase history of the run in progress
struct RunState {
    started: Instant,
    phases: Vec<PhaseLog>,
    completed_steps: Vec<u32>,
}

impl RunState {
    fn start() -> Self {
        Self {
            started: Instant::now(),
            phases: Vec::new(),
            completed_steps: Vec::new(),
        }
    }

    fn enter(&mut self, phase: DeployPhase, subject: Option<&str>, target: Option<u32>) {
        self.phases.push(PhaseLog {
            phase,
            subject: subject.map(str::to_string),
            target,
            at_secs: self.started.elapsed().as_secs_f64(),
        });
    }

    fn current(&self) -> Option<&PhaseLog> {
        self.phases.last()
    }
}

/// Runs one swap against an environment
pub struct Orchestrator<'a, A, B, L> {
    config: &'a RunConfig,
    autoscaling: &'a A,
    balancer: &'a B,
    locks: Option<&'a LockManager<L>>,
    cancel: CancellationToken,
    run_id: String,
}

impl<'a, A, B, L> Orchestrator<'a, A, B, L>
where
    A: AutoScalingOperations,
    B: LoadBalancerOperations,
    L: LockStore,
{
    pub fn new(
        config: &'a RunConfig,
        autoscaling: &'a A,
        balancer: &'a B,
        locks: Option<&'a LockManager<L>>,
    ) -> Self {
        let run_id = locks
            .map(|l| l.run_id().to_string())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        Self {
            config,
            autoscaling,
            balancer,
            locks,
            cancel: CancellationToken::new(),
            run_id,
        }
    }

    /// Stop polling and fail with `Interrupted` once `cancel` fires
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Run the configured mode.
    ///
    /// The lock, when configured, is held around detection and every
    /// mutation and released on every exit path.
    pub async fn run(&self) -> Result<DeployReport, DeployError> {
        let mut state = RunState::start();
        state.enter(DeployPhase::Validate, None, None);
        if let Err(e) = self.config.validate() {
            return Err(self.fail(&mut state, e));
        }

        let environment = self.config.environment();
        info!(
            environment = %environment,
            mode = %self.config.mode(),
            run_id = %self.run_id,
            dry_run = self.config.dry_run(),
            "Starting run"
        );

        if self.locks.is_none() {
            warn!(environment = %environment, "No lock bucket configured; running without an environment lock");
        }
        if self.config.mode() == RunMode::Deploy && self.config.elb_name().is_none() {
            warn!(environment = %environment, "No load balancer configured; balancer health checks are skipped");
        }

        if self.config.dry_run() {
            return match self.inspect(&mut state).await {
                Ok((plan, locked, holder)) => {
                    info!(environment = %environment, "Dry run complete; no changes made");
                    Ok(self.report(state, plan, locked, holder))
                }
                Err(e) => Err(self.fail(&mut state, e)),
            };
        }

        let result = match self.locks {
            Some(locks) => {
                state.enter(DeployPhase::Lock, Some(&lock_key(environment)), None);
                locks.with_lock(environment, self.execute(&mut state)).await
            }
            None => self.execute(&mut state).await,
        };

        match result {
            Ok(plan) => {
                let report = self.report(state, plan, false, None);
                info!(
                    environment = %environment,
                    elapsed_secs = report.elapsed_secs,
                    "Run complete"
                );
                Ok(report)
            }
            Err(e) => Err(self.fail(&mut state, e)),
        }
    }

    async fn detect(&self) -> Result<Detection, DeployError> {
        let environment = self.config.environment();
        if self.config.single_fleet() {
            detect_single(self.autoscaling, environment).await
        } else {
            detect_pair(self.autoscaling, environment).await
        }
    }

    /// Decide which fleets to act on for the detected state
    fn plan(&self, detection: Detection) -> Result<Plan, DeployError> {
        let environment = self.config.environment();

        let (target, drain) = match (self.config.mode(), &detection) {
            (RunMode::Deploy, Detection::NoActiveFleet) if self.config.single_fleet() => {
                (Some(FleetId::single(environment)), None)
            }
            (RunMode::Deploy, Detection::Active { fleet, desired }) if self.config.single_fleet() => {
                return Err(DeployError::configuration(format!(
                    "{fleet} is not empty (desired {desired}); zero it before deploying"
                )));
            }
            (RunMode::Deploy, Detection::NoActiveFleet) => (
                Some(FleetId::slot(environment, Slot::A)),
                Some(FleetId::slot(environment, Slot::B)),
            ),
            (RunMode::Deploy, Detection::Active { fleet, .. }) => {
                let slot = fleet.slot_id().ok_or_else(|| {
                    DeployError::configuration(format!("{fleet} is not part of an A/B pair"))
                })?;
                (
                    Some(FleetId::slot(environment, slot.other())),
                    Some(fleet.clone()),
                )
            }
            (RunMode::Zero, Detection::NoActiveFleet) => {
                return Err(DeployError::configuration(format!(
                    "nothing to zero: {environment} has no active fleet"
                )));
            }
            (RunMode::Zero, Detection::Active { fleet, .. }) => (None, Some(fleet.clone())),
        };

        Ok(Plan {
            detection,
            target,
            drain,
        })
    }

    /// Everything a run does while holding the lock
    async fn execute(&self, state: &mut RunState) -> Result<Plan, DeployError> {
        state.enter(DeployPhase::Detect, None, None);
        let detection = self.detect().await?;
        let plan = self.plan(detection)?;

        let interval = self.config.poll_interval();
        let cancel = Some(&self.cancel);
        let controller = CapacityController::new(self.autoscaling, interval, cancel);

        if let Some(target) = &plan.target {
            let fleet = target.name();
            let fleet_probe = FleetHealthProbe::new(self.autoscaling, interval, cancel);
            let balancer_probe = BalancerHealthProbe::new(self.balancer, interval, cancel);

            for desired in self.config.step_targets() {
                self.checkpoint(&fleet)?;

                state.enter(DeployPhase::ScalingUp, Some(&fleet), Some(desired));
                controller
                    .scale_to(&fleet, desired, self.phase_deadline())
                    .await?;

                state.enter(DeployPhase::FleetHealth, Some(&fleet), Some(desired));
                fleet_probe
                    .wait(&fleet, desired, self.phase_deadline())
                    .await?;

                if let Some(elb) = self.config.elb_name() {
                    state.enter(DeployPhase::BalancerHealth, Some(elb), Some(desired));
                    let members = self.autoscaling.describe_fleet(&fleet).await?.instance_ids();
                    balancer_probe
                        .wait(elb, &members, self.phase_deadline())
                        .await?;
                }

                info!(fleet = %fleet, desired, total = self.config.total(), "Step verified");
                state.completed_steps.push(desired);
            }
        }

        if let Some(source) = &plan.drain {
            let fleet = source.name();
            self.checkpoint(&fleet)?;
            state.enter(DeployPhase::Draining, Some(&fleet), Some(0));
            controller.drain(&fleet).await?;
        }

        state.enter(DeployPhase::Done, None, None);
        Ok(plan)
    }

    /// Detect and plan without locking or mutating anything
    async fn inspect(
        &self,
        state: &mut RunState,
    ) -> Result<(Plan, bool, Option<LockMarker>), DeployError> {
        let environment = self.config.environment();

        state.enter(DeployPhase::Detect, None, None);
        let detection = self.detect().await?;
        let plan = self.plan(detection)?;

        let (locked, holder) = match self.locks {
            Some(locks) => {
                let locked = locks.is_locked(environment).await?;
                let holder = if locked {
                    warn!(environment = %environment, "Environment is locked; a real run would refuse to start");
                    locks.holder(environment).await?
                } else {
                    None
                };
                (locked, holder)
            }
            None => (false, None),
        };

        state.enter(DeployPhase::Done, None, None);
        Ok((plan, locked, holder))
    }

    fn checkpoint(&self, fleet: &str) -> Result<(), DeployError> {
        if self.cancel.is_cancelled() {
            return Err(DeployError::Interrupted {
                what: fleet.to_string(),
            });
        }
        Ok(())
    }

    fn phase_deadline(&self) -> Deadline {
        Deadline::after(self.config.phase_timeout())
    }

    fn report(
        &self,
        state: RunState,
        plan: Plan,
        locked: bool,
        lock_holder: Option<LockMarker>,
    ) -> DeployReport {
        let planned_steps = if plan.target.is_some() {
            self.config.step_targets()
        } else {
            Vec::new()
        };

        DeployReport {
            run_id: self.run_id.clone(),
            environment: self.config.environment().to_string(),
            mode: self.config.mode(),
            dry_run: self.config.dry_run(),
            detection: plan.detection,
            target_fleet: plan.target.map(|f| f.name()),
            drained_fleet: plan.drain.map(|f| f.name()),
            planned_steps,
            completed_steps: state.completed_steps,
            locked,
            lock_holder,
            phases: state.phases,
            elapsed_secs: state.started.elapsed().as_secs_f64(),
        }
    }

    /// Record the terminal `Failed` phase and log where the run was when
    /// the error happened
    fn fail(&self, state: &mut RunState, err: DeployError) -> DeployError {
        let (phase, subject, target) = match state.current() {
            Some(log) => (log.phase, log.subject.clone(), log.target),
            None => (DeployPhase::Validate, None, None),
        };
        state.enter(DeployPhase::Failed, subject.as_deref(), target);

        error!(
            environment = %self.config.environment(),
            phase = %phase,
            fleet = subject.as_deref().unwrap_or("-"),
            step = ?target,
            elapsed = ?state.started.elapsed(),
            family = %err.family(),
            error = %err,
            "Run failed"
        );
        err
    }
}
