//! abswap: blue/green swaps of Auto Scaling groups behind a Classic ELB
//!
//! Brings up the inactive fleet of an environment in steps, checks it at
//! the fleet and balancer level after each step, then drains the fleet it
//! replaced. Runs against one environment are serialized by an S3 lock.

use abswap_common::defaults::{
    DEFAULT_INSTANCE_COUNT, DEFAULT_INSTANCE_COUNT_STEP, DEFAULT_PHASE_TIMEOUT_SECS,
    DEFAULT_POLL_INTERVAL_SECS,
};
use abswap_common::exit::EXIT_SUCCESS;
use abswap_common::{ErrorFamily, lock_key};
use abswap_deployer::aws::{
    AutoScalingClient, AwsContext, AwsError, ElbClient, S3LockStore, find_aws_error,
};
use abswap_deployer::config::{self, RunConfig, RunMode};
use abswap_deployer::lock::LockManager;
use abswap_deployer::{DeployError, DeployReport, Orchestrator};
use clap::{Parser, Subcommand};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "abswap")]
#[command(about = "Blue/green Auto Scaling group swaps behind a load balancer")]
#[command(version)]
struct Args {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

/// Flags shared by `deploy` and `zero`
#[derive(clap::Args, Debug)]
struct CommonArgs {
    /// Environment name; fleets are `<environment>-a` and `<environment>-b`
    #[arg(short, long)]
    environment: String,

    /// Classic ELB in front of the fleets (balancer checks are skipped without it)
    #[arg(long)]
    elb_name: Option<String>,

    /// S3 bucket holding environment locks
    #[arg(long, env = "ABSWAP_LOCK_BUCKET")]
    lock_bucket: Option<String>,

    /// AWS region
    #[arg(long, env = "AWS_REGION")]
    region: Option<String>,

    /// AWS profile to use (overrides AWS_PROFILE env var)
    #[arg(long)]
    aws_profile: Option<String>,

    /// Seconds between status checks
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL_SECS)]
    poll_interval: u64,

    /// Seconds each scaling or health phase may take
    #[arg(long, default_value_t = DEFAULT_PHASE_TIMEOUT_SECS)]
    phase_timeout: u64,

    /// Manage a single group named exactly `<environment>` (no A/B pair)
    #[arg(long)]
    single_fleet: bool,

    /// Detect and report without locking or changing capacity
    #[arg(long)]
    dry_run: bool,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,
}

/// Arguments for the deploy command
#[derive(clap::Args, Debug)]
struct DeployArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Desired capacity of the new fleet
    #[arg(long, default_value_t = DEFAULT_INSTANCE_COUNT)]
    instance_count: u32,

    /// Capacity added per step; must evenly divide --instance-count
    #[arg(long, default_value_t = DEFAULT_INSTANCE_COUNT_STEP)]
    instance_count_step: u32,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bring up the inactive fleet and drain the active one
    Deploy(Box<DeployArgs>),

    /// Set the active fleet's capacity to zero
    Zero(Box<CommonArgs>),

    /// Remove an environment lock left behind by a killed run
    Unlock {
        /// Environment whose lock to remove
        #[arg(short, long)]
        environment: String,

        /// S3 bucket holding environment locks
        #[arg(long, env = "ABSWAP_LOCK_BUCKET")]
        lock_bucket: Option<String>,

        /// AWS region
        #[arg(long, env = "AWS_REGION")]
        region: Option<String>,

        /// AWS profile to use (overrides AWS_PROFILE env var)
        #[arg(long)]
        aws_profile: Option<String>,
    },
}

fn run_config(common: &CommonArgs, mode: RunMode) -> RunConfig {
    let mut config = RunConfig::new(common.environment.clone(), mode);
    config.timing = config::TimingConfig {
        poll_interval: Duration::from_secs(common.poll_interval),
        phase_timeout: Duration::from_secs(common.phase_timeout),
    };
    config.aws = config::AwsConfig {
        region: common.region.clone(),
        aws_profile: common.aws_profile.clone(),
        elb_name: common.elb_name.clone(),
        lock_bucket: common.lock_bucket.clone(),
    };
    config.flags.single_fleet = common.single_fleet;
    config.flags.dry_run = common.dry_run;
    config
}

impl From<&DeployArgs> for RunConfig {
    fn from(args: &DeployArgs) -> Self {
        let mut config = run_config(&args.common, RunMode::Deploy);
        config.capacity = config::CapacityConfig {
            total: args.instance_count,
            step: args.instance_count_step,
        };
        config
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    let code = match run(args.command).await {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            print_error(&e);
            e.exit_code()
        }
    };
    std::process::exit(code);
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    // AWS SDK crates are chatty at debug; keep them at warn unless RUST_LOG says otherwise
    let default = format!(
        "{level},aws_config=warn,aws_smithy_runtime=warn,aws_smithy_runtime_api=warn,\
         aws_sdk_autoscaling=warn,aws_sdk_elasticloadbalancing=warn,aws_sdk_s3=warn"
    );
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Print error in a user-friendly way
fn print_error(e: &DeployError) {
    use std::error::Error;
    use std::io::Write;

    let mut stderr = std::io::stderr();

    let _ = writeln!(stderr, "\n\x1b[1;31mError:\x1b[0m {e}");

    let mut source = e.source();
    while let Some(cause) = source {
        let _ = writeln!(stderr, "  \x1b[33mCaused by:\x1b[0m {cause}");
        source = cause.source();
    }

    if let Some(hint) = aws_error(e).and_then(AwsError::suggestion) {
        let _ = writeln!(stderr, "\n\x1b[36mHint:\x1b[0m {hint}");
    }

    if let DeployError::LockContention { key, .. } = e {
        let _ = writeln!(
            stderr,
            "\n\x1b[2mIf no other run is active, remove {key} with `abswap unlock`\x1b[0m"
        );
    }

    let _ = writeln!(
        stderr,
        "\x1b[2mExit status {} ({})\x1b[0m",
        e.exit_code(),
        e.family()
    );
}

fn aws_error(e: &DeployError) -> Option<&AwsError> {
    match e {
        DeployError::Aws(inner) | DeployError::LockStore { source: inner, .. } => {
            find_aws_error(inner)
        }
        _ => None,
    }
}

async fn run(command: Command) -> Result<(), DeployError> {
    match command {
        Command::Deploy(args) => {
            let config = RunConfig::from(args.as_ref());
            execute(&config, args.common.json).await
        }
        Command::Zero(args) => {
            let config = run_config(&args, RunMode::Zero);
            execute(&config, args.json).await
        }
        Command::Unlock {
            environment,
            lock_bucket,
            region,
            aws_profile,
        } => unlock(&environment, lock_bucket, region, aws_profile).await,
    }
}

async fn execute(config: &RunConfig, json: bool) -> Result<(), DeployError> {
    // Fail on bad flags before loading credentials
    config.validate()?;

    if let Some(profile) = config.aws_profile() {
        info!(profile = %profile, "Using AWS profile");
    }
    let aws = AwsContext::new(config.region(), config.aws_profile()).await;
    info!(region = ?aws.region(), "Loaded AWS configuration");

    let autoscaling = AutoScalingClient::from_context(&aws);
    let elb = ElbClient::from_context(&aws);
    let locks = config.lock_bucket().map(|bucket| {
        LockManager::new(
            S3LockStore::from_context(&aws, bucket),
            Uuid::new_v4().to_string(),
        )
    });

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if watch_interrupts(tokio::signal::ctrl_c, interrupt).await {
            error!("Second interrupt received, exiting without releasing the environment lock");
            std::process::exit(ErrorFamily::Interrupted.exit_code());
        }
    });

    let report = Orchestrator::new(config, &autoscaling, &elb, locks.as_ref())
        .with_cancel(cancel)
        .run()
        .await?;

    print_report(&report, json)
}

/// Cancel the run on the first interrupt.
///
/// Returns `true` if a second interrupt arrives before the run finishes,
/// `false` if the signal source fails.
async fn watch_interrupts<F, Fut>(mut next_interrupt: F, cancel: CancellationToken) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if next_interrupt().await.is_err() {
        return false;
    }
    warn!("Interrupt received, stopping after the current check (press Ctrl-C again to exit now)");
    cancel.cancel();

    next_interrupt().await.is_ok()
}

fn print_report(report: &DeployReport, json: bool) -> Result<(), DeployError> {
    if json {
        let out = serde_json::to_string_pretty(report).map_err(anyhow::Error::from)?;
        println!("{out}");
    } else {
        println!("{report}");
    }
    Ok(())
}

async fn unlock(
    environment: &str,
    lock_bucket: Option<String>,
    region: Option<String>,
    aws_profile: Option<String>,
) -> Result<(), DeployError> {
    let Some(bucket) = lock_bucket else {
        return Err(DeployError::configuration(
            "--lock-bucket (or ABSWAP_LOCK_BUCKET) is required to unlock",
        ));
    };

    let aws = AwsContext::new(region.as_deref(), aws_profile.as_deref()).await;
    let locks = LockManager::new(
        S3LockStore::from_context(&aws, &bucket),
        Uuid::new_v4().to_string(),
    );

    if !locks.is_locked(environment).await? {
        println!("Environment {environment} is not locked");
        return Ok(());
    }

    match locks.holder(environment).await? {
        Some(marker) => warn!(
            environment = %environment,
            holder = %marker.holder,
            run_id = %marker.run_id,
            acquired_at = %marker.acquired_at,
            "Removing lock held by another run"
        ),
        None => warn!(environment = %environment, "Removing lock with no readable marker"),
    }

    locks.release(environment).await?;
    println!("Released lock s3://{bucket}/{}", lock_key(environment));
    Ok(())
}
