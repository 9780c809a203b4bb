//! Cluster capacity CLI
//!
//! Estimates how many additional replicas of a pod with the given CPU and
//! memory requests the healthy nodes of a Kubernetes cluster can schedule.

mod commands;
mod config;
mod kube_client;
mod output;

use anyhow::{Context, Result};
use capacity_lib::{CapacityPlanner, RunLogger, TargetPod};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::output::{LogFormat, OutputFormat};

/// Exit status when the cluster cannot take the requested replicas and
/// `--fail-on-insufficient` is set
const EXIT_INSUFFICIENT: u8 = 3;

/// Cluster capacity estimator
#[derive(Parser)]
#[command(name = "cluster-capacity")]
#[command(
    author,
    version,
    about = "Estimate how many pod replicas a Kubernetes cluster can schedule",
    long_about = None
)]
pub struct Cli {
    /// CPU request of one replica: millicores with `m`, otherwise cores
    /// (e.g. 100m, 0.5, 2)
    #[arg(long = "cpuRequests", alias = "cpu-requests", default_value = "100m")]
    pub cpu_requests: String,

    /// CPU limit of one replica
    #[arg(long = "cpuLimits", alias = "cpu-limits", default_value = "200m")]
    pub cpu_limits: String,

    /// Memory request of one replica. Ki/Mi/Gi/Ti are binary and k/M/G/T
    /// decimal (Kubernetes units, case-sensitive); kb/mb/gb/tb in any case
    /// are binary; a lowercase `m` alone means milli-bytes; bare numbers are bytes
    /// (e.g. 100mb, 256Mi)
    #[arg(long = "memRequests", alias = "mem-requests", default_value = "100mb")]
    pub mem_requests: String,

    /// Memory limit of one replica, same units as --memRequests
    #[arg(long = "memLimits", alias = "mem-limits", default_value = "200mb")]
    pub mem_limits: String,

    /// Number of replicas to schedule
    #[arg(long, default_value_t = 1)]
    pub replicas: u64,

    /// Path to kubeconfig file (uses default if not specified)
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<String>,

    /// Path to the config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<OutputFormat>,

    /// Log line format on stderr
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Only consider nodes carrying this label (KEY or KEY=VALUE, or "all")
    #[arg(long)]
    pub worker_label: Option<String>,

    /// Number of nodes queried at once
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// What to do when a pod cannot be fetched (skip, abort)
    #[arg(long)]
    pub pod_fetch_policy: Option<String>,

    /// Exit with status 3 when the requested replicas do not fit
    #[arg(long)]
    pub fail_on_insufficient: bool,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,
}

fn init_tracing(verbose: bool, format: LogFormat) {
    let default_filter = if verbose {
        "warn,capacity_lib=debug,cluster_capacity=debug"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    // Reject bad input before touching the cluster
    let target = TargetPod::parse(
        &cli.cpu_requests,
        &cli.cpu_limits,
        &cli.mem_requests,
        &cli.mem_limits,
    )?;

    let config = config::Config::load(cli.config.as_deref())?;
    let overrides = config::Overrides {
        worker_label: cli.worker_label.clone(),
        concurrency: cli.concurrency,
        pod_fetch_policy: cli.pod_fetch_policy.clone(),
    };
    let settings = config.estimator_settings(&overrides)?;
    let format = cli.format.or(config.format).unwrap_or_default();

    let kubeconfig = config::kubeconfig_path(cli.kubeconfig.as_deref())?;
    let cluster = kube_client::KubeCluster::connect(&kubeconfig)
        .await
        .context("Failed to connect to the cluster")?;

    let planner =
        CapacityPlanner::new(Arc::new(cluster), settings).with_logger(RunLogger::default());

    let fits = commands::estimate::run(&planner, &target, cli.replicas, format, cli.verbose)
        .await
        .context("Capacity estimate failed")?;

    if !fits && cli.fail_on_insufficient {
        return Ok(ExitCode::from(EXIT_INSUFFICIENT));
    }
    Ok(ExitCode::SUCCESS)
}
