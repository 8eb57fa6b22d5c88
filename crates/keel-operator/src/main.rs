//! Keel Operator - declarative Linode resources managed from Kubernetes

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use tokio_util::sync::CancellationToken;

use keel_common::class::Claim;
use keel_common::telemetry::{init_telemetry, LogFormat, TelemetryConfig};
use keel_common::FIELD_MANAGER;
use keel_managed::ReconcilerConfig;
use keel_operator::{all_crds, select, RunSettings};

/// Keel - reconcile Linode instances and LKE clusters from Kubernetes records
#[derive(Parser, Debug)]
#[command(name = "keel", version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    controller: ControllerArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the controllers (default mode)
    ///
    /// Installs the CRDs with server-side apply, then watches every selected
    /// managed kind until SIGINT or SIGTERM.
    Controller,

    /// Print CRD manifests and exit
    Crd,

    /// Render the record a claim of a class stands for and exit
    Materialize(MaterializeArgs),
}

#[derive(Args, Debug)]
struct ControllerArgs {
    /// Log output format (json or text)
    #[arg(long, env = "KEEL_LOG_FORMAT", default_value = "json")]
    log_format: LogFormat,

    /// Resync interval for available resources, in seconds
    #[arg(long, env = "KEEL_POLL_INTERVAL_SECS", default_value_t = 60)]
    poll_interval_secs: u64,

    /// Requeue interval while resources are provisioning, in seconds
    #[arg(long, env = "KEEL_CREATING_POLL_INTERVAL_SECS", default_value_t = 15)]
    creating_poll_interval_secs: u64,

    /// Requeue interval after corrective updates, in seconds
    #[arg(long, env = "KEEL_DRIFT_POLL_INTERVAL_SECS", default_value_t = 5)]
    drift_poll_interval_secs: u64,

    /// Deadline of one reconciliation pass, in seconds
    #[arg(long, env = "KEEL_PASS_TIMEOUT_SECS", default_value_t = 120)]
    pass_timeout_secs: u64,

    /// Requeue interval for configuration errors, in seconds
    #[arg(long, env = "KEEL_CONFIG_RETRY_SECS", default_value_t = 300)]
    config_retry_secs: u64,

    /// Only watch this namespace
    #[arg(long, env = "KEEL_WATCH_NAMESPACE")]
    watch_namespace: Option<String>,

    /// Comma-separated kinds to run controllers for (default: all)
    #[arg(long, env = "KEEL_KINDS", value_delimiter = ',')]
    kinds: Vec<String>,
}

impl ControllerArgs {
    fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            creating_poll_interval: Duration::from_secs(self.creating_poll_interval_secs),
            drift_poll_interval: Duration::from_secs(self.drift_poll_interval_secs),
            pass_timeout: Duration::from_secs(self.pass_timeout_secs),
            configuration_retry_interval: Duration::from_secs(self.config_retry_secs),
            ..ReconcilerConfig::default()
        }
    }
}

#[derive(Args, Debug)]
struct MaterializeArgs {
    /// Managed kind of the class
    #[arg(long)]
    kind: String,

    /// Path to the class YAML
    #[arg(long)]
    class: PathBuf,

    /// Path to the claim YAML
    #[arg(long)]
    claim: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Crd) => print_crds(),
        Some(Commands::Materialize(args)) => print_materialized(&args),
        Some(Commands::Controller) | None => run_controller(cli.controller).await,
    }
}

fn print_crds() -> anyhow::Result<()> {
    for crd in all_crds() {
        let yaml = serde_yaml::to_string(&crd)
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("---\n{yaml}");
    }
    Ok(())
}

fn print_materialized(args: &MaterializeArgs) -> anyhow::Result<()> {
    let entry = select(std::slice::from_ref(&args.kind))?[0];
    let class = std::fs::read_to_string(&args.class)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", args.class.display(), e))?;
    let claim: Claim = serde_yaml::from_str(
        &std::fs::read_to_string(&args.claim)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", args.claim.display(), e))?,
    )
    .map_err(|e| anyhow::anyhow!("invalid claim: {}", e))?;

    print!("{}", (entry.materialize)(&class, &claim)?);
    Ok(())
}

/// Ensure all Keel CRDs are installed
///
/// The operator installs its own CRDs on startup using server-side apply.
/// This ensures the CRD versions always match the operator version.
async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    for crd in all_crds() {
        let name = crd.name_any();
        tracing::info!(crd = %name, "Installing CRD...");
        crds.patch(&name, &params, &Patch::Apply(&crd))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to install {} CRD: {}", name, e))?;
    }

    tracing::info!("All Keel CRDs installed/updated");
    Ok(())
}

async fn run_controller(args: ControllerArgs) -> anyhow::Result<()> {
    init_telemetry(TelemetryConfig {
        format: args.log_format,
        ..TelemetryConfig::default()
    })?;

    let kinds = select(&args.kinds)?;
    tracing::info!("Keel controller starting...");

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    ensure_crds_installed(&client).await?;

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    let settings = RunSettings {
        config: args.reconciler_config(),
        namespace: args.watch_namespace.clone(),
        shutdown,
    };

    tracing::info!("Starting controllers:");
    let controllers: Vec<_> = kinds
        .iter()
        .map(|entry| (entry.controller)(client.clone(), &settings))
        .collect();

    futures::future::join_all(controllers).await;
    tracing::info!("Keel controller shutting down");
    Ok(())
}

/// Cancel in-flight passes on SIGINT or SIGTERM; the controllers stop their
/// watches on the same signals.
async fn cancel_on_signal(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("Shutdown signal received, cancelling in-flight passes");
    token.cancel();
}
