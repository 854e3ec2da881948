//! JobSync Pulse - main entry point
//!
//! Keeps the scheduler in line with the job store, one cycle per tick.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use jobsync_core::{
    bootstrap::{register_pulse_entry, Seed},
    config::Config,
    jobs::{InMemoryScheduler, TenantSource},
    sync::{JobPulse, PulseRunner},
    telemetry,
};

#[derive(Debug, Parser)]
#[command(name = "jobsync-pulse", version, about = "Tenant job schedule reconciliation")]
struct Args {
    /// Configuration file (toml, yaml or json)
    #[arg(short, long, env = "JOBSYNC_CONFIG")]
    config: Option<String>,

    /// JSON file with tenants and job definitions to load into the in-memory store
    #[arg(long, env = "JOBSYNC_SEED")]
    seed: Option<PathBuf>,

    /// Run a single cycle, print its summary and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };

    let telemetry = telemetry::init_telemetry(&config.observability)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        multi_tenant = config.sync.multi_tenant,
        production_mode = config.sync.production_mode,
        "Starting JobSync Pulse"
    );

    let seed = match &args.seed {
        Some(path) => Seed::from_file(path)?,
        None => Seed::default(),
    };
    let (repository, tenants) = seed.into_collaborators();
    tracing::info!(tenants = tenants.tenants().len(), "Collaborators seeded");

    let scheduler = Arc::new(InMemoryScheduler::new());
    register_pulse_entry(scheduler.as_ref(), &config.sync).await?;

    let pulse = Arc::new(
        JobPulse::builder()
            .repository(Arc::new(repository))
            .scheduler(scheduler.clone())
            .tenant_source(Arc::new(tenants))
            .config(config.sync.clone())
            .build()?,
    );

    if args.once {
        let cancel = CancellationToken::new();
        let summary = tokio::select! {
            summary = pulse.run_cycle(&cancel) => summary?,
            _ = shutdown_signal() => {
                cancel.cancel();
                anyhow::bail!("Interrupted before the cycle completed");
            }
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        let handle = PulseRunner::new(pulse).start();
        shutdown_signal().await;
        handle.shutdown();
        handle.join().await?;
    }

    tracing::info!(entries = scheduler.len(), "JobSync Pulse stopped");
    telemetry.shutdown();

    Ok(())
}

/// Wait for shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
