//! jigsync agent - keeps the local mutation queue in sync with the jig
//! tracking API.
//!
//! Runs as a long-lived process by default; `status`, `export`, `sync` and
//! `reset` act on the queue once and exit. `status` and `export` only read and
//! may run next to a live agent. `sync` and `reset` need to own the queue and
//! refuse while another process holds it.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use jigsync_client::clock::{now_millis, to_datetime};
use jigsync_client::{
    Config, ConnectivityObserver, DurableStore, HttpProbe, HttpRemoteClient, SyncAgent,
    SyncOrchestrator, SyncPolicy,
};
use jigsync_engine::{MutationId, SyncOutcome};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "jigsync-agent", version, about = "Offline mutation queue sync agent")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Probe the remote and drain the queue until interrupted (default)
    Run,
    /// Print the sync status report
    Status,
    /// Print every unsynced entry as JSON
    Export,
    /// Run a single pass and exit
    Sync,
    /// Return an abandoned or stuck entry to pending
    Reset { id: MutationId },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jigsync_client=debug,jigsync_agent=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(&config).await?,
        Command::Status => {
            let store = DurableStore::open_for_inspection(&config.database_path).await?;
            let report = store.status_report(config.retry.stuck_after).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            store.close().await;
        }
        Command::Export => {
            let store = DurableStore::open_for_inspection(&config.database_path).await?;
            let export = store.export_pending(now_millis()).await?;
            println!("{}", export.to_json_pretty()?);
            store.close().await;
        }
        Command::Sync => {
            let store = DurableStore::open(&config.database_path).await?;
            let remote = HttpRemoteClient::new(
                config.remote_url.clone(),
                config.request_timeout,
                config.auth_token.clone(),
            )?;
            let probe = HttpProbe::new(
                &config.remote_url,
                config.request_timeout,
                config.probe_interval,
            )?;

            // No trigger channel: the only pass is the forced one below
            let connectivity = ConnectivityObserver::new();
            let (connected, reachable) = probe.check().await;
            connectivity.report(connected, reachable);

            let policy = SyncPolicy {
                retry: config.retry.clone(),
                inter_item_delay: config.inter_item_delay,
            };
            let orchestrator =
                SyncOrchestrator::new(store.clone(), Arc::new(remote), connectivity, policy);
            let outcome = orchestrator.force_sync().await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            store.close().await;
            if matches!(outcome, SyncOutcome::Offline) {
                std::process::exit(2);
            }
        }
        Command::Reset { id } => {
            let store = DurableStore::open(&config.database_path).await?;
            store.reset(id).await?;
            println!("Mutation {} reset to pending", id);
            store.close().await;
        }
    }

    Ok(())
}

async fn run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("Starting jigsync agent against {}", config.remote_url);

    let agent = SyncAgent::open(config).await?;

    let migrations = agent.store().migration_report();
    if !migrations.applied.is_empty() {
        tracing::info!(steps = ?migrations.applied, "Database schema upgraded");
    }

    let status = agent.status().await?;
    tracing::info!(
        pending = status.pending_count,
        failed = status.failed_count,
        abandoned = status.abandoned_count,
        last_sync = ?status.last_sync_at.and_then(to_datetime),
        "Queue loaded"
    );

    let _indicator = agent.connectivity().subscribe(|snapshot| {
        if snapshot.is_online() {
            tracing::info!("Online");
        } else {
            tracing::warn!("Offline, mutations will be queued");
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    agent.close().await;

    Ok(())
}
