use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use donorwall_core::Collection;
use donorwall_query::QuerySurface;
use donorwall_storage::SnapshotKind;
use donorwall_sync::{CycleOutcome, SyncService};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "donorwall")]
#[command(about = "Donor wall sync service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one sync cycle and exit.
    Sync,
    /// Startup cycle plus the recurring scheduler, until ctrl-c.
    Serve,
    /// Print the current summary as JSON.
    Summary,
    /// Print a page of enriched donors as JSON.
    Donors {
        #[arg(long, default_value_t = 50)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Print health and the latest snapshot key per type.
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Sync) {
        Commands::Sync => match donorwall_sync::run_sync_once_from_env().await? {
            CycleOutcome::Completed(report) => {
                println!(
                    "sync complete: run_id={} donors={} transactions={} total={} fallbacks={}",
                    report.run_id,
                    report.summary.total_donors,
                    report.summary.total_transactions,
                    donorwall_core::money::format_major(report.summary.total_amount_cents),
                    report.fallbacks.len()
                );
            }
            CycleOutcome::AlreadyRunning => println!("sync already running"),
        },
        Commands::Serve => {
            let service = SyncService::from_env()?;
            let scheduler = service.start().await?;
            info!("serving; press ctrl-c to stop");
            tokio::signal::ctrl_c()
                .await
                .context("waiting for ctrl-c")?;
            if let Some(mut scheduler) = scheduler {
                scheduler
                    .shutdown()
                    .await
                    .context("stopping scheduler")?;
            }
            info!("shut down");
        }
        Commands::Summary => {
            let surface = surface_from_env()?;
            print_json(&surface.get_summary().await)?;
        }
        Commands::Donors { limit, offset } => {
            let surface = surface_from_env()?;
            print_json(&surface.get_donors(limit, offset).await)?;
        }
        Commands::Status => {
            let service = SyncService::from_env()?;
            let surface = QuerySurface::for_service(&service, None);
            print_json(&surface.health().await)?;

            let store = service.orchestrator().snapshots();
            let kinds = Collection::ALL
                .into_iter()
                .map(SnapshotKind::from)
                .chain([SnapshotKind::Summary]);
            for kind in kinds {
                let latest = store.latest_key(kind).await?;
                println!("{kind}: {}", latest.as_deref().unwrap_or("-"));
            }
        }
    }

    Ok(())
}

fn surface_from_env() -> Result<QuerySurface> {
    let service = SyncService::from_env()?;
    Ok(QuerySurface::for_service(&service, None))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("rendering json")?;
    println!("{rendered}");
    Ok(())
}
