//! Stockbridge command-line entrypoint.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use stockbridge_core::audit::SyncHealth;
use stockbridge_core::config;
use stockbridge_core::infrastructure::jobs::SyncQueue;
use stockbridge_core::Core;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "stockbridge", about = "Bidirectional inventory sync engine")]
struct Cli {
    /// Data directory (defaults to the platform data dir)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the webhook receiver and worker pool until interrupted
    Serve,
    /// Create the database and apply pending migrations
    Migrate,
    /// Show queue depth and per-tenant sync health
    Status {
        /// Restrict to one tenant
        #[arg(long)]
        tenant: Option<Uuid>,
    },
    /// Delete audit log entries past the retention window
    Prune,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,stockbridge_core=debug"));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

fn data_dir(cli: &Cli) -> Result<PathBuf> {
    match &cli.data_dir {
        Some(dir) => Ok(dir.clone()),
        None => config::default_data_dir(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let dir = data_dir(&cli)?;

    match cli.command {
        Command::Serve => {
            let core = Core::new_with_config(dir).await?;
            core.start().await?;
            info!("Stockbridge running; Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
            core.shutdown().await?;
        }
        Command::Migrate => {
            let core = Core::new_with_config(dir).await?;
            // Migrations run during init; nothing more to do
            core.shutdown().await?;
            println!("Database is up to date");
        }
        Command::Status { tenant } => {
            let core = Core::new_with_config(dir).await?;
            println!("Queued jobs:       {}", core.queue.depth().await?);
            println!("Dead-lettered:     {}", core.queue.dead_letter_count().await?);
            if let Some(tenant_id) = tenant {
                let health = match core.audit.sync_health(tenant_id).await? {
                    SyncHealth::Healthy => "healthy",
                    SyncHealth::Degraded => "degraded",
                };
                println!("Tenant {}: {}", tenant_id, health);
            }
            core.shutdown().await?;
        }
        Command::Prune => {
            let core = Core::new_with_config(dir).await?;
            let days = core.config.log_retention_days as i64;
            let removed = core.audit.prune_older_than(days).await?;
            println!("Removed {} audit entries older than {} days", removed, days);
            core.shutdown().await?;
        }
    }

    Ok(())
}
