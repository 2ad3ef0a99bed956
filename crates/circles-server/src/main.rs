//! # Circles Server
//!
//! Main binary. `serve` (the default) runs the HTTP API; `provision` applies a circle
//! definitions file to the database and exits.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use circles_api::{AppState, build_router};
use circles_common::{circle_spec, config::AppConfig, permissions::PermissionCatalog};
use circles_db::{
    Database,
    repository::provisioning::{self, ProvisionOutcome},
};
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "circles", version, about = "Hierarchical circles with role-based permissions")]
struct Cli {
    /// Config file name (without extension); `config` is tried when omitted
    #[arg(long, env = "CIRCLES_CONFIG", global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP API
    Serve,
    /// Apply a circle definitions file and exit
    Provision {
        /// Definitions file; defaults to `provisioning.circles_init`
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = circles_common::config::init(cli.config.as_deref())?;

    // Initialize tracing (structured logging)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "circles=debug,tower_http=debug".into()),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();

    tracing::info!("Starting Circles v{}", env!("CARGO_PKG_VERSION"));

    let catalog = Arc::new(PermissionCatalog::builtin()?);

    let db = Database::connect(&config.database).await?;
    db.migrate().await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Provision { file } => {
            let path = file
                .or_else(|| config.provisioning.circles_init.as_ref().map(PathBuf::from))
                .context("No circle definitions file given (use --file or provisioning.circles_init)")?;
            provision_from(&db, &catalog, &path).await
        }
        Command::Serve => {
            if let Some(path) = config.provisioning.circles_init.as_deref() {
                provision_from(&db, &catalog, Path::new(path)).await?;
            }
            serve(config, db, catalog).await
        }
    }
}

async fn provision_from(db: &Database, catalog: &PermissionCatalog, path: &Path) -> anyhow::Result<()> {
    tracing::info!(path = %path.display(), "Provisioning circles");
    let specs = circle_spec::load(path, catalog)?;
    for outcome in provisioning::provision(&db.pool, catalog, &specs).await? {
        match outcome {
            ProvisionOutcome::Created(id) => tracing::info!(circle_id = id, "Created"),
            ProvisionOutcome::Reconciled { id, report } if report.is_noop() => {
                tracing::debug!(circle_id = id, "Already up to date")
            }
            ProvisionOutcome::Reconciled { id, report } => {
                tracing::info!(circle_id = id, writes = report.writes(), "Reconciled")
            }
        }
    }
    Ok(())
}

async fn serve(config: AppConfig, db: Database, catalog: Arc<PermissionCatalog>) -> anyhow::Result<()> {
    let api_router = build_router(AppState {
        db,
        catalog,
        sessions: config.sessions,
    });
    let api_addr = SocketAddr::new(config.server.host.parse()?, config.server.port);

    tracing::info!("REST API listening on http://{api_addr}");

    let listener = tokio::net::TcpListener::bind(api_addr).await?;
    axum::serve(listener, api_router).await?;
    Ok(())
}
