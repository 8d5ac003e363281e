//! # evtag-api — Binary Entry Point
//!
//! Loads configuration, initializes tracing, optionally connects to
//! Postgres and seeds the external catalog, then serves the Axum app.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use evtag_api::seed::CatalogSeed;
use evtag_api::state::{AppState, Backends};
use evtag_core::config::LogFormat;
use evtag_core::EvtagConfig;
use evtag_store::Database;

/// Evidence & tagging core HTTP service.
#[derive(Parser, Debug)]
#[command(name = "evtag-api", version, about, long_about = None)]
struct Cli {
    /// Path to a YAML configuration file.
    #[arg(long, env = "EVTAG_CONFIG")]
    config: Option<PathBuf>,

    /// Port to bind. Overrides the configuration file.
    #[arg(long, env = "EVTAG_PORT")]
    port: Option<u16>,

    /// YAML file with the external catalog to seed at startup.
    #[arg(long, env = "EVTAG_CATALOG")]
    catalog: Option<PathBuf>,
}

fn init_tracing(config: &EvtagConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log.filter));
    match config.log.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config =
        EvtagConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    init_tracing(&config);
    tracing::debug!(?config, "configuration loaded");

    let pool = evtag_api::db::init_pool(config.database_url.as_deref())
        .await
        .context("database initialization failed")?;

    let port = config.server.port;
    let db = Arc::new(Database::new());
    let mut state = AppState::new(Arc::clone(&db), Backends::in_memory(), config);

    if let Some(pool) = pool {
        // Subscribe first: restoring an interrupted export announces its failure.
        evtag_api::db::mirror::spawn(pool.clone(), db.subscribe(), state.exporter.subscribe());
        evtag_api::db::hydrate(&pool, &db, &state.exporter)
            .await
            .context("database hydration failed")?;
        state = state.with_pool(pool);
    }

    if let Some(path) = &cli.catalog {
        CatalogSeed::load(path)
            .and_then(|seed| seed.apply(&db))
            .with_context(|| format!("failed to seed catalog from {}", path.display()))?;
    }

    let app = evtag_api::app(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("evtag API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
