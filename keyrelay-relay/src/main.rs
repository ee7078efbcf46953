//! keyrelay relay server
//!
//! A self-hostable key-value relay for paired keyrelay endpoints. It stores
//! envelopes whose payloads are ciphertext under a secret it never sees;
//! room ids, request ids, type tags and timestamps are all it learns.

mod cleanup;
mod config;
mod error;
mod handlers;
mod rate_limit;
mod server;
mod storage;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "keyrelay-relay", about = "keyrelay key-value relay server")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "relay.toml")]
    config: PathBuf,

    /// Listen address override
    #[arg(short, long)]
    listen: Option<String>,

    /// Database path override
    #[arg(short, long)]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cli = Cli::parse();

    let mut cfg = if cli.config.exists() {
        config::RelayConfig::load(&cli.config)?
    } else {
        tracing::info!("No config file found, using defaults");
        config::RelayConfig::default()
    };

    if let Some(listen) = cli.listen {
        cfg.listen_addr = listen;
    }
    if let Some(database) = cli.database {
        cfg.storage_path = database;
    }

    tracing::info!("Starting keyrelay relay on {}", cfg.listen_addr);

    let state = server::AppState {
        storage: storage::RelayStorage::open(&cfg.storage_path)?,
        limiter: rate_limit::RateLimiter::new(cfg.rate_limit_per_minute),
    };
    cleanup::spawn_cleanup_task(
        state.storage.clone(),
        state.limiter.clone(),
        cfg.request_retention_secs,
        cfg.cleanup_interval_secs,
    );
    let app = server::build_router(state, &cfg);

    let listener = tokio::net::TcpListener::bind(&cfg.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
