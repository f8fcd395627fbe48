use clap::Parser;
use keyescrow_server::{build_router, AppState, KeyStorage, ServerConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "keyescrow-server", about = "Recovery-key escrow server")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "keyescrow.toml")]
    config: PathBuf,

    /// Listen address override
    #[arg(short, long, env = "KEYESCROW_LISTEN")]
    listen: Option<String>,

    /// Database path override
    #[arg(short, long, env = "KEYESCROW_DATABASE")]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cli = Cli::parse();

    let mut cfg = if cli.config.exists() {
        ServerConfig::load(&cli.config)?
    } else {
        tracing::info!("No config file found, using defaults");
        ServerConfig::default()
    };

    if let Some(listen) = cli.listen {
        cfg.listen_addr = listen;
    }
    if let Some(database) = cli.database {
        cfg.storage_path = database;
    }

    tracing::info!("Opening key store at {}", cfg.storage_path.display());
    let storage = KeyStorage::open(&cfg.storage_path)?;
    let app = build_router(AppState::new(storage.clone(), &cfg), &cfg);

    let listener = tokio::net::TcpListener::bind(&cfg.listen_addr).await?;
    tracing::info!("KeyEscrow server listening on {}", cfg.listen_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down, closing key store");
    storage.close()?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
