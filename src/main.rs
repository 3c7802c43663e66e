use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use collection_gateway::config::AppConfig;
use collection_gateway::database::CollectionManager;
use collection_gateway::routing::AllowedHosts;
use collection_gateway::{server, Dispatcher};

#[derive(Parser)]
#[command(name = "collection-gateway")]
#[command(about = "JSON-over-HTTP gateway for flashcard collections")]
#[command(version)]
struct Args {
    #[arg(long, env = "GATEWAY_CONFIG", help = "YAML config file")]
    config: Option<PathBuf>,

    #[arg(long, help = "Directory holding one sub-directory per collection")]
    data_root: Option<PathBuf>,

    #[arg(long, help = "Single client address allowed to connect, or * for any")]
    allowed_hosts: Option<String>,

    #[arg(long, help = "Address to bind")]
    bind: Option<String>,

    #[arg(long, help = "Port to listen on")]
    port: Option<u16>,
}

impl Args {
    fn apply(self, mut config: AppConfig) -> AppConfig {
        if let Some(v) = self.data_root {
            config.gateway.data_root = v;
        }
        if let Some(v) = self.allowed_hosts {
            config.gateway.allowed_hosts = AllowedHosts::from(v);
        }
        if let Some(v) = self.bind {
            config.server.bind_address = v;
        }
        if let Some(v) = self.port {
            config.server.port = v;
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so GATEWAY_* settings can live next to the binary
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = Args::parse();
    let config = AppConfig::load(args.config.take().as_deref())?;
    let mut config = args.apply(config);
    config.prepare_data_root()?;

    tracing::info!(
        "Starting collection gateway in {:?} mode, data root {}, allowed hosts {}",
        config.environment,
        config.gateway.data_root.display(),
        config.gateway.allowed_hosts
    );

    let collections = Arc::new(
        CollectionManager::new(config.executor.queue_depth).with_idle_timeout(config.idle_timeout()),
    );
    let dispatcher = Arc::new(Dispatcher::from_config(&config, collections.clone())?);

    let bind_addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    server::serve(listener, dispatcher, shutdown_signal()).await?;

    collections.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
