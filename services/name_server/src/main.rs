//! Name server binary
//!
//! Usage:
//!   name_server
//!   name_server --config config/portmw.toml --port 10100

use anyhow::{Context, Result};
use clap::Parser;
use mw_config::MiddlewareConfig;
use name_server::NameServer;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "name_server")]
#[command(about = "Port name server")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on (overrides the configuration file)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides the configuration file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Name the server registers itself under
    #[arg(short, long)]
    namespace: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args)?;

    let mut config = MiddlewareConfig::load(args.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(host) = args.host {
        config.name_server.host = host;
    }
    if let Some(port) = args.port {
        config.name_server.port = port;
    }
    if let Some(namespace) = args.namespace {
        config.name_server.namespace = namespace;
    }
    config.validate()?;

    info!(
        "Starting name server {} on {}",
        config.name_server.namespace,
        config.name_server.bind_address()
    );

    let server = NameServer::bind(&config).await?;
    server.run(shutdown_signal()).await?;

    info!("Name server stopped");
    Ok(())
}

fn init_logging(args: &Args) -> Result<()> {
    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };

    tracing_subscriber::fmt().with_max_level(log_level).init();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for CTRL+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
