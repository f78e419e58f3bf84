//! EBD transcoding proxy server binary.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ebd_proxy::config::Config;
use ebd_proxy::fetch::Fetcher;
use ebd_proxy::server::Server;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "ebd-proxy")]
#[command(about = "Transcoding proxy for the EBD handheld browser")]
#[command(version)]
struct Args {
    /// Configuration file path; defaults are used when absent
    #[arg(short, long)]
    config: Option<String>,

    /// Listen port (overrides config)
    #[arg(long = "port")]
    port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration before logging so the verbose flag can come from
    // either place.
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if args.verbose {
        config.verbose = true;
    }

    init_logging(config.verbose);
    tracing::info!("starting EBD proxy");

    let config = Arc::new(config);
    let fetcher = Arc::new(Fetcher::new(Arc::clone(&config))?);
    let server = Server::new(Arc::clone(&config), fetcher);

    server
        .run_with_shutdown(config.bind_port, wait_for_shutdown())
        .await?;

    tracing::info!("shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("ebd_proxy={level},ebd-proxy={level}").into());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
async fn wait_for_shutdown() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("received SIGTERM");
        }
        _ = sigint.recv() => {
            tracing::info!("received SIGINT");
        }
    }
}
