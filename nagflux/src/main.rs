use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use nagflux::{Config, MetricsServer, Pipeline};
use nagflux_core::{MetricsCollector, PauseState};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(
    name = "nagflux",
    about = "Ingestion bridge from Nagios spool data to time-series backends"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nagflux=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    let pause = Arc::new(PauseState::new());
    let metrics = Arc::new(MetricsCollector::new());

    let metrics_server = match &config.main.metrics_listen {
        Some(listen) => Some(MetricsServer::bind(listen, metrics.clone()).await?),
        None => None,
    };

    let pipeline = Pipeline::start(&config, pause, metrics)?;
    info!("nagflux started");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    pipeline.stop().await;
    if let Some(server) = metrics_server {
        server.stop().await;
    }
    Ok(())
}
