//! CA watch pipeline - Entry Point

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Telegram contract-address watch pipeline
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via CAWATCH_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    cawatch_telemetry::init_logging()?;

    info!("Starting cawatch v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > CAWATCH_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("CAWATCH_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");

    let config = cawatch_bot::AppConfig::from_file(&config_path)?;
    info!(
        mode = ?config.mode,
        tasks_path = %config.tasks_path,
        sources = ?config.sources.order,
        "Configuration loaded"
    );

    let app = cawatch_bot::Application::new(config)?;
    app.run().await?;

    Ok(())
}
