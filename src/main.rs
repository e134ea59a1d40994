use std::fs::OpenOptions;

use anyhow::Result;
use clap::Parser;
use growhire::cli::{handle_command, Cli};
use growhire::config::get_environment;
use growhire::AppConfig;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("growhire=info"));

    let json_layer = match std::env::var("GROWHIRE_LOG_FILE") {
        Ok(path) if !path.trim().is_empty() => {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true) // Clear file on startup
                .open(&path)
                .map_err(|e| anyhow::anyhow!("Failed to open log file {}: {}", path, e))?;
            Some(
                fmt::layer()
                    .json()
                    .with_writer(file)
                    .with_current_span(false)
                    .with_span_list(false),
            )
        }
        _ => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(json_layer)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_logging()?;

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;

    info!("Starting GrowHire");
    info!("Environment: {}", get_environment());

    handle_command(cli, config).await
}
