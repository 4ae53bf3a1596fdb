//! Booking Daemon - durable booking lifecycle service
//!
//! bookingd provides:
//! - REST ingress for booking domain events
//! - Durable timers for reminders, deadlines and completions
//! - Periodic profile maintenance

use booking_daemon::error::{DaemonError, DaemonResult};
use booking_daemon::{DaemonConfig, Server};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Booking Daemon CLI
#[derive(Parser)]
#[command(name = "bookingd")]
#[command(about = "Booking Daemon - durable booking lifecycle service", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "BOOKING_CONFIG")]
    config: Option<String>,

    /// Listen address (overrides the configuration file)
    #[arg(short, long, env = "BOOKING_LISTEN_ADDR")]
    listen: Option<String>,

    /// Log level
    #[arg(long, env = "BOOKING_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "BOOKING_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    let mut config = DaemonConfig::load(cli.config.as_deref())
        .map_err(|e| DaemonError::Config(e.to_string()))?;

    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.logging.json |= cli.json;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    if let Some(listen) = cli.listen {
        config.server.listen_addr = listen
            .parse()
            .map_err(|e| DaemonError::Config(format!("Invalid listen address: {}", e)))?;
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        listen = %config.server.listen_addr,
        slot_utc_offset_hours = config.engine.slot_utc_offset_hours,
        "Starting bookingd"
    );

    let server = Server::new(config).await?;
    server.run().await
}
