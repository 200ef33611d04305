//! Main entry point for the host-stand waitlist service
//!
//! This is the production entry point that initializes and runs the
//! complete waitlist microservice with proper error handling, logging,
//! and graceful shutdown.

use anyhow::Result;
use clap::Parser;
use host_stand::config::AppConfig;
use host_stand::service::AppState;
use std::path::PathBuf;
use tokio::signal;
use tokio::time::Duration;
use tracing::{error, info, warn};

/// Host Stand Waitlist Service - venue queue management with live updates
#[derive(Parser)]
#[command(
    name = "host-stand",
    version,
    about = "A waitlist queue management microservice for restaurant and venue seating",
    long_about = "Host Stand is a Rust-based waitlist microservice that admits parties into \
                 per-venue queues, keeps positions and wait estimates current, handles staff \
                 call/seat/no-show actions, and streams live updates to every connected guest \
                 and dashboard over server-sent events."
)]
struct Args {
    /// Configuration file path
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Path to configuration file (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Log level override
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        help = "Override log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    /// HTTP port override
    #[arg(long, value_name = "PORT", help = "Override HTTP server port")]
    http_port: Option<u16>,

    /// Enable debug mode
    #[arg(short, long, help = "Enable debug mode with verbose logging")]
    debug: bool,

    /// Dry run mode (validate config and exit)
    #[arg(
        long,
        help = "Validate configuration and exit without starting service"
    )]
    dry_run: bool,
}

/// Initialize structured logging with the configured level
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Wait for shutdown signals (SIGINT, SIGTERM)
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C) signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

/// Display startup banner with service information
fn display_startup_banner(config: &AppConfig) {
    info!("Host Stand Waitlist Service");
    info!("   Service: {}", config.service.name);
    info!("   Log level: {}", config.service.log_level);
    info!(
        "   HTTP: {}:{}",
        config.service.http_host, config.service.http_port
    );
    info!(
        "   Heartbeat interval: {}s",
        config.stream.heartbeat_interval_seconds
    );
    info!(
        "   Called timeout: {}s",
        config.queue.called_timeout_seconds
    );
    info!(
        "   Sweep interval: {}s",
        config.queue.sweep_interval_seconds
    );
}

/// Load and merge configuration from environment and CLI arguments
fn load_config(args: &Args) -> Result<AppConfig> {
    // Start with file- or environment-based config
    let mut config = if let Some(config_path) = &args.config {
        info!("Loading configuration from: {}", config_path.display());
        AppConfig::from_file(config_path)?
    } else {
        AppConfig::from_env()?
    };

    // Apply CLI overrides
    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }

    if args.debug {
        config.service.log_level = "debug".to_string();
    }

    if let Some(http_port) = args.http_port {
        config.service.http_port = http_port;
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration (CLI args can override environment/config file)
    let config = load_config(&args).unwrap_or_else(|e| {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    });

    // Initialize logging early (before any other operations)
    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if args.dry_run {
        info!("Configuration validation successful");
        display_startup_banner(&config);
        info!("Dry run completed - exiting without starting service");
        return Ok(());
    }

    // Display startup information
    display_startup_banner(&config);

    // Initialize application state
    info!("Initializing service components...");
    let mut app_state = match AppState::new(config.clone()).await {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            std::process::exit(1);
        }
    };

    // Start the service
    info!("Starting service...");
    if let Err(e) = app_state.start().await {
        error!("Failed to start service: {}", e);
        std::process::exit(1);
    }

    info!("Host Stand Waitlist Service is running");
    info!("Press Ctrl+C to shutdown gracefully...");

    // Wait for shutdown signal
    wait_for_shutdown_signal().await;

    // Begin graceful shutdown
    info!("Shutdown signal received, beginning graceful shutdown...");

    let shutdown_timeout = config.shutdown_timeout();
    match tokio::time::timeout(shutdown_timeout, app_state.shutdown()).await {
        Ok(Ok(())) => {
            info!("Graceful shutdown completed successfully");
        }
        Ok(Err(e)) => {
            warn!("Shutdown finished with errors: {}", e);
        }
        Err(_) => {
            warn!("Shutdown timeout exceeded, forcing exit");
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    info!("Host Stand Waitlist Service stopped");
    Ok(())
}
