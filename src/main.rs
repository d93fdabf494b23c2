//! Main entry point for the meeting matcher service
//!
//! Loads configuration, initializes logging, runs the service until a
//! shutdown signal arrives, then shuts it down within the configured timeout.

use anyhow::{Context, Result};
use clap::Parser;
use meeting_matcher::config::{validate_config, AppConfig, QueueBackend};
use meeting_matcher::service::AppState;
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

/// Meeting Matcher - friend-excluding group matchmaking for video meetings
#[derive(Parser)]
#[command(
    name = "meeting-matcher",
    version,
    about = "Groups queued participants into video meetings without friends across sides",
    long_about = "Meeting Matcher keeps a male and a female queue, forms groups of K per side in \
                 which nobody is a friend of anyone on the other side, and opens a video session \
                 for each group."
)]
struct Args {
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Path to configuration file (TOML format)"
    )]
    config: Option<PathBuf>,

    #[arg(
        long,
        help = "Probe the running service's readiness endpoint and exit with its status"
    )]
    health_check: bool,

    #[arg(
        short,
        long,
        value_name = "LEVEL",
        help = "Override log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    #[arg(long, value_name = "PORT", help = "Override health and metrics port")]
    health_port: Option<u16>,

    #[arg(long, value_name = "K", help = "Override participants per side in a group")]
    group_size: Option<usize>,

    #[arg(long, value_name = "BACKEND", help = "Override queue backend (memory, redis)")]
    queue_backend: Option<QueueBackend>,

    #[arg(short, long, help = "Enable debug mode with verbose logging")]
    debug: bool,

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

/// Ask a running instance whether it is ready
async fn perform_health_check(config: &AppConfig) -> Result<bool> {
    let url = format!("http://127.0.0.1:{}/ready", config.service.health_port);
    info!("Performing health check against {}", url);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .context("Failed to build health check client")?;

    match client.get(&url).send().await {
        Ok(response) => {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            println!("Health Check: {} {}", status.as_u16(), body);
            Ok(status.is_success())
        }
        Err(e) => {
            println!("Health Check: unreachable ({})", e);
            Ok(false)
        }
    }
}

/// Wait for shutdown signals (SIGINT, SIGTERM)
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("Failed to install SIGTERM handler")?;

        tokio::select! {
            result = signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl+C")?;
                info!("Received SIGINT (Ctrl+C) signal");
            },
            _ = terminate.recv() => {
                info!("Received SIGTERM signal");
            },
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl+C")?;
        info!("Received Ctrl+C signal");
    }

    Ok(())
}

fn display_startup_banner(config: &AppConfig) {
    info!("Meeting Matcher Service");
    info!("   Service: {}", config.service.name);
    info!("   Log level: {}", config.service.log_level);
    info!("   Health port: {}", config.service.health_port);
    info!("   Group size: {} per side", config.matching.group_size);
    info!("   Queue backend: {:?}", config.queue.backend);
    info!("   Video provider: {:?}", config.video.provider);
    info!(
        "   Friend lookups: {}",
        config
            .friends
            .social_graph_url
            .as_deref()
            .unwrap_or("in-memory graph")
    );
    info!("   Friend lookup policy: {}", config.matching.friend_lookup_policy);
}

/// Load configuration from file or environment, then apply CLI overrides
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path)?
    } else {
        AppConfig::from_env()?
    };

    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }

    if args.debug {
        config.service.log_level = "debug".to_string();
    }

    if let Some(port) = args.health_port {
        config.service.health_port = port;
    }

    if let Some(group_size) = args.group_size {
        config.matching.group_size = group_size;
    }

    if let Some(backend) = args.queue_backend {
        config.queue.backend = backend;
    }

    validate_config(&config)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if args.health_check {
        let healthy = perform_health_check(&config).await?;
        std::process::exit(if healthy { 0 } else { 1 });
    }

    display_startup_banner(&config);

    if args.dry_run {
        info!("Configuration validation successful");
        info!("Dry run completed - exiting without starting service");
        return Ok(());
    }

    info!("Initializing service components...");
    let mut app_state = match AppState::new(config.clone()).await {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting service...");
    if let Err(e) = app_state.start().await {
        error!("Failed to start service: {}", e);
        std::process::exit(1);
    }

    info!("Meeting matcher is running, press Ctrl+C to shut down");

    wait_for_shutdown_signal().await?;

    info!("Shutdown signal received, beginning graceful shutdown...");

    match tokio::time::timeout(config.shutdown_timeout(), app_state.shutdown()).await {
        Ok(Ok(())) => info!("Graceful shutdown completed successfully"),
        Ok(Err(e)) => warn!("Shutdown finished with errors: {}", e),
        Err(_) => warn!("Shutdown timeout exceeded, forcing exit"),
    }

    info!("Meeting matcher stopped");
    Ok(())
}
