//! herakles-proc-cpu-collector - version 0.1.0
//!
//! CPU utilization collector for logical process groups with tracing logging.
//! This is the main entry point that starts the collectors and the HTTP server
//! and handles subcommands.

mod cli;
mod commands;
mod config;
mod handlers;
mod health_stats;
mod metrics;
mod scheduler;
mod state;

use axum::{routing::get, Router};
use clap::Parser;
use prometheus::Registry;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::{net::TcpListener, signal};
use tracing::{debug, error, info, Level};

use cli::{Args, Commands, LogLevel};
use commands::{command_check, command_config, command_test};
use config::{
    resolve_config, show_config, validate_effective_config, Config, DEFAULT_BIND_ADDR,
    DEFAULT_INTERVAL_SECONDS, DEFAULT_PORT,
};
use handlers::{health_handler, metrics_handler, root_handler};
use health_stats::HealthStats;
use metrics::CollectorMetrics;
use state::AppState;

/// Maps the configured level name, falling back to the CLI value.
fn resolve_log_level(config: &Config, args: &Args) -> Option<Level> {
    let from_cli = match args.log_level {
        LogLevel::Off => None,
        LogLevel::Error => Some(Level::ERROR),
        LogLevel::Warn => Some(Level::WARN),
        LogLevel::Info => Some(Level::INFO),
        LogLevel::Debug => Some(Level::DEBUG),
        LogLevel::Trace => Some(Level::TRACE),
    };

    // The CLI default is "info"; a config value only applies when the flag kept it.
    if !matches!(args.log_level, LogLevel::Info) {
        return from_cli;
    }
    match config.log_level.as_deref().map(str::to_ascii_lowercase).as_deref() {
        Some("off") => None,
        Some("error") => Some(Level::ERROR),
        Some("warn") => Some(Level::WARN),
        Some("debug") => Some(Level::DEBUG),
        Some("trace") => Some(Level::TRACE),
        _ => from_cli,
    }
}

/// Initializes tracing logging subsystem with configured log level.
fn setup_logging(config: &Config, args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let Some(log_level) = resolve_log_level(config, args) else {
        return Ok(());
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Logging initialized with level: {}", log_level);
    Ok(())
}

/// Loads the configuration and exits with code 1 if it is invalid.
fn load_validated_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let config = resolve_config(args)?;
    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }
    Ok(config)
}

/// Completes on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}

/// Main application entry point.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Early config resolution for show/check modes
    if args.show_config || args.check_config {
        let config = resolve_config(&args)?;

        if args.check_config {
            if let Err(e) = validate_effective_config(&config) {
                eprintln!("❌ Configuration invalid: {}", e);
                std::process::exit(1);
            }
            println!("✅ Configuration is valid");
            return Ok(());
        }

        return show_config(&config, &args.config_format);
    }

    // Handle subcommands
    if let Some(command) = &args.command {
        return match command {
            Commands::Config {
                output,
                format,
                commented,
            } => command_config(output.clone(), format.clone(), *commented),

            // Check reports an invalid config itself instead of exiting early
            Commands::Check { verbose } => {
                let config = resolve_config(&args)?;
                setup_logging(&config, &args)?;
                command_check(*verbose, &config)
            }

            Commands::Test {
                iterations,
                pause_ms,
            } => {
                let config = load_validated_config(&args)?;
                setup_logging(&config, &args)?;
                command_test(*iterations, *pause_ms, &config)
            }
        };
    }

    // Load configuration for main server mode
    let config = load_validated_config(&args)?;
    setup_logging(&config, &args)?;

    info!("Starting herakles-proc-cpu-collector");

    let bind_ip_str = config.bind.as_deref().unwrap_or(DEFAULT_BIND_ADDR);
    let port = config.port.unwrap_or(DEFAULT_PORT);
    let interval = Duration::from_secs(
        config
            .interval_seconds
            .unwrap_or(DEFAULT_INTERVAL_SECONDS),
    );

    // Initialize Prometheus metrics registry
    let registry = Registry::new();
    let metrics = CollectorMetrics::new(&registry)?;
    debug!("All metrics registered successfully");

    let collectors = scheduler::build_collectors(&config.collectors);
    let collector_names: Vec<String> = collectors.iter().map(|c| c.name().to_string()).collect();

    let state = Arc::new(AppState {
        registry,
        metrics,
        config: Arc::new(config.clone()),
        health_stats: Arc::new(HealthStats::new()),
        collectors: collector_names,
        start_time: Instant::now(),
    });

    let tasks = scheduler::spawn_collectors(
        state.clone(),
        collectors,
        interval,
        config.enable_stdout.unwrap_or(false),
    );

    // Configure HTTP server routes
    let addr: SocketAddr = format!("{}:{}", bind_ip_str, port).parse()?;

    let mut app = Router::new()
        .route("/", get(root_handler))
        .route("/metrics", get(metrics_handler));

    if config.enable_health.unwrap_or(true) {
        app = app.route("/health", get(health_handler));
    }

    let app = app.with_state(state.clone());

    let listener = TcpListener::bind(addr).await?;
    info!(
        "herakles-proc-cpu-collector listening on http://{}:{}",
        bind_ip_str, port
    );

    let server = axum::serve(listener, app);

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                error!("Server error: {}", e);
                return Err(e.into());
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, exiting...");
        }
    }

    for task in tasks {
        task.abort();
    }

    info!("herakles-proc-cpu-collector stopped gracefully");
    Ok(())
}
