//! stackscope Server
//!
//! Dashboard backend for a locally emulated cloud. Serves the dashboard,
//! relays browser calls to the backend with CORS headers, and polls every
//! catalog service on an interval.
//!
//! # Features
//!
//! - Forwarding proxy under `/api/*`
//! - Concurrent service polling with per-check timeouts
//! - Snapshot, metrics, catalog and container-log endpoints
//! - Prometheus metrics export
//! - Graceful shutdown handling
//!
//! # Usage
//!
//! ```bash
//! # Start with default settings
//! stackscope-server
//!
//! # Start with custom config
//! stackscope-server --config /path/to/config.toml
//!
//! # Start with environment overrides
//! STACKSCOPE__POLLER__INTERVAL_SECS=5 stackscope-server
//! ```

mod config;

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use stackscope_api::{create_router, ApiConfig, AppState, ContainerLogs, LogsConfig};
use stackscope_poller::{Aggregator, Catalog, PollScheduler};
use stackscope_proxy::{CorsPolicy, Proxy, ProxyConfig};
use stackscope_types::Metrics;

use crate::config::ServerConfig;

// =============================================================================
// CLI Arguments
// =============================================================================

/// stackscope - CORS proxy and service poller for an emulated cloud
#[derive(Parser, Debug)]
#[command(name = "stackscope-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML, JSON, or YAML)
    #[arg(short, long, env = "STACKSCOPE_CONFIG")]
    config: Option<String>,

    /// Host to bind to
    #[arg(long, env = "STACKSCOPE_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "STACKSCOPE_PORT")]
    port: Option<u16>,

    /// Emulated-cloud base URL
    #[arg(long, env = "STACKSCOPE_BACKEND_URL")]
    backend_url: Option<String>,

    /// Seconds between poll cycles
    #[arg(long)]
    poll_interval: Option<u64>,

    /// Per-check timeout in seconds
    #[arg(long)]
    check_timeout: Option<u64>,

    /// Directory with the dashboard files
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Serve only, without background polling
    #[arg(long)]
    no_poll: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "STACKSCOPE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (json, pretty)
    #[arg(long, env = "STACKSCOPE_LOG_FORMAT")]
    log_format: Option<String>,
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration
    let mut server_config = ServerConfig::load(args.config.as_deref())?;
    apply_args(&mut server_config, args);

    // Initialize logging
    init_logging(&server_config.logging)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting stackscope server"
    );

    // Validate configuration
    validate_config(&server_config)?;

    // Build the proxy, catalog and aggregator
    let aggregator = init_aggregator(&server_config)?;

    let logs = ContainerLogs::docker(LogsConfig {
        containers: server_config.logs.containers.clone(),
        tail: server_config.logs.tail,
        max_entries: server_config.logs.max_entries,
        max_message_len: server_config.logs.max_message_len,
        command_timeout: Duration::from_secs(server_config.logs.command_timeout_secs),
    });

    // Create application state
    let state = Arc::new(AppState::new(aggregator.clone(), Arc::new(logs)));

    // Create API configuration
    let api_config = ApiConfig {
        enable_compression: true,
        enable_tracing: true,
        max_body_size: server_config.server.max_body_size,
        slow_request_threshold: Duration::from_millis(
            server_config.logging.slow_request_threshold_ms,
        ),
        static_dir: server_config.server.static_dir.clone(),
    };

    // Create router
    let app = create_router(state, api_config);

    // Start metrics server if enabled
    if server_config.metrics.enabled {
        start_metrics_server(&server_config.metrics)?;
    }

    // Start polling
    let poller = if server_config.poller.enabled {
        Some(PollScheduler::spawn(
            aggregator,
            server_config.poller.interval(),
        ))
    } else {
        tracing::info!("Background polling disabled");
        None
    };

    // Start server with graceful shutdown
    let listener = tokio::net::TcpListener::bind((
        server_config.server.host.as_str(),
        server_config.server.port,
    ))
    .await?;

    tracing::info!(
        addr = %listener.local_addr()?,
        backend = %server_config.backend.base_url,
        "Server listening"
    );

    let (stopping_tx, stopping_rx) = watch::channel(false);
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            if let Some(poller) = poller {
                poller.shutdown().await;
            }
            let _ = stopping_tx.send(true);
        })
        .into_future();

    let drain_timeout = server_config.server.shutdown_timeout();
    tokio::select! {
        result = server => result?,
        _ = drain_deadline(stopping_rx, drain_timeout) => {
            tracing::warn!(
                timeout_secs = drain_timeout.as_secs(),
                "Shutdown timeout elapsed, closing open connections"
            );
        }
    }

    tracing::info!("Server shutdown complete");

    Ok(())
}

// =============================================================================
// Initialization Functions
// =============================================================================

/// Apply CLI overrides on top of the loaded configuration
fn apply_args(config: &mut ServerConfig, args: Args) {
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(url) = args.backend_url {
        config.backend.base_url = url;
    }
    if let Some(secs) = args.poll_interval {
        config.poller.interval_secs = secs;
    }
    if let Some(secs) = args.check_timeout {
        config.poller.check_timeout_secs = secs;
    }
    if let Some(dir) = args.static_dir {
        config.server.static_dir = Some(dir);
    }
    if args.no_poll {
        config.poller.enabled = false;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if let Some(format) = args.log_format {
        config.logging.format = format;
    }
}

/// Initialize tracing/logging
fn init_logging(config: &config::LoggingConfig) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    match config.format.as_str() {
        "json" => {
            subscriber
                .with(fmt::layer().json().with_target(true))
                .try_init()?;
        }
        _ => {
            subscriber
                .with(fmt::layer().pretty().with_target(true))
                .try_init()?;
        }
    }

    Ok(())
}

/// Validate configuration
fn validate_config(config: &ServerConfig) -> anyhow::Result<()> {
    if config.poller.interval_secs == 0 {
        anyhow::bail!("poller.interval_secs must be greater than zero");
    }
    if config.poller.check_timeout_secs == 0 {
        anyhow::bail!("poller.check_timeout_secs must be greater than zero");
    }
    if config.backend.request_timeout_secs == 0 {
        anyhow::bail!("backend.request_timeout_secs must be greater than zero");
    }

    let url = config.backend.base_url.as_str();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        anyhow::bail!("backend.base_url must be an http(s) URL, got {url}");
    }

    // A cycle can take up to two check timeouts
    if config.poller.check_timeout_secs * 2 >= config.poller.interval_secs {
        tracing::warn!(
            interval_secs = config.poller.interval_secs,
            check_timeout_secs = config.poller.check_timeout_secs,
            "Slow cycles may overlap the poll interval; overlapping ticks will be skipped"
        );
    }

    Ok(())
}

/// Build the proxy and the aggregator that polls through it
fn init_aggregator(config: &ServerConfig) -> anyhow::Result<Arc<Aggregator>> {
    let cors = CorsPolicy::new(
        &config.cors.allowed_origins,
        &config.cors.allowed_methods,
        &config.cors.allowed_headers,
        config.cors.max_age_secs,
    )?;

    let metrics = Arc::new(Metrics::new());
    let proxy = Proxy::new(
        ProxyConfig {
            backend_url: config.backend.base_url.clone(),
            request_timeout: config.backend.request_timeout(),
        },
        cors,
        metrics,
    )?;

    let catalog = match &config.catalog {
        Some(entries) => Catalog::new(entries.clone())?,
        None => Catalog::localstack(),
    };

    tracing::info!(
        services = catalog.len(),
        interval_secs = config.poller.interval_secs,
        check_timeout_secs = config.poller.check_timeout_secs,
        "Service catalog loaded"
    );

    Ok(Arc::new(Aggregator::new(
        Arc::new(proxy),
        Arc::new(catalog),
        config.poller.check_timeout(),
    )))
}

/// Start Prometheus metrics server
fn start_metrics_server(config: &config::MetricsConfig) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    metrics::describe_counter!(
        "stackscope_proxy_requests_total",
        "Forwarded backend exchanges by outcome"
    );
    metrics::describe_counter!(
        "stackscope_poll_cycles_total",
        "Poll cycles by outcome (completed, skipped)"
    );
    metrics::describe_gauge!(
        "stackscope_services_healthy",
        "Healthy services in the latest snapshot"
    );
    metrics::describe_histogram!(
        "stackscope_check_latency_ms",
        "Health request latency per service"
    );

    tracing::info!(port = config.port, "Metrics server started");

    Ok(())
}

// =============================================================================
// Graceful Shutdown
// =============================================================================

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

/// Resolves `timeout` after shutdown has begun
async fn drain_deadline(mut stopping: watch::Receiver<bool>, timeout: Duration) {
    while !*stopping.borrow() {
        if stopping.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    tracing::info!(
        timeout_secs = timeout.as_secs(),
        "Waiting for in-flight requests to complete..."
    );
    tokio::time::sleep(timeout).await;
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let args = Args::parse_from([
            "stackscope-server",
            "--port",
            "8080",
            "--backend-url",
            "http://cloud.local:4566",
            "--no-poll",
        ]);
        assert_eq!(args.port, Some(8080));

        let mut config = ServerConfig::default();
        apply_args(&mut config, args);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.backend.base_url, "http://cloud.local:4566");
        assert!(!config.poller.enabled);
        // Not given on the command line, so the configured value stays
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_development_config() {
        let config = ServerConfig::development();
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.poller.interval_secs, 5);
    }

    #[test]
    fn test_validate_config() {
        assert!(validate_config(&ServerConfig::default()).is_ok());

        let mut config = ServerConfig::default();
        config.poller.interval_secs = 0;
        assert!(validate_config(&config).is_err());

        let mut config = ServerConfig::default();
        config.backend.base_url = "localhost:4566".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[tokio::test]
    async fn test_init_aggregator_rejects_duplicate_catalog() {
        let mut config = ServerConfig::default();
        config.catalog = Some(vec![
            stackscope_types::EndpointDescriptor::new("s3", "/health"),
            stackscope_types::EndpointDescriptor::new("s3", "/health"),
        ]);
        assert!(init_aggregator(&config).is_err());

        config.catalog = None;
        let aggregator = init_aggregator(&config).unwrap();
        assert_eq!(aggregator.catalog().len(), 6);
    }
}
