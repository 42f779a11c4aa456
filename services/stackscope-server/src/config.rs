//! Server Configuration
//!
//! Layered configuration for the stackscope server: built-in defaults, an
//! optional config file, `config/default` and `config/local`, then
//! `STACKSCOPE__SECTION__KEY` environment variables. CLI flags are applied
//! on top by `main`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use stackscope_types::EndpointDescriptor;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listener settings
    #[serde(default)]
    pub server: ServerSettings,

    /// Emulated-cloud backend
    #[serde(default)]
    pub backend: BackendConfig,

    /// Polling loop
    #[serde(default)]
    pub poller: PollerConfig,

    /// Cross-origin headers
    #[serde(default)]
    pub cors: CorsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Prometheus exporter
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Container log endpoint
    #[serde(default)]
    pub logs: LogsSettings,

    /// Polled services; the LocalStack catalog when absent
    #[serde(default)]
    pub catalog: Option<Vec<EndpointDescriptor>>,
}

/// Server binding settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Time allowed for open connections to drain on shutdown
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Dashboard files served for unmatched paths
    #[serde(default = "default_static_dir")]
    pub static_dir: Option<PathBuf>,

    /// Maximum request body size in bytes
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            static_dir: default_static_dir(),
            max_body_size: default_max_body_size(),
        }
    }
}

impl ServerSettings {
    /// Get the shutdown timeout duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL every proxied path is joined onto
    #[serde(default = "default_backend_url")]
    pub base_url: String,

    /// Timeout for browser-initiated proxy requests
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_backend_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Polling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Seconds between cycle starts
    #[serde(default = "default_poll_interval")]
    pub interval_secs: u64,

    /// Bound on each health or listing request
    #[serde(default = "default_check_timeout")]
    pub check_timeout_secs: u64,

    /// Run the background poller
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval(),
            check_timeout_secs: default_check_timeout(),
            enabled: true,
        }
    }
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.check_timeout_secs)
    }
}

/// CORS settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Allowed origins; `*` allows any
    #[serde(default = "default_cors_origins")]
    pub allowed_origins: Vec<String>,

    #[serde(default = "default_cors_methods")]
    pub allowed_methods: Vec<String>,

    #[serde(default = "default_cors_headers")]
    pub allowed_headers: Vec<String>,

    /// Preflight cache lifetime
    #[serde(default = "default_cors_max_age")]
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_cors_origins(),
            allowed_methods: default_cors_methods(),
            allowed_headers: default_cors_headers(),
            max_age_secs: default_cors_max_age(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log slow requests threshold in ms
    #[serde(default = "default_slow_request_threshold")]
    pub slow_request_threshold_ms: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            slow_request_threshold_ms: default_slow_request_threshold(),
        }
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Start the Prometheus exporter
    #[serde(default)]
    pub enabled: bool,

    /// Exporter port (separate from main server)
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

/// Container log settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsSettings {
    /// Container names tried in order
    #[serde(default = "default_containers")]
    pub containers: Vec<String>,

    #[serde(default = "default_log_tail")]
    pub tail: usize,

    #[serde(default = "default_log_max_entries")]
    pub max_entries: usize,

    #[serde(default = "default_log_max_message_len")]
    pub max_message_len: usize,

    #[serde(default = "default_log_command_timeout")]
    pub command_timeout_secs: u64,
}

impl Default for LogsSettings {
    fn default() -> Self {
        Self {
            containers: default_containers(),
            tail: default_log_tail(),
            max_entries: default_log_max_entries(),
            max_message_len: default_log_max_message_len(),
            command_timeout_secs: default_log_command_timeout(),
        }
    }
}

// =============================================================================
// Default Functions
// =============================================================================

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9999
}

fn default_shutdown_timeout() -> u64 {
    10
}

fn default_static_dir() -> Option<PathBuf> {
    Some(PathBuf::from("static"))
}

fn default_max_body_size() -> usize {
    10 * 1024 * 1024 // 10MB
}

fn default_backend_url() -> String {
    "http://localhost:4566".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_poll_interval() -> u64 {
    10
}

fn default_check_timeout() -> u64 {
    2
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_cors_methods() -> Vec<String> {
    ["GET", "POST", "PUT", "DELETE", "OPTIONS"]
        .iter()
        .map(|m| m.to_string())
        .collect()
}

fn default_cors_headers() -> Vec<String> {
    vec!["Content-Type".to_string(), "Authorization".to_string()]
}

fn default_cors_max_age() -> u64 {
    86400
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_slow_request_threshold() -> u64 {
    1000
}

fn default_metrics_port() -> u16 {
    9464
}

fn default_containers() -> Vec<String> {
    [
        "localstack-main",
        "localstack-demo-localstack-1",
        "localstack_main",
        "localstack",
    ]
    .iter()
    .map(|c| c.to_string())
    .collect()
}

fn default_log_tail() -> usize {
    100
}

fn default_log_max_entries() -> usize {
    50
}

fn default_log_max_message_len() -> usize {
    800
}

fn default_log_command_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Settings read from the environment as comma-separated lists
const LIST_KEYS: &[&str] = &[
    "cors.allowed_origins",
    "cors.allowed_methods",
    "cors.allowed_headers",
    "logs.containers",
];

impl ServerConfig {
    /// Load configuration from environment and optional config file
    pub fn load(config_path: Option<&str>) -> anyhow::Result<Self> {
        // Load .env file if present
        let _ = dotenvy::dotenv();

        let mut builder = ::config::Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(::config::File::with_name(path).required(true));
        }

        builder = builder
            .add_source(::config::File::with_name("config/default").required(false))
            .add_source(::config::File::with_name("config/local").required(false));

        // STACKSCOPE__POLLER__INTERVAL_SECS=5
        // STACKSCOPE__CORS__ALLOWED_ORIGINS=http://localhost:3000,http://dash.local
        let mut environment = ::config::Environment::with_prefix("STACKSCOPE")
            .prefix_separator("__")
            .separator("__")
            .list_separator(",")
            .try_parsing(true);
        for &key in LIST_KEYS {
            environment = environment.with_list_parse_key(key);
        }
        builder = builder.add_source(environment);

        let config = builder.build().context("failed to read configuration")?;
        config
            .try_deserialize()
            .context("invalid configuration")
    }

    /// Create a configuration for local development
    pub fn development() -> Self {
        Self {
            poller: PollerConfig {
                interval_secs: 5,
                ..PollerConfig::default()
            },
            logging: LoggingConfig {
                level: "debug".to_string(),
                format: "pretty".to_string(),
                slow_request_threshold_ms: 500,
            },
            ..Self::default()
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            backend: BackendConfig::default(),
            poller: PollerConfig::default(),
            cors: CorsConfig::default(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
            logs: LogsSettings::default(),
            catalog: None,
        }
    }
}
