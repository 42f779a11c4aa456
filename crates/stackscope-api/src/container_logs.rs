//! Backend container logs
//!
//! Tails the emulated cloud's container through the docker CLI and turns the
//! raw lines into [`LogEntry`] values. When no container can be read, the
//! response is a troubleshooting payload instead of an error.

use std::io::ErrorKind;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;

const DISPLAY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";
const MAX_CONTAINER_LIST_LEN: usize = 500;

const ERROR_KEYWORDS: &[&str] = &["ERROR", "EXCEPTION", "FAILED", "FATAL"];
const WARNING_KEYWORDS: &[&str] = &["WARN", "WARNING"];
const DEBUG_KEYWORDS: &[&str] = &["DEBUG"];

/// Container log settings
#[derive(Debug, Clone)]
pub struct LogsConfig {
    /// Container names tried in order
    pub containers: Vec<String>,
    /// Lines requested from each container
    pub tail: usize,
    /// Entries kept in the response
    pub max_entries: usize,
    /// Characters kept per message
    pub max_message_len: usize,
    /// Bound on each docker invocation
    pub command_timeout: Duration,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            containers: vec![
                "localstack-main".to_string(),
                "localstack-demo-localstack-1".to_string(),
                "localstack_main".to_string(),
                "localstack".to_string(),
            ],
            tail: 100,
            max_entries: 50,
            max_message_len: 800,
            command_timeout: Duration::from_secs(30),
        }
    }
}

/// Severity derived from message keywords
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warning,
    Info,
    Debug,
}

impl LogLevel {
    /// Classify a message, case-insensitively
    pub fn classify(message: &str) -> Self {
        let upper = message.to_ascii_uppercase();
        let has_any = |keywords: &[&str]| keywords.iter().any(|k| upper.contains(k));
        if has_any(ERROR_KEYWORDS) {
            Self::Error
        } else if has_any(WARNING_KEYWORDS) {
            Self::Warning
        } else if has_any(DEBUG_KEYWORDS) {
            Self::Debug
        } else {
            Self::Info
        }
    }
}

/// One parsed log line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    fn now(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now().format(DISPLAY_TIME_FORMAT).to_string(),
            level,
            message: message.into(),
        }
    }
}

/// `GET /logs` payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsResponse {
    pub success: bool,
    pub logs: Vec<LogEntry>,
    /// Lines parsed before trimming to the most recent entries
    pub total: usize,
    /// `docker:<container>` or `troubleshooting`
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
}

/// Errors from reading a container's logs
#[derive(Debug, Error)]
pub enum LogSourceError {
    /// Docker is missing or may not be run; no container can be read
    #[error("failed to run docker: {0}")]
    Spawn(std::io::Error),

    /// Docker started but reading its output failed
    #[error("docker i/o error: {0}")]
    Io(std::io::Error),

    #[error("docker did not answer within {0:?}")]
    Timeout(Duration),

    #[error("docker exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
}

impl From<std::io::Error> for LogSourceError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            ErrorKind::NotFound | ErrorKind::PermissionDenied => Self::Spawn(err),
            _ => Self::Io(err),
        }
    }
}

/// Where container logs come from
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Last `lines` lines of a container's output, `None` when it has none
    async fn tail(&self, container: &str, lines: usize) -> Result<Option<String>, LogSourceError>;

    /// Human-readable listing of running containers
    async fn running_containers(&self) -> Result<String, LogSourceError>;
}

/// Reads logs through the local `docker` CLI
#[derive(Debug, Clone)]
pub struct DockerCli {
    timeout: Duration,
}

impl DockerCli {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn run(&self, args: &[&str]) -> Result<std::process::Output, LogSourceError> {
        let child = Command::new("docker").args(args).kill_on_drop(true).output();
        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| LogSourceError::Timeout(self.timeout))??;

        if output.status.success() {
            Ok(output)
        } else {
            Err(LogSourceError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[async_trait]
impl LogSource for DockerCli {
    async fn tail(&self, container: &str, lines: usize) -> Result<Option<String>, LogSourceError> {
        let lines = lines.to_string();
        let output = self
            .run(&["logs", "--tail", &lines, "--timestamps", container])
            .await?;

        // Containers that log to stderr produce nothing on stdout
        let text = if output.stdout.iter().all(u8::is_ascii_whitespace) {
            String::from_utf8_lossy(&output.stderr).into_owned()
        } else {
            String::from_utf8_lossy(&output.stdout).into_owned()
        };
        Ok(if text.trim().is_empty() { None } else { Some(text) })
    }

    async fn running_containers(&self) -> Result<String, LogSourceError> {
        let output = self
            .run(&["ps", "--format", "table {{.Names}}\t{{.Image}}\t{{.Status}}"])
            .await?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Fetches and formats container logs
pub struct ContainerLogs {
    config: LogsConfig,
    source: Box<dyn LogSource>,
}

impl std::fmt::Debug for ContainerLogs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerLogs")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ContainerLogs {
    /// Read logs through the docker CLI
    pub fn docker(config: LogsConfig) -> Self {
        let source = DockerCli::new(config.command_timeout);
        Self::with_source(config, source)
    }

    pub fn with_source(config: LogsConfig, source: impl LogSource + 'static) -> Self {
        Self {
            config,
            source: Box::new(source),
        }
    }

    pub fn config(&self) -> &LogsConfig {
        &self.config
    }

    /// Logs of the first configured container that has any
    pub async fn fetch(&self) -> LogsResponse {
        let mut spawn_error = None;

        for container in &self.config.containers {
            match self.source.tail(container, self.config.tail).await {
                Ok(Some(output)) => {
                    tracing::debug!(container = %container, "Read container logs");
                    return self.parse_output(container, &output);
                }
                Ok(None) => continue,
                Err(LogSourceError::Spawn(e)) => {
                    tracing::warn!(error = %e, "Cannot run docker for container logs");
                    spawn_error = Some(e.to_string());
                    break;
                }
                Err(e) => {
                    tracing::debug!(container = %container, error = %e, "No logs from container");
                }
            }
        }

        self.troubleshooting(spawn_error).await
    }

    fn parse_output(&self, container: &str, output: &str) -> LogsResponse {
        let now = Utc::now();
        let mut logs: Vec<LogEntry> = output
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| parse_line(line, self.config.max_message_len, now))
            .collect();

        let total = logs.len();
        if total > self.config.max_entries {
            logs.drain(..total - self.config.max_entries);
        }

        LogsResponse {
            success: true,
            logs,
            total,
            source: format!("docker:{container}"),
            container: Some(container.to_string()),
        }
    }

    async fn troubleshooting(&self, spawn_error: Option<String>) -> LogsResponse {
        let mut logs = vec![
            LogEntry::now(LogLevel::Warning, "No backend container found running"),
            LogEntry::now(
                LogLevel::Info,
                format!("Searched for containers: {}", self.config.containers.join(", ")),
            ),
        ];

        match spawn_error {
            Some(error) => logs.push(LogEntry::now(
                LogLevel::Warning,
                format!("Docker not available: {error}"),
            )),
            None => {
                let listing = match self.source.running_containers().await {
                    Ok(listing) => listing,
                    Err(e) => format!("Unable to list containers: {e}"),
                };
                logs.push(LogEntry::now(LogLevel::Info, "Available containers:"));
                logs.push(LogEntry::now(
                    LogLevel::Debug,
                    truncate_chars(&listing, MAX_CONTAINER_LIST_LEN),
                ));
            }
        }

        LogsResponse {
            success: true,
            total: logs.len(),
            logs,
            source: "troubleshooting".to_string(),
            container: None,
        }
    }
}

/// Split a `docker logs --timestamps` line into timestamp, level and message
pub fn parse_line(line: &str, max_message_len: usize, now: DateTime<Utc>) -> LogEntry {
    let parsed = line.split_once(' ').and_then(|(stamp, rest)| {
        DateTime::parse_from_rfc3339(stamp)
            .ok()
            .map(|ts| (ts.format(DISPLAY_TIME_FORMAT).to_string(), rest))
    });

    let (timestamp, message) = match parsed {
        Some((timestamp, rest)) => (timestamp, rest),
        None => (
            now.with_timezone(&Local).format(DISPLAY_TIME_FORMAT).to_string(),
            line,
        ),
    };

    LogEntry {
        timestamp,
        level: LogLevel::classify(message),
        message: truncate_chars(message, max_message_len),
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
