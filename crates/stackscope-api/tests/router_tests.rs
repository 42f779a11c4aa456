//! Router tests over an in-memory test server, without a reachable backend

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::Value;

use stackscope_api::container_logs::{LogSource, LogSourceError};
use stackscope_api::{create_test_router, AppState, ContainerLogs, LogsConfig};
use stackscope_poller::{Aggregator, Catalog};
use stackscope_proxy::{CorsPolicy, Proxy, ProxyConfig};
use stackscope_types::Metrics;

struct NoDocker;

#[async_trait::async_trait]
impl LogSource for NoDocker {
    async fn tail(&self, _container: &str, _lines: usize) -> Result<Option<String>, LogSourceError> {
        Err(LogSourceError::Spawn(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "docker not installed",
        )))
    }

    async fn running_containers(&self) -> Result<String, LogSourceError> {
        Ok(String::new())
    }
}

fn test_server(logs: LogsConfig) -> (TestServer, Arc<AppState>) {
    // Bind and release a port so nothing listens on it
    let closed = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let backend_url = format!("http://{}", closed.local_addr().unwrap());
    drop(closed);

    let proxy = Proxy::new(
        ProxyConfig {
            backend_url,
            request_timeout: Duration::from_secs(1),
        },
        CorsPolicy::permissive(),
        Arc::new(Metrics::new()),
    )
    .unwrap();
    let aggregator = Aggregator::new(
        Arc::new(proxy),
        Arc::new(Catalog::localstack()),
        Duration::from_millis(500),
    );
    let logs = ContainerLogs::with_source(logs, NoDocker);
    let state = Arc::new(AppState::new(Arc::new(aggregator), Arc::new(logs)));
    let server = TestServer::new(create_test_router(state.clone())).unwrap();
    (server, state)
}

#[tokio::test]
async fn test_health_endpoint() {
    let (server, _) = test_server(LogsConfig::default());
    let response = server.get("/health").await;

    response.assert_status_ok();
    let json = response.json::<Value>();
    assert_eq!(json["status"], "healthy");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_unreachable_backend_through_proxy_route() {
    let (server, state) = test_server(LogsConfig::default());
    let response = server.get("/api/_localstack/health").await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let json = response.json::<Value>();
    assert_eq!(json["kind"], "connectivity");
    assert_eq!(state.metrics.failed_calls(), 1);
}

#[tokio::test]
async fn test_cycle_with_unreachable_backend() {
    let (server, state) = test_server(LogsConfig::default());
    state.aggregator.poll_once().await;

    let json = server.get("/snapshot").await.json::<Value>();
    assert_eq!(json["summary"]["total"], 6);
    assert_eq!(json["summary"]["unreachable"], 6);
    assert_eq!(json["results"]["s3"]["status"], "unreachable");
}

#[tokio::test]
async fn test_logs_without_docker() {
    let (server, _) = test_server(LogsConfig::default());
    let json = server.get("/logs").await.json::<Value>();

    assert_eq!(json["source"], "troubleshooting");
    assert_eq!(json["success"], true);
}

#[tokio::test]
async fn test_logs_disabled_without_containers() {
    let (server, _) = test_server(LogsConfig {
        containers: vec![],
        ..LogsConfig::default()
    });
    let response = server.get("/logs").await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.json::<Value>()["code"], "LOGS_UNAVAILABLE");
}
