//! Poller Integration Tests
//!
//! Drives the aggregator against a local axum backend. Timings are scaled
//! down from the production defaults.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;

use stackscope_poller::{Aggregator, Catalog, CycleOutcome, PollScheduler};
use stackscope_proxy::{CorsPolicy, Proxy, ProxyConfig};
use stackscope_types::{
    EndpointDescriptor, ListingRequest, LivenessCheck, Metrics, ResourceParser, ServiceStatus,
};

const CHECK_TIMEOUT: Duration = Duration::from_millis(300);

async fn spawn_backend(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn aggregator(backend_url: String, catalog: Catalog) -> (Arc<Aggregator>, Arc<Metrics>) {
    let metrics = Arc::new(Metrics::new());
    let proxy = Proxy::new(
        ProxyConfig {
            backend_url,
            request_timeout: Duration::from_secs(5),
        },
        CorsPolicy::permissive(),
        metrics.clone(),
    )
    .unwrap();
    let aggregator = Aggregator::new(Arc::new(proxy), Arc::new(catalog), CHECK_TIMEOUT);
    (Arc::new(aggregator), metrics)
}

/// `storage` answers at once, `queue` stalls past the check timeout
fn storage_and_queue() -> Catalog {
    Catalog::new(vec![
        EndpointDescriptor::new("storage", "/storage/health").with_listing(
            ListingRequest::get("/storage/buckets"),
            ResourceParser::JsonArray {
                field: "buckets".to_string(),
            },
        ),
        EndpointDescriptor::new("queue", "/queue/health"),
    ])
    .unwrap()
}

fn storage_and_queue_backend() -> Router {
    Router::new()
        .route("/storage/health", get(|| async { StatusCode::OK }))
        .route(
            "/storage/buckets",
            get(|| async { axum::Json(serde_json::json!({ "buckets": ["a", "b", "c"] })) }),
        )
        .route(
            "/queue/health",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                StatusCode::OK
            }),
        )
}

// =============================================================================
// Cycles
// =============================================================================

#[tokio::test]
async fn test_stalled_service_does_not_delay_cycle() {
    let backend = spawn_backend(storage_and_queue_backend()).await;
    let (aggregator, metrics) = aggregator(backend, storage_and_queue());
    assert!(aggregator.current().is_none());

    let started = Instant::now();
    let outcome = aggregator.poll_once().await;
    let elapsed = started.elapsed();

    let snapshot = outcome.snapshot().unwrap().clone();
    assert_eq!(snapshot.cycle, 1);
    assert_eq!(snapshot.len(), 2);

    let storage = snapshot.get("storage").unwrap();
    assert_eq!(storage.status, ServiceStatus::Healthy);
    assert_eq!(storage.resource_count, Some(3));

    let queue = snapshot.get("queue").unwrap();
    assert_eq!(queue.status, ServiceStatus::Unreachable);
    assert!(queue.error.is_some());

    // Checks run concurrently: about one timeout, well under the sum
    assert!(elapsed >= CHECK_TIMEOUT);
    assert!(elapsed < CHECK_TIMEOUT * 2, "cycle took {elapsed:?}");

    // storage health + storage listing + queue health
    assert_eq!(metrics.total_calls(), 3);
    assert_eq!(metrics.failed_calls(), 1);
    assert_eq!(aggregator.current().unwrap().cycle, 1);
}

#[tokio::test]
async fn test_results_cover_every_catalog_entry() {
    let backend = spawn_backend(
        Router::new()
            .route(
                "/_localstack/health",
                get(|| async {
                    axum::Json(serde_json::json!({
                        "services": { "s3": "running", "sqs": "available", "sns": "disabled" }
                    }))
                }),
            )
            .route(
                "/",
                get(|| async {
                    "<ListAllMyBucketsResult><Buckets><Bucket><Name>a</Name></Bucket></Buckets></ListAllMyBucketsResult>"
                })
                .post(|| async { axum::Json(serde_json::json!({ "TableNames": ["t1"] })) }),
            ),
    )
    .await;
    let (aggregator, _) = aggregator(backend, Catalog::localstack());

    let snapshot = aggregator.poll_once().await.snapshot().unwrap().clone();
    assert_eq!(snapshot.len(), Catalog::localstack().len());

    let names: Vec<_> = snapshot.results().iter().map(|r| r.service_name.as_str()).collect();
    assert_eq!(names, ["s3", "sqs", "dynamodb", "sns", "lambda", "apigateway"]);

    let s3 = snapshot.get("s3").unwrap();
    assert_eq!(s3.status, ServiceStatus::Healthy);
    assert_eq!(s3.resource_count, Some(1));

    // Listed as disabled, or not listed at all
    assert_eq!(snapshot.get("sns").unwrap().status, ServiceStatus::Unhealthy);
    assert_eq!(snapshot.get("lambda").unwrap().status, ServiceStatus::Unhealthy);

    // sqs is healthy but the listing endpoint answers with the s3 document
    let sqs = snapshot.get("sqs").unwrap();
    assert_eq!(sqs.status, ServiceStatus::Healthy);
    assert_eq!(sqs.resource_count, Some(0));
}

#[tokio::test]
async fn test_unparseable_listing_keeps_service_healthy() {
    let backend = spawn_backend(
        Router::new()
            .route("/health", get(|| async { axum::Json(serde_json::json!({ "status": "ok" })) }))
            .route("/functions", post(|| async { "not json" })),
    )
    .await;
    let catalog = Catalog::new(vec![EndpointDescriptor::new("lambda", "/health")
        .with_liveness(LivenessCheck::StatusField)
        .with_listing(
            ListingRequest::post("/functions", "{}"),
            ResourceParser::JsonArray {
                field: "Functions".to_string(),
            },
        )])
    .unwrap();
    let (aggregator, _) = aggregator(backend, catalog);

    let snapshot = aggregator.poll_once().await.snapshot().unwrap().clone();
    let lambda = snapshot.get("lambda").unwrap();
    assert_eq!(lambda.status, ServiceStatus::Healthy);
    assert_eq!(lambda.resource_count, None);
    assert!(lambda.error.as_deref().unwrap().contains("unparseable"));
}

#[tokio::test]
async fn test_backend_error_is_unhealthy() {
    let backend = spawn_backend(Router::new().route(
        "/health",
        get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "warming up") }),
    ))
    .await;
    let catalog = Catalog::new(vec![EndpointDescriptor::new("storage", "/health")]).unwrap();
    let (aggregator, _) = aggregator(backend, catalog);

    let snapshot = aggregator.poll_once().await.snapshot().unwrap().clone();
    let storage = snapshot.get("storage").unwrap();
    assert_eq!(storage.status, ServiceStatus::Unhealthy);
    assert!(storage.error.as_deref().unwrap().contains("503"));
}

// =============================================================================
// Overlap
// =============================================================================

#[tokio::test]
async fn test_overlapping_cycle_is_skipped() {
    let backend = spawn_backend(storage_and_queue_backend()).await;
    let (aggregator, metrics) = aggregator(backend, storage_and_queue());

    let first = {
        let aggregator = aggregator.clone();
        tokio::spawn(async move { aggregator.poll_once().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = aggregator.poll_once().await;
    assert!(second.is_skipped());
    assert!(aggregator.stats().in_flight);

    let first = first.await.unwrap();
    assert!(matches!(first, CycleOutcome::Completed(_)));

    let stats = aggregator.stats();
    assert_eq!(stats.cycles_completed, 1);
    assert_eq!(stats.cycles_skipped, 1);
    assert!(!stats.in_flight);

    // Only the first cycle's attempts were made
    assert_eq!(metrics.total_calls(), 3);

    let next = aggregator.poll_once().await;
    assert_eq!(next.snapshot().unwrap().cycle, 2);
}

// =============================================================================
// Scheduler
// =============================================================================

#[tokio::test]
async fn test_scheduler_polls_until_shutdown() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let backend = spawn_backend(Router::new().route(
        "/health",
        get(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                StatusCode::OK
            }
        }),
    ))
    .await;
    let catalog = Catalog::new(vec![EndpointDescriptor::new("storage", "/health")]).unwrap();
    let (aggregator, _) = aggregator(backend, catalog);

    let handle = PollScheduler::spawn(aggregator.clone(), Duration::from_millis(50));
    tokio::time::sleep(Duration::from_millis(220)).await;
    handle.shutdown().await;

    let completed = aggregator.stats().cycles_completed;
    let requests = hits.load(Ordering::SeqCst);
    assert!(completed >= 2, "only {completed} cycles completed");
    assert!(aggregator.current().is_some());
    assert!(!aggregator.stats().in_flight);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(aggregator.stats().cycles_completed, completed);
    assert_eq!(hits.load(Ordering::SeqCst), requests);
}

#[tokio::test]
async fn test_shutdown_cancels_cycle_in_flight() {
    let backend = spawn_backend(Router::new().route(
        "/health",
        get(|| async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            StatusCode::OK
        }),
    ))
    .await;
    let catalog = Catalog::new(vec![EndpointDescriptor::new("storage", "/health")]).unwrap();
    let (aggregator, metrics) = aggregator(backend, catalog);

    let handle = PollScheduler::spawn(aggregator.clone(), Duration::from_secs(10));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(aggregator.stats().in_flight);

    handle.shutdown().await;
    let after_shutdown = (metrics.total_calls(), aggregator.stats().cycles_completed);
    assert_eq!(after_shutdown, (0, 0));
    assert!(!aggregator.stats().in_flight);

    // The backend would have answered by now
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(
        (metrics.total_calls(), aggregator.stats().cycles_completed),
        after_shutdown
    );
    assert!(aggregator.current().is_none());
}

#[tokio::test]
async fn test_dropping_handle_stops_scheduler() {
    let catalog = Catalog::new(vec![EndpointDescriptor::new("storage", "/health")]).unwrap();
    let backend = spawn_backend(Router::new().route("/health", get(|| async { StatusCode::OK }))).await;
    let (aggregator, _) = aggregator(backend, catalog);

    let handle = PollScheduler::spawn(aggregator.clone(), Duration::from_millis(30));
    tokio::time::sleep(Duration::from_millis(100)).await;
    drop(handle);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let completed = aggregator.stats().cycles_completed;
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(aggregator.stats().cycles_completed, completed);
}
