//! Common test utilities for API testing with mocks.
//!
//! Builds an in-process router over a file-backed queue in a temp dir and a
//! worker pool driven by [`MockEncoder`], so requests exercise the real
//! queue and pool without an ffmpeg binary.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use reelpress_core::{
    testing::MockEncoder, Config, DatabaseConfig, EventBus, QueueBackend, RetryConfig,
    SqliteJobQueue, WorkerConfig, WorkerPool,
};
use reelpress_server::{api::create_router, state::AppState};

/// Re-export fixtures for test convenience
pub use reelpress_core::testing::fixtures;

/// Test fixture for API testing with a mock encoder.
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Queue shared by the router and the pool
    pub queue: Arc<SqliteJobQueue>,
    /// Mock encoder - script outcomes and progress
    pub encoder: Arc<MockEncoder>,
    pub pool: Arc<WorkerPool>,
    pub events: EventBus,
    /// Temporary directory for the test database and job outputs
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
    pub text: String,
}

impl TestFixture {
    /// Create a fixture whose pool is not started.
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let mut config = Config::default();
        config.server.host = std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST);
        config.server.port = 0;
        config.database = DatabaseConfig {
            path: db_path.clone(),
        };
        config.queue = fixtures::fast_queue_config(5);
        config.retry = RetryConfig::immediate(3);
        config.worker = WorkerConfig {
            dequeue_wait_ms: 50,
            error_backoff_ms: 20,
            ..WorkerConfig::default()
        };
        config.notifier.webhook_url = Some("https://hooks.example.com/jobs?token=secret".to_string());

        let queue = Arc::new(
            SqliteJobQueue::new(&db_path, config.queue.clone())
                .expect("Failed to create queue")
                .with_retry(config.retry.clone()),
        );

        let encoder = Arc::new(MockEncoder::new());
        encoder.set_write_output(true).await;
        encoder.set_encode_duration(Duration::from_millis(20)).await;

        let events = EventBus::new(256);
        let pool = Arc::new(
            WorkerPool::new(
                config.worker.clone(),
                Arc::clone(&queue) as Arc<dyn QueueBackend>,
                Arc::clone(&encoder) as Arc<dyn reelpress_core::Encoder>,
            )
            .with_retry(config.retry.clone())
            .with_lease_duration(config.queue.visibility_timeout())
            .with_events(events.clone()),
        );

        let state = Arc::new(AppState::new(
            config,
            Arc::clone(&queue) as Arc<dyn QueueBackend>,
            Arc::clone(&pool),
            events.clone(),
        ));

        let router = create_router(state);

        Self {
            router,
            queue,
            encoder,
            pool,
            events,
            temp_dir,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Poll a job until `done` holds for its JSON representation.
    pub async fn wait_for_job(&self, id: &str, done: impl Fn(&Value) -> bool) -> Value {
        for _ in 0..200 {
            let response = self.get(&format!("/api/v1/jobs/{}", id)).await;
            if response.status == StatusCode::OK && done(&response.body) {
                return response.body;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("Job {} did not reach the expected state", id);
    }

    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        self.send(request_builder.body(body).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let text = String::from_utf8_lossy(&body_bytes).into_owned();
        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body, text }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status, $response.status, $response.text
        );
    };
}
