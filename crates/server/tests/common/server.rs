//! Server test utilities.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use depot_core::config::{AppConfig, StorageConfig};
use depot_server::{AppState, create_router};
use depot_storage::{FilesystemBackend, MemoryBackend, ObjectStore};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    _temp_dir: Option<TempDir>,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a test server over in-memory storage.
    pub fn new() -> Self {
        let config = AppConfig {
            storage: StorageConfig::Memory,
            ..Default::default()
        };
        let storage: Arc<dyn ObjectStore> = Arc::new(MemoryBackend::new());
        Self::build(config, storage, None)
    }

    /// Create a test server over temporary filesystem storage, with custom
    /// config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let storage_path = temp_dir.path().join("storage");

        let mut config = AppConfig {
            storage: StorageConfig::Filesystem {
                path: storage_path.clone(),
            },
            ..Default::default()
        };
        modifier(&mut config);

        let storage: Arc<dyn ObjectStore> = Arc::new(
            FilesystemBackend::new(&storage_path)
                .await
                .expect("Failed to create storage backend"),
        );
        Self::build(config, storage, Some(temp_dir))
    }

    fn build(config: AppConfig, storage: Arc<dyn ObjectStore>, temp_dir: Option<TempDir>) -> Self {
        let state = AppState::new(config, storage);
        let router = create_router(state.clone());
        Self {
            router,
            state,
            _temp_dir: temp_dir,
        }
    }

    /// Send a request and decode the JSON response body (Null when empty).
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();

        let json = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    /// Helper to make JSON requests.
    pub async fn json_request(
        &self,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                builder = builder.header("Content-Type", "application/json");
                Body::from(serde_json::to_vec(&v).unwrap())
            }
            None => Body::empty(),
        };
        self.send(builder.body(body).unwrap()).await
    }

    /// Create a session for `size` bytes and return its id.
    pub async fn create_upload(&self, size: u64) -> String {
        let (status, json) = self
            .json_request("POST", "/v1/uploads", Some(serde_json::json!({ "size": size })))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{json}");
        json["upload_id"].as_str().unwrap().to_string()
    }

    /// PUT one chunk starting at `start`, using an inclusive Content-Range.
    pub async fn put_chunk(
        &self,
        upload_id: &str,
        start: u64,
        data: &[u8],
        total: u64,
    ) -> (StatusCode, Value) {
        let end = start + data.len() as u64 - 1;
        let request = Request::builder()
            .method("PUT")
            .uri(format!("/v1/uploads/{upload_id}"))
            .header("Content-Range", format!("bytes {start}-{end}/{total}"))
            .body(Body::from(data.to_vec()))
            .unwrap();
        self.send(request).await
    }

    /// Fetch raw response bytes for a GET.
    pub async fn get_bytes(&self, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, headers, body.to_vec())
    }
}
