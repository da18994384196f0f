//! Router harness: in-memory SQLite, a temp media directory and a scripted
//! detector.

use super::router;
use crate::state::{AppState, UploadRegistry};
use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::Router;
use famtree_core::{DetectionError, DetectionResult, FaceDetector, PhotoStore};
use famtree_store::{Database, FsBlobStore, SqliteAccounts, SqlitePhotoRecords};
use famtree_vision::encode_data_url;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR\0\0\0\x01\0\0\0\x01";

pub fn png_data_url() -> String {
    encode_data_url("image/png", PNG_BYTES)
}

pub struct StubDetector {
    outcome: Mutex<Result<u32, DetectionError>>,
}

impl StubDetector {
    pub fn faces(n: u32) -> Arc<Self> {
        Arc::new(Self {
            outcome: Mutex::new(Ok(n)),
        })
    }

    pub fn failing(err: DetectionError) -> Arc<Self> {
        Arc::new(Self {
            outcome: Mutex::new(Err(err)),
        })
    }

    pub fn set_faces(&self, n: u32) {
        *self.outcome.lock().unwrap() = Ok(n);
    }
}

#[async_trait]
impl FaceDetector for StubDetector {
    async fn detect_faces(&self, _image: &[u8]) -> Result<DetectionResult, DetectionError> {
        self.outcome.lock().unwrap().clone().map(DetectionResult::new)
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub bytes: Vec<u8>,
    pub body: Value,
}

impl TestResponse {
    pub fn message(&self) -> &str {
        self.body["message"].as_str().unwrap_or_default()
    }

    pub fn location(&self) -> Option<&str> {
        self.headers.get("location").and_then(|v| v.to_str().ok())
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub detector: Arc<StubDetector>,
    _media: TempDir,
}

impl TestApp {
    pub async fn new(detector: Arc<StubDetector>) -> Self {
        let media = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().await.unwrap();
        let blobs = Arc::new(FsBlobStore::new(media.path(), "http://test/media"));
        let records = Arc::new(SqlitePhotoRecords::new(db.clone()));
        let store = Arc::new(PhotoStore::new(blobs, records));

        let state = AppState {
            identity: Arc::new(SqliteAccounts::new(db)),
            detector: detector.clone(),
            store: store.clone(),
            uploads: Arc::new(UploadRegistry::new(
                detector.clone(),
                store,
                Duration::from_secs(3),
            )),
            media_dir: media.path().to_path_buf(),
            cookie_secure: false,
        };

        Self {
            router: router(state.clone(), 1024 * 1024),
            state,
            detector,
            _media: media,
        }
    }

    pub async fn single_face() -> Self {
        Self::new(StubDetector::faces(1)).await
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        TestResponse {
            status,
            headers,
            bytes,
            body,
        }
    }

    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        };
        self.send(request.unwrap()).await
    }

    /// Create an account and return its session token.
    pub async fn sign_up(&self, email: &str) -> String {
        let response = self
            .call(
                Method::POST,
                "/api/auth/signup",
                None,
                Some(json!({ "name": "Ann Lee", "email": email, "password": "secret1" })),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);
        response.body["token"].as_str().unwrap().to_string()
    }

    /// Run an image through select, details and commit; returns the photo.
    pub async fn upload(&self, token: &str, person: &str, relationship: &str) -> Value {
        let selected = self
            .call(
                Method::POST,
                "/api/uploads",
                Some(token),
                Some(json!({ "fileName": "photo.png", "image": png_data_url() })),
            )
            .await;
        assert_eq!(selected.body["phase"], "accepted", "{:?}", selected.body);

        let updated = self
            .call(
                Method::PATCH,
                "/api/uploads/current",
                Some(token),
                Some(json!({ "personName": person, "relationship": relationship })),
            )
            .await;
        assert_eq!(updated.body["canCommit"], true, "{:?}", updated.body);

        let committed = self
            .call(Method::POST, "/api/uploads/current/commit", Some(token), None)
            .await;
        assert_eq!(committed.status, StatusCode::OK, "{:?}", committed.body);
        committed.body["photo"].clone()
    }
}
