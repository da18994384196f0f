//! Cloud Vision `images:annotate` client.
//!
//! One request per image, `FACE_DETECTION` only. The face count is the number
//! of `faceAnnotations` in the first response, zero when that entry carries
//! none. A body with no response entries is treated as unanalyzable.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use famtree_core::detector::{DetectionError, FaceDetector};
use famtree_core::types::DetectionResult;
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_ENDPOINT: &str = "https://vision.googleapis.com/v1/images:annotate";
pub const DEFAULT_MAX_RESULTS: u32 = 10;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest raw error body carried into a [`DetectionError`].
const MAX_ERROR_BODY: usize = 200;

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub endpoint: String,
    /// Sent as the `key` query parameter. Without one the API answers 403,
    /// which surfaces as a detection failure.
    pub api_key: Option<String>,
    pub max_results: u32,
    pub timeout: Duration,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: None,
            max_results: DEFAULT_MAX_RESULTS,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

// ── Wire format ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct AnnotateRequest<'a> {
    requests: [ImageRequest<'a>; 1],
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    image: ImageContent<'a>,
    features: [Feature; 1],
}

#[derive(Serialize)]
struct ImageContent<'a> {
    content: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Feature {
    #[serde(rename = "type")]
    kind: &'static str,
    max_results: u32,
}

impl<'a> AnnotateRequest<'a> {
    fn face_detection(content: &'a str, max_results: u32) -> Self {
        Self {
            requests: [ImageRequest {
                image: ImageContent { content },
                features: [Feature {
                    kind: "FACE_DETECTION",
                    max_results,
                }],
            }],
        }
    }
}

#[derive(Deserialize, Debug, Default)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<ImageAnnotation>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct ImageAnnotation {
    face_annotations: Option<Vec<IgnoredAny>>,
    error: Option<ApiStatus>,
}

#[derive(Deserialize, Debug)]
struct ApiStatus {
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ApiStatus,
}

/// Face count from a successful `images:annotate` body.
fn parse_annotation(body: &str) -> Result<DetectionResult, DetectionError> {
    let response: AnnotateResponse = serde_json::from_str(body).map_err(|e| {
        tracing::debug!(error = %e, "unexpected vision response shape");
        DetectionError::Unanalyzable
    })?;
    let first = response
        .responses
        .into_iter()
        .next()
        .ok_or(DetectionError::Unanalyzable)?;

    if let Some(status) = first.error {
        tracing::warn!(message = %status.message, "vision API reported a per-image error");
    }
    let annotations = first.face_annotations.unwrap_or_default();
    let faces = u32::try_from(annotations.len()).unwrap_or(u32::MAX);
    Ok(DetectionResult::new(faces))
}

/// Message for a non-2xx response: the API's `error.message` if present,
/// otherwise the start of the raw body.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) if !envelope.error.message.is_empty() => envelope.error.message,
        _ => body.chars().take(MAX_ERROR_BODY).collect(),
    }
}

// ── Client ───────────────────────────────────────────────────────────────────

/// [`FaceDetector`] backed by the Cloud Vision REST API.
pub struct VisionClient {
    http: reqwest::Client,
    config: VisionConfig,
}

impl VisionClient {
    pub fn new(config: VisionConfig) -> Result<Self, VisionError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        if config.api_key.is_none() {
            tracing::warn!("no vision API key configured; face detection will fail");
        }
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &VisionConfig {
        &self.config
    }
}

#[async_trait]
impl FaceDetector for VisionClient {
    async fn detect_faces(&self, image: &[u8]) -> Result<DetectionResult, DetectionError> {
        let content = STANDARD.encode(image);
        let body = AnnotateRequest::face_detection(&content, self.config.max_results);
        let key = self.config.api_key.as_deref().unwrap_or_default();

        let response = self
            .http
            .post(&self.config.endpoint)
            .query(&[("key", key)])
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "vision request failed");
                DetectionError::Transport(e.to_string())
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| DetectionError::Transport(e.to_string()))?;

        if !status.is_success() {
            let message = error_message(&text);
            tracing::warn!(status = status.as_u16(), %message, "vision API returned an error");
            return Err(DetectionError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let result = parse_annotation(&text)?;
        tracing::debug!(faces = result.face_count, bytes = image.len(), "faces detected");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    type Seen = Arc<Mutex<Option<(HashMap<String, String>, Value)>>>;

    /// Serve `reply` on a local port and record the last request.
    async fn mock_vision(status: StatusCode, reply: Value) -> (String, Seen) {
        let seen: Seen = Arc::default();
        let record = seen.clone();
        let app = Router::new().route(
            "/v1/annotate",
            post(
                move |Query(query): Query<HashMap<String, String>>, Json(body): Json<Value>| {
                    let record = record.clone();
                    let reply = reply.clone();
                    async move {
                        *record.lock().unwrap() = Some((query, body));
                        (status, Json(reply))
                    }
                },
            ),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/v1/annotate"), seen)
    }

    fn client(endpoint: String) -> VisionClient {
        VisionClient::new(VisionConfig {
            endpoint,
            api_key: Some("test-key".into()),
            max_results: 10,
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[test]
    fn test_request_shape() {
        let body = serde_json::to_value(AnnotateRequest::face_detection("QUJD", 10)).unwrap();
        assert_eq!(
            body,
            json!({
                "requests": [{
                    "image": { "content": "QUJD" },
                    "features": [{ "type": "FACE_DETECTION", "maxResults": 10 }]
                }]
            })
        );
    }

    #[test]
    fn test_parse_counts_face_annotations() {
        let body = r#"{"responses":[{"faceAnnotations":[{"detectionConfidence":0.9},{}]}]}"#;
        assert_eq!(parse_annotation(body).unwrap().face_count, 2);
    }

    #[test]
    fn test_parse_missing_annotations_means_no_faces() {
        assert_eq!(parse_annotation(r#"{"responses":[{}]}"#).unwrap().face_count, 0);
        let body = r#"{"responses":[{"faceAnnotations":null}]}"#;
        assert_eq!(parse_annotation(body).unwrap().face_count, 0);
    }

    #[test]
    fn test_parse_empty_responses_is_unanalyzable() {
        assert_eq!(parse_annotation("{}"), Err(DetectionError::Unanalyzable));
        assert_eq!(
            parse_annotation(r#"{"responses":[]}"#),
            Err(DetectionError::Unanalyzable)
        );
        assert_eq!(parse_annotation("not json"), Err(DetectionError::Unanalyzable));
    }

    #[test]
    fn test_parse_per_image_error_counts_as_no_faces() {
        let body = r#"{"responses":[{"error":{"code":3,"message":"Bad image data."}}]}"#;
        assert_eq!(parse_annotation(body), Ok(DetectionResult::new(0)));
    }

    #[test]
    fn test_error_message_prefers_api_message() {
        let body = r#"{"error":{"code":403,"message":"API key not valid.","status":"PERMISSION_DENIED"}}"#;
        assert_eq!(error_message(body), "API key not valid.");
        assert_eq!(error_message("gateway down"), "gateway down");
        assert_eq!(error_message(&"x".repeat(1000)).len(), MAX_ERROR_BODY);
    }

    #[tokio::test]
    async fn test_detect_faces_against_mock() {
        let reply = json!({ "responses": [{ "faceAnnotations": [{}, {}, {}] }] });
        let (endpoint, seen) = mock_vision(StatusCode::OK, reply).await;

        let result = client(endpoint).detect_faces(b"ABC").await.unwrap();
        assert_eq!(result.face_count, 3);

        let (query, body) = seen.lock().unwrap().take().unwrap();
        assert_eq!(query.get("key").map(String::as_str), Some("test-key"));
        assert_eq!(body["requests"][0]["image"]["content"], "QUJD");
        assert_eq!(body["requests"][0]["features"][0]["maxResults"], 10);
    }

    #[tokio::test]
    async fn test_detect_faces_http_error() {
        let reply = json!({ "error": { "code": 403, "message": "API key not valid." } });
        let (endpoint, _) = mock_vision(StatusCode::FORBIDDEN, reply).await;

        let err = client(endpoint).detect_faces(b"ABC").await.unwrap_err();
        assert_eq!(
            err,
            DetectionError::Status {
                status: 403,
                message: "API key not valid.".into()
            }
        );
    }

    #[tokio::test]
    async fn test_detect_faces_unreachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(format!("http://{addr}/v1/annotate"))
            .detect_faces(b"ABC")
            .await
            .unwrap_err();
        assert!(matches!(err, DetectionError::Transport(_)));
    }
}
