//! Face detector seam.

use crate::types::DetectionResult;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DetectionError {
    #[error("detection request failed: {0}")]
    Transport(String),
    #[error("detection service returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("Unable to analyze image")]
    Unanalyzable,
}

/// Counts faces in an encoded image.
///
/// Implementations make at most one outbound call per invocation and never
/// retry on their own.
#[async_trait]
pub trait FaceDetector: Send + Sync {
    async fn detect_faces(&self, image: &[u8]) -> Result<DetectionResult, DetectionError>;
}
