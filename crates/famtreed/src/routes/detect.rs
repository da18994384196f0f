//! Stateless face-detection proxy.

use crate::error::ApiError;
use crate::session::Authenticated;
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use famtree_core::{gate, DetectionError};
use famtree_vision::{decode_data_url, sniff};
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
pub struct DetectRequest {
    /// `data:<type>;base64,<payload>`
    #[serde(default)]
    image: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectResponse {
    success: bool,
    face_count: u32,
    is_single_person: bool,
    message: String,
}

pub async fn detect_faces(
    State(state): State<AppState>,
    user: Authenticated,
    payload: Result<Json<DetectRequest>, JsonRejection>,
) -> Result<Json<DetectResponse>, ApiError> {
    let Json(request) = payload?;
    let image = decode_data_url(&request.image).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    tracing::debug!(
        user = %user.session.user_id,
        declared = %image.media_type,
        sniffed = sniff::mime_type(&image.bytes),
        bytes = image.bytes.len(),
        "detect-faces request"
    );

    match state.detector.detect_faces(&image.bytes).await {
        Ok(result) => {
            let decision = gate::evaluate(&result);
            tracing::info!(
                user = %user.session.user_id,
                faces = result.face_count,
                accepted = decision.is_accepted(),
                "detect-faces"
            );
            Ok(Json(DetectResponse {
                success: true,
                face_count: result.face_count,
                is_single_person: decision.is_accepted(),
                message: decision.message(),
            }))
        }
        // A non-2xx answer carries no annotations, so it reads the same as
        // an empty one.
        Err(DetectionError::Unanalyzable | DetectionError::Status { .. }) => {
            Err(ApiError::Detection {
                status: StatusCode::BAD_REQUEST,
                message: DetectionError::Unanalyzable.to_string(),
            })
        }
        Err(err) => Err(ApiError::Detection {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("Error analyzing image: {err}"),
        }),
    }
}
