//! HTTP mapping of domain errors.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use famtree_core::{AuthError, StoreError, ValidationError, WorkflowError};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthorized,
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error("Error loading photos: {0}")]
    Load(StoreError),
    #[error("Error deleting photo: {0}")]
    Delete(StoreError),
    /// Detect-faces proxy failure with the status it should carry.
    #[error("{message}")]
    Detection { status: StatusCode, message: String },
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Auth(err) => match err {
                AuthError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
                AuthError::EmailTaken => StatusCode::CONFLICT,
                AuthError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Workflow(err) => match err {
                WorkflowError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                WorkflowError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
                WorkflowError::UploadInProgress
                | WorkflowError::Busy
                | WorkflowError::NotAccepted
                | WorkflowError::Superseded => StatusCode::CONFLICT,
            },
            ApiError::Load(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Delete(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Delete(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Detection { status, .. } => *status,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "request rejected");
        }
        let body = json!({ "success": false, "message": self.to_string() });
        (status, Json(body)).into_response()
    }
}
