//! The caller's upload workflow over HTTP.
//!
//! Analysis and commit run on spawned tasks so a client that disconnects
//! mid-request does not abandon the step.

use crate::error::ApiError;
use crate::session::Authenticated;
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::Json;
use famtree_core::{Relationship, UploadSnapshot, ValidationError};
use famtree_vision::{decode_data_url, sniff};
use serde::Deserialize;
use serde_json::{json, Value};

const DEFAULT_FILE_NAME: &str = "upload";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectFile {
    #[serde(default)]
    file_name: String,
    /// `data:<type>;base64,<payload>`
    #[serde(default)]
    image: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDetails {
    person_name: Option<String>,
    /// Relationship label; empty leaves the current choice unchanged.
    relationship: Option<String>,
}

pub async fn current(State(state): State<AppState>, user: Authenticated) -> Json<UploadSnapshot> {
    Json(state.uploads.workflow(user.session.user_id).snapshot())
}

pub async fn select(
    State(state): State<AppState>,
    user: Authenticated,
    payload: Result<Json<SelectFile>, JsonRejection>,
) -> Result<Json<UploadSnapshot>, ApiError> {
    let Json(request) = payload?;
    let image = decode_data_url(&request.image).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let name = match request.file_name.trim() {
        "" => DEFAULT_FILE_NAME,
        name => name,
    };
    let file_name = sniff::with_extension(name, &image.bytes);

    let workflow = state.uploads.workflow(user.session.user_id);
    let session = user.session;
    let snapshot = tokio::spawn(async move {
        workflow.select_file(&session, file_name, image.bytes).await
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;

    Ok(Json(snapshot))
}

pub async fn update(
    State(state): State<AppState>,
    user: Authenticated,
    payload: Result<Json<UpdateDetails>, JsonRejection>,
) -> Result<Json<UploadSnapshot>, ApiError> {
    let Json(request) = payload?;
    let relationship = match request.relationship.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(label) => Some(
            label
                .parse::<Relationship>()
                .map_err(|_| ValidationError::UnknownRelationship(label.to_string()))?,
        ),
    };

    let workflow = state.uploads.workflow(user.session.user_id);
    Ok(Json(workflow.update_details(request.person_name, relationship)?))
}

/// Bytes of the accepted image.
pub async fn preview(
    State(state): State<AppState>,
    user: Authenticated,
) -> Result<Response, ApiError> {
    let (_, image) = state
        .uploads
        .workflow(user.session.user_id)
        .preview()
        .ok_or_else(|| ApiError::NotFound("no accepted upload".to_string()))?;

    let headers = [
        (CONTENT_TYPE, sniff::mime_type(&image)),
        (CACHE_CONTROL, "no-store"),
    ];
    Ok((headers, Bytes::copy_from_slice(&image)).into_response())
}

pub async fn commit(
    State(state): State<AppState>,
    user: Authenticated,
) -> Result<Json<Value>, ApiError> {
    let workflow = state.uploads.workflow(user.session.user_id);
    let session = user.session;
    let receipt = tokio::spawn(async move { workflow.commit(&session).await })
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;

    Ok(Json(json!({
        "success": true,
        "photo": receipt.photo,
        "photos": receipt.collection,
    })))
}

/// Cancel the pending upload or dismiss a rejection.
pub async fn cancel(
    State(state): State<AppState>,
    user: Authenticated,
) -> Result<Json<UploadSnapshot>, ApiError> {
    Ok(Json(state.uploads.workflow(user.session.user_id).cancel()?))
}

#[cfg(test)]
mod tests {
    use crate::routes::testing::{png_data_url, StubDetector, TestApp, PNG_BYTES};
    use axum::http::header::CONTENT_TYPE;
    use axum::http::{Method, StatusCode};
    use famtree_core::DetectionError;
    use serde_json::json;

    async fn select(app: &TestApp, token: &str) -> crate::routes::testing::TestResponse {
        app.call(
            Method::POST,
            "/api/uploads",
            Some(token),
            Some(json!({ "fileName": "grandma.png", "image": png_data_url() })),
        )
        .await
    }

    #[tokio::test]
    async fn test_accept_then_commit() {
        let app = TestApp::single_face().await;
        let token = app.sign_up("ann@example.com").await;

        let response = select(&app, &token).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body["phase"], "accepted");
        assert_eq!(response.body["message"], "Single person detected");
        assert_eq!(response.body["canCommit"], false);

        let response = app
            .call(Method::GET, "/api/uploads/current/preview", Some(&token), None)
            .await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.headers[CONTENT_TYPE], "image/png");
        assert_eq!(response.bytes, PNG_BYTES);

        let response = app
            .call(
                Method::PATCH,
                "/api/uploads/current",
                Some(&token),
                Some(json!({ "personName": "  Jane Doe ", "relationship": "Parent" })),
            )
            .await;
        assert_eq!(response.body["canCommit"], true);

        let response = app
            .call(Method::POST, "/api/uploads/current/commit", Some(&token), None)
            .await;
        assert_eq!(response.status, StatusCode::OK);
        let photo = &response.body["photo"];
        assert_eq!(photo["personName"], "Jane Doe");
        assert_eq!(photo["relationship"], "Parent");
        let key = photo["storagePath"].as_str().unwrap();
        assert!(key.ends_with(".png"));
        assert_eq!(photo["url"], format!("http://test/media/{key}"));
        assert_eq!(response.body["photos"].as_array().unwrap().len(), 1);

        // Served back from the media directory.
        let media = app.call(Method::GET, &format!("/media/{key}"), None, None).await;
        assert_eq!(media.status, StatusCode::OK);
        assert_eq!(media.bytes, PNG_BYTES);

        let response = app
            .call(Method::GET, "/api/uploads/current", Some(&token), None)
            .await;
        assert_eq!(response.body["phase"], "idle");
    }

    #[tokio::test]
    async fn test_no_face_is_rejected() {
        let app = TestApp::new(StubDetector::faces(0)).await;
        let token = app.sign_up("ann@example.com").await;

        let response = select(&app, &token).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body["phase"], "rejected");
        assert_eq!(response.body["message"], "No face detected in image");
        assert_eq!(response.body["faceCount"], 0);

        let response = app
            .call(Method::POST, "/api/uploads/current/commit", Some(&token), None)
            .await;
        assert_eq!(response.status, StatusCode::CONFLICT);

        let response = app
            .call(Method::GET, "/api/uploads/current/preview", Some(&token), None)
            .await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);

        // Dismissed explicitly.
        let response = app
            .call(Method::DELETE, "/api/uploads/current", Some(&token), None)
            .await;
        assert_eq!(response.body["phase"], "idle");
    }

    #[tokio::test]
    async fn test_detector_failure_is_shown_as_rejection() {
        let app = TestApp::new(StubDetector::failing(DetectionError::Status {
            status: 403,
            message: "API key not valid.".into(),
        }))
        .await;
        let token = app.sign_up("ann@example.com").await;

        let response = select(&app, &token).await;
        assert_eq!(response.body["phase"], "rejected");
        assert_eq!(response.body["message"], "Error analyzing image");
        assert!(response.body["faceCount"].is_null());

        let photos = app.call(Method::GET, "/api/photos", Some(&token), None).await;
        assert_eq!(photos.body["total"], 0);
    }

    #[tokio::test]
    async fn test_commit_requires_details() {
        let app = TestApp::single_face().await;
        let token = app.sign_up("ann@example.com").await;
        select(&app, &token).await;

        app.call(
            Method::PATCH,
            "/api/uploads/current",
            Some(&token),
            Some(json!({ "personName": "   ", "relationship": "Child" })),
        )
        .await;
        let response = app
            .call(Method::POST, "/api/uploads/current/commit", Some(&token), None)
            .await;
        assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(response.message(), "Person's name is required");

        // Still accepted; the details can be fixed and the commit retried.
        let response = app
            .call(Method::GET, "/api/uploads/current", Some(&token), None)
            .await;
        assert_eq!(response.body["phase"], "accepted");
    }

    #[tokio::test]
    async fn test_unknown_relationship() {
        let app = TestApp::single_face().await;
        let token = app.sign_up("ann@example.com").await;
        select(&app, &token).await;

        let response = app
            .call(
                Method::PATCH,
                "/api/uploads/current",
                Some(&token),
                Some(json!({ "relationship": "Neighbour" })),
            )
            .await;
        assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(response.message(), "Unknown relationship: Neighbour");
    }

    #[tokio::test]
    async fn test_second_select_while_accepted_conflicts() {
        let app = TestApp::single_face().await;
        let token = app.sign_up("ann@example.com").await;
        select(&app, &token).await;

        let response = select(&app, &token).await;
        assert_eq!(response.status, StatusCode::CONFLICT);

        let response = app
            .call(Method::DELETE, "/api/uploads/current", Some(&token), None)
            .await;
        assert_eq!(response.body["phase"], "idle");
        assert_eq!(select(&app, &token).await.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_workflows_are_per_user() {
        let app = TestApp::single_face().await;
        let ann = app.sign_up("ann@example.com").await;
        let bob = app.sign_up("bob@example.com").await;
        select(&app, &ann).await;

        let response = app
            .call(Method::GET, "/api/uploads/current", Some(&bob), None)
            .await;
        assert_eq!(response.body["phase"], "idle");
        assert_eq!(select(&app, &bob).await.body["phase"], "accepted");
    }

    #[tokio::test]
    async fn test_bad_data_url() {
        let app = TestApp::single_face().await;
        let token = app.sign_up("ann@example.com").await;
        let response = app
            .call(
                Method::POST,
                "/api/uploads",
                Some(&token),
                Some(json!({ "fileName": "x.png", "image": "data:image/png,raw" })),
            )
            .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
    }
}
