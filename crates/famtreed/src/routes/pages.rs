//! Auth-gated entry points and the health check.

use super::photos::{self, RelationshipFilter};
use crate::error::ApiError;
use crate::session::Authenticated;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use famtree_core::Relationship;
use serde_json::json;

/// The collection view. Signed-out visitors are sent to `/auth`.
pub async fn home(
    State(state): State<AppState>,
    user: Option<Authenticated>,
    Query(filter): Query<RelationshipFilter>,
) -> Result<Response, ApiError> {
    let Some(user) = user else {
        return Ok(Redirect::to("/auth").into_response());
    };
    let relationship = filter.parse()?;

    let photos = state
        .store
        .list(user.session.user_id)
        .await
        .map_err(ApiError::Load)?;
    let total = photos.len();
    let shown = photos::filtered(photos, relationship);

    let empty_message = match (total, shown.len()) {
        (0, _) => Some("No photos yet"),
        (_, 0) => Some("No photos match this filter"),
        _ => None,
    };

    Ok(Json(json!({
        "user": user.session,
        "filter": relationship,
        "total": total,
        "shown": shown.len(),
        "photos": shown,
        "emptyMessage": empty_message,
        "relationships": Relationship::ALL,
    }))
    .into_response())
}

/// The sign-in page. Signed-in visitors are sent to `/`.
pub async fn auth(user: Option<Authenticated>) -> Response {
    if user.is_some() {
        return Redirect::to("/").into_response();
    }
    Json(json!({
        "signIn": "/api/auth/signin",
        "signUp": "/api/auth/signup",
    }))
    .into_response()
}

pub async fn health() -> &'static str {
    "OK"
}
