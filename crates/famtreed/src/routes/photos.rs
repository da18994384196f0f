use crate::error::ApiError;
use crate::session::Authenticated;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::Json;
use famtree_core::{Photo, Relationship, StoreError, ValidationError};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

/// `?relationship=` query. Absent, empty or `all` means no filter.
#[derive(Debug, Default, Deserialize)]
pub struct RelationshipFilter {
    relationship: Option<String>,
}

impl RelationshipFilter {
    pub fn parse(&self) -> Result<Option<Relationship>, ApiError> {
        match self.relationship.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(all) if all.eq_ignore_ascii_case("all") => Ok(None),
            Some(label) => label
                .parse::<Relationship>()
                .map(Some)
                .map_err(|_| ValidationError::UnknownRelationship(label.to_string()).into()),
        }
    }
}

pub fn filtered(photos: Vec<Photo>, relationship: Option<Relationship>) -> Vec<Photo> {
    match relationship {
        Some(rel) => photos.into_iter().filter(|p| p.relationship == rel).collect(),
        None => photos,
    }
}

pub async fn relationships() -> Json<[Relationship; 12]> {
    Json(Relationship::ALL)
}

pub async fn list(
    State(state): State<AppState>,
    user: Authenticated,
    Query(filter): Query<RelationshipFilter>,
) -> Result<Json<Value>, ApiError> {
    let relationship = filter.parse()?;
    let photos = state
        .store
        .list(user.session.user_id)
        .await
        .map_err(ApiError::Load)?;
    let total = photos.len();
    let photos = filtered(photos, relationship);
    Ok(Json(json!({ "success": true, "total": total, "photos": photos })))
}

pub async fn remove(
    State(state): State<AppState>,
    user: Authenticated,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let owner = user.session.user_id;
    let photo = state
        .store
        .find(owner, id)
        .await
        .map_err(ApiError::Delete)?
        .ok_or(ApiError::Delete(StoreError::NotFound(id)))?;

    state.store.delete(&photo).await.map_err(ApiError::Delete)?;

    // The delete stands even if the refresh fails.
    let photos = match state.store.list(owner).await {
        Ok(photos) => Some(photos),
        Err(err) => {
            tracing::warn!(user = %owner, error = %err, "refreshing collection after delete failed");
            None
        }
    };
    Ok(Json(json!({ "success": true, "photos": photos })))
}
