//! HTTP routes.

mod auth;
mod detect;
mod pages;
mod photos;
mod uploads;

use crate::state::AppState;
use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    let media = ServeDir::new(&state.media_dir);

    Router::new()
        .route("/", get(pages::home))
        .route("/auth", get(pages::auth))
        .route("/health", get(pages::health))
        .route("/api/auth/signup", post(auth::sign_up))
        .route("/api/auth/signin", post(auth::sign_in))
        .route("/api/auth/signout", post(auth::sign_out))
        .route("/api/detect-faces", post(detect::detect_faces))
        .route("/api/relationships", get(photos::relationships))
        .route("/api/photos", get(photos::list))
        .route("/api/photos/:id", delete(photos::remove))
        .route("/api/uploads", post(uploads::select))
        .route(
            "/api/uploads/current",
            get(uploads::current)
                .patch(uploads::update)
                .delete(uploads::cancel),
        )
        .route("/api/uploads/current/preview", get(uploads::preview))
        .route("/api/uploads/current/commit", post(uploads::commit))
        .nest_service("/media", media)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod testing;
