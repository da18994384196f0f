use crate::error::ApiError;
use crate::session::{removal_cookie, session_cookie, Authenticated};
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use axum_extra::extract::cookie::CookieJar;
use famtree_core::{Credentials, SessionGrant, SignUp};
use serde_json::{json, Value};

pub async fn sign_up(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<SignUp>, JsonRejection>,
) -> Result<(CookieJar, Json<Value>), ApiError> {
    let Json(request) = payload?;
    let grant = state.identity.sign_up(&request).await?;
    Ok(issue(&state, jar, grant))
}

pub async fn sign_in(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<(CookieJar, Json<Value>), ApiError> {
    let Json(credentials) = payload?;
    let grant = state.identity.sign_in(&credentials).await?;
    Ok(issue(&state, jar, grant))
}

pub async fn sign_out(
    State(state): State<AppState>,
    user: Authenticated,
    jar: CookieJar,
) -> Result<(CookieJar, Json<Value>), ApiError> {
    state.identity.sign_out(&user.token).await?;
    state.uploads.remove(user.session.user_id);
    tracing::info!(user = %user.session.user_id, "signed out");
    Ok((jar.add(removal_cookie()), Json(json!({ "success": true }))))
}

/// Set the session cookie and return the token for non-browser clients.
fn issue(state: &AppState, jar: CookieJar, grant: SessionGrant) -> (CookieJar, Json<Value>) {
    let body = json!({
        "success": true,
        "token": grant.token,
        "user": grant.session,
    });
    let jar = jar.add(session_cookie(grant.token, state.cookie_secure));
    (jar, Json(body))
}
