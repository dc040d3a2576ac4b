//! Session management request handlers.

use axum::extract::{Path, State};
use axum::{Extension, Json};

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{MessageResponse, SessionResponse};

/// `GET /sessions`: active sessions of the current user.
pub async fn list_sessions_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> AppResult<Json<Vec<SessionResponse>>> {
    let current = user.0.session_id.as_deref();
    let sessions = state
        .auth
        .list_sessions(&user.0.user_id)
        .await?
        .into_iter()
        .map(|s| SessionResponse::from_info(s, current))
        .collect();
    Ok(Json(sessions))
}

/// `DELETE /sessions/{id}`: revoke one of the current user's sessions.
pub async fn revoke_session_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    state.auth.revoke_session(&id, &user.0.user_id).await?;
    Ok(Json(MessageResponse::new("Session revoked")))
}

/// `DELETE /sessions`: revoke every session of the current user.
pub async fn revoke_all_sessions_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> AppResult<Json<MessageResponse>> {
    state.auth.revoke_all_sessions(&user.0.user_id).await?;
    Ok(Json(MessageResponse::new("All sessions revoked")))
}
