//! User administration handlers.

use axum::extract::{Path, State};
use axum::{Extension, Json};

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::MessageResponse;

/// `DELETE /users/{id}`: soft-delete a user. The record moves to the trash.
pub async fn delete_user_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    if id == user.0.user_id {
        return Err(AppError::Validation("Cannot delete your own account".into()));
    }
    state.auth.soft_delete_user(&id).await?;
    Ok(Json(MessageResponse::new("User deleted")))
}
