//! Trash handlers. Mounted behind `admin:manage_trash`.

use axum::Json;
use axum::extract::{Path, State};
use desk_core::trash::{TrashItem, TrashKind};

use crate::AppState;
use crate::error::AppResult;
use crate::models::MessageResponse;

/// `GET /trash/{kind}`
pub async fn list_trash_handler(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> AppResult<Json<Vec<TrashItem>>> {
    let kind: TrashKind = kind.parse()?;
    Ok(Json(state.trash.list(kind).await?))
}

/// `POST /trash/{kind}/{id}/restore`
pub async fn restore_handler(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> AppResult<Json<MessageResponse>> {
    let kind: TrashKind = kind.parse()?;
    state.trash.restore(kind, &id).await?;
    Ok(Json(MessageResponse::new("Item restored")))
}

/// `DELETE /trash/{kind}/{id}`: permanently delete.
pub async fn purge_handler(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> AppResult<Json<MessageResponse>> {
    let kind: TrashKind = kind.parse()?;
    state.trash.purge(kind, &id).await?;
    Ok(Json(MessageResponse::new("Item permanently deleted")))
}
