//! Application error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use desk_core::auth::AuthError;
use desk_core::rbac::RbacError;
use desk_core::trash::TrashError;
use thiserror::Error;

use crate::models::ErrorResponse;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal server error")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = match &self {
            AppError::Validation(m) => (StatusCode::BAD_REQUEST, "validation_error", m.as_str()),
            AppError::Conflict(m) => (StatusCode::BAD_REQUEST, "conflict", m.as_str()),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, "not_found", m.as_str()),
            AppError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, "unauthorized", m.as_str()),
            AppError::Forbidden(m) => (StatusCode::FORBIDDEN, "forbidden", m.as_str()),
            AppError::Internal(m) => {
                tracing::error!(error = %m, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error",
                )
            }
        };
        let body = Json(ErrorResponse {
            error: error.to_string(),
            message: message.to_string(),
        });
        (status, body).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => AppError::NotFound("row not found".into()),
            _ => AppError::Internal(e.to_string()),
        }
    }
}

/// Default status mapping. Handlers that know more about the context (the
/// authentication gate, change-password) remap before converting.
impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        let message = e.to_string();
        match e {
            AuthError::Unauthenticated
            | AuthError::InvalidCredential
            | AuthError::SessionRevoked => AppError::Unauthorized(message),
            AuthError::InvalidToken
            | AuthError::InvalidRefreshToken
            | AuthError::AccountDeleted => AppError::Forbidden(message),
            AuthError::Forbidden(slug) => AppError::Forbidden(format!("Permission denied: {slug}")),
            AuthError::PrincipalNotFound | AuthError::SessionNotFound => {
                AppError::NotFound(message)
            }
            AuthError::DuplicateUser => AppError::Conflict(message),
            AuthError::ValidationError(msg) => AppError::Validation(msg),
            AuthError::DbError(e) => AppError::from(e),
            AuthError::SigningError(msg) | AuthError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl From<RbacError> for AppError {
    fn from(e: RbacError) -> Self {
        match e {
            RbacError::NotFound(what) => AppError::NotFound(format!("{what} not found")),
            RbacError::Conflict(msg) | RbacError::InUse(msg) | RbacError::Protected(msg) => {
                AppError::Conflict(msg)
            }
            RbacError::Validation(msg) => AppError::Validation(msg),
            RbacError::DbError(e) => AppError::from(e),
        }
    }
}

impl From<TrashError> for AppError {
    fn from(e: TrashError) -> Self {
        match e {
            TrashError::UnknownKind(kind) => {
                AppError::Validation(format!("Invalid trash type: {kind}"))
            }
            TrashError::NotFound => AppError::NotFound("Item not found".into()),
            TrashError::DbError(e) => AppError::from(e),
        }
    }
}
