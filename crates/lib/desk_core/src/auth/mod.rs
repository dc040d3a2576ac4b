//! Authentication and authorization logic.
//!
//! Token signing, password hashing, permission resolution, the per-request
//! authentication gate and the session lifecycle (login, registration,
//! refresh rotation, logout, revocation).

pub mod gate;
pub mod jwt;
pub mod password;
pub mod resolver;
pub mod sessions;

use thiserror::Error;

/// Authentication errors.
///
/// All of these are request-local; the HTTP boundary maps them to statuses.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Access token required")]
    Unauthenticated,

    #[error("Invalid credentials")]
    InvalidCredential,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Session revoked")]
    SessionRevoked,

    #[error("User not found")]
    PrincipalNotFound,

    #[error("Missing permission: {0}")]
    Forbidden(String),

    #[error("User already exists")]
    DuplicateUser,

    #[error("Session not found")]
    SessionNotFound,

    #[error("User account is deleted")]
    AccountDeleted,

    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    #[error("Token signing error: {0}")]
    SigningError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DbError(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}
