//! Authentication domain models.
//!
//! These are internal domain models, distinct from the API request/response
//! models (which carry `#[serde(rename_all = "camelCase")]` for the wire).

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted user, including its password hash (never leaves the core).
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub full_name: Option<String>,
    /// Name of the assigned role, if any.
    pub role: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl UserRecord {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Input for user creation.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub full_name: Option<String>,
    pub role: String,
}

/// Public user summary returned alongside a token pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: String,
    pub email: String,
    pub role: String,
}

/// Profile view of the current user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub email: String,
    pub full_name: Option<String>,
    pub role: String,
    pub permissions: Vec<String>,
}

/// Soft-deleted user as shown in the trash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletedUser {
    pub id: String,
    pub email: String,
    pub full_name: Option<String>,
    pub deleted_at: DateTime<Utc>,
}

/// Refresh-token session row.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub token: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
    pub last_active_at: Option<DateTime<Utc>>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl Session {
    /// Usable while not revoked and not yet expired.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && now < self.expires_at
    }
}

/// Client metadata recorded with a session.
#[derive(Debug, Clone, Default)]
pub struct SessionMetadata {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Input for session creation.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub token: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub metadata: SessionMetadata,
}

/// Session as listed to its owner (no token).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub last_active_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Session> for SessionInfo {
    fn from(s: Session) -> Self {
        Self {
            id: s.id,
            ip_address: s.ip_address,
            user_agent: s.user_agent,
            last_active_at: s.last_active_at,
            created_at: s.created_at,
        }
    }
}

/// JWT claims embedded in access tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessClaims {
    pub user_id: String,
    pub email: String,
    pub role: String,
    /// Session the token was issued with; checked for revocation per request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiry (unix timestamp).
    pub exp: i64,
}

/// JWT claims embedded in refresh tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshClaims {
    pub user_id: String,
    /// Random id; keeps tokens issued in the same second distinct.
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

/// Freshly issued access + refresh tokens.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Result of login/registration: a token pair plus the public user summary.
#[derive(Debug, Clone)]
pub struct AuthOutcome {
    pub tokens: TokenPair,
    pub user: UserSummary,
}

/// Resolved identity attached to an authenticated request.
///
/// Rebuilt on every request; never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
    pub email: String,
    pub role: String,
    pub permissions: BTreeSet<String>,
    /// Session of the access token that authenticated the request.
    pub session_id: Option<String>,
}

impl Principal {
    /// Exact slug match; no prefix or hierarchy.
    pub fn has_permission(&self, slug: &str) -> bool {
        self.permissions.contains(slug)
    }
}
