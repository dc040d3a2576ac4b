//! Session lifecycle: registration, login, refresh rotation, logout,
//! password change and session revocation.
//!
//! Every issued refresh token has exactly one session row. Rotation revokes the
//! old row and creates a new one; rows are never reactivated or deleted here.

use std::sync::Arc;

use chrono::Duration;
use tracing::{info, warn};

use super::AuthError;
use super::jwt::TokenCodec;
use super::password::{hash_password, validate_password, verify_dummy_password, verify_password};
use super::resolver::{DEFAULT_ROLE, PermissionResolver, effective_role};
use crate::clock::Clock;
use crate::models::auth::{
    AuthOutcome, NewSession, NewUser, Profile, SessionInfo, SessionMetadata, TokenPair,
    UserRecord, UserSummary,
};
use crate::store::{SessionStore, UserStore};
use crate::uuid::is_uuid;

/// Access token lifetime: 15 minutes.
pub const ACCESS_TOKEN_TTL_SECS: i64 = 15 * 60;

/// Refresh token lifetime: 7 days.
pub const REFRESH_TOKEN_TTL_DAYS: i64 = 7;

/// Token lifetimes and password-change policy.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    /// Revoke every session of a user after a password change.
    pub revoke_sessions_on_password_change: bool,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            access_ttl: Duration::seconds(ACCESS_TOKEN_TTL_SECS),
            refresh_ttl: Duration::days(REFRESH_TOKEN_TTL_DAYS),
            revoke_sessions_on_password_change: false,
        }
    }
}

/// Registration input.
#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
    pub role: Option<String>,
}

fn validate_email(email: &str) -> Result<(), AuthError> {
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        })
        && !email.chars().any(char::is_whitespace);
    if !valid {
        return Err(AuthError::ValidationError("Invalid email address".into()));
    }
    Ok(())
}

/// Orchestrates the session lifecycle over the user and session stores.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    sessions: Arc<dyn SessionStore>,
    resolver: PermissionResolver,
    codec: TokenCodec,
    clock: Arc<dyn Clock>,
    settings: AuthSettings,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionStore>,
        resolver: PermissionResolver,
        codec: TokenCodec,
        clock: Arc<dyn Clock>,
        settings: AuthSettings,
    ) -> Self {
        Self {
            users,
            sessions,
            resolver,
            codec,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    /// Create an account and sign it in.
    pub async fn register(
        &self,
        registration: Registration,
        metadata: SessionMetadata,
    ) -> Result<AuthOutcome, AuthError> {
        validate_email(&registration.email)?;
        validate_password(&registration.password)?;

        if self
            .users
            .find_user_by_email(&registration.email)
            .await?
            .is_some()
        {
            return Err(AuthError::DuplicateUser);
        }

        let password_hash = hash_password(&registration.password)?;
        let user = self
            .users
            .create_user(NewUser {
                email: registration.email,
                password_hash,
                full_name: registration.full_name,
                role: registration.role.unwrap_or_else(|| DEFAULT_ROLE.to_string()),
            })
            .await?;

        info!(user_id = %user.id, role = ?user.role, "user registered");
        self.issue_token_pair(&user, metadata).await
    }

    /// Authenticate with email + password.
    ///
    /// Unknown, soft-deleted and wrong-password cases all return the same
    /// `InvalidCredential` after one bcrypt verify.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        metadata: SessionMetadata,
    ) -> Result<AuthOutcome, AuthError> {
        let user = match self.users.find_user_by_email(email).await? {
            Some(u) if !u.is_deleted() => u,
            _ => {
                verify_dummy_password(password);
                warn!("login failed");
                return Err(AuthError::InvalidCredential);
            }
        };

        if !verify_password(password, &user.password_hash)? {
            warn!(user_id = %user.id, "login failed");
            return Err(AuthError::InvalidCredential);
        }

        info!(user_id = %user.id, "user logged in");
        self.issue_token_pair(&user, metadata).await
    }

    /// Create a session row and sign the paired refresh + access tokens.
    async fn issue_token_pair(
        &self,
        user: &UserRecord,
        metadata: SessionMetadata,
    ) -> Result<AuthOutcome, AuthError> {
        let now = self.clock.now();
        let role = effective_role(user.role.as_deref()).to_string();

        let refresh_token = self.codec.sign_refresh(&user.id, self.settings.refresh_ttl)?;
        let session = self
            .sessions
            .create_session(NewSession {
                token: refresh_token.clone(),
                user_id: user.id.clone(),
                expires_at: now + self.settings.refresh_ttl,
                created_at: now,
                metadata,
            })
            .await?;

        let access_token = self.codec.sign_access(
            &user.id,
            &user.email,
            &role,
            Some(&session.id),
            self.settings.access_ttl,
        )?;

        Ok(AuthOutcome {
            tokens: TokenPair {
                access_token,
                refresh_token,
            },
            user: UserSummary {
                id: user.id.clone(),
                email: user.email.clone(),
                role,
            },
        })
    }

    /// Exchange a refresh token for a new pair, revoking the old session.
    ///
    /// A token whose session was already revoked is treated as reuse of a
    /// stolen token: every session of the owner is revoked.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        metadata: SessionMetadata,
    ) -> Result<TokenPair, AuthError> {
        let claims = self
            .codec
            .verify_refresh(refresh_token)
            .map_err(|_| AuthError::InvalidRefreshToken)?;

        let session = self
            .sessions
            .find_session_by_token(refresh_token)
            .await?
            .filter(|s| s.user_id == claims.user_id)
            .ok_or(AuthError::InvalidRefreshToken)?;

        if session.revoked {
            let revoked = self.sessions.revoke_all_sessions(&session.user_id).await?;
            warn!(
                user_id = %session.user_id,
                session_id = %session.id,
                revoked,
                "refresh token reuse detected, revoked all sessions"
            );
            return Err(AuthError::InvalidRefreshToken);
        }
        if !session.is_usable(self.clock.now()) {
            return Err(AuthError::InvalidRefreshToken);
        }

        let user = self
            .users
            .find_user_by_id(&session.user_id)
            .await?
            .ok_or(AuthError::InvalidRefreshToken)?;
        if user.is_deleted() {
            return Err(AuthError::AccountDeleted);
        }

        // Only the request that flips the row may rotate.
        if !self.sessions.revoke_session(&session.id).await? {
            return Err(AuthError::InvalidRefreshToken);
        }

        let outcome = self.issue_token_pair(&user, metadata).await?;
        info!(user_id = %user.id, old_session_id = %session.id, "refresh token rotated");
        Ok(outcome.tokens)
    }

    /// Revoke the session behind a refresh token. Never fails on a missing or
    /// already revoked session.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AuthError> {
        if let Some(session) = self.sessions.find_session_by_token(refresh_token).await? {
            if self.sessions.revoke_session(&session.id).await? {
                info!(user_id = %session.user_id, session_id = %session.id, "session logged out");
            }
        }
        Ok(())
    }

    /// Profile of a live user with their resolved permissions.
    pub async fn profile(&self, user_id: &str) -> Result<Profile, AuthError> {
        let user = self.live_user(user_id).await?;
        let permissions = self.resolver.resolve(user.role.as_deref()).await?;
        Ok(Profile {
            role: effective_role(user.role.as_deref()).to_string(),
            id: user.id,
            email: user.email,
            full_name: user.full_name,
            permissions: permissions.into_iter().collect(),
        })
    }

    /// Replace a user's password after checking the old one.
    pub async fn change_password(
        &self,
        user_id: &str,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let user = self.live_user(user_id).await?;
        if !verify_password(old_password, &user.password_hash)? {
            return Err(AuthError::InvalidCredential);
        }
        validate_password(new_password)?;

        let password_hash = hash_password(new_password)?;
        self.users
            .update_password_hash(&user.id, &password_hash)
            .await?;
        info!(user_id = %user.id, "password changed");

        if self.settings.revoke_sessions_on_password_change {
            let revoked = self.sessions.revoke_all_sessions(&user.id).await?;
            info!(user_id = %user.id, revoked, "sessions revoked after password change");
        }
        Ok(())
    }

    /// Unexpired, non-revoked sessions of a user, most recently active first.
    pub async fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionInfo>, AuthError> {
        let now = self.clock.now();
        Ok(self
            .sessions
            .list_active_sessions(user_id)
            .await?
            .into_iter()
            .filter(|s| s.is_usable(now))
            .map(SessionInfo::from)
            .collect())
    }

    /// Revoke one of the owner's sessions. Sessions of other users are
    /// reported as `SessionNotFound`.
    pub async fn revoke_session(&self, id: &str, owner_id: &str) -> Result<(), AuthError> {
        if !is_uuid(id) {
            return Err(AuthError::SessionNotFound);
        }
        let session = self
            .sessions
            .find_session_by_id(id)
            .await?
            .filter(|s| s.user_id == owner_id)
            .ok_or(AuthError::SessionNotFound)?;

        self.sessions.revoke_session(&session.id).await?;
        info!(user_id = %owner_id, session_id = %session.id, "session revoked");
        Ok(())
    }

    /// Revoke every session of the owner.
    pub async fn revoke_all_sessions(&self, owner_id: &str) -> Result<u64, AuthError> {
        let revoked = self.sessions.revoke_all_sessions(owner_id).await?;
        info!(user_id = %owner_id, revoked, "all sessions revoked");
        Ok(revoked)
    }

    /// Soft-delete a user. Returns `PrincipalNotFound` if no live user matches.
    pub async fn soft_delete_user(&self, user_id: &str) -> Result<(), AuthError> {
        if !is_uuid(user_id) || !self.users.soft_delete_user(user_id, self.clock.now()).await? {
            return Err(AuthError::PrincipalNotFound);
        }
        info!(user_id, "user soft-deleted");
        Ok(())
    }

    async fn live_user(&self, user_id: &str) -> Result<UserRecord, AuthError> {
        self.users
            .find_user_by_id(user_id)
            .await?
            .filter(|u| !u.is_deleted())
            .ok_or(AuthError::PrincipalNotFound)
    }
}
