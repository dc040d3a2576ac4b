//! Authentication and authorization gates.
//!
//! [`Authenticator::authenticate`] runs the per-request pipeline
//! `extract → verify → check session → load principal`; the first failing step
//! terminates the request. [`authorize`] is the per-route permission check.

use std::sync::Arc;

use tracing::{debug, warn};

use super::AuthError;
use super::jwt::TokenCodec;
use super::resolver::{PermissionResolver, effective_role};
use crate::models::auth::Principal;
use crate::store::{SessionStore, UserStore};

/// Pick the credential: the header token wins over the cookie token.
pub fn select_token<'a>(header: Option<&'a str>, cookie: Option<&'a str>) -> Option<&'a str> {
    header
        .filter(|t| !t.is_empty())
        .or_else(|| cookie.filter(|t| !t.is_empty()))
}

/// Extract the token from an `Authorization` header value.
///
/// Only the `Bearer` scheme is accepted. A present header never falls back to
/// the cookie, so any other value is an `InvalidCredential`.
pub fn bearer_token(header: &str) -> Result<&str, AuthError> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::InvalidCredential)
}

/// Resolves bearer tokens into principals.
#[derive(Clone)]
pub struct Authenticator {
    codec: TokenCodec,
    sessions: Arc<dyn SessionStore>,
    users: Arc<dyn UserStore>,
    resolver: PermissionResolver,
}

impl Authenticator {
    pub fn new(
        codec: TokenCodec,
        sessions: Arc<dyn SessionStore>,
        users: Arc<dyn UserStore>,
        resolver: PermissionResolver,
    ) -> Self {
        Self {
            codec,
            sessions,
            users,
            resolver,
        }
    }

    /// Resolve the principal for a request's token.
    ///
    /// Errors: `Unauthenticated` (no token), `InvalidCredential` (bad
    /// signature or expired), `SessionRevoked` (session missing or revoked),
    /// `PrincipalNotFound` (user missing or soft-deleted).
    pub async fn authenticate(&self, token: Option<&str>) -> Result<Principal, AuthError> {
        let token = token.ok_or(AuthError::Unauthenticated)?;

        let claims = self
            .codec
            .verify_access(token)
            .map_err(|_| AuthError::InvalidCredential)?;

        if let Some(session_id) = claims.session_id.as_deref() {
            let session = self.sessions.find_session_by_id(session_id).await?;
            if !session.is_some_and(|s| !s.revoked) {
                debug!(user_id = %claims.user_id, session_id, "access token bound to revoked session");
                return Err(AuthError::SessionRevoked);
            }
        }

        let user = self
            .users
            .find_user_by_id(&claims.user_id)
            .await?
            .filter(|u| !u.is_deleted())
            .ok_or(AuthError::PrincipalNotFound)?;

        let permissions = self.resolver.resolve(user.role.as_deref()).await?;

        Ok(Principal {
            role: effective_role(user.role.as_deref()).to_string(),
            user_id: user.id,
            email: user.email,
            permissions,
            session_id: claims.session_id,
        })
    }
}

/// Permission guard.
///
/// `Unauthenticated` when no principal is attached, `Forbidden` when the slug
/// is not held (exact match only).
pub fn authorize(principal: Option<&Principal>, slug: &str) -> Result<(), AuthError> {
    let principal = principal.ok_or(AuthError::Unauthenticated)?;
    if !principal.has_permission(slug) {
        warn!(user_id = %principal.user_id, role = %principal.role, permission = slug, "permission denied");
        return Err(AuthError::Forbidden(slug.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::{Duration, Utc};

    use super::*;
    use crate::clock::ManualClock;
    use crate::models::auth::{NewSession, NewUser, SessionMetadata};
    use crate::models::rbac::{NewPermission, NewRole};
    use crate::store::memory::MemoryStore;
    use crate::store::{RbacStore, SessionStore, UserStore};

    const SECRET: &[u8] = b"gate-test-secret-gate-test-secret";

    struct Fixture {
        store: Arc<MemoryStore>,
        codec: TokenCodec,
        gate: Authenticator,
        clock: ManualClock,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let clock = ManualClock::starting_now();
        let codec = TokenCodec::new(SECRET, Arc::new(clock.clone())).unwrap();
        let view = store
            .create_permission(NewPermission {
                slug: "tickets:view".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        store
            .create_role(NewRole {
                name: "customer".into(),
                permission_ids: vec![view.id],
                ..Default::default()
            })
            .await
            .unwrap();
        let gate = Authenticator::new(
            codec.clone(),
            store.clone(),
            store.clone(),
            PermissionResolver::new(store.clone()),
        );
        Fixture {
            store,
            codec,
            gate,
            clock,
        }
    }

    async fn user_with_session(f: &Fixture) -> (String, String, String) {
        let user = f
            .store
            .create_user(NewUser {
                email: "alice@x.com".into(),
                password_hash: "hash".into(),
                full_name: None,
                role: "customer".into(),
            })
            .await
            .unwrap();
        let session = f
            .store
            .create_session(NewSession {
                token: "refresh".into(),
                user_id: user.id.clone(),
                expires_at: Utc::now() + Duration::days(7),
                created_at: Utc::now(),
                metadata: SessionMetadata::default(),
            })
            .await
            .unwrap();
        let token = f
            .codec
            .sign_access(&user.id, &user.email, "customer", Some(&session.id), Duration::minutes(15))
            .unwrap();
        (user.id, session.id, token)
    }

    #[test]
    fn header_takes_precedence_over_cookie() {
        assert_eq!(select_token(Some("h"), Some("c")), Some("h"));
        assert_eq!(select_token(None, Some("c")), Some("c"));
        assert_eq!(select_token(Some(""), Some("c")), Some("c"));
        assert_eq!(select_token(None, None), None);
    }

    #[test]
    fn bearer_scheme_only() {
        assert_eq!(bearer_token("Bearer abc").unwrap(), "abc");
        assert!(matches!(
            bearer_token("Basic abc"),
            Err(AuthError::InvalidCredential)
        ));
        assert!(matches!(
            bearer_token("Bearer "),
            Err(AuthError::InvalidCredential)
        ));
    }

    #[tokio::test]
    async fn attaches_principal_with_permissions() {
        let f = fixture().await;
        let (user_id, session_id, token) = user_with_session(&f).await;
        let p = f.gate.authenticate(Some(&token)).await.unwrap();
        assert_eq!(p.user_id, user_id);
        assert_eq!(p.role, "customer");
        assert_eq!(p.session_id.as_deref(), Some(session_id.as_str()));
        assert!(p.has_permission("tickets:view"));
    }

    #[tokio::test]
    async fn missing_token_is_unauthenticated() {
        let f = fixture().await;
        assert!(matches!(
            f.gate.authenticate(None).await,
            Err(AuthError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn expired_token_is_invalid_credential() {
        let f = fixture().await;
        let (_, _, token) = user_with_session(&f).await;
        f.clock.advance(Duration::minutes(16));
        assert!(matches!(
            f.gate.authenticate(Some(&token)).await,
            Err(AuthError::InvalidCredential)
        ));
    }

    #[tokio::test]
    async fn revoked_session_rejects_unexpired_token() {
        let f = fixture().await;
        let (_, session_id, token) = user_with_session(&f).await;
        f.store.revoke_session(&session_id).await.unwrap();
        assert!(matches!(
            f.gate.authenticate(Some(&token)).await,
            Err(AuthError::SessionRevoked)
        ));
    }

    #[tokio::test]
    async fn unknown_session_is_revoked() {
        let f = fixture().await;
        let (user_id, _, _) = user_with_session(&f).await;
        let token = f
            .codec
            .sign_access(&user_id, "alice@x.com", "customer", Some("nope"), Duration::minutes(15))
            .unwrap();
        assert!(matches!(
            f.gate.authenticate(Some(&token)).await,
            Err(AuthError::SessionRevoked)
        ));
    }

    #[tokio::test]
    async fn token_without_session_skips_session_check() {
        let f = fixture().await;
        let (user_id, _, _) = user_with_session(&f).await;
        let token = f
            .codec
            .sign_access(&user_id, "alice@x.com", "customer", None, Duration::minutes(15))
            .unwrap();
        assert!(f.gate.authenticate(Some(&token)).await.is_ok());
    }

    #[tokio::test]
    async fn soft_deleted_user_is_not_found() {
        let f = fixture().await;
        let (user_id, _, token) = user_with_session(&f).await;
        f.store.soft_delete_user(&user_id, Utc::now()).await.unwrap();
        assert!(matches!(
            f.gate.authenticate(Some(&token)).await,
            Err(AuthError::PrincipalNotFound)
        ));
    }

    #[test]
    fn authorize_is_exact_match() {
        let principal = Principal {
            user_id: "u1".into(),
            email: "a@x.com".into(),
            role: "customer".into(),
            permissions: BTreeSet::from(["tickets:create".to_string(), "tickets:view".to_string()]),
            session_id: None,
        };
        assert!(authorize(Some(&principal), "tickets:view").is_ok());
        assert!(matches!(
            authorize(Some(&principal), "tickets:delete"),
            Err(AuthError::Forbidden(_))
        ));
        assert!(matches!(
            authorize(Some(&principal), "tickets"),
            Err(AuthError::Forbidden(_))
        ));
        assert!(matches!(
            authorize(None, "tickets:view"),
            Err(AuthError::Unauthenticated)
        ));
    }
}
