//! Persistence seams.
//!
//! The auth core talks to storage only through these traits. [`postgres::PgStore`]
//! is the production implementation; [`memory::MemoryStore`] backs tests and
//! local experiments.
//!
//! Every method is a single atomic store operation except
//! [`RbacStore::update_role`], which must apply the name/flag changes and the
//! permission replacement as one transaction.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::auth::AuthError;
use crate::models::auth::{DeletedUser, NewSession, NewUser, Session, UserRecord};
use crate::models::rbac::{
    NewPermission, NewRole, Permission, PermissionUpdate, Role, RoleGrants, RoleUpdate,
};
use crate::rbac::RbacError;
use crate::trash::TrashError;

/// User lookups and mutations needed by authentication.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Find a user by exact email, including soft-deleted users.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, AuthError>;

    /// Find a user by id, including soft-deleted users.
    async fn find_user_by_id(&self, id: &str) -> Result<Option<UserRecord>, AuthError>;

    /// Create a user. Fails with `DuplicateUser` on an existing email and
    /// `ValidationError` when the role name does not exist.
    async fn create_user(&self, user: NewUser) -> Result<UserRecord, AuthError>;

    async fn update_password_hash(&self, id: &str, password_hash: &str) -> Result<(), AuthError>;

    /// Mark a user deleted. Returns false when no live user has this id.
    async fn soft_delete_user(&self, id: &str, at: DateTime<Utc>) -> Result<bool, AuthError>;
}

/// Refresh-token sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, session: NewSession) -> Result<Session, AuthError>;

    async fn find_session_by_token(&self, token: &str) -> Result<Option<Session>, AuthError>;

    async fn find_session_by_id(&self, id: &str) -> Result<Option<Session>, AuthError>;

    /// Flip `revoked` to true if it is currently false.
    ///
    /// Returns true only for the caller that performed the flip, so of two
    /// racing revocations exactly one observes `true`. Revoking an already
    /// revoked or unknown session is not an error.
    async fn revoke_session(&self, id: &str) -> Result<bool, AuthError>;

    /// Revoke every live session of a user. Returns the number flipped.
    async fn revoke_all_sessions(&self, user_id: &str) -> Result<u64, AuthError>;

    /// Non-revoked sessions of a user, most recently active first.
    async fn list_active_sessions(&self, user_id: &str) -> Result<Vec<Session>, AuthError>;
}

/// Source data for the permission resolver.
#[async_trait]
pub trait PermissionSource: Send + Sync {
    /// Grants of the named role, or `None` if no such role exists.
    async fn role_grants(&self, role: &str) -> Result<Option<RoleGrants>, AuthError>;

    /// Every permission slug currently defined, sorted.
    async fn all_slugs(&self) -> Result<Vec<String>, AuthError>;
}

/// Role and permission administration.
#[async_trait]
pub trait RbacStore: Send + Sync {
    async fn list_roles(&self) -> Result<Vec<Role>, RbacError>;
    async fn find_role(&self, id: &str) -> Result<Option<Role>, RbacError>;
    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, RbacError>;
    async fn create_role(&self, role: NewRole) -> Result<Role, RbacError>;
    /// Apply the update atomically. Returns `None` if the role does not exist.
    async fn update_role(&self, id: &str, update: RoleUpdate) -> Result<Option<Role>, RbacError>;
    /// Delete a role. Returns false if it did not exist.
    async fn delete_role(&self, id: &str) -> Result<bool, RbacError>;
    /// Number of users (live or soft-deleted) assigned to the role.
    async fn role_user_count(&self, id: &str) -> Result<i64, RbacError>;
    /// Add permissions to a role, ignoring ones already linked.
    async fn grant_permissions(&self, role_id: &str, permission_ids: &[String])
    -> Result<(), RbacError>;

    async fn list_permissions(&self) -> Result<Vec<Permission>, RbacError>;
    async fn find_permission(&self, id: &str) -> Result<Option<Permission>, RbacError>;
    async fn find_permission_by_slug(&self, slug: &str) -> Result<Option<Permission>, RbacError>;
    /// Ids among `ids` that exist.
    async fn existing_permission_ids(&self, ids: &[String]) -> Result<Vec<String>, RbacError>;
    async fn create_permission(&self, permission: NewPermission) -> Result<Permission, RbacError>;
    async fn update_permission(
        &self,
        id: &str,
        update: PermissionUpdate,
    ) -> Result<Option<Permission>, RbacError>;
    async fn delete_permission(&self, id: &str) -> Result<bool, RbacError>;
    /// Number of roles linking the permission.
    async fn permission_role_count(&self, id: &str) -> Result<i64, RbacError>;
}

/// Soft-deleted users, as one bin of the trash.
#[async_trait]
pub trait UserTrash: Send + Sync {
    async fn list_deleted_users(&self) -> Result<Vec<DeletedUser>, TrashError>;
    /// Clear `deleted_at`. Returns false if no soft-deleted user has this id.
    async fn restore_user(&self, id: &str) -> Result<bool, TrashError>;
    /// Physically remove a soft-deleted user. Returns false if none matched.
    async fn purge_user(&self, id: &str) -> Result<bool, TrashError>;
}

/// Bundle of store handles shared by the services.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub permissions: Arc<dyn PermissionSource>,
    pub rbac: Arc<dyn RbacStore>,
    pub user_trash: Arc<dyn UserTrash>,
}

impl Stores {
    /// All stores backed by one PostgreSQL pool.
    pub fn postgres(pool: PgPool) -> Self {
        let store = Arc::new(postgres::PgStore::new(pool));
        Self::from_shared(store)
    }

    /// All stores backed by one in-memory store.
    pub fn memory(store: Arc<memory::MemoryStore>) -> Self {
        Self::from_shared(store)
    }

    fn from_shared<S>(store: Arc<S>) -> Self
    where
        S: UserStore + SessionStore + PermissionSource + RbacStore + UserTrash + 'static,
    {
        Self {
            users: store.clone(),
            sessions: store.clone(),
            permissions: store.clone(),
            rbac: store.clone(),
            user_trash: store,
        }
    }
}
