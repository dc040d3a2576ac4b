//! PostgreSQL-backed stores.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{PermissionSource, RbacStore, SessionStore, UserStore, UserTrash};
use crate::auth::AuthError;
use crate::models::auth::{DeletedUser, NewSession, NewUser, Session, UserRecord};
use crate::models::rbac::{
    NewPermission, NewRole, Permission, PermissionUpdate, Role, RoleGrants, RoleUpdate,
};
use crate::rbac::RbacError;
use crate::trash::TrashError;
use crate::uuid::uuidv7;

type UserRow = (
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<DateTime<Utc>>,
);

type SessionRow = (
    String,
    String,
    String,
    DateTime<Utc>,
    bool,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
    Option<String>,
    Option<String>,
);

type RoleRow = (String, String, Option<String>, bool, bool, i64);

type PermissionRow = (String, String, Option<String>, Option<String>);

const USER_COLUMNS: &str = "u.id::text, u.email, u.password_hash, u.full_name, r.name, u.deleted_at";

const SESSION_COLUMNS: &str = "id::text, token, user_id::text, expires_at, revoked, created_at, \
     last_active_at, ip_address, user_agent";

fn user_from_row(row: UserRow) -> UserRecord {
    let (id, email, password_hash, full_name, role, deleted_at) = row;
    UserRecord {
        id,
        email,
        password_hash,
        full_name,
        role,
        deleted_at,
    }
}

fn session_from_row(row: SessionRow) -> Session {
    let (id, token, user_id, expires_at, revoked, created_at, last_active_at, ip_address, user_agent) =
        row;
    Session {
        id,
        token,
        user_id,
        expires_at,
        revoked,
        created_at,
        last_active_at,
        ip_address,
        user_agent,
    }
}

fn permission_from_row(row: PermissionRow) -> Permission {
    let (id, slug, description, module) = row;
    Permission {
        id,
        slug,
        description,
        module,
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .is_some_and(|d| d.is_unique_violation())
}

fn is_foreign_key_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .is_some_and(|d| d.is_foreign_key_violation())
}

/// All stores over one connection pool.
#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Load roles (optionally a single one by id or name) with their permissions.
    async fn load_roles(
        &self,
        id: Option<&str>,
        name: Option<&str>,
    ) -> Result<Vec<Role>, RbacError> {
        let rows = sqlx::query_as::<_, RoleRow>(
            "SELECT r.id::text, r.name, r.description, r.wildcard, r.is_system, \
                    (SELECT COUNT(*) FROM users u WHERE u.role_id = r.id) \
             FROM roles r \
             WHERE ($1::uuid IS NULL OR r.id = $1::uuid) \
               AND ($2::text IS NULL OR r.name = $2) \
             ORDER BY r.name",
        )
        .bind(id)
        .bind(name)
        .fetch_all(&self.pool)
        .await?;

        let role_ids: Vec<String> = rows.iter().map(|r| r.0.clone()).collect();
        let links = sqlx::query_as::<_, (String, String, String, Option<String>, Option<String>)>(
            "SELECT rp.role_id::text, p.id::text, p.slug, p.description, p.module \
             FROM role_permissions rp \
             JOIN permissions p ON p.id = rp.permission_id \
             WHERE rp.role_id = ANY($1::uuid[]) \
             ORDER BY p.slug",
        )
        .bind(&role_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_role: HashMap<String, Vec<Permission>> = HashMap::new();
        for (role_id, pid, slug, description, module) in links {
            by_role
                .entry(role_id)
                .or_default()
                .push(permission_from_row((pid, slug, description, module)));
        }

        Ok(rows
            .into_iter()
            .map(|(id, name, description, wildcard, is_system, user_count)| {
                let permissions = by_role.remove(&id).unwrap_or_default();
                Role {
                    id,
                    name,
                    description,
                    wildcard,
                    is_system,
                    permissions,
                    user_count,
                }
            })
            .collect())
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, AuthError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users u LEFT JOIN roles r ON r.id = u.role_id \
             WHERE u.email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(user_from_row))
    }

    async fn find_user_by_id(&self, id: &str) -> Result<Option<UserRecord>, AuthError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users u LEFT JOIN roles r ON r.id = u.role_id \
             WHERE u.id = $1::uuid"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(user_from_row))
    }

    async fn create_user(&self, user: NewUser) -> Result<UserRecord, AuthError> {
        let id = sqlx::query_scalar::<_, String>(
            "INSERT INTO users (email, password_hash, full_name, role_id) \
             SELECT $1, $2, $3, r.id FROM roles r WHERE r.name = $4 \
             RETURNING id::text",
        )
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.full_name)
        .bind(&user.role)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AuthError::DuplicateUser
            } else {
                AuthError::from(e)
            }
        })?
        .ok_or_else(|| AuthError::ValidationError(format!("Unknown role: {}", user.role)))?;

        Ok(UserRecord {
            id,
            email: user.email,
            password_hash: user.password_hash,
            full_name: user.full_name,
            role: Some(user.role),
            deleted_at: None,
        })
    }

    async fn update_password_hash(&self, id: &str, password_hash: &str) -> Result<(), AuthError> {
        sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1::uuid")
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn soft_delete_user(&self, id: &str, at: DateTime<Utc>) -> Result<bool, AuthError> {
        let result = sqlx::query(
            "UPDATE users SET deleted_at = $2 WHERE id = $1::uuid AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn create_session(&self, session: NewSession) -> Result<Session, AuthError> {
        let id = uuidv7().to_string();
        sqlx::query(
            "INSERT INTO refresh_tokens \
                 (id, token, user_id, expires_at, created_at, last_active_at, ip_address, user_agent) \
             VALUES ($1::uuid, $2, $3::uuid, $4, $5, $5, $6, $7)",
        )
        .bind(&id)
        .bind(&session.token)
        .bind(&session.user_id)
        .bind(session.expires_at)
        .bind(session.created_at)
        .bind(&session.metadata.ip_address)
        .bind(&session.metadata.user_agent)
        .execute(&self.pool)
        .await?;

        Ok(Session {
            id,
            token: session.token,
            user_id: session.user_id,
            expires_at: session.expires_at,
            revoked: false,
            created_at: session.created_at,
            last_active_at: Some(session.created_at),
            ip_address: session.metadata.ip_address,
            user_agent: session.metadata.user_agent,
        })
    }

    async fn find_session_by_token(&self, token: &str) -> Result<Option<Session>, AuthError> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM refresh_tokens WHERE token = $1"
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(session_from_row))
    }

    async fn find_session_by_id(&self, id: &str) -> Result<Option<Session>, AuthError> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM refresh_tokens WHERE id = $1::uuid"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(session_from_row))
    }

    async fn revoke_session(&self, id: &str) -> Result<bool, AuthError> {
        let flipped = sqlx::query_scalar::<_, String>(
            "UPDATE refresh_tokens SET revoked = TRUE \
             WHERE id = $1::uuid AND revoked = FALSE \
             RETURNING id::text",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(flipped.is_some())
    }

    async fn revoke_all_sessions(&self, user_id: &str) -> Result<u64, AuthError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked = TRUE \
             WHERE user_id = $1::uuid AND revoked = FALSE",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn list_active_sessions(&self, user_id: &str) -> Result<Vec<Session>, AuthError> {
        let rows = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM refresh_tokens \
             WHERE user_id = $1::uuid AND revoked = FALSE \
             ORDER BY last_active_at DESC NULLS LAST, created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(session_from_row).collect())
    }
}

#[async_trait]
impl PermissionSource for PgStore {
    async fn role_grants(&self, role: &str) -> Result<Option<RoleGrants>, AuthError> {
        let row = sqlx::query_as::<_, (bool, Vec<String>)>(
            "SELECT r.wildcard, \
                    COALESCE(array_agg(p.slug ORDER BY p.slug) FILTER (WHERE p.slug IS NOT NULL), '{}') \
             FROM roles r \
             LEFT JOIN role_permissions rp ON rp.role_id = r.id \
             LEFT JOIN permissions p ON p.id = rp.permission_id \
             WHERE r.name = $1 \
             GROUP BY r.id",
        )
        .bind(role)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(wildcard, slugs)| RoleGrants { wildcard, slugs }))
    }

    async fn all_slugs(&self) -> Result<Vec<String>, AuthError> {
        let slugs = sqlx::query_scalar::<_, String>("SELECT slug FROM permissions ORDER BY slug")
            .fetch_all(&self.pool)
            .await?;
        Ok(slugs)
    }
}

#[async_trait]
impl RbacStore for PgStore {
    async fn list_roles(&self) -> Result<Vec<Role>, RbacError> {
        self.load_roles(None, None).await
    }

    async fn find_role(&self, id: &str) -> Result<Option<Role>, RbacError> {
        Ok(self.load_roles(Some(id), None).await?.into_iter().next())
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, RbacError> {
        Ok(self.load_roles(None, Some(name)).await?.into_iter().next())
    }

    async fn create_role(&self, role: NewRole) -> Result<Role, RbacError> {
        let mut tx = self.pool.begin().await?;

        let id = sqlx::query_scalar::<_, String>(
            "INSERT INTO roles (name, description, wildcard, is_system) \
             VALUES ($1, $2, $3, $4) RETURNING id::text",
        )
        .bind(&role.name)
        .bind(&role.description)
        .bind(role.wildcard)
        .bind(role.is_system)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                RbacError::Conflict(format!("Role '{}' already exists", role.name))
            } else {
                RbacError::from(e)
            }
        })?;

        sqlx::query(
            "INSERT INTO role_permissions (role_id, permission_id) \
             SELECT $1::uuid, unnest($2::uuid[]) ON CONFLICT DO NOTHING",
        )
        .bind(&id)
        .bind(&role.permission_ids)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.find_role(&id)
            .await?
            .ok_or(RbacError::NotFound("Role"))
    }

    async fn update_role(&self, id: &str, update: RoleUpdate) -> Result<Option<Role>, RbacError> {
        let mut tx = self.pool.begin().await?;

        let found = sqlx::query_scalar::<_, String>(
            "UPDATE roles SET \
                 name = COALESCE($2, name), \
                 description = COALESCE($3, description), \
                 wildcard = COALESCE($4, wildcard) \
             WHERE id = $1::uuid RETURNING id::text",
        )
        .bind(id)
        .bind(&update.name)
        .bind(&update.description)
        .bind(update.wildcard)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                RbacError::Conflict("Role name already in use".into())
            } else {
                RbacError::from(e)
            }
        })?;

        if found.is_none() {
            tx.rollback().await?;
            return Ok(None);
        }

        // Replace the link set inside the same transaction so no reader ever
        // sees a partial permission set.
        if let Some(permission_ids) = &update.permission_ids {
            sqlx::query("DELETE FROM role_permissions WHERE role_id = $1::uuid")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            sqlx::query(
                "INSERT INTO role_permissions (role_id, permission_id) \
                 SELECT $1::uuid, unnest($2::uuid[]) ON CONFLICT DO NOTHING",
            )
            .bind(id)
            .bind(permission_ids)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        self.find_role(id).await
    }

    async fn delete_role(&self, id: &str) -> Result<bool, RbacError> {
        let result = sqlx::query("DELETE FROM roles WHERE id = $1::uuid")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    RbacError::InUse("Cannot delete role assigned to users".into())
                } else {
                    RbacError::from(e)
                }
            })?;
        Ok(result.rows_affected() > 0)
    }

    async fn role_user_count(&self, id: &str) -> Result<i64, RbacError> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE role_id = $1::uuid")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn grant_permissions(
        &self,
        role_id: &str,
        permission_ids: &[String],
    ) -> Result<(), RbacError> {
        sqlx::query(
            "INSERT INTO role_permissions (role_id, permission_id) \
             SELECT $1::uuid, unnest($2::uuid[]) ON CONFLICT DO NOTHING",
        )
        .bind(role_id)
        .bind(permission_ids)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_permissions(&self) -> Result<Vec<Permission>, RbacError> {
        let rows = sqlx::query_as::<_, PermissionRow>(
            "SELECT id::text, slug, description, module FROM permissions ORDER BY slug",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(permission_from_row).collect())
    }

    async fn find_permission(&self, id: &str) -> Result<Option<Permission>, RbacError> {
        let row = sqlx::query_as::<_, PermissionRow>(
            "SELECT id::text, slug, description, module FROM permissions WHERE id = $1::uuid",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(permission_from_row))
    }

    async fn find_permission_by_slug(&self, slug: &str) -> Result<Option<Permission>, RbacError> {
        let row = sqlx::query_as::<_, PermissionRow>(
            "SELECT id::text, slug, description, module FROM permissions WHERE slug = $1",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(permission_from_row))
    }

    async fn existing_permission_ids(&self, ids: &[String]) -> Result<Vec<String>, RbacError> {
        let found = sqlx::query_scalar::<_, String>(
            "SELECT id::text FROM permissions WHERE id = ANY($1::uuid[])",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(found)
    }

    async fn create_permission(&self, permission: NewPermission) -> Result<Permission, RbacError> {
        let id = sqlx::query_scalar::<_, String>(
            "INSERT INTO permissions (slug, description, module) VALUES ($1, $2, $3) \
             RETURNING id::text",
        )
        .bind(&permission.slug)
        .bind(&permission.description)
        .bind(&permission.module)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                RbacError::Conflict(format!("Permission '{}' already exists", permission.slug))
            } else {
                RbacError::from(e)
            }
        })?;

        Ok(Permission {
            id,
            slug: permission.slug,
            description: permission.description,
            module: permission.module,
        })
    }

    async fn update_permission(
        &self,
        id: &str,
        update: PermissionUpdate,
    ) -> Result<Option<Permission>, RbacError> {
        let row = sqlx::query_as::<_, PermissionRow>(
            "UPDATE permissions SET \
                 slug = COALESCE($2, slug), \
                 description = COALESCE($3, description), \
                 module = COALESCE($4, module) \
             WHERE id = $1::uuid \
             RETURNING id::text, slug, description, module",
        )
        .bind(id)
        .bind(&update.slug)
        .bind(&update.description)
        .bind(&update.module)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                RbacError::Conflict("Permission slug already in use".into())
            } else {
                RbacError::from(e)
            }
        })?;
        Ok(row.map(permission_from_row))
    }

    async fn delete_permission(&self, id: &str) -> Result<bool, RbacError> {
        let result = sqlx::query("DELETE FROM permissions WHERE id = $1::uuid")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    RbacError::InUse("Cannot delete permission assigned to roles".into())
                } else {
                    RbacError::from(e)
                }
            })?;
        Ok(result.rows_affected() > 0)
    }

    async fn permission_role_count(&self, id: &str) -> Result<i64, RbacError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM role_permissions WHERE permission_id = $1::uuid",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

#[async_trait]
impl UserTrash for PgStore {
    async fn list_deleted_users(&self) -> Result<Vec<DeletedUser>, TrashError> {
        let rows = sqlx::query_as::<_, (String, String, Option<String>, DateTime<Utc>)>(
            "SELECT id::text, email, full_name, deleted_at FROM users \
             WHERE deleted_at IS NOT NULL ORDER BY deleted_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, email, full_name, deleted_at)| DeletedUser {
                id,
                email,
                full_name,
                deleted_at,
            })
            .collect())
    }

    async fn restore_user(&self, id: &str) -> Result<bool, TrashError> {
        let result = sqlx::query(
            "UPDATE users SET deleted_at = NULL WHERE id = $1::uuid AND deleted_at IS NOT NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn purge_user(&self, id: &str) -> Result<bool, TrashError> {
        let result =
            sqlx::query("DELETE FROM users WHERE id = $1::uuid AND deleted_at IS NOT NULL")
                .bind(id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }
}
