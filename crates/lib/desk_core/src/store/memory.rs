//! In-memory stores.
//!
//! Mirrors the PostgreSQL semantics (unique keys, referential guards,
//! conditional revocation) behind a single mutex so every trait call is atomic.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{PermissionSource, RbacStore, SessionStore, UserStore, UserTrash};
use crate::auth::AuthError;
use crate::models::auth::{DeletedUser, NewSession, NewUser, Session, UserRecord};
use crate::models::rbac::{
    NewPermission, NewRole, Permission, PermissionUpdate, Role, RoleGrants, RoleUpdate,
};
use crate::rbac::RbacError;
use crate::trash::TrashError;
use crate::uuid::{uuidv4, uuidv7};

#[derive(Debug, Clone)]
struct UserRow {
    id: String,
    email: String,
    password_hash: String,
    full_name: Option<String>,
    role_id: Option<String>,
    deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct RoleRow {
    id: String,
    name: String,
    description: Option<String>,
    wildcard: bool,
    is_system: bool,
    permission_ids: Vec<String>,
}

#[derive(Debug, Default)]
struct Tables {
    users: BTreeMap<String, UserRow>,
    roles: BTreeMap<String, RoleRow>,
    permissions: BTreeMap<String, Permission>,
    sessions: BTreeMap<String, Session>,
}

impl Tables {
    fn role_name(&self, role_id: Option<&String>) -> Option<String> {
        role_id
            .and_then(|id| self.roles.get(id))
            .map(|r| r.name.clone())
    }

    fn user_record(&self, row: &UserRow) -> UserRecord {
        UserRecord {
            id: row.id.clone(),
            email: row.email.clone(),
            password_hash: row.password_hash.clone(),
            full_name: row.full_name.clone(),
            role: self.role_name(row.role_id.as_ref()),
            deleted_at: row.deleted_at,
        }
    }

    fn role_view(&self, row: &RoleRow) -> Role {
        let mut permissions: Vec<Permission> = row
            .permission_ids
            .iter()
            .filter_map(|pid| self.permissions.get(pid).cloned())
            .collect();
        permissions.sort_by(|a, b| a.slug.cmp(&b.slug));
        Role {
            id: row.id.clone(),
            name: row.name.clone(),
            description: row.description.clone(),
            wildcard: row.wildcard,
            is_system: row.is_system,
            permissions,
            user_count: self.role_user_count(&row.id),
        }
    }

    fn role_user_count(&self, role_id: &str) -> i64 {
        self.users
            .values()
            .filter(|u| u.role_id.as_deref() == Some(role_id))
            .count() as i64
    }

    fn name_taken(&self, name: &str, except: Option<&str>) -> bool {
        self.roles
            .values()
            .any(|r| r.name == name && Some(r.id.as_str()) != except)
    }

    fn slug_taken(&self, slug: &str, except: Option<&str>) -> bool {
        self.permissions
            .values()
            .any(|p| p.slug == slug && Some(p.id.as_str()) != except)
    }
}

fn dedup(ids: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(ids.len());
    for id in ids {
        if !out.contains(id) {
            out.push(id.clone());
        }
    }
    out
}

/// In-memory implementation of every store trait.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, AuthError> {
        let t = self.lock();
        Ok(t.users
            .values()
            .find(|u| u.email == email)
            .map(|u| t.user_record(u)))
    }

    async fn find_user_by_id(&self, id: &str) -> Result<Option<UserRecord>, AuthError> {
        let t = self.lock();
        Ok(t.users.get(id).map(|u| t.user_record(u)))
    }

    async fn create_user(&self, user: NewUser) -> Result<UserRecord, AuthError> {
        let mut t = self.lock();
        if t.users.values().any(|u| u.email == user.email) {
            return Err(AuthError::DuplicateUser);
        }
        let role_id = t
            .roles
            .values()
            .find(|r| r.name == user.role)
            .map(|r| r.id.clone())
            .ok_or_else(|| AuthError::ValidationError(format!("Unknown role: {}", user.role)))?;

        let row = UserRow {
            id: uuidv4().to_string(),
            email: user.email,
            password_hash: user.password_hash,
            full_name: user.full_name,
            role_id: Some(role_id),
            deleted_at: None,
        };
        let record = t.user_record(&row);
        t.users.insert(row.id.clone(), row);
        Ok(record)
    }

    async fn update_password_hash(&self, id: &str, password_hash: &str) -> Result<(), AuthError> {
        if let Some(u) = self.lock().users.get_mut(id) {
            u.password_hash = password_hash.to_string();
        }
        Ok(())
    }

    async fn soft_delete_user(&self, id: &str, at: DateTime<Utc>) -> Result<bool, AuthError> {
        match self.lock().users.get_mut(id) {
            Some(u) if u.deleted_at.is_none() => {
                u.deleted_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self, session: NewSession) -> Result<Session, AuthError> {
        let mut t = self.lock();
        if t.sessions.values().any(|s| s.token == session.token) {
            return Err(AuthError::Internal("duplicate session token".into()));
        }
        let row = Session {
            id: uuidv7().to_string(),
            token: session.token,
            user_id: session.user_id,
            expires_at: session.expires_at,
            revoked: false,
            created_at: session.created_at,
            last_active_at: Some(session.created_at),
            ip_address: session.metadata.ip_address,
            user_agent: session.metadata.user_agent,
        };
        t.sessions.insert(row.id.clone(), row.clone());
        Ok(row)
    }

    async fn find_session_by_token(&self, token: &str) -> Result<Option<Session>, AuthError> {
        Ok(self
            .lock()
            .sessions
            .values()
            .find(|s| s.token == token)
            .cloned())
    }

    async fn find_session_by_id(&self, id: &str) -> Result<Option<Session>, AuthError> {
        Ok(self.lock().sessions.get(id).cloned())
    }

    async fn revoke_session(&self, id: &str) -> Result<bool, AuthError> {
        match self.lock().sessions.get_mut(id) {
            Some(s) if !s.revoked => {
                s.revoked = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_all_sessions(&self, user_id: &str) -> Result<u64, AuthError> {
        let mut flipped = 0;
        for s in self.lock().sessions.values_mut() {
            if s.user_id == user_id && !s.revoked {
                s.revoked = true;
                flipped += 1;
            }
        }
        Ok(flipped)
    }

    async fn list_active_sessions(&self, user_id: &str) -> Result<Vec<Session>, AuthError> {
        let mut active: Vec<Session> = self
            .lock()
            .sessions
            .values()
            .filter(|s| s.user_id == user_id && !s.revoked)
            .cloned()
            .collect();
        // Most recently active first; ids are v7 so they break ties by age.
        active.sort_by(|a, b| {
            b.last_active_at
                .cmp(&a.last_active_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(active)
    }
}

#[async_trait]
impl PermissionSource for MemoryStore {
    async fn role_grants(&self, role: &str) -> Result<Option<RoleGrants>, AuthError> {
        let t = self.lock();
        Ok(t.roles.values().find(|r| r.name == role).map(|r| {
            let mut slugs: Vec<String> = r
                .permission_ids
                .iter()
                .filter_map(|pid| t.permissions.get(pid).map(|p| p.slug.clone()))
                .collect();
            slugs.sort();
            RoleGrants {
                wildcard: r.wildcard,
                slugs,
            }
        }))
    }

    async fn all_slugs(&self) -> Result<Vec<String>, AuthError> {
        let mut slugs: Vec<String> = self
            .lock()
            .permissions
            .values()
            .map(|p| p.slug.clone())
            .collect();
        slugs.sort();
        Ok(slugs)
    }
}

#[async_trait]
impl RbacStore for MemoryStore {
    async fn list_roles(&self) -> Result<Vec<Role>, RbacError> {
        let t = self.lock();
        let mut roles: Vec<Role> = t.roles.values().map(|r| t.role_view(r)).collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    async fn find_role(&self, id: &str) -> Result<Option<Role>, RbacError> {
        let t = self.lock();
        Ok(t.roles.get(id).map(|r| t.role_view(r)))
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, RbacError> {
        let t = self.lock();
        Ok(t.roles
            .values()
            .find(|r| r.name == name)
            .map(|r| t.role_view(r)))
    }

    async fn create_role(&self, role: NewRole) -> Result<Role, RbacError> {
        let mut t = self.lock();
        if t.name_taken(&role.name, None) {
            return Err(RbacError::Conflict(format!(
                "Role '{}' already exists",
                role.name
            )));
        }
        let row = RoleRow {
            id: uuidv4().to_string(),
            name: role.name,
            description: role.description,
            wildcard: role.wildcard,
            is_system: role.is_system,
            permission_ids: dedup(&role.permission_ids),
        };
        let view = t.role_view(&row);
        t.roles.insert(row.id.clone(), row);
        Ok(view)
    }

    async fn update_role(&self, id: &str, update: RoleUpdate) -> Result<Option<Role>, RbacError> {
        let mut t = self.lock();
        if let Some(name) = &update.name
            && t.name_taken(name, Some(id))
        {
            return Err(RbacError::Conflict("Role name already in use".into()));
        }
        let Some(row) = t.roles.get_mut(id) else {
            return Ok(None);
        };
        if let Some(name) = update.name {
            row.name = name;
        }
        if let Some(description) = update.description {
            row.description = Some(description);
        }
        if let Some(wildcard) = update.wildcard {
            row.wildcard = wildcard;
        }
        if let Some(permission_ids) = update.permission_ids {
            row.permission_ids = dedup(&permission_ids);
        }
        let row = row.clone();
        Ok(Some(t.role_view(&row)))
    }

    async fn delete_role(&self, id: &str) -> Result<bool, RbacError> {
        let mut t = self.lock();
        if t.role_user_count(id) > 0 {
            return Err(RbacError::InUse(
                "Cannot delete role assigned to users".into(),
            ));
        }
        Ok(t.roles.remove(id).is_some())
    }

    async fn role_user_count(&self, id: &str) -> Result<i64, RbacError> {
        Ok(self.lock().role_user_count(id))
    }

    async fn grant_permissions(
        &self,
        role_id: &str,
        permission_ids: &[String],
    ) -> Result<(), RbacError> {
        if let Some(row) = self.lock().roles.get_mut(role_id) {
            for pid in permission_ids {
                if !row.permission_ids.contains(pid) {
                    row.permission_ids.push(pid.clone());
                }
            }
        }
        Ok(())
    }

    async fn list_permissions(&self) -> Result<Vec<Permission>, RbacError> {
        let mut permissions: Vec<Permission> = self.lock().permissions.values().cloned().collect();
        permissions.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(permissions)
    }

    async fn find_permission(&self, id: &str) -> Result<Option<Permission>, RbacError> {
        Ok(self.lock().permissions.get(id).cloned())
    }

    async fn find_permission_by_slug(&self, slug: &str) -> Result<Option<Permission>, RbacError> {
        Ok(self
            .lock()
            .permissions
            .values()
            .find(|p| p.slug == slug)
            .cloned())
    }

    async fn existing_permission_ids(&self, ids: &[String]) -> Result<Vec<String>, RbacError> {
        let t = self.lock();
        Ok(ids
            .iter()
            .filter(|id| t.permissions.contains_key(*id))
            .cloned()
            .collect())
    }

    async fn create_permission(&self, permission: NewPermission) -> Result<Permission, RbacError> {
        let mut t = self.lock();
        if t.slug_taken(&permission.slug, None) {
            return Err(RbacError::Conflict(format!(
                "Permission '{}' already exists",
                permission.slug
            )));
        }
        let row = Permission {
            id: uuidv4().to_string(),
            slug: permission.slug,
            description: permission.description,
            module: permission.module,
        };
        t.permissions.insert(row.id.clone(), row.clone());
        Ok(row)
    }

    async fn update_permission(
        &self,
        id: &str,
        update: PermissionUpdate,
    ) -> Result<Option<Permission>, RbacError> {
        let mut t = self.lock();
        if let Some(slug) = &update.slug
            && t.slug_taken(slug, Some(id))
        {
            return Err(RbacError::Conflict("Permission slug already in use".into()));
        }
        let Some(row) = t.permissions.get_mut(id) else {
            return Ok(None);
        };
        if let Some(slug) = update.slug {
            row.slug = slug;
        }
        if let Some(description) = update.description {
            row.description = Some(description);
        }
        if let Some(module) = update.module {
            row.module = Some(module);
        }
        Ok(Some(row.clone()))
    }

    async fn delete_permission(&self, id: &str) -> Result<bool, RbacError> {
        let mut t = self.lock();
        if t.roles.values().any(|r| r.permission_ids.iter().any(|p| p == id)) {
            return Err(RbacError::InUse(
                "Cannot delete permission assigned to roles".into(),
            ));
        }
        Ok(t.permissions.remove(id).is_some())
    }

    async fn permission_role_count(&self, id: &str) -> Result<i64, RbacError> {
        Ok(self
            .lock()
            .roles
            .values()
            .filter(|r| r.permission_ids.iter().any(|p| p == id))
            .count() as i64)
    }
}

#[async_trait]
impl UserTrash for MemoryStore {
    async fn list_deleted_users(&self) -> Result<Vec<DeletedUser>, TrashError> {
        let mut deleted: Vec<DeletedUser> = self
            .lock()
            .users
            .values()
            .filter_map(|u| {
                u.deleted_at.map(|deleted_at| DeletedUser {
                    id: u.id.clone(),
                    email: u.email.clone(),
                    full_name: u.full_name.clone(),
                    deleted_at,
                })
            })
            .collect();
        deleted.sort_by(|a, b| b.deleted_at.cmp(&a.deleted_at));
        Ok(deleted)
    }

    async fn restore_user(&self, id: &str) -> Result<bool, TrashError> {
        match self.lock().users.get_mut(id) {
            Some(u) if u.deleted_at.is_some() => {
                u.deleted_at = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn purge_user(&self, id: &str) -> Result<bool, TrashError> {
        let mut t = self.lock();
        if !t.users.get(id).is_some_and(|u| u.deleted_at.is_some()) {
            return Ok(false);
        }
        t.users.remove(id);
        t.sessions.retain(|_, s| s.user_id != id);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::auth::SessionMetadata;

    fn new_session(token: &str, user_id: &str, at: DateTime<Utc>) -> NewSession {
        NewSession {
            token: token.to_string(),
            user_id: user_id.to_string(),
            expires_at: at + chrono::Duration::days(7),
            created_at: at,
            metadata: SessionMetadata::default(),
        }
    }

    #[tokio::test]
    async fn revoke_flips_exactly_once() {
        let store = MemoryStore::new();
        let s = store
            .create_session(new_session("t1", "u1", Utc::now()))
            .await
            .unwrap();
        assert!(store.revoke_session(&s.id).await.unwrap());
        assert!(!store.revoke_session(&s.id).await.unwrap());
        assert!(!store.revoke_session("missing").await.unwrap());
    }

    #[tokio::test]
    async fn list_active_is_most_recent_first_and_skips_revoked() {
        let store = MemoryStore::new();
        let t0 = Utc::now();
        let old = store.create_session(new_session("a", "u1", t0)).await.unwrap();
        let new = store
            .create_session(new_session("b", "u1", t0 + chrono::Duration::minutes(5)))
            .await
            .unwrap();
        let gone = store
            .create_session(new_session("c", "u1", t0 + chrono::Duration::minutes(9)))
            .await
            .unwrap();
        store.create_session(new_session("d", "u2", t0)).await.unwrap();
        store.revoke_session(&gone.id).await.unwrap();

        let ids: Vec<String> = store
            .list_active_sessions("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec![new.id, old.id]);
    }

    #[tokio::test]
    async fn delete_permission_blocked_while_linked() {
        let store = MemoryStore::new();
        let p = store
            .create_permission(NewPermission {
                slug: "tickets:view".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        let r = store
            .create_role(NewRole {
                name: "viewer".into(),
                permission_ids: vec![p.id.clone()],
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(matches!(
            store.delete_permission(&p.id).await,
            Err(RbacError::InUse(_))
        ));
        store.delete_role(&r.id).await.unwrap();
        assert!(store.delete_permission(&p.id).await.unwrap());
    }
}
