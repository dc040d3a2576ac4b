//! Role and permission administration.
//!
//! Guards live here, on top of [`RbacStore`]: ids must be UUIDs, slugs must be
//! namespaced (`<resource>:<action>`), referenced permission ids must exist,
//! system roles cannot be deleted. Referential guards (role in use by a user,
//! permission linked to a role) are enforced by the store itself.

pub mod seed;

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::models::rbac::{NewPermission, NewRole, Permission, PermissionUpdate, Role, RoleUpdate};
use crate::store::RbacStore;
use crate::uuid::is_uuid;

/// RBAC administration errors.
#[derive(Debug, Error)]
pub enum RbacError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    InUse(String),

    #[error("{0}")]
    Protected(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    DbError(#[from] sqlx::Error),
}

/// Check that a slug has the `<resource>:<action>` shape.
pub fn validate_slug(slug: &str) -> Result<(), RbacError> {
    let valid_part = |s: &str| {
        !s.is_empty()
            && s
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
    };
    match slug.split_once(':') {
        Some((resource, action)) if valid_part(resource) && valid_part(action) => Ok(()),
        _ => Err(RbacError::Validation(format!(
            "Permission slug '{slug}' must look like <resource>:<action>"
        ))),
    }
}

fn validate_name(name: &str) -> Result<(), RbacError> {
    if name.trim().is_empty() {
        return Err(RbacError::Validation("Role name is required".into()));
    }
    Ok(())
}

/// CRUD over roles and permissions.
#[derive(Clone)]
pub struct RbacService {
    store: Arc<dyn RbacStore>,
}

impl RbacService {
    pub fn new(store: Arc<dyn RbacStore>) -> Self {
        Self { store }
    }

    // --- Roles ---

    /// All roles ordered by name.
    pub async fn list_roles(&self) -> Result<Vec<Role>, RbacError> {
        self.store.list_roles().await
    }

    pub async fn get_role(&self, id: &str) -> Result<Role, RbacError> {
        if !is_uuid(id) {
            return Err(RbacError::NotFound("Role"));
        }
        self.store
            .find_role(id)
            .await?
            .ok_or(RbacError::NotFound("Role"))
    }

    pub async fn create_role(&self, role: NewRole) -> Result<Role, RbacError> {
        validate_name(&role.name)?;
        self.check_permission_ids(&role.permission_ids).await?;

        let role = self.store.create_role(role).await?;
        info!(role_id = %role.id, role = %role.name, "role created");
        Ok(role)
    }

    /// Update a role. A present `permission_ids` replaces the whole set.
    ///
    /// System roles keep their name; registration and the resolver look them
    /// up by it.
    pub async fn update_role(&self, id: &str, update: RoleUpdate) -> Result<Role, RbacError> {
        let current = self.get_role(id).await?;
        if let Some(name) = &update.name {
            validate_name(name)?;
            if current.is_system && *name != current.name {
                return Err(RbacError::Protected(format!(
                    "Cannot rename system role '{}'",
                    current.name
                )));
            }
        }
        if let Some(ids) = &update.permission_ids {
            self.check_permission_ids(ids).await?;
        }

        let role = self
            .store
            .update_role(id, update)
            .await?
            .ok_or(RbacError::NotFound("Role"))?;
        info!(role_id = %role.id, role = %role.name, "role updated");
        Ok(role)
    }

    /// Delete a role. Rejected for system roles and roles still assigned to users.
    pub async fn delete_role(&self, id: &str) -> Result<(), RbacError> {
        let role = self.get_role(id).await?;
        if role.is_system {
            return Err(RbacError::Protected(format!(
                "Cannot delete system role '{}'",
                role.name
            )));
        }
        if self.store.role_user_count(id).await? > 0 {
            return Err(RbacError::InUse("Cannot delete role assigned to users".into()));
        }
        if !self.store.delete_role(id).await? {
            return Err(RbacError::NotFound("Role"));
        }
        info!(role_id = %id, role = %role.name, "role deleted");
        Ok(())
    }

    async fn check_permission_ids(&self, ids: &[String]) -> Result<(), RbacError> {
        if let Some(bad) = ids.iter().find(|id| !is_uuid(id)) {
            return Err(RbacError::Validation(format!("Invalid permission id '{bad}'")));
        }
        let existing = self.store.existing_permission_ids(ids).await?;
        if let Some(missing) = ids.iter().find(|id| !existing.contains(id)) {
            return Err(RbacError::Validation(format!(
                "Unknown permission id '{missing}'"
            )));
        }
        Ok(())
    }

    // --- Permissions ---

    /// All permissions ordered by slug.
    pub async fn list_permissions(&self) -> Result<Vec<Permission>, RbacError> {
        self.store.list_permissions().await
    }

    pub async fn get_permission(&self, id: &str) -> Result<Permission, RbacError> {
        if !is_uuid(id) {
            return Err(RbacError::NotFound("Permission"));
        }
        self.store
            .find_permission(id)
            .await?
            .ok_or(RbacError::NotFound("Permission"))
    }

    pub async fn create_permission(
        &self,
        permission: NewPermission,
    ) -> Result<Permission, RbacError> {
        validate_slug(&permission.slug)?;
        let permission = self.store.create_permission(permission).await?;
        info!(permission_id = %permission.id, slug = %permission.slug, "permission created");
        Ok(permission)
    }

    pub async fn update_permission(
        &self,
        id: &str,
        update: PermissionUpdate,
    ) -> Result<Permission, RbacError> {
        if !is_uuid(id) {
            return Err(RbacError::NotFound("Permission"));
        }
        if let Some(slug) = &update.slug {
            validate_slug(slug)?;
        }
        let permission = self
            .store
            .update_permission(id, update)
            .await?
            .ok_or(RbacError::NotFound("Permission"))?;
        info!(permission_id = %permission.id, slug = %permission.slug, "permission updated");
        Ok(permission)
    }

    /// Delete a permission. Rejected while any role links it.
    pub async fn delete_permission(&self, id: &str) -> Result<(), RbacError> {
        let permission = self.get_permission(id).await?;
        if self.store.permission_role_count(id).await? > 0 {
            return Err(RbacError::InUse(
                "Cannot delete permission assigned to roles".into(),
            ));
        }
        if !self.store.delete_permission(id).await? {
            return Err(RbacError::NotFound("Permission"));
        }
        info!(permission_id = %id, slug = %permission.slug, "permission deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::auth::NewUser;
    use crate::store::UserStore;
    use crate::store::memory::MemoryStore;

    fn service() -> (Arc<MemoryStore>, RbacService) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), RbacService::new(store))
    }

    async fn perm(svc: &RbacService, slug: &str) -> Permission {
        svc.create_permission(NewPermission {
            slug: slug.into(),
            ..Default::default()
        })
        .await
        .unwrap()
    }

    #[test]
    fn slugs_must_be_namespaced() {
        assert!(validate_slug("tickets:view").is_ok());
        assert!(validate_slug("admin:manage_roles").is_ok());
        assert!(validate_slug("tickets").is_err());
        assert!(validate_slug(":view").is_err());
        assert!(validate_slug("tickets:").is_err());
        assert!(validate_slug("Tickets:View").is_err());
        assert!(validate_slug("a:b:c").is_err());
    }

    #[tokio::test]
    async fn create_role_with_permissions() {
        let (_, svc) = service();
        let view = perm(&svc, "tickets:view").await;
        let role = svc
            .create_role(NewRole {
                name: "auditor".into(),
                permission_ids: vec![view.id.clone()],
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(role.permissions, vec![view]);
        assert_eq!(role.user_count, 0);
    }

    #[tokio::test]
    async fn create_role_rejects_unknown_permission_ids() {
        let (_, svc) = service();
        let err = svc
            .create_role(NewRole {
                name: "auditor".into(),
                permission_ids: vec![crate::uuid::uuidv4().to_string()],
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RbacError::Validation(_)));
    }

    #[tokio::test]
    async fn duplicate_role_name_conflicts() {
        let (_, svc) = service();
        let role = NewRole {
            name: "auditor".into(),
            ..Default::default()
        };
        svc.create_role(role.clone()).await.unwrap();
        assert!(matches!(
            svc.create_role(role).await,
            Err(RbacError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn update_replaces_permission_set() {
        let (_, svc) = service();
        let view = perm(&svc, "tickets:view").await;
        let create = perm(&svc, "tickets:create").await;
        let role = svc
            .create_role(NewRole {
                name: "auditor".into(),
                permission_ids: vec![view.id.clone()],
                ..Default::default()
            })
            .await
            .unwrap();

        let updated = svc
            .update_role(
                &role.id,
                RoleUpdate {
                    permission_ids: Some(vec![create.id.clone()]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.permissions, vec![create]);
        assert_eq!(updated.name, "auditor");
    }

    #[tokio::test]
    async fn delete_role_guarded_by_users() {
        let (store, svc) = service();
        let used = svc
            .create_role(NewRole {
                name: "agent".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        let unused = svc
            .create_role(NewRole {
                name: "auditor".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        store
            .create_user(NewUser {
                email: "a@x.com".into(),
                password_hash: "h".into(),
                full_name: None,
                role: "agent".into(),
            })
            .await
            .unwrap();

        assert!(matches!(
            svc.delete_role(&used.id).await,
            Err(RbacError::InUse(_))
        ));
        svc.delete_role(&unused.id).await.unwrap();
        assert!(matches!(
            svc.get_role(&unused.id).await,
            Err(RbacError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn system_roles_cannot_be_deleted() {
        let (_, svc) = service();
        let role = svc
            .create_role(NewRole {
                name: "customer".into(),
                is_system: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(matches!(
            svc.delete_role(&role.id).await,
            Err(RbacError::Protected(_))
        ));
    }

    #[tokio::test]
    async fn system_roles_cannot_be_renamed() {
        let (_, svc) = service();
        let role = svc
            .create_role(NewRole {
                name: "customer".into(),
                is_system: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(matches!(
            svc.update_role(
                &role.id,
                RoleUpdate {
                    name: Some("client".into()),
                    ..Default::default()
                }
            )
            .await,
            Err(RbacError::Protected(_))
        ));

        let updated = svc
            .update_role(
                &role.id,
                RoleUpdate {
                    name: Some("customer".into()),
                    description: Some("End users".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "customer");
        assert_eq!(updated.description.as_deref(), Some("End users"));
    }

    #[test]
    fn not_found_names_the_entity_once() {
        assert_eq!(RbacError::NotFound("Role").to_string(), "Role not found");
    }

    #[tokio::test]
    async fn delete_permission_guarded_by_roles() {
        let (_, svc) = service();
        let view = perm(&svc, "tickets:view").await;
        svc.create_role(NewRole {
            name: "auditor".into(),
            permission_ids: vec![view.id.clone()],
            ..Default::default()
        })
        .await
        .unwrap();
        assert!(matches!(
            svc.delete_permission(&view.id).await,
            Err(RbacError::InUse(_))
        ));

        let orphan = perm(&svc, "reports:export").await;
        svc.delete_permission(&orphan.id).await.unwrap();
    }

    #[tokio::test]
    async fn non_uuid_ids_are_not_found() {
        let (_, svc) = service();
        assert!(matches!(
            svc.get_role("abc").await,
            Err(RbacError::NotFound("Role"))
        ));
        assert!(matches!(
            svc.delete_permission("abc").await,
            Err(RbacError::NotFound("Permission"))
        ));
    }

    #[tokio::test]
    async fn update_permission_validates_slug() {
        let (_, svc) = service();
        let view = perm(&svc, "tickets:view").await;
        assert!(matches!(
            svc.update_permission(
                &view.id,
                PermissionUpdate {
                    slug: Some("bad".into()),
                    ..Default::default()
                }
            )
            .await,
            Err(RbacError::Validation(_))
        ));
        let updated = svc
            .update_permission(
                &view.id,
                PermissionUpdate {
                    description: Some("View tickets".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.description.as_deref(), Some("View tickets"));
    }
}
