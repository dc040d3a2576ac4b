//! Permission resolution: role name → flattened slug set.
//!
//! Users without a role assignment resolve as [`DEFAULT_ROLE`]. A role that
//! does not exist resolves to the empty set. Wildcard roles are expanded
//! against the live permission table on every call, so permissions added
//! later are granted without touching the role.

use std::collections::BTreeSet;
use std::sync::Arc;

use super::AuthError;
use crate::store::PermissionSource;

/// Role assumed for users with no role assignment.
pub const DEFAULT_ROLE: &str = "customer";

/// Effective role name for an optional assignment.
pub fn effective_role(role: Option<&str>) -> &str {
    role.unwrap_or(DEFAULT_ROLE)
}

/// Resolves roles to permission slugs.
#[derive(Clone)]
pub struct PermissionResolver {
    source: Arc<dyn PermissionSource>,
}

impl PermissionResolver {
    pub fn new(source: Arc<dyn PermissionSource>) -> Self {
        Self { source }
    }

    /// Flattened slugs for `role` (or [`DEFAULT_ROLE`] when `None`).
    pub async fn resolve(&self, role: Option<&str>) -> Result<BTreeSet<String>, AuthError> {
        let role = effective_role(role);
        let Some(grants) = self.source.role_grants(role).await? else {
            return Ok(BTreeSet::new());
        };
        if grants.wildcard {
            return Ok(self.source.all_slugs().await?.into_iter().collect());
        }
        Ok(grants.slugs.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::rbac::{NewPermission, NewRole};
    use crate::store::RbacStore;
    use crate::store::memory::MemoryStore;

    async fn permission(store: &MemoryStore, slug: &str) -> String {
        store
            .create_permission(NewPermission {
                slug: slug.into(),
                ..Default::default()
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn flattens_assigned_permissions() {
        let store = Arc::new(MemoryStore::new());
        let create = permission(&store, "tickets:create").await;
        let view = permission(&store, "tickets:view").await;
        permission(&store, "tickets:delete").await;
        store
            .create_role(NewRole {
                name: "customer".into(),
                permission_ids: vec![create, view],
                ..Default::default()
            })
            .await
            .unwrap();

        let resolver = PermissionResolver::new(store);
        let slugs = resolver.resolve(Some("customer")).await.unwrap();
        assert_eq!(
            slugs.into_iter().collect::<Vec<_>>(),
            vec!["tickets:create", "tickets:view"]
        );
    }

    #[tokio::test]
    async fn missing_assignment_uses_default_role() {
        let store = Arc::new(MemoryStore::new());
        let view = permission(&store, "tickets:view").await;
        store
            .create_role(NewRole {
                name: DEFAULT_ROLE.into(),
                permission_ids: vec![view],
                ..Default::default()
            })
            .await
            .unwrap();

        let resolver = PermissionResolver::new(store);
        assert!(resolver.resolve(None).await.unwrap().contains("tickets:view"));
    }

    #[tokio::test]
    async fn unknown_role_resolves_empty() {
        let store = Arc::new(MemoryStore::new());
        permission(&store, "tickets:view").await;
        let resolver = PermissionResolver::new(store);
        assert!(resolver.resolve(Some("ghost")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn wildcard_picks_up_permissions_added_later() {
        let store = Arc::new(MemoryStore::new());
        permission(&store, "tickets:view").await;
        store
            .create_role(NewRole {
                name: "administrator".into(),
                wildcard: true,
                ..Default::default()
            })
            .await
            .unwrap();
        let resolver = PermissionResolver::new(store.clone());
        assert_eq!(resolver.resolve(Some("administrator")).await.unwrap().len(), 1);

        permission(&store, "reports:export").await;
        let slugs = resolver.resolve(Some("administrator")).await.unwrap();
        assert!(slugs.contains("reports:export"));
        assert!(slugs.contains("tickets:view"));
    }
}
