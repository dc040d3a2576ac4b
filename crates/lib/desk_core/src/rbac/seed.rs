//! Default permission catalog and roles.
//!
//! Seeding is idempotent: existing permissions and roles are kept, missing
//! ones are created, and missing role links are added. Nothing is removed.

use tracing::{debug, info};

use super::RbacError;
use crate::auth::AuthError;
use crate::auth::password::{hash_password, validate_password};
use crate::models::auth::NewUser;
use crate::models::rbac::{NewPermission, NewRole};
use crate::store::{RbacStore, UserStore};

/// A group of related permissions.
pub struct Module {
    pub name: &'static str,
    pub permissions: &'static [(&'static str, &'static str)],
}

pub const MODULES: &[Module] = &[
    Module {
        name: "Dashboard",
        permissions: &[
            ("dashboard:view", "View dashboard"),
            ("activities:view", "View activities"),
            ("notifications:view", "View notifications"),
            ("sessions:view", "View sessions"),
        ],
    },
    Module {
        name: "Ticket Management",
        permissions: &[
            ("tickets:create", "Create new tickets"),
            ("tickets:view", "View tickets"),
            ("tickets:update", "Update ticket details"),
            ("tickets:delete", "Delete tickets"),
            ("tickets:assign", "Assign tickets to agents"),
            ("tickets:change_status", "Change ticket status"),
        ],
    },
    Module {
        name: "User Management",
        permissions: &[
            ("users:view", "View users"),
            ("users:manage", "Manage users"),
            ("roles:manage", "Manage roles"),
            ("permissions:manage", "Manage permissions"),
        ],
    },
    Module {
        name: "System Management",
        permissions: &[
            ("categories:manage", "Manage categories"),
            ("services:manage", "Manage services"),
            ("priorities:manage", "Manage priorities"),
            ("statuses:manage", "Manage statuses"),
            ("trash:manage", "Manage trash"),
            ("logs:manage", "Manage logs"),
        ],
    },
    Module {
        name: "Administration",
        permissions: &[
            ("admin:manage_roles", "Administer roles and permissions"),
            ("admin:manage_trash", "Restore or purge deleted records"),
        ],
    },
];

/// A default role. `wildcard` roles hold every permission.
pub struct RoleSeed {
    pub name: &'static str,
    pub description: &'static str,
    pub wildcard: bool,
    pub permissions: &'static [&'static str],
}

pub const ADMIN_ROLE: &str = "administrator";

pub const ROLES: &[RoleSeed] = &[
    RoleSeed {
        name: ADMIN_ROLE,
        description: "Full system access",
        wildcard: true,
        permissions: &[],
    },
    RoleSeed {
        name: "support_agent",
        description: "Process tickets",
        wildcard: false,
        permissions: &[
            "tickets:create",
            "dashboard:view",
            "activities:view",
            "notifications:view",
            "sessions:view",
            "tickets:view",
            "tickets:update",
            "tickets:change_status",
            "tickets:assign",
        ],
    },
    RoleSeed {
        name: "customer",
        description: "Create and view own tickets",
        wildcard: false,
        permissions: &[
            "dashboard:view",
            "activities:view",
            "notifications:view",
            "sessions:view",
            "tickets:create",
            "tickets:view",
            "tickets:update",
        ],
    },
];

/// What a seed run created.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeedReport {
    pub permissions_created: usize,
    pub roles_created: usize,
}

/// Seed the permission catalog and default roles.
pub async fn seed_rbac(store: &dyn RbacStore) -> Result<SeedReport, RbacError> {
    let mut report = SeedReport::default();

    for module in MODULES {
        for (slug, description) in module.permissions {
            if store.find_permission_by_slug(slug).await?.is_some() {
                continue;
            }
            store
                .create_permission(NewPermission {
                    slug: (*slug).to_string(),
                    description: Some((*description).to_string()),
                    module: Some(module.name.to_string()),
                })
                .await?;
            report.permissions_created += 1;
            debug!(slug, module = module.name, "permission seeded");
        }
    }

    for seed in ROLES {
        let role = match store.find_role_by_name(seed.name).await? {
            Some(role) => role,
            None => {
                report.roles_created += 1;
                store
                    .create_role(NewRole {
                        name: seed.name.to_string(),
                        description: Some(seed.description.to_string()),
                        wildcard: seed.wildcard,
                        is_system: true,
                        permission_ids: Vec::new(),
                    })
                    .await?
            }
        };

        let mut ids = Vec::with_capacity(seed.permissions.len());
        for slug in seed.permissions {
            if let Some(p) = store.find_permission_by_slug(slug).await? {
                ids.push(p.id);
            }
        }
        store.grant_permissions(&role.id, &ids).await?;
    }

    info!(
        permissions_created = report.permissions_created,
        roles_created = report.roles_created,
        "RBAC seeded"
    );
    Ok(report)
}

/// Create an administrator account unless the email is already taken.
///
/// Returns true when a user was created.
pub async fn seed_admin(
    users: &dyn UserStore,
    email: &str,
    password: &str,
) -> Result<bool, AuthError> {
    if users.find_user_by_email(email).await?.is_some() {
        debug!("administrator already present");
        return Ok(false);
    }
    validate_password(password)?;
    let user = users
        .create_user(NewUser {
            email: email.to_string(),
            password_hash: hash_password(password)?,
            full_name: Some("System Administrator".to_string()),
            role: ADMIN_ROLE.to_string(),
        })
        .await?;
    info!(user_id = %user.id, "administrator created");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::resolver::PermissionResolver;
    use crate::store::memory::MemoryStore;
    use std::sync::Arc;

    fn catalog_size() -> usize {
        MODULES.iter().map(|m| m.permissions.len()).sum()
    }

    #[tokio::test]
    async fn seeding_is_idempotent() {
        let store = MemoryStore::new();
        let first = seed_rbac(&store).await.unwrap();
        assert_eq!(first.permissions_created, catalog_size());
        assert_eq!(first.roles_created, ROLES.len());

        let second = seed_rbac(&store).await.unwrap();
        assert_eq!(second, SeedReport::default());
        assert_eq!(store.list_roles().await.unwrap().len(), ROLES.len());
    }

    #[tokio::test]
    async fn seeded_roles_resolve_as_expected() {
        let store = Arc::new(MemoryStore::new());
        seed_rbac(store.as_ref()).await.unwrap();
        let resolver = PermissionResolver::new(store.clone());

        let admin = resolver.resolve(Some(ADMIN_ROLE)).await.unwrap();
        assert_eq!(admin.len(), catalog_size());
        assert!(admin.contains("admin:manage_roles"));
        assert!(admin.contains("admin:manage_trash"));

        let customer = resolver.resolve(Some("customer")).await.unwrap();
        assert!(customer.contains("tickets:view"));
        assert!(!customer.contains("tickets:delete"));

        let agent = resolver.resolve(Some("support_agent")).await.unwrap();
        assert!(agent.contains("tickets:assign"));
        assert!(!agent.contains("users:manage"));
    }

    #[tokio::test]
    async fn seeded_roles_are_system_roles() {
        let store = MemoryStore::new();
        seed_rbac(&store).await.unwrap();
        assert!(
            store
                .list_roles()
                .await
                .unwrap()
                .iter()
                .all(|r| r.is_system)
        );
    }

    #[tokio::test]
    async fn admin_seed_runs_once() {
        let store = MemoryStore::new();
        seed_rbac(&store).await.unwrap();
        assert!(seed_admin(&store, "admin@helpdesk.com", "adminadmin").await.unwrap());
        assert!(!seed_admin(&store, "admin@helpdesk.com", "adminadmin").await.unwrap());
        let admin = store
            .find_user_by_email("admin@helpdesk.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(admin.role.as_deref(), Some(ADMIN_ROLE));
    }
}
