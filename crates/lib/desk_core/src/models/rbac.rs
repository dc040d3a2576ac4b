//! Role and permission models.

use serde::{Deserialize, Serialize};

/// Permission row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: String,
    pub slug: String,
    pub description: Option<String>,
    pub module: Option<String>,
}

/// Role with its directly assigned permissions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub wildcard: bool,
    pub is_system: bool,
    pub permissions: Vec<Permission>,
    /// Number of users (including soft-deleted ones) referencing the role.
    pub user_count: i64,
}

/// What a role grants, as seen by the permission resolver.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleGrants {
    pub wildcard: bool,
    pub slugs: Vec<String>,
}

/// Input for role creation.
#[derive(Debug, Clone, Default)]
pub struct NewRole {
    pub name: String,
    pub description: Option<String>,
    pub wildcard: bool,
    pub is_system: bool,
    pub permission_ids: Vec<String>,
}

/// Partial role update. `permission_ids: Some(_)` replaces the whole set.
#[derive(Debug, Clone, Default)]
pub struct RoleUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub wildcard: Option<bool>,
    pub permission_ids: Option<Vec<String>>,
}

/// Input for permission creation.
#[derive(Debug, Clone, Default)]
pub struct NewPermission {
    pub slug: String,
    pub description: Option<String>,
    pub module: Option<String>,
}

/// Partial permission update.
#[derive(Debug, Clone, Default)]
pub struct PermissionUpdate {
    pub slug: Option<String>,
    pub description: Option<String>,
    pub module: Option<String>,
}
