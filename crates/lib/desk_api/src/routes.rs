//! Route paths.

pub const POST_AUTH_REGISTER: &str = "/auth/register";
pub const POST_AUTH_LOGIN: &str = "/auth/login";
pub const POST_AUTH_LOGOUT: &str = "/auth/logout";
pub const POST_AUTH_REFRESH: &str = "/auth/refresh";
pub const GET_AUTH_ME: &str = "/auth/me";
pub const POST_AUTH_CHANGE_PASSWORD: &str = "/auth/change-password";

pub const SESSIONS: &str = "/sessions";
pub const SESSIONS_ID: &str = "/sessions/{id}";

pub const RBAC_ROLES: &str = "/rbac/roles";
pub const RBAC_ROLES_ID: &str = "/rbac/roles/{id}";
pub const RBAC_PERMISSIONS: &str = "/rbac/permissions";
pub const RBAC_PERMISSIONS_ID: &str = "/rbac/permissions/{id}";

pub const USERS_ID: &str = "/users/{id}";

pub const TRASH_KIND: &str = "/trash/{kind}";
pub const TRASH_KIND_ID: &str = "/trash/{kind}/{id}";
pub const TRASH_KIND_ID_RESTORE: &str = "/trash/{kind}/{id}/restore";
