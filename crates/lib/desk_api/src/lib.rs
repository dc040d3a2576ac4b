//! # desk_api
//!
//! HTTP API library for the helpdesk auth core.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post};
use desk_core::auth::gate::Authenticator;
use desk_core::auth::jwt::TokenCodec;
use desk_core::auth::resolver::PermissionResolver;
use desk_core::auth::sessions::AuthService;
use desk_core::clock::{Clock, SystemClock};
use desk_core::rbac::RbacService;
use desk_core::store::Stores;
use desk_core::trash::TrashRegistry;
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};

use crate::config::{ApiConfig, ConfigError};
use crate::handlers::{auth, rbac, sessions, trash, users};
use crate::middleware::auth::{require_auth, require_permission};
use crate::services::cookies::CookieIssuer;

/// Permission guarding the RBAC admin routes.
pub const MANAGE_ROLES: &str = "admin:manage_roles";
/// Permission guarding the trash routes.
pub const MANAGE_TRASH: &str = "admin:manage_trash";
/// Permission guarding user administration.
pub const MANAGE_USERS: &str = "users:manage";

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Session lifecycle (login, refresh, logout, revocation).
    pub auth: AuthService,
    /// Per-request principal resolution.
    pub gate: Authenticator,
    pub rbac: RbacService,
    pub trash: TrashRegistry,
    pub cookies: CookieIssuer,
    /// API configuration.
    pub config: ApiConfig,
}

impl AppState {
    /// Wire the services over a set of stores.
    pub fn new(
        stores: Stores,
        config: ApiConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let codec = TokenCodec::new(config.jwt_secret.as_bytes(), clock.clone())
            .map_err(|_| ConfigError::WeakSecret(config.jwt_secret.len()))?;
        let resolver = PermissionResolver::new(stores.permissions.clone());
        let settings = config.auth_settings();

        Ok(Self {
            gate: Authenticator::new(
                codec.clone(),
                stores.sessions.clone(),
                stores.users.clone(),
                resolver.clone(),
            ),
            cookies: CookieIssuer::new(&settings, config.secure_cookies),
            auth: AuthService::new(
                stores.users.clone(),
                stores.sessions.clone(),
                resolver,
                codec,
                clock,
                settings,
            ),
            rbac: RbacService::new(stores.rbac.clone()),
            trash: TrashRegistry::with_users(stores.user_trash.clone()),
            config,
        })
    }

    /// Production state over PostgreSQL with the system clock.
    pub fn postgres(pool: PgPool, config: ApiConfig) -> Result<Self, ConfigError> {
        Self::new(Stores::postgres(pool), config, Arc::new(SystemClock))
    }
}

/// Run embedded database migrations.
///
/// Delegates to `desk_core::migrate::migrate()` which owns the migration files.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    desk_core::migrate::migrate(pool).await
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required)
    let public = Router::new()
        .route(routes::POST_AUTH_REGISTER, post(auth::register_handler))
        .route(routes::POST_AUTH_LOGIN, post(auth::login_handler))
        .route(routes::POST_AUTH_REFRESH, post(auth::refresh_handler))
        .route(routes::POST_AUTH_LOGOUT, post(auth::logout_handler));

    let rbac_admin = Router::new()
        .route(
            routes::RBAC_ROLES,
            get(rbac::list_roles_handler).post(rbac::create_role_handler),
        )
        .route(
            routes::RBAC_ROLES_ID,
            get(rbac::get_role_handler)
                .put(rbac::update_role_handler)
                .delete(rbac::delete_role_handler),
        )
        .route(
            routes::RBAC_PERMISSIONS,
            get(rbac::list_permissions_handler).post(rbac::create_permission_handler),
        )
        .route(
            routes::RBAC_PERMISSIONS_ID,
            get(rbac::get_permission_handler)
                .put(rbac::update_permission_handler)
                .delete(rbac::delete_permission_handler),
        )
        .layer(axum::middleware::from_fn(require_permission(MANAGE_ROLES)));

    let user_admin = Router::new()
        .route(routes::USERS_ID, delete(users::delete_user_handler))
        .layer(axum::middleware::from_fn(require_permission(MANAGE_USERS)));

    let trash_admin = Router::new()
        .route(routes::TRASH_KIND, get(trash::list_trash_handler))
        .route(routes::TRASH_KIND_ID, delete(trash::purge_handler))
        .route(routes::TRASH_KIND_ID_RESTORE, post(trash::restore_handler))
        .layer(axum::middleware::from_fn(require_permission(MANAGE_TRASH)));

    // Protected routes (require auth)
    let protected = Router::new()
        .route(routes::GET_AUTH_ME, get(auth::me_handler))
        .route(
            routes::POST_AUTH_CHANGE_PASSWORD,
            post(auth::change_password_handler),
        )
        .route(
            routes::SESSIONS,
            get(sessions::list_sessions_handler).delete(sessions::revoke_all_sessions_handler),
        )
        .route(
            routes::SESSIONS_ID,
            delete(sessions::revoke_session_handler),
        )
        .merge(rbac_admin)
        .merge(user_admin)
        .merge(trash_admin)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_auth,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(cors)
        .with_state(state)
}
