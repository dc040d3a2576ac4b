//! Role and permission administration handlers.
//!
//! Mounted behind `admin:manage_roles`.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use desk_core::models::rbac::{NewPermission, NewRole, PermissionUpdate, RoleUpdate};

use crate::AppState;
use crate::error::AppResult;
use crate::models::{
    CreatePermissionRequest, CreateRoleRequest, MessageResponse, PermissionResponse,
    RoleResponse, UpdatePermissionRequest, UpdateRoleRequest,
};

// --- Roles ---

/// `GET /rbac/roles`
pub async fn list_roles_handler(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<RoleResponse>>> {
    let roles = state.rbac.list_roles().await?;
    Ok(Json(roles.into_iter().map(Into::into).collect()))
}

/// `GET /rbac/roles/{id}`
pub async fn get_role_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<RoleResponse>> {
    Ok(Json(state.rbac.get_role(&id).await?.into()))
}

/// `POST /rbac/roles`
pub async fn create_role_handler(
    State(state): State<AppState>,
    Json(body): Json<CreateRoleRequest>,
) -> AppResult<(StatusCode, Json<RoleResponse>)> {
    let role = state
        .rbac
        .create_role(NewRole {
            name: body.name,
            description: body.description,
            wildcard: body.wildcard,
            is_system: false,
            permission_ids: body.permission_ids,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(role.into())))
}

/// `PUT /rbac/roles/{id}`: a present `permissionIds` replaces the set.
pub async fn update_role_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateRoleRequest>,
) -> AppResult<Json<RoleResponse>> {
    let role = state
        .rbac
        .update_role(
            &id,
            RoleUpdate {
                name: body.name,
                description: body.description,
                wildcard: body.wildcard,
                permission_ids: body.permission_ids,
            },
        )
        .await?;
    Ok(Json(role.into()))
}

/// `DELETE /rbac/roles/{id}`
pub async fn delete_role_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    state.rbac.delete_role(&id).await?;
    Ok(Json(MessageResponse::new("Role deleted")))
}

// --- Permissions ---

/// `GET /rbac/permissions`
pub async fn list_permissions_handler(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<PermissionResponse>>> {
    let permissions = state.rbac.list_permissions().await?;
    Ok(Json(permissions.into_iter().map(Into::into).collect()))
}

/// `GET /rbac/permissions/{id}`
pub async fn get_permission_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<PermissionResponse>> {
    Ok(Json(state.rbac.get_permission(&id).await?.into()))
}

/// `POST /rbac/permissions`
pub async fn create_permission_handler(
    State(state): State<AppState>,
    Json(body): Json<CreatePermissionRequest>,
) -> AppResult<(StatusCode, Json<PermissionResponse>)> {
    let permission = state
        .rbac
        .create_permission(NewPermission {
            slug: body.slug,
            description: body.description,
            module: body.module,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(permission.into())))
}

/// `PUT /rbac/permissions/{id}`
pub async fn update_permission_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdatePermissionRequest>,
) -> AppResult<Json<PermissionResponse>> {
    let permission = state
        .rbac
        .update_permission(
            &id,
            PermissionUpdate {
                slug: body.slug,
                description: body.description,
                module: body.module,
            },
        )
        .await?;
    Ok(Json(permission.into()))
}

/// `DELETE /rbac/permissions/{id}`
pub async fn delete_permission_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    state.rbac.delete_permission(&id).await?;
    Ok(Json(MessageResponse::new("Permission deleted")))
}
