use crate::error::{AppError, AppResult};
use crate::handlers::context::forum_service;
use crate::middleware::auth::{require_admin, AuthUser};
use crate::models::ForumPermissionModel;
use crate::response::ApiResponse;
use crate::services::{
    cache::CacheService,
    permission::{NewGrant, Perm},
    AuthService, PermissionService,
};
use axum::{
    extract::{Path, Query},
    response::IntoResponse,
    Extension, Json,
};
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Deserialize, ToSchema)]
pub struct GrantRequest {
    /// Member the grant applies to; omitted for anonymous visitors
    pub user_id: Option<i32>,
    /// Forum the grant applies to; omitted for a global grant
    pub forum_id: Option<i32>,
    pub codename: Perm,
    /// `false` records an explicit denial
    #[serde(default = "granted")]
    pub has_perm: bool,
}

fn granted() -> bool {
    true
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct GrantFilter {
    pub forum_id: Option<i32>,
    pub user_id: Option<i32>,
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/permissions",
    security(("jwt_token" = [])),
    request_body = GrantRequest,
    responses(
        (status = 200, description = "Grant stored", body = ForumPermissionModel),
        (status = 403, description = "Superuser only", body = AppError),
        (status = 404, description = "Unknown member or forum", body = AppError),
    ),
    tag = "permissions"
)]
pub async fn set_permission(
    Extension(db): Extension<DatabaseConnection>,
    cache: Option<Extension<CacheService>>,
    auth_user: AuthUser,
    Json(payload): Json<GrantRequest>,
) -> AppResult<impl IntoResponse> {
    require_admin(&auth_user)?;

    if let Some(user_id) = payload.user_id {
        AuthService::new(db.clone()).get_user_by_id(user_id).await?;
    }
    if let Some(forum_id) = payload.forum_id {
        let tree = forum_service(db.clone(), cache.map(|c| c.0))
            .load_tree()
            .await?;
        if !tree.contains(forum_id) {
            return Err(AppError::NotFound);
        }
    }

    let saved = PermissionService::new(db)
        .set(NewGrant {
            user_id: payload.user_id,
            forum_id: payload.forum_id,
            perm: payload.codename,
            has_perm: payload.has_perm,
        })
        .await?;

    Ok(ApiResponse::ok(saved))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/permissions",
    security(("jwt_token" = [])),
    params(GrantFilter),
    responses(
        (status = 200, description = "Stored grants", body = Vec<ForumPermissionModel>),
        (status = 403, description = "Superuser only", body = AppError),
    ),
    tag = "permissions"
)]
pub async fn list_permissions(
    Extension(db): Extension<DatabaseConnection>,
    auth_user: AuthUser,
    Query(filter): Query<GrantFilter>,
) -> AppResult<impl IntoResponse> {
    require_admin(&auth_user)?;

    let grants = PermissionService::new(db)
        .list(filter.forum_id, filter.user_id)
        .await?;
    Ok(ApiResponse::ok(grants))
}

#[utoipa::path(
    delete,
    path = "/api/v1/admin/permissions/{id}",
    security(("jwt_token" = [])),
    params(("id" = i32, Path, description = "Grant ID")),
    responses(
        (status = 200, description = "Grant removed", body = String),
        (status = 403, description = "Superuser only", body = AppError),
        (status = 404, description = "Grant not found", body = AppError),
    ),
    tag = "permissions"
)]
pub async fn delete_permission(
    Extension(db): Extension<DatabaseConnection>,
    auth_user: AuthUser,
    Path(id): Path<i32>,
) -> AppResult<impl IntoResponse> {
    require_admin(&auth_user)?;

    PermissionService::new(db).delete(id).await?;
    tracing::info!(grant_id = id, admin_id = auth_user.user_id, "Forum permission removed");
    Ok(ApiResponse::ok("Permission removed"))
}
