use crate::error::{AppError, AppResult};
use crate::handlers::context::ForumContext;
use crate::handlers::topic::TopicResponse;
use crate::middleware::auth::AuthUser;
use crate::response::{ApiResponse, PaginatedResponse, PaginationQuery};
use crate::services::{cache::CacheService, TrackingService};
use axum::{
    extract::{Path, Query},
    response::IntoResponse,
    Extension,
};
use sea_orm::DatabaseConnection;

/// Visible forums whose content the caller may read, in id order.
fn readable_forum_ids(ctx: &ForumContext) -> Vec<i32> {
    let mut ids: Vec<i32> = ctx
        .perms
        .visible_forum_ids(&ctx.tree)
        .into_iter()
        .filter(|id| ctx.tree.get(*id).is_some_and(|f| ctx.perms.can_read_forum(f)))
        .collect();
    ids.sort_unstable();
    ids
}

#[utoipa::path(
    get,
    path = "/api/v1/tracking/unread-topics",
    security(("jwt_token" = [])),
    params(PaginationQuery),
    responses(
        (status = 200, description = "Unread topics in every readable forum", body = PaginatedResponse<TopicResponse>),
        (status = 401, description = "Unauthorized", body = AppError),
    ),
    tag = "tracking"
)]
pub async fn unread_topics(
    Extension(db): Extension<DatabaseConnection>,
    cache: Option<Extension<CacheService>>,
    auth_user: AuthUser,
    Query(params): Query<PaginationQuery>,
) -> AppResult<impl IntoResponse> {
    let ctx = ForumContext::load(&db, cache.map(|c| c.0), Some(&auth_user)).await?;
    let forum_ids = readable_forum_ids(&ctx);

    let (page, per_page) = params.resolve();
    let (topics, total) = TrackingService::new(db)
        .unread_topics(auth_user.user_id, &forum_ids, page, per_page)
        .await?;

    let items = topics
        .into_iter()
        .map(|t| TopicResponse::new(t, true))
        .collect();
    Ok(ApiResponse::ok(PaginatedResponse::new(items, total, page, per_page)))
}

#[utoipa::path(
    post,
    path = "/api/v1/tracking/forums/{id}/mark-read",
    security(("jwt_token" = [])),
    params(("id" = i32, Path, description = "Forum ID")),
    responses(
        (status = 200, description = "Forum and its readable sub-forums marked read", body = String),
        (status = 403, description = "Forum not readable", body = AppError),
        (status = 404, description = "Forum not found", body = AppError),
    ),
    tag = "tracking"
)]
pub async fn mark_forum_read(
    Extension(db): Extension<DatabaseConnection>,
    cache: Option<Extension<CacheService>>,
    auth_user: AuthUser,
    Path(id): Path<i32>,
) -> AppResult<impl IntoResponse> {
    let ctx = ForumContext::load(&db, cache.map(|c| c.0), Some(&auth_user)).await?;
    ctx.readable_forum(id)?;

    let readable = readable_forum_ids(&ctx);
    let forum_ids: Vec<i32> = ctx
        .tree
        .subtree(id)
        .into_iter()
        .filter(|f| readable.contains(f))
        .collect();

    TrackingService::new(db)
        .mark_forums_read(auth_user.user_id, &forum_ids)
        .await?;
    Ok(ApiResponse::ok("Forums marked as read"))
}

#[utoipa::path(
    post,
    path = "/api/v1/tracking/forums/mark-read",
    security(("jwt_token" = [])),
    responses(
        (status = 200, description = "Every readable forum marked read", body = String),
        (status = 401, description = "Unauthorized", body = AppError),
    ),
    tag = "tracking"
)]
pub async fn mark_all_forums_read(
    Extension(db): Extension<DatabaseConnection>,
    cache: Option<Extension<CacheService>>,
    auth_user: AuthUser,
) -> AppResult<impl IntoResponse> {
    let ctx = ForumContext::load(&db, cache.map(|c| c.0), Some(&auth_user)).await?;
    let forum_ids = readable_forum_ids(&ctx);

    TrackingService::new(db)
        .mark_forums_read(auth_user.user_id, &forum_ids)
        .await?;
    Ok(ApiResponse::ok("Forums marked as read"))
}
