use crate::error::{AppError, AppResult};
use crate::handlers::context::{forum_service, ForumContext};
use crate::middleware::auth::{require_staff, AuthUser, MaybeAuthUser};
use crate::models::{ForumModel, ForumType};
use crate::response::ApiResponse;
use crate::services::{
    cache::CacheService,
    forum::ForumInput,
    upload::{UploadConfig, UploadService},
    TrackingService,
};
use crate::utils::{not_blank, render_markdown};
use axum::{
    extract::{Multipart, Path},
    response::{IntoResponse, Redirect},
    Extension, Json,
};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ForumRequest {
    /// Parent forum; omitted for a root
    pub parent_id: Option<i32>,
    /// Forum name (1-100 characters)
    #[validate(length(min = 1, max = 100), custom(function = "not_blank"))]
    pub name: String,
    /// forum (default), category or link
    pub forum_type: Option<ForumType>,
    /// Description markup
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    /// Image URL
    #[validate(length(max = 255))]
    pub image: Option<String>,
    /// Target of a link forum
    #[validate(url)]
    pub link: Option<String>,
    /// Count clicks on the link
    pub link_redirects: Option<bool>,
    pub display_sub_forum_list: Option<bool>,
    pub sort_order: Option<i32>,
}

impl From<ForumRequest> for ForumInput {
    fn from(req: ForumRequest) -> Self {
        Self {
            parent_id: req.parent_id,
            name: req.name.trim().to_string(),
            forum_type: req.forum_type.unwrap_or(ForumType::Forum),
            description: req.description.filter(|d| !d.trim().is_empty()),
            image: req.image.filter(|i| !i.trim().is_empty()),
            link: req.link.filter(|l| !l.trim().is_empty()),
            link_redirects: req.link_redirects.unwrap_or(false),
            display_sub_forum_list: req.display_sub_forum_list.unwrap_or(true),
            sort_order: req.sort_order.unwrap_or(0),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ForumResponse {
    pub id: i32,
    pub parent_id: Option<i32>,
    pub name: String,
    pub slug: String,
    pub forum_type: ForumType,
    pub description: Option<String>,
    /// Description rendered to sanitized HTML
    pub description_html: Option<String>,
    pub image: Option<String>,
    pub link: Option<String>,
    pub link_redirects: bool,
    pub link_redirects_count: i32,
    pub posts_count: i32,
    pub topics_count: i32,
    pub last_post_on: Option<String>,
    pub display_sub_forum_list: bool,
    pub sort_order: i32,
    /// Depth in the tree, 0 for roots
    pub level: usize,
    pub margin_level: usize,
    /// Whether the subtree holds a topic the caller has not read
    pub unread: bool,
}

impl ForumResponse {
    pub fn new(forum: &ForumModel, level: usize, unread: bool) -> Self {
        Self {
            id: forum.id,
            parent_id: forum.parent_id,
            name: forum.name.clone(),
            slug: forum.slug.clone(),
            forum_type: forum.kind(),
            description_html: forum.description.as_deref().map(render_markdown),
            description: forum.description.clone(),
            image: forum.image.clone(),
            link: forum.link.clone(),
            link_redirects: forum.link_redirects,
            link_redirects_count: forum.link_redirects_count,
            posts_count: forum.posts_count,
            topics_count: forum.topics_count,
            last_post_on: forum.last_post_on.map(|t| t.to_string()),
            display_sub_forum_list: forum.display_sub_forum_list,
            sort_order: forum.sort_order,
            level,
            margin_level: level * 2,
            unread,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ForumDetailResponse {
    pub forum: ForumResponse,
    /// Visible direct children
    pub sub_forums: Vec<ForumResponse>,
}

#[utoipa::path(
    get,
    path = "/api/v1/forums",
    responses(
        (status = 200, description = "Visible forum tree in display order", body = Vec<ForumResponse>),
    ),
    tag = "forums"
)]
pub async fn list_forums(
    Extension(db): Extension<DatabaseConnection>,
    cache: Option<Extension<CacheService>>,
    MaybeAuthUser(caller): MaybeAuthUser,
) -> AppResult<impl IntoResponse> {
    let ctx = ForumContext::load(&db, cache.map(|c| c.0), caller.as_ref()).await?;
    let visible = ctx.perms.visible_forum_ids(&ctx.tree);
    let unread = TrackingService::new(db)
        .unread_forum_ids(ctx.perms.user_id(), &ctx.tree, &visible)
        .await?;

    let response: Vec<ForumResponse> = ctx
        .tree
        .walk()
        .into_iter()
        .filter(|(forum, _)| visible.contains(&forum.id))
        .map(|(forum, level)| ForumResponse::new(forum, level, unread.contains(&forum.id)))
        .collect();

    Ok(ApiResponse::ok(response))
}

#[utoipa::path(
    get,
    path = "/api/v1/forums/{id}",
    params(("id" = i32, Path, description = "Forum ID")),
    responses(
        (status = 200, description = "Forum with its visible sub-forums", body = ForumDetailResponse),
        (status = 403, description = "Forum not readable", body = AppError),
        (status = 404, description = "Forum not found", body = AppError),
    ),
    tag = "forums"
)]
pub async fn get_forum(
    Extension(db): Extension<DatabaseConnection>,
    cache: Option<Extension<CacheService>>,
    MaybeAuthUser(caller): MaybeAuthUser,
    Path(id): Path<i32>,
) -> AppResult<impl IntoResponse> {
    let ctx = ForumContext::load(&db, cache.map(|c| c.0), caller.as_ref()).await?;
    let forum = ctx.readable_forum(id)?;

    let visible: HashSet<i32> = ctx.perms.visible_forum_ids(&ctx.tree);
    let unread = TrackingService::new(db)
        .unread_forum_ids(ctx.perms.user_id(), &ctx.tree, &visible)
        .await?;

    let level = ctx.tree.level(id);
    let sub_forums = ctx
        .tree
        .children(Some(id))
        .iter()
        .filter(|child| visible.contains(child))
        .filter_map(|child| ctx.tree.get(*child))
        .map(|child| ForumResponse::new(child, level + 1, unread.contains(&child.id)))
        .collect();

    Ok(ApiResponse::ok(ForumDetailResponse {
        forum: ForumResponse::new(forum, level, unread.contains(&id)),
        sub_forums,
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/forums/{id}/redirect",
    params(("id" = i32, Path, description = "Link forum ID")),
    responses(
        (status = 303, description = "Redirect to the link target"),
        (status = 404, description = "Not a link forum", body = AppError),
    ),
    tag = "forums"
)]
pub async fn follow_link(
    Extension(db): Extension<DatabaseConnection>,
    cache: Option<Extension<CacheService>>,
    MaybeAuthUser(caller): MaybeAuthUser,
    Path(id): Path<i32>,
) -> AppResult<impl IntoResponse> {
    let cache = cache.map(|c| c.0);
    let ctx = ForumContext::load(&db, cache.clone(), caller.as_ref()).await?;
    ctx.readable_forum(id)?;

    let link = forum_service(db, cache).follow_link(id).await?;
    Ok(Redirect::to(&link))
}

#[utoipa::path(
    post,
    path = "/api/v1/forums",
    security(("jwt_token" = [])),
    request_body = ForumRequest,
    responses(
        (status = 200, description = "Forum created", body = ForumResponse),
        (status = 400, description = "Invalid forum placement", body = AppError),
        (status = 403, description = "Staff only", body = AppError),
    ),
    tag = "forums"
)]
pub async fn create_forum(
    Extension(db): Extension<DatabaseConnection>,
    cache: Option<Extension<CacheService>>,
    auth_user: AuthUser,
    Json(payload): Json<ForumRequest>,
) -> AppResult<impl IntoResponse> {
    require_staff(&auth_user)?;
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let service = forum_service(db, cache.map(|c| c.0));
    let forum = service.create(payload.into()).await?;
    let tree = service.load_tree().await?;

    Ok(ApiResponse::ok(ForumResponse::new(&forum, tree.level(forum.id), false)))
}

#[utoipa::path(
    put,
    path = "/api/v1/forums/{id}",
    security(("jwt_token" = [])),
    params(("id" = i32, Path, description = "Forum ID")),
    request_body = ForumRequest,
    responses(
        (status = 200, description = "Forum updated", body = ForumResponse),
        (status = 400, description = "Invalid forum placement", body = AppError),
        (status = 403, description = "Staff only", body = AppError),
        (status = 404, description = "Forum not found", body = AppError),
    ),
    tag = "forums"
)]
pub async fn update_forum(
    Extension(db): Extension<DatabaseConnection>,
    cache: Option<Extension<CacheService>>,
    auth_user: AuthUser,
    Path(id): Path<i32>,
    Json(payload): Json<ForumRequest>,
) -> AppResult<impl IntoResponse> {
    require_staff(&auth_user)?;
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let service = forum_service(db, cache.map(|c| c.0));
    let forum = service.update(id, payload.into()).await?;
    let tree = service.load_tree().await?;

    Ok(ApiResponse::ok(ForumResponse::new(&forum, tree.level(forum.id), false)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/forums/{id}",
    security(("jwt_token" = [])),
    params(("id" = i32, Path, description = "Forum ID")),
    responses(
        (status = 200, description = "Forum and its subtree deleted", body = String),
        (status = 403, description = "Staff only", body = AppError),
        (status = 404, description = "Forum not found", body = AppError),
    ),
    tag = "forums"
)]
pub async fn delete_forum(
    Extension(db): Extension<DatabaseConnection>,
    Extension(config): Extension<UploadConfig>,
    cache: Option<Extension<CacheService>>,
    auth_user: AuthUser,
    Path(id): Path<i32>,
) -> AppResult<impl IntoResponse> {
    require_staff(&auth_user)?;

    forum_service(db, cache.map(|c| c.0))
        .delete(&config, id)
        .await?;

    Ok(ApiResponse::ok("Forum deleted"))
}

#[utoipa::path(
    post,
    path = "/api/v1/forums/{id}/image",
    security(("jwt_token" = [])),
    params(("id" = i32, Path, description = "Forum ID")),
    request_body(content_type = "multipart/form-data", description = "Image in the `file` field"),
    responses(
        (status = 200, description = "Forum image replaced", body = ForumResponse),
        (status = 400, description = "Unsupported image", body = AppError),
        (status = 403, description = "Staff only", body = AppError),
        (status = 413, description = "Image too large", body = AppError),
    ),
    tag = "forums"
)]
pub async fn upload_forum_image(
    Extension(db): Extension<DatabaseConnection>,
    Extension(config): Extension<UploadConfig>,
    cache: Option<Extension<CacheService>>,
    auth_user: AuthUser,
    Path(id): Path<i32>,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    require_staff(&auth_user)?;

    let service = forum_service(db, cache.map(|c| c.0));
    service.get_by_id(id).await?;

    let field = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Failed to read upload: {}", e)))?
        .ok_or_else(|| AppError::Validation("No file provided".to_string()))?;

    let content_type = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_string();

    let data = field
        .bytes()
        .await
        .map_err(|e| AppError::Validation(format!("Failed to read file data: {}", e)))?;

    let url = UploadService::save_image(&config, &data, &content_type, "forums").await?;
    let forum = service.set_image(id, url).await?;
    let tree = service.load_tree().await?;

    Ok(ApiResponse::ok(ForumResponse::new(&forum, tree.level(forum.id), false)))
}
