use crate::error::{AppError, AppResult};
use crate::handlers::attachment::AttachmentResponse;
use crate::handlers::context::ForumContext;
use crate::handlers::topic::ensure_topic_visible;
use crate::middleware::auth::{AuthUser, MaybeAuthUser};
use crate::models::{AttachmentModel, PostModel, TopicModel};
use crate::response::{ApiResponse, PaginatedResponse, PaginationQuery};
use crate::services::{
    cache::CacheService,
    forum::invalidate_tree_cache,
    post::{NewReply, PostEdit},
    upload::UploadConfig,
    AttachmentService, PermissionHandler, PostService, TopicService,
};
use crate::utils::render_markdown;
use axum::{
    extract::{Path, Query},
    response::IntoResponse,
    Extension, Json,
};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Serialize, ToSchema)]
pub struct PostResponse {
    pub id: i32,
    pub topic_id: i32,
    pub poster_id: i32,
    /// Display name at the time of posting
    pub username: String,
    pub subject: String,
    /// Raw markup
    pub content: String,
    /// Rendered, sanitized HTML
    pub content_html: String,
    pub approved: bool,
    pub update_reason: Option<String>,
    pub updates_count: i32,
    pub updated_by_id: Option<i32>,
    pub created_at: String,
    pub updated_at: String,
    /// 1-based place in the topic
    pub position: u64,
    pub is_topic_head: bool,
    pub is_topic_tail: bool,
    pub attachments: Vec<AttachmentResponse>,
}

impl PostResponse {
    pub fn new(
        post: PostModel,
        topic: &TopicModel,
        position: u64,
        attachments: Vec<AttachmentModel>,
    ) -> Self {
        Self {
            is_topic_head: topic.first_post_id == Some(post.id),
            is_topic_tail: topic.last_post_id == Some(post.id),
            content_html: render_markdown(&post.content),
            id: post.id,
            topic_id: post.topic_id,
            poster_id: post.poster_id,
            username: post.username,
            subject: post.subject,
            content: post.content,
            approved: post.approved,
            update_reason: post.update_reason,
            updates_count: post.updates_count,
            updated_by_id: post.updated_by_id,
            created_at: post.created_at.to_string(),
            updated_at: post.updated_at.to_string(),
            position,
            attachments: attachments.into_iter().map(AttachmentResponse::from).collect(),
        }
    }
}

fn ensure_post_visible(perms: &PermissionHandler, post: &PostModel, forum_id: i32) -> AppResult<()> {
    if post.approved || perms.user_id() == Some(post.poster_id) || perms.can_approve_posts(forum_id) {
        Ok(())
    } else {
        Err(AppError::NotFound)
    }
}

async fn single_post_response(
    db: &DatabaseConnection,
    post: PostModel,
) -> AppResult<PostResponse> {
    let topic = TopicService::new(db.clone()).get_by_id(post.topic_id).await?;
    let position = PostService::new(db.clone()).position_of(&post).await?;
    let attachments = AttachmentService::new(db.clone())
        .list_for_posts(&[post.id])
        .await?;
    Ok(PostResponse::new(post, &topic, position, attachments))
}

#[utoipa::path(
    get,
    path = "/api/v1/topics/{id}/posts",
    params(
        ("id" = i32, Path, description = "Topic ID"),
        PaginationQuery,
    ),
    responses(
        (status = 200, description = "Approved posts in reading order", body = PaginatedResponse<PostResponse>),
        (status = 403, description = "Forum not readable", body = AppError),
        (status = 404, description = "Topic not found", body = AppError),
    ),
    tag = "posts"
)]
pub async fn list_posts(
    Extension(db): Extension<DatabaseConnection>,
    cache: Option<Extension<CacheService>>,
    MaybeAuthUser(caller): MaybeAuthUser,
    Path(topic_id): Path<i32>,
    Query(params): Query<PaginationQuery>,
) -> AppResult<impl IntoResponse> {
    let topic = TopicService::new(db.clone()).get_by_id(topic_id).await?;
    let ctx = ForumContext::load(&db, cache.map(|c| c.0), caller.as_ref()).await?;
    ctx.readable_forum(topic.forum_id)?;
    ensure_topic_visible(&ctx.perms, &topic)?;

    let (page, per_page) = params.resolve();
    let (posts, total) = PostService::new(db.clone())
        .list_by_topic(topic_id, page, per_page)
        .await?;

    let post_ids: Vec<i32> = posts.iter().map(|p| p.post.id).collect();
    let mut attachments: HashMap<i32, Vec<AttachmentModel>> = HashMap::new();
    for attachment in AttachmentService::new(db).list_for_posts(&post_ids).await? {
        attachments.entry(attachment.post_id).or_default().push(attachment);
    }

    let items = posts
        .into_iter()
        .map(|p| {
            let files = attachments.remove(&p.post.id).unwrap_or_default();
            PostResponse::new(p.post, &topic, p.position, files)
        })
        .collect();

    Ok(ApiResponse::ok(PaginatedResponse::new(items, total, page, per_page)))
}

#[utoipa::path(
    get,
    path = "/api/v1/posts/{id}",
    params(("id" = i32, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Post", body = PostResponse),
        (status = 403, description = "Forum not readable", body = AppError),
        (status = 404, description = "Post not found", body = AppError),
    ),
    tag = "posts"
)]
pub async fn get_post(
    Extension(db): Extension<DatabaseConnection>,
    cache: Option<Extension<CacheService>>,
    MaybeAuthUser(caller): MaybeAuthUser,
    Path(id): Path<i32>,
) -> AppResult<impl IntoResponse> {
    let post = PostService::new(db.clone()).get_by_id(id).await?;
    let topic = TopicService::new(db.clone()).get_by_id(post.topic_id).await?;

    let ctx = ForumContext::load(&db, cache.map(|c| c.0), caller.as_ref()).await?;
    ctx.readable_forum(topic.forum_id)?;
    ensure_topic_visible(&ctx.perms, &topic)?;
    ensure_post_visible(&ctx.perms, &post, topic.forum_id)?;

    Ok(ApiResponse::ok(single_post_response(&db, post).await?))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ReplyRequest {
    /// Defaults to "Re: <topic subject>"
    #[validate(length(max = 255))]
    pub subject: Option<String>,
    #[validate(length(min = 1, max = 50000))]
    pub content: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/topics/{id}/posts",
    security(("jwt_token" = [])),
    params(("id" = i32, Path, description = "Topic ID")),
    request_body = ReplyRequest,
    responses(
        (status = 200, description = "Reply posted", body = PostResponse),
        (status = 400, description = "Validation error", body = AppError),
        (status = 403, description = "Permission denied or topic locked", body = AppError),
    ),
    tag = "posts"
)]
pub async fn create_reply(
    Extension(db): Extension<DatabaseConnection>,
    cache: Option<Extension<CacheService>>,
    auth_user: AuthUser,
    Path(topic_id): Path<i32>,
    Json(payload): Json<ReplyRequest>,
) -> AppResult<impl IntoResponse> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let topic = TopicService::new(db.clone()).get_by_id(topic_id).await?;
    let cache = cache.map(|c| c.0);
    let ctx = ForumContext::load(&db, cache.clone(), Some(&auth_user)).await?;
    ctx.readable_forum(topic.forum_id)?;
    ensure_topic_visible(&ctx.perms, &topic)?;
    ctx.perms.require(ctx.perms.can_add_post(&topic))?;

    let approved = ctx.perms.can_post_without_approval(topic.forum_id);
    let post = PostService::new(db.clone())
        .reply(
            &topic,
            NewReply {
                poster_id: auth_user.user_id,
                subject: payload.subject,
                content: payload.content,
                approved,
            },
        )
        .await?;

    invalidate_tree_cache(cache.as_ref()).await;

    let response = single_post_response(&db, post).await?;
    if approved {
        Ok(ApiResponse::ok(response))
    } else {
        Ok(ApiResponse::with_message(
            response,
            "Your post is awaiting moderation".to_string(),
        ))
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct EditPostRequest {
    #[validate(length(max = 255))]
    pub subject: Option<String>,
    #[validate(length(min = 1, max = 50000))]
    pub content: String,
    /// Shown next to the edit marker
    #[validate(length(max = 255))]
    pub update_reason: Option<String>,
}

#[utoipa::path(
    put,
    path = "/api/v1/posts/{id}",
    security(("jwt_token" = [])),
    params(("id" = i32, Path, description = "Post ID")),
    request_body = EditPostRequest,
    responses(
        (status = 200, description = "Post updated", body = PostResponse),
        (status = 400, description = "Validation error", body = AppError),
        (status = 403, description = "Permission denied", body = AppError),
    ),
    tag = "posts"
)]
pub async fn update_post(
    Extension(db): Extension<DatabaseConnection>,
    cache: Option<Extension<CacheService>>,
    auth_user: AuthUser,
    Path(id): Path<i32>,
    Json(payload): Json<EditPostRequest>,
) -> AppResult<impl IntoResponse> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let service = PostService::new(db.clone());
    let post = service.get_by_id(id).await?;
    let topic = TopicService::new(db.clone()).get_by_id(post.topic_id).await?;

    let cache = cache.map(|c| c.0);
    let ctx = ForumContext::load(&db, cache.clone(), Some(&auth_user)).await?;
    ctx.readable_forum(topic.forum_id)?;
    ctx.perms
        .require(ctx.perms.can_edit_post(&post, topic.forum_id))?;

    let updated = service
        .edit(
            post,
            PostEdit {
                editor_id: auth_user.user_id,
                subject: payload.subject,
                content: payload.content,
                update_reason: payload.update_reason.filter(|r| !r.trim().is_empty()),
            },
        )
        .await?;

    invalidate_tree_cache(cache.as_ref()).await;
    Ok(ApiResponse::ok(single_post_response(&db, updated).await?))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeletePostResponse {
    /// The post was the last one and took its topic with it
    pub topic_deleted: bool,
}

#[utoipa::path(
    delete,
    path = "/api/v1/posts/{id}",
    security(("jwt_token" = [])),
    params(("id" = i32, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Post deleted", body = DeletePostResponse),
        (status = 403, description = "Permission denied", body = AppError),
        (status = 404, description = "Post not found", body = AppError),
    ),
    tag = "posts"
)]
pub async fn delete_post(
    Extension(db): Extension<DatabaseConnection>,
    Extension(config): Extension<UploadConfig>,
    cache: Option<Extension<CacheService>>,
    auth_user: AuthUser,
    Path(id): Path<i32>,
) -> AppResult<impl IntoResponse> {
    let service = PostService::new(db.clone());
    let post = service.get_by_id(id).await?;
    let topic = TopicService::new(db.clone()).get_by_id(post.topic_id).await?;

    let cache = cache.map(|c| c.0);
    let ctx = ForumContext::load(&db, cache.clone(), Some(&auth_user)).await?;
    ctx.readable_forum(topic.forum_id)?;
    ctx.perms
        .require(ctx.perms.can_delete_post(&post, topic.forum_id))?;

    let deleted = service.delete(&post).await?;
    AttachmentService::remove_files(&config, &deleted.files).await;
    invalidate_tree_cache(cache.as_ref()).await;

    Ok(ApiResponse::ok(DeletePostResponse {
        topic_deleted: deleted.topic_deleted,
    }))
}
