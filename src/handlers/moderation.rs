use crate::error::{AppError, AppResult};
use crate::handlers::context::ForumContext;
use crate::handlers::forum::ForumResponse;
use crate::handlers::topic::TopicResponse;
use crate::middleware::auth::AuthUser;
use crate::models::{PostModel, TopicModel, TopicType};
use crate::response::{ApiResponse, PaginatedResponse, PaginationQuery};
use crate::services::{
    cache::CacheService, forum::invalidate_tree_cache, upload::UploadConfig, AttachmentService,
    ModerationService, PostService, TopicService,
};
use crate::utils::render_markdown;
use axum::{
    extract::{Path, Query},
    response::IntoResponse,
    Extension, Json,
};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use utoipa::ToSchema;

/// Topic plus the caller's context, for the topic moderation endpoints.
async fn load_topic(
    db: &DatabaseConnection,
    cache: Option<CacheService>,
    auth_user: &AuthUser,
    topic_id: i32,
) -> AppResult<(TopicModel, ForumContext)> {
    let topic = TopicService::new(db.clone()).get_by_id(topic_id).await?;
    let ctx = ForumContext::load(db, cache, Some(auth_user)).await?;
    ctx.readable_forum(topic.forum_id)?;
    Ok((topic, ctx))
}

#[utoipa::path(
    put,
    path = "/api/v1/topics/{id}/lock",
    security(("jwt_token" = [])),
    params(("id" = i32, Path, description = "Topic ID")),
    responses(
        (status = 200, description = "Topic locked", body = TopicResponse),
        (status = 403, description = "Permission denied", body = AppError),
    ),
    tag = "moderation"
)]
pub async fn lock_topic(
    Extension(db): Extension<DatabaseConnection>,
    cache: Option<Extension<CacheService>>,
    auth_user: AuthUser,
    Path(id): Path<i32>,
) -> AppResult<impl IntoResponse> {
    let (topic, ctx) = load_topic(&db, cache.map(|c| c.0), &auth_user, id).await?;
    ctx.perms.require(ctx.perms.can_lock_topics(topic.forum_id))?;

    let topic = ModerationService::new(db).lock_topic(topic).await?;
    Ok(ApiResponse::ok(TopicResponse::new(topic, false)))
}

#[utoipa::path(
    put,
    path = "/api/v1/topics/{id}/unlock",
    security(("jwt_token" = [])),
    params(("id" = i32, Path, description = "Topic ID")),
    responses(
        (status = 200, description = "Topic unlocked", body = TopicResponse),
        (status = 403, description = "Permission denied", body = AppError),
    ),
    tag = "moderation"
)]
pub async fn unlock_topic(
    Extension(db): Extension<DatabaseConnection>,
    cache: Option<Extension<CacheService>>,
    auth_user: AuthUser,
    Path(id): Path<i32>,
) -> AppResult<impl IntoResponse> {
    let (topic, ctx) = load_topic(&db, cache.map(|c| c.0), &auth_user, id).await?;
    ctx.perms.require(ctx.perms.can_lock_topics(topic.forum_id))?;

    let topic = ModerationService::new(db).unlock_topic(topic).await?;
    Ok(ApiResponse::ok(TopicResponse::new(topic, false)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/topics/{id}",
    security(("jwt_token" = [])),
    params(("id" = i32, Path, description = "Topic ID")),
    responses(
        (status = 200, description = "Topic and its posts deleted", body = String),
        (status = 403, description = "Permission denied", body = AppError),
    ),
    tag = "moderation"
)]
pub async fn delete_topic(
    Extension(db): Extension<DatabaseConnection>,
    Extension(config): Extension<UploadConfig>,
    cache: Option<Extension<CacheService>>,
    auth_user: AuthUser,
    Path(id): Path<i32>,
) -> AppResult<impl IntoResponse> {
    let cache = cache.map(|c| c.0);
    let (topic, ctx) = load_topic(&db, cache.clone(), &auth_user, id).await?;
    ctx.perms.require(ctx.perms.can_delete_topics(topic.forum_id))?;

    let files = ModerationService::new(db).delete_topic(&topic).await?;
    AttachmentService::remove_files(&config, &files).await;
    invalidate_tree_cache(cache.as_ref()).await;

    Ok(ApiResponse::ok("Topic deleted"))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MoveTopicRequest {
    /// Destination forum
    pub forum_id: i32,
    /// Lock the topic after the move instead of flagging it as moved
    #[serde(default)]
    pub lock_topic: bool,
}

#[utoipa::path(
    put,
    path = "/api/v1/topics/{id}/move",
    security(("jwt_token" = [])),
    params(("id" = i32, Path, description = "Topic ID")),
    request_body = MoveTopicRequest,
    responses(
        (status = 200, description = "Topic moved", body = TopicResponse),
        (status = 400, description = "Invalid destination", body = AppError),
        (status = 403, description = "Permission denied", body = AppError),
    ),
    tag = "moderation"
)]
pub async fn move_topic(
    Extension(db): Extension<DatabaseConnection>,
    cache: Option<Extension<CacheService>>,
    auth_user: AuthUser,
    Path(id): Path<i32>,
    Json(payload): Json<MoveTopicRequest>,
) -> AppResult<impl IntoResponse> {
    let cache = cache.map(|c| c.0);
    let (topic, ctx) = load_topic(&db, cache.clone(), &auth_user, id).await?;
    let target = ctx.forum(payload.forum_id)?;
    ctx.perms.require(
        ctx.perms.can_move_topics(topic.forum_id) && ctx.perms.can_move_topics(target.id),
    )?;

    let topic = ModerationService::new(db)
        .move_topic(topic, target, payload.lock_topic)
        .await?;
    invalidate_tree_cache(cache.as_ref()).await;

    Ok(ApiResponse::ok(TopicResponse::new(topic, false)))
}

#[utoipa::path(
    get,
    path = "/api/v1/topics/{id}/move-targets",
    security(("jwt_token" = [])),
    params(("id" = i32, Path, description = "Topic ID")),
    responses(
        (status = 200, description = "Forums the topic can be moved into, in tree order", body = Vec<ForumResponse>),
        (status = 403, description = "Permission denied", body = AppError),
    ),
    tag = "moderation"
)]
pub async fn move_targets(
    Extension(db): Extension<DatabaseConnection>,
    cache: Option<Extension<CacheService>>,
    auth_user: AuthUser,
    Path(id): Path<i32>,
) -> AppResult<impl IntoResponse> {
    let (topic, ctx) = load_topic(&db, cache.map(|c| c.0), &auth_user, id).await?;
    ctx.perms.require(ctx.perms.can_move_topics(topic.forum_id))?;

    let movable: HashSet<i32> = ctx.perms.movable_forums(&ctx.tree).into_iter().collect();
    let visible = ctx.perms.visible_forum_ids(&ctx.tree);
    let targets: Vec<ForumResponse> = ctx
        .tree
        .walk()
        .into_iter()
        .filter(|(f, _)| f.is_forum() && f.id != topic.forum_id)
        .filter(|(f, _)| movable.contains(&f.id) && visible.contains(&f.id))
        .map(|(f, level)| ForumResponse::new(f, level, false))
        .collect();

    Ok(ApiResponse::ok(targets))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateTopicTypeRequest {
    pub topic_type: TopicType,
}

#[utoipa::path(
    put,
    path = "/api/v1/topics/{id}/type",
    security(("jwt_token" = [])),
    params(("id" = i32, Path, description = "Topic ID")),
    request_body = UpdateTopicTypeRequest,
    responses(
        (status = 200, description = "Topic type changed", body = TopicResponse),
        (status = 403, description = "Permission denied", body = AppError),
    ),
    tag = "moderation"
)]
pub async fn update_topic_type(
    Extension(db): Extension<DatabaseConnection>,
    cache: Option<Extension<CacheService>>,
    auth_user: AuthUser,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateTopicTypeRequest>,
) -> AppResult<impl IntoResponse> {
    let (topic, ctx) = load_topic(&db, cache.map(|c| c.0), &auth_user, id).await?;
    ctx.perms
        .require(ctx.perms.can_update_topic_type(topic.forum_id, payload.topic_type))?;

    let topic = ModerationService::new(db)
        .update_topic_type(topic, payload.topic_type)
        .await?;
    Ok(ApiResponse::ok(TopicResponse::new(topic, false)))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct QueuedPostResponse {
    pub id: i32,
    pub topic_id: i32,
    pub forum_id: i32,
    pub topic_subject: String,
    pub poster_id: i32,
    pub username: String,
    pub subject: String,
    pub content_html: String,
    pub created_at: String,
}

impl QueuedPostResponse {
    fn new(post: PostModel, topic: &TopicModel) -> Self {
        Self {
            id: post.id,
            topic_id: topic.id,
            forum_id: topic.forum_id,
            topic_subject: topic.subject.clone(),
            poster_id: post.poster_id,
            username: post.username,
            subject: post.subject,
            content_html: render_markdown(&post.content),
            created_at: post.created_at.to_string(),
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/moderation/queue",
    security(("jwt_token" = [])),
    params(PaginationQuery),
    responses(
        (status = 200, description = "Posts awaiting approval", body = PaginatedResponse<QueuedPostResponse>),
        (status = 403, description = "No forum to moderate", body = AppError),
    ),
    tag = "moderation"
)]
pub async fn moderation_queue(
    Extension(db): Extension<DatabaseConnection>,
    cache: Option<Extension<CacheService>>,
    auth_user: AuthUser,
    Query(params): Query<PaginationQuery>,
) -> AppResult<impl IntoResponse> {
    let ctx = ForumContext::load(&db, cache.map(|c| c.0), Some(&auth_user)).await?;
    ctx.perms
        .require(ctx.perms.can_access_moderation_queue(&ctx.tree))?;

    let (page, per_page) = params.resolve();
    let (posts, total) = ModerationService::new(db.clone())
        .moderation_queue(ctx.perms.moderation_queue_forums(&ctx.tree), page, per_page)
        .await?;

    let topic_service = TopicService::new(db);
    let mut topics: HashMap<i32, TopicModel> = HashMap::new();
    let mut items = Vec::with_capacity(posts.len());
    for post in posts {
        if !topics.contains_key(&post.topic_id) {
            let topic = topic_service.get_by_id(post.topic_id).await?;
            topics.insert(topic.id, topic);
        }
        if let Some(topic) = topics.get(&post.topic_id) {
            items.push(QueuedPostResponse::new(post, topic));
        }
    }

    Ok(ApiResponse::ok(PaginatedResponse::new(items, total, page, per_page)))
}

async fn load_post_for_approval(
    db: &DatabaseConnection,
    cache: Option<CacheService>,
    auth_user: &AuthUser,
    post_id: i32,
) -> AppResult<(PostModel, TopicModel)> {
    let post = PostService::new(db.clone()).get_by_id(post_id).await?;
    let (topic, ctx) = load_topic(db, cache, auth_user, post.topic_id).await?;
    ctx.perms.require(ctx.perms.can_approve_posts(topic.forum_id))?;
    Ok((post, topic))
}

#[utoipa::path(
    put,
    path = "/api/v1/posts/{id}/approve",
    security(("jwt_token" = [])),
    params(("id" = i32, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Post approved", body = QueuedPostResponse),
        (status = 403, description = "Permission denied", body = AppError),
    ),
    tag = "moderation"
)]
pub async fn approve_post(
    Extension(db): Extension<DatabaseConnection>,
    cache: Option<Extension<CacheService>>,
    auth_user: AuthUser,
    Path(id): Path<i32>,
) -> AppResult<impl IntoResponse> {
    let cache = cache.map(|c| c.0);
    let (post, _) = load_post_for_approval(&db, cache.clone(), &auth_user, id).await?;

    let post = ModerationService::new(db.clone()).approve_post(post).await?;
    invalidate_tree_cache(cache.as_ref()).await;

    let topic = TopicService::new(db).get_by_id(post.topic_id).await?;
    Ok(ApiResponse::ok(QueuedPostResponse::new(post, &topic)))
}

#[utoipa::path(
    put,
    path = "/api/v1/posts/{id}/disapprove",
    security(("jwt_token" = [])),
    params(("id" = i32, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Post disapproved and removed", body = String),
        (status = 400, description = "Post already approved", body = AppError),
        (status = 403, description = "Permission denied", body = AppError),
    ),
    tag = "moderation"
)]
pub async fn disapprove_post(
    Extension(db): Extension<DatabaseConnection>,
    Extension(config): Extension<UploadConfig>,
    cache: Option<Extension<CacheService>>,
    auth_user: AuthUser,
    Path(id): Path<i32>,
) -> AppResult<impl IntoResponse> {
    let cache = cache.map(|c| c.0);
    let (post, _) = load_post_for_approval(&db, cache.clone(), &auth_user, id).await?;

    let deleted = ModerationService::new(db).disapprove_post(&post).await?;
    AttachmentService::remove_files(&config, &deleted.files).await;
    invalidate_tree_cache(cache.as_ref()).await;

    Ok(ApiResponse::ok("Post disapproved"))
}
