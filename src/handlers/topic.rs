use crate::error::{AppError, AppResult};
use crate::handlers::context::ForumContext;
use crate::handlers::poll::PollRequest;
use crate::middleware::auth::{AuthUser, MaybeAuthUser};
use crate::models::{TopicModel, TopicStatus, TopicType};
use crate::response::{ApiResponse, PaginatedResponse, PaginationQuery};
use crate::services::{
    cache::CacheService,
    forum::invalidate_tree_cache,
    topic::NewTopic,
    PermissionHandler, TopicService, TrackingService,
};
use crate::utils::not_blank;
use axum::{
    extract::{Path, Query},
    response::IntoResponse,
    Extension, Json,
};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Serialize, ToSchema)]
pub struct TopicResponse {
    pub id: i32,
    pub forum_id: i32,
    pub poster_id: i32,
    pub subject: String,
    pub slug: String,
    pub topic_type: TopicType,
    pub status: TopicStatus,
    pub approved: bool,
    /// Approved posts only
    pub posts_count: i32,
    pub views_count: i32,
    pub first_post_id: Option<i32>,
    pub last_post_id: Option<i32>,
    pub last_post_on: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    /// Whether the caller has unread posts in this topic
    pub unread: bool,
}

impl TopicResponse {
    pub fn new(topic: TopicModel, unread: bool) -> Self {
        Self {
            id: topic.id,
            forum_id: topic.forum_id,
            poster_id: topic.poster_id,
            topic_type: topic.kind(),
            status: topic.state(),
            subject: topic.subject,
            slug: topic.slug,
            approved: topic.approved,
            posts_count: topic.posts_count,
            views_count: topic.views_count,
            first_post_id: topic.first_post_id,
            last_post_id: topic.last_post_id,
            last_post_on: topic.last_post_on.map(|t| t.to_string()),
            created_at: topic.created_at.to_string(),
            updated_at: topic.updated_at.to_string(),
            unread,
        }
    }
}

/// Unapproved topics are only shown to their poster and to moderators.
pub(crate) fn ensure_topic_visible(perms: &PermissionHandler, topic: &TopicModel) -> AppResult<()> {
    if topic.approved
        || perms.user_id() == Some(topic.poster_id)
        || perms.can_approve_posts(topic.forum_id)
    {
        Ok(())
    } else {
        Err(AppError::NotFound)
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/forums/{id}/topics",
    params(
        ("id" = i32, Path, description = "Forum ID"),
        PaginationQuery,
    ),
    responses(
        (status = 200, description = "Approved topics: announces, stickies, then latest activity", body = PaginatedResponse<TopicResponse>),
        (status = 403, description = "Forum not readable", body = AppError),
        (status = 404, description = "Forum not found", body = AppError),
    ),
    tag = "topics"
)]
pub async fn list_topics(
    Extension(db): Extension<DatabaseConnection>,
    cache: Option<Extension<CacheService>>,
    MaybeAuthUser(caller): MaybeAuthUser,
    Path(forum_id): Path<i32>,
    Query(params): Query<PaginationQuery>,
) -> AppResult<impl IntoResponse> {
    let ctx = ForumContext::load(&db, cache.map(|c| c.0), caller.as_ref()).await?;
    ctx.readable_forum(forum_id)?;

    let (page, per_page) = params.resolve();
    let (topics, total) = TopicService::new(db.clone())
        .list_by_forum(forum_id, page, per_page)
        .await?;

    let unread = TrackingService::new(db)
        .unread_topic_ids(ctx.perms.user_id(), &[forum_id])
        .await?;

    let items = topics
        .into_iter()
        .map(|t| {
            let is_unread = unread.contains(&t.id);
            TopicResponse::new(t, is_unread)
        })
        .collect();

    Ok(ApiResponse::ok(PaginatedResponse::new(items, total, page, per_page)))
}

#[utoipa::path(
    get,
    path = "/api/v1/topics/{id}",
    params(("id" = i32, Path, description = "Topic ID")),
    responses(
        (status = 200, description = "Topic; counts a view and marks it read", body = TopicResponse),
        (status = 403, description = "Forum not readable", body = AppError),
        (status = 404, description = "Topic not found", body = AppError),
    ),
    tag = "topics"
)]
pub async fn get_topic(
    Extension(db): Extension<DatabaseConnection>,
    cache: Option<Extension<CacheService>>,
    MaybeAuthUser(caller): MaybeAuthUser,
    Path(id): Path<i32>,
) -> AppResult<impl IntoResponse> {
    let service = TopicService::new(db.clone());
    let topic = service.get_by_id(id).await?;

    let ctx = ForumContext::load(&db, cache.map(|c| c.0), caller.as_ref()).await?;
    ctx.readable_forum(topic.forum_id)?;
    ensure_topic_visible(&ctx.perms, &topic)?;

    service.increment_views(id).await?;
    if let Some(user_id) = ctx.perms.user_id() {
        TrackingService::new(db)
            .mark_topic_read(user_id, &topic)
            .await?;
    }

    let topic = service.get_by_id(id).await?;
    Ok(ApiResponse::ok(TopicResponse::new(topic, false)))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateTopicRequest {
    /// Subject (1-255 characters)
    #[validate(length(min = 1, max = 255), custom(function = "not_blank"))]
    pub subject: String,
    /// First post markup
    #[validate(length(min = 1, max = 50000), custom(function = "not_blank"))]
    pub content: String,
    /// default, sticky or announce
    pub topic_type: Option<TopicType>,
    #[validate(nested)]
    pub poll: Option<PollRequest>,
}

#[utoipa::path(
    post,
    path = "/api/v1/forums/{id}/topics",
    security(("jwt_token" = [])),
    params(("id" = i32, Path, description = "Forum ID")),
    request_body = CreateTopicRequest,
    responses(
        (status = 200, description = "Topic created", body = TopicResponse),
        (status = 400, description = "Validation error or forum cannot hold topics", body = AppError),
        (status = 403, description = "Permission denied", body = AppError),
    ),
    tag = "topics"
)]
pub async fn create_topic(
    Extension(db): Extension<DatabaseConnection>,
    cache: Option<Extension<CacheService>>,
    auth_user: AuthUser,
    Path(forum_id): Path<i32>,
    Json(payload): Json<CreateTopicRequest>,
) -> AppResult<impl IntoResponse> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let cache = cache.map(|c| c.0);
    let ctx = ForumContext::load(&db, cache.clone(), Some(&auth_user)).await?;
    let forum = ctx.readable_forum(forum_id)?;

    let topic_type = payload.topic_type.unwrap_or(TopicType::Default);
    ctx.perms
        .require(ctx.perms.can_add_topic_of_type(forum, topic_type))?;
    if payload.poll.is_some() {
        ctx.perms.require(ctx.perms.can_create_polls(forum))?;
    }

    let approved = ctx.perms.can_post_without_approval(forum_id);
    let topic = TopicService::new(db)
        .create(
            forum,
            NewTopic {
                poster_id: auth_user.user_id,
                subject: payload.subject.trim().to_string(),
                content: payload.content,
                topic_type,
                approved,
                poll: payload.poll.map(Into::into),
            },
        )
        .await?;

    invalidate_tree_cache(cache.as_ref()).await;

    let response = TopicResponse::new(topic, false);
    if approved {
        Ok(ApiResponse::ok(response))
    } else {
        Ok(ApiResponse::with_message(
            response,
            "Your topic is awaiting moderation".to_string(),
        ))
    }
}
