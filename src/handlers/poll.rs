use crate::error::{AppError, AppResult};
use crate::handlers::context::ForumContext;
use crate::handlers::topic::ensure_topic_visible;
use crate::middleware::auth::{AuthUser, MaybeAuthUser};
use crate::response::ApiResponse;
use crate::services::{
    cache::CacheService,
    poll::{PollDetails, PollInput},
    PermissionHandler, PollService, TopicService,
};
use axum::{extract::Path, response::IntoResponse, Extension, Json};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PollRequest {
    #[validate(length(min = 1, max = 255))]
    pub question: String,
    /// Days the poll stays open; omit for no limit
    #[validate(range(min = 1))]
    pub duration: Option<i32>,
    /// How many options a voter may pick (1-10, default 1)
    #[validate(range(min = 1, max = 10))]
    pub max_options: Option<i16>,
    /// Whether voters may change their ballot
    pub user_changes: Option<bool>,
    /// At least two options
    #[validate(length(min = 2, max = 30))]
    pub options: Vec<String>,
}

impl From<PollRequest> for PollInput {
    fn from(req: PollRequest) -> Self {
        Self {
            question: req.question,
            duration: req.duration,
            max_options: req.max_options.unwrap_or(1),
            user_changes: req.user_changes.unwrap_or(false),
            options: req.options,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PollOptionResponse {
    pub id: i32,
    pub text: String,
    pub votes: i64,
    /// Share of all votes, 0-100
    pub percentage: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PollResponse {
    pub id: i32,
    pub topic_id: i32,
    pub question: String,
    pub duration: Option<i32>,
    pub max_options: i16,
    pub user_changes: bool,
    pub closes_at: Option<String>,
    pub is_open: bool,
    pub total_votes: i64,
    pub options: Vec<PollOptionResponse>,
    /// The caller already voted
    pub has_voted: bool,
    /// The caller may vote now
    pub can_vote: bool,
}

impl PollResponse {
    fn new(details: PollDetails, has_voted: bool, can_vote: bool, now: chrono::NaiveDateTime) -> Self {
        let total_votes = details.total_votes();
        let poll = details.poll;
        let options = details
            .options
            .into_iter()
            .map(|(option, votes)| PollOptionResponse {
                id: option.id,
                text: option.text,
                votes,
                percentage: if total_votes == 0 {
                    0.0
                } else {
                    votes as f64 * 100.0 / total_votes as f64
                },
            })
            .collect();

        Self {
            id: poll.id,
            topic_id: poll.topic_id,
            closes_at: poll.closes_at().map(|t| t.to_string()),
            is_open: poll.is_open_at(now),
            question: poll.question,
            duration: poll.duration,
            max_options: poll.max_options,
            user_changes: poll.user_changes,
            total_votes,
            options,
            has_voted,
            can_vote,
        }
    }
}

async fn poll_response(
    service: &PollService,
    perms: &PermissionHandler,
    details: PollDetails,
    topic: &crate::models::TopicModel,
) -> AppResult<PollResponse> {
    let now = chrono::Utc::now().naive_utc();
    let has_voted = service
        .has_been_completed_by(details.poll.id, perms.user_id())
        .await?;
    let can_vote = perms.can_vote_in_poll(&details.poll, topic, has_voted, now);
    Ok(PollResponse::new(details, has_voted, can_vote, now))
}

#[utoipa::path(
    get,
    path = "/api/v1/topics/{id}/poll",
    params(("id" = i32, Path, description = "Topic ID")),
    responses(
        (status = 200, description = "Poll with vote counts", body = PollResponse),
        (status = 404, description = "Topic has no poll", body = AppError),
    ),
    tag = "polls"
)]
pub async fn get_topic_poll(
    Extension(db): Extension<DatabaseConnection>,
    cache: Option<Extension<CacheService>>,
    MaybeAuthUser(caller): MaybeAuthUser,
    Path(topic_id): Path<i32>,
) -> AppResult<impl IntoResponse> {
    let topic = TopicService::new(db.clone()).get_by_id(topic_id).await?;
    let ctx = ForumContext::load(&db, cache.map(|c| c.0), caller.as_ref()).await?;
    ctx.readable_forum(topic.forum_id)?;
    ensure_topic_visible(&ctx.perms, &topic)?;

    let service = PollService::new(db);
    let details = service.get_for_topic(topic_id).await?;
    Ok(ApiResponse::ok(
        poll_response(&service, &ctx.perms, details, &topic).await?,
    ))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VoteRequest {
    /// Chosen option ids
    pub options: Vec<i32>,
}

#[utoipa::path(
    post,
    path = "/api/v1/polls/{id}/votes",
    security(("jwt_token" = [])),
    params(("id" = i32, Path, description = "Poll ID")),
    request_body = VoteRequest,
    responses(
        (status = 200, description = "Vote recorded", body = PollResponse),
        (status = 400, description = "Invalid ballot", body = AppError),
        (status = 403, description = "Voting not allowed", body = AppError),
    ),
    tag = "polls"
)]
pub async fn vote(
    Extension(db): Extension<DatabaseConnection>,
    cache: Option<Extension<CacheService>>,
    auth_user: AuthUser,
    Path(poll_id): Path<i32>,
    Json(payload): Json<VoteRequest>,
) -> AppResult<impl IntoResponse> {
    let service = PollService::new(db.clone());
    let poll = service.get_by_id(poll_id).await?;
    let topic = TopicService::new(db.clone()).get_by_id(poll.topic_id).await?;

    let ctx = ForumContext::load(&db, cache.map(|c| c.0), Some(&auth_user)).await?;
    ctx.readable_forum(topic.forum_id)?;
    ensure_topic_visible(&ctx.perms, &topic)?;

    let already_voted = service
        .has_been_completed_by(poll.id, Some(auth_user.user_id))
        .await?;
    let now = chrono::Utc::now().naive_utc();
    ctx.perms
        .require(ctx.perms.can_vote_in_poll(&poll, &topic, already_voted, now))?;

    service.vote(&poll, auth_user.user_id, &payload.options).await?;

    let details = service.details(poll).await?;
    Ok(ApiResponse::ok(
        poll_response(&service, &ctx.perms, details, &topic).await?,
    ))
}
