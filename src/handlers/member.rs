use crate::error::AppResult;
use crate::response::ApiResponse;
use crate::services::ProfileService;
use crate::utils::markdown::render_signature;
use axum::{extract::Path, response::IntoResponse, Extension};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use utoipa::ToSchema;

/// Public view of a member: no email.
#[derive(Debug, Serialize, ToSchema)]
pub struct MemberResponse {
    pub id: i32,
    pub username: String,
    pub role: String,
    pub posts_count: i32,
    pub signature_html: Option<String>,
    pub joined_at: String,
}

#[utoipa::path(
    get,
    path = "/api/v1/members/{id}",
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 200, description = "Member profile", body = MemberResponse),
        (status = 404, description = "Member not found", body = crate::error::AppError),
    ),
    tag = "members"
)]
pub async fn get_member(
    Extension(db): Extension<DatabaseConnection>,
    Path(id): Path<i32>,
) -> AppResult<impl IntoResponse> {
    let (user, profile) = ProfileService::new(db).get_member(id).await?;
    Ok(ApiResponse::ok(MemberResponse {
        id: user.id,
        username: user.username,
        role: user.role,
        posts_count: profile.posts_count,
        signature_html: profile.signature.as_deref().map(render_signature),
        joined_at: user.created_at.to_string(),
    }))
}
