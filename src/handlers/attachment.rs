use crate::error::{AppError, AppResult};
use crate::handlers::context::ForumContext;
use crate::handlers::topic::ensure_topic_visible;
use crate::middleware::auth::{AuthUser, MaybeAuthUser};
use crate::models::{AttachmentModel, PostModel, TopicModel};
use crate::response::ApiResponse;
use crate::services::{
    attachment::NewAttachment, cache::CacheService, upload::UploadConfig, AttachmentService,
    PostService, TopicService,
};
use axum::{
    extract::{Multipart, Path},
    http::{header, HeaderValue},
    response::IntoResponse,
    Extension,
};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct AttachmentResponse {
    pub id: i32,
    pub post_id: i32,
    pub filename: String,
    pub content_type: String,
    pub size: i64,
    pub comment: Option<String>,
    /// Download URL
    pub url: String,
    pub created_at: String,
}

impl From<AttachmentModel> for AttachmentResponse {
    fn from(a: AttachmentModel) -> Self {
        Self {
            url: format!("/api/v1/attachments/{}", a.id),
            id: a.id,
            post_id: a.post_id,
            filename: a.filename,
            content_type: a.content_type,
            size: a.size,
            comment: a.comment,
            created_at: a.created_at.to_string(),
        }
    }
}

/// Quoted-string safe filename for `Content-Disposition`.
fn disposition_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

async fn load_post_and_topic(db: &DatabaseConnection, post_id: i32) -> AppResult<(PostModel, TopicModel)> {
    let post = PostService::new(db.clone()).get_by_id(post_id).await?;
    let topic = TopicService::new(db.clone()).get_by_id(post.topic_id).await?;
    Ok((post, topic))
}

#[utoipa::path(
    post,
    path = "/api/v1/posts/{id}/attachments",
    security(("jwt_token" = [])),
    params(("id" = i32, Path, description = "Post ID")),
    request_body(content_type = "multipart/form-data", description = "`file` and an optional `comment`"),
    responses(
        (status = 200, description = "Attachment stored", body = AttachmentResponse),
        (status = 400, description = "Missing or invalid file", body = AppError),
        (status = 403, description = "Permission denied", body = AppError),
        (status = 413, description = "File too large", body = AppError),
    ),
    tag = "attachments"
)]
pub async fn upload_attachment(
    Extension(db): Extension<DatabaseConnection>,
    Extension(config): Extension<UploadConfig>,
    cache: Option<Extension<CacheService>>,
    auth_user: AuthUser,
    Path(post_id): Path<i32>,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let (post, topic) = load_post_and_topic(&db, post_id).await?;
    let ctx = ForumContext::load(&db, cache.map(|c| c.0), Some(&auth_user)).await?;
    ctx.readable_forum(topic.forum_id)?;
    ctx.perms.require(
        ctx.perms.can_attach_files(topic.forum_id)
            && ctx.perms.can_edit_post(&post, topic.forum_id),
    )?;

    let mut file: Option<(String, Option<String>, Vec<u8>)> = None;
    let mut comment: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Failed to read upload: {}", e)))?
    {
        match field.name() {
            Some("file") => {
                let filename = field.file_name().unwrap_or("file").to_string();
                let content_type = field.content_type().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Failed to read file data: {}", e)))?;
                file = Some((filename, content_type, data.to_vec()));
            }
            Some("comment") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("Failed to read comment: {}", e)))?;
                comment = Some(text).filter(|c| !c.trim().is_empty());
            }
            _ => {}
        }
    }

    let (filename, content_type, data) =
        file.ok_or_else(|| AppError::Validation("No file provided".to_string()))?;

    let attachment = AttachmentService::new(db)
        .create(
            &config,
            NewAttachment {
                post_id: post.id,
                filename: &filename,
                content_type: content_type.as_deref(),
                comment,
                data: &data,
            },
        )
        .await?;

    Ok(ApiResponse::ok(AttachmentResponse::from(attachment)))
}

#[utoipa::path(
    get,
    path = "/api/v1/attachments/{id}",
    params(("id" = i32, Path, description = "Attachment ID")),
    responses(
        (status = 200, description = "File contents"),
        (status = 403, description = "Download not allowed", body = AppError),
        (status = 404, description = "Attachment not found", body = AppError),
    ),
    tag = "attachments"
)]
pub async fn download_attachment(
    Extension(db): Extension<DatabaseConnection>,
    Extension(config): Extension<UploadConfig>,
    cache: Option<Extension<CacheService>>,
    MaybeAuthUser(caller): MaybeAuthUser,
    Path(id): Path<i32>,
) -> AppResult<impl IntoResponse> {
    let service = AttachmentService::new(db.clone());
    let attachment = service.get_by_id(id).await?;
    let (post, topic) = load_post_and_topic(&db, attachment.post_id).await?;

    let ctx = ForumContext::load(&db, cache.map(|c| c.0), caller.as_ref()).await?;
    ctx.readable_forum(topic.forum_id)?;
    ensure_topic_visible(&ctx.perms, &topic)?;
    let own_post = ctx.perms.user_id() == Some(post.poster_id);
    if !post.approved && !own_post && !ctx.perms.can_approve_posts(topic.forum_id) {
        return Err(AppError::NotFound);
    }
    ctx.perms.require(ctx.perms.can_download_files(topic.forum_id))?;

    let data = service.read_file(&config, &attachment).await?;

    let content_type = HeaderValue::from_str(&attachment.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        disposition_filename(&attachment.filename)
    ))
    .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        data,
    ))
}

#[utoipa::path(
    delete,
    path = "/api/v1/attachments/{id}",
    security(("jwt_token" = [])),
    params(("id" = i32, Path, description = "Attachment ID")),
    responses(
        (status = 200, description = "Attachment deleted", body = String),
        (status = 403, description = "Permission denied", body = AppError),
        (status = 404, description = "Attachment not found", body = AppError),
    ),
    tag = "attachments"
)]
pub async fn delete_attachment(
    Extension(db): Extension<DatabaseConnection>,
    Extension(config): Extension<UploadConfig>,
    cache: Option<Extension<CacheService>>,
    auth_user: AuthUser,
    Path(id): Path<i32>,
) -> AppResult<impl IntoResponse> {
    let service = AttachmentService::new(db.clone());
    let attachment = service.get_by_id(id).await?;
    let (post, topic) = load_post_and_topic(&db, attachment.post_id).await?;

    let ctx = ForumContext::load(&db, cache.map(|c| c.0), Some(&auth_user)).await?;
    ctx.readable_forum(topic.forum_id)?;
    ctx.perms
        .require(ctx.perms.can_edit_post(&post, topic.forum_id))?;

    service.delete(&config, attachment).await?;
    Ok(ApiResponse::ok("Attachment deleted"))
}
