use crate::{
    error::{AppError, AppResult},
    models::{attachment, Attachment, AttachmentModel},
    services::upload::{sanitize_filename, UploadConfig, UploadService},
};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder,
};

pub struct NewAttachment<'a> {
    pub post_id: i32,
    pub filename: &'a str,
    pub content_type: Option<&'a str>,
    pub comment: Option<String>,
    pub data: &'a [u8],
}

pub struct AttachmentService {
    db: DatabaseConnection,
}

impl AttachmentService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn get_by_id(&self, id: i32) -> AppResult<AttachmentModel> {
        Attachment::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)
    }

    pub async fn list_for_posts(&self, post_ids: &[i32]) -> AppResult<Vec<AttachmentModel>> {
        if post_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = Attachment::find()
            .filter(attachment::Column::PostId.is_in(post_ids.to_vec()))
            .order_by_asc(attachment::Column::Id)
            .all(&self.db)
            .await?;
        Ok(rows)
    }

    /// Write the file first, then the row. A failed insert removes the file.
    pub async fn create(
        &self,
        config: &UploadConfig,
        input: NewAttachment<'_>,
    ) -> AppResult<AttachmentModel> {
        if input.comment.as_ref().is_some_and(|c| c.chars().count() > 255) {
            return Err(AppError::Validation(
                "Attachment comment must be at most 255 characters".to_string(),
            ));
        }

        let stored = UploadService::save_attachment(config, input.data, input.filename).await?;

        let row = attachment::ActiveModel {
            post_id: Set(input.post_id),
            file_path: Set(stored.relative_path.clone()),
            filename: Set(sanitize_filename(input.filename)),
            content_type: Set(input
                .content_type
                .unwrap_or("application/octet-stream")
                .to_string()),
            size: Set(stored.size as i64),
            comment: Set(input.comment),
            created_at: Set(chrono::Utc::now().naive_utc()),
            ..Default::default()
        };

        match row.insert(&self.db).await {
            Ok(model) => {
                tracing::debug!(attachment_id = model.id, post_id = model.post_id, "Attachment stored");
                Ok(model)
            }
            Err(e) => {
                Self::remove_file(config, &stored.relative_path).await;
                Err(e.into())
            }
        }
    }

    pub async fn read_file(&self, config: &UploadConfig, model: &AttachmentModel) -> AppResult<Vec<u8>> {
        tokio::fs::read(config.resolve(&model.file_path))
            .await
            .map_err(|e| {
                tracing::warn!(attachment_id = model.id, "Attachment file unreadable: {}", e);
                AppError::NotFound
            })
    }

    pub async fn delete(&self, config: &UploadConfig, model: AttachmentModel) -> AppResult<()> {
        Attachment::delete_by_id(model.id).exec(&self.db).await?;
        Self::remove_file(config, &model.file_path).await;
        Ok(())
    }

    /// Best-effort removal after the rows are gone.
    pub async fn remove_files(config: &UploadConfig, paths: &[String]) {
        for path in paths {
            Self::remove_file(config, path).await;
        }
    }

    async fn remove_file(config: &UploadConfig, path: &str) {
        if let Err(e) = tokio::fs::remove_file(config.resolve(path)).await {
            tracing::warn!(path, "Failed to remove attachment file: {}", e);
        }
    }
}
