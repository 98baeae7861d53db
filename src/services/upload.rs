use crate::error::{AppError, AppResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

const DEFAULT_ATTACHMENT_MAX_SIZE: usize = 5 * 1024 * 1024;
const MAX_IMAGE_SIZE: usize = 5 * 1024 * 1024;
const ALLOWED_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];

#[derive(Clone)]
pub struct UploadConfig {
    pub upload_dir: String,
    pub attachment_max_size: usize,
}

impl UploadConfig {
    pub fn from_env() -> Self {
        let upload_dir = std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads".to_string());
        let attachment_max_size = std::env::var("ATTACHMENT_MAX_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_ATTACHMENT_MAX_SIZE);
        Self {
            upload_dir,
            attachment_max_size,
        }
    }

    /// Absolute location of a path stored relative to the upload root.
    pub fn resolve(&self, relative: &str) -> PathBuf {
        Path::new(&self.upload_dir).join(relative)
    }
}

/// A file written under the upload root.
#[derive(Debug, Clone)]
pub struct StoredFile {
    /// Relative to `UploadConfig::upload_dir`.
    pub relative_path: String,
    pub size: usize,
}

/// Validate file magic bytes match the declared content type.
fn validate_magic_bytes(data: &[u8], content_type: &str) -> bool {
    match content_type {
        "image/jpeg" => data.len() >= 3 && data[..3] == [0xFF, 0xD8, 0xFF],
        "image/png" => data.len() >= 4 && data[..4] == [0x89, 0x50, 0x4E, 0x47],
        "image/gif" => data.len() >= 4 && data[..4] == [0x47, 0x49, 0x46, 0x38],
        "image/webp" => {
            data.len() >= 12
                && data[..4] == [0x52, 0x49, 0x46, 0x46]
                && data[8..12] == [0x57, 0x45, 0x42, 0x50]
        }
        _ => false,
    }
}

/// Lowercase alphanumeric extension of an uploaded filename, if any.
fn safe_extension(filename: &str) -> Option<String> {
    let ext = Path::new(filename).extension()?.to_str()?;
    if ext.is_empty() || ext.len() > 10 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Strip any directory components a client put into the filename.
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if base.is_empty() || base == "." || base == ".." {
        "file".to_string()
    } else {
        base.chars().take(255).collect()
    }
}

pub struct UploadService;

impl UploadService {
    /// Save an image (forum icons). Returns the public URL path, e.g.
    /// `/uploads/forums/uuid.png`.
    pub async fn save_image(
        config: &UploadConfig,
        data: &[u8],
        content_type: &str,
        subdirectory: &str,
    ) -> AppResult<String> {
        if data.len() > MAX_IMAGE_SIZE {
            return Err(AppError::PayloadTooLarge);
        }

        if !ALLOWED_IMAGE_TYPES.contains(&content_type) {
            return Err(AppError::Validation(format!(
                "Unsupported file type: {}. Allowed: jpeg, png, gif, webp",
                content_type
            )));
        }

        if !validate_magic_bytes(data, content_type) {
            return Err(AppError::Validation(
                "File content does not match declared content type".to_string(),
            ));
        }

        let ext = match content_type {
            "image/jpeg" => "jpg",
            "image/png" => "png",
            "image/gif" => "gif",
            "image/webp" => "webp",
            _ => return Err(AppError::Validation("Unsupported file type".to_string())),
        };

        let stored = Self::write(config, subdirectory, ext, data).await?;
        Ok(format!("/uploads/{}", stored.relative_path))
    }

    /// Save a post attachment of any type, bounded by `ATTACHMENT_MAX_SIZE`.
    pub async fn save_attachment(
        config: &UploadConfig,
        data: &[u8],
        filename: &str,
    ) -> AppResult<StoredFile> {
        if data.is_empty() {
            return Err(AppError::Validation("Uploaded file is empty".to_string()));
        }
        if data.len() > config.attachment_max_size {
            return Err(AppError::PayloadTooLarge);
        }

        let ext = safe_extension(filename).unwrap_or_else(|| "bin".to_string());
        Self::write(config, "attachments", &ext, data).await
    }

    async fn write(
        config: &UploadConfig,
        subdirectory: &str,
        ext: &str,
        data: &[u8],
    ) -> AppResult<StoredFile> {
        let filename = format!("{}.{}", Uuid::new_v4(), ext);
        let dir = Path::new(&config.upload_dir).join(subdirectory);

        fs::create_dir_all(&dir)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create upload directory: {}", e))?;

        fs::write(dir.join(&filename), data)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to write file: {}", e))?;

        Ok(StoredFile {
            relative_path: format!("{}/{}", subdirectory, filename),
            size: data.len(),
        })
    }
}
