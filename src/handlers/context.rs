use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::models::ForumModel;
use crate::services::{cache::CacheService, ForumService, ForumTree, PermissionHandler};
use sea_orm::DatabaseConnection;

pub fn forum_service(db: DatabaseConnection, cache: Option<CacheService>) -> ForumService {
    let service = ForumService::new(db);
    match cache {
        Some(c) => service.with_cache(c),
        None => service,
    }
}

/// The forum tree plus the caller's permissions, loaded once per request.
pub struct ForumContext {
    pub tree: ForumTree,
    pub perms: PermissionHandler,
}

impl ForumContext {
    pub async fn load(
        db: &DatabaseConnection,
        cache: Option<CacheService>,
        caller: Option<&AuthUser>,
    ) -> AppResult<Self> {
        let tree = forum_service(db.clone(), cache).load_tree().await?;
        let perms = PermissionHandler::load(db, caller).await?;
        Ok(Self { tree, perms })
    }

    pub fn forum(&self, id: i32) -> AppResult<&ForumModel> {
        self.tree.get(id).ok_or(AppError::NotFound)
    }

    /// A forum the caller may read; hidden and unreadable forums are 403.
    pub fn readable_forum(&self, id: i32) -> AppResult<&ForumModel> {
        let forum = self.forum(id)?;
        self.perms.require(self.perms.can_browse(&self.tree, forum))?;
        Ok(forum)
    }
}
