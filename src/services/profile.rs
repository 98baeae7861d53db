use crate::{
    error::{AppError, AppResult},
    models::{forum_profile, ForumProfile, ForumProfileModel, User, UserModel},
};
use sea_orm::{
    sea_query::OnConflict, ActiveModelTrait, ActiveValue::Set, DatabaseConnection, EntityTrait,
};

pub const SIGNATURE_MAX_CHARS: usize = 255;

pub struct ProfileService {
    db: DatabaseConnection,
}

impl ProfileService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Profiles are created lazily for accounts that predate them.
    pub async fn get_or_create(&self, user_id: i32) -> AppResult<ForumProfileModel> {
        if let Some(profile) = ForumProfile::find_by_id(user_id).one(&self.db).await? {
            return Ok(profile);
        }

        let now = chrono::Utc::now().naive_utc();
        ForumProfile::insert(forum_profile::ActiveModel {
            user_id: Set(user_id),
            posts_count: Set(0),
            signature: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        })
        .on_conflict(
            OnConflict::column(forum_profile::Column::UserId)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(&self.db)
        .await?;

        ForumProfile::find_by_id(user_id)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)
    }

    pub async fn get_member(&self, user_id: i32) -> AppResult<(UserModel, ForumProfileModel)> {
        let user = User::find_by_id(user_id)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)?;
        let profile = self.get_or_create(user_id).await?;
        Ok((user, profile))
    }

    /// An empty signature clears it.
    pub async fn update_signature(
        &self,
        user_id: i32,
        signature: Option<String>,
    ) -> AppResult<ForumProfileModel> {
        let signature = signature
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        if signature
            .as_ref()
            .is_some_and(|s| s.chars().count() > SIGNATURE_MAX_CHARS)
        {
            return Err(AppError::Validation(format!(
                "Signature must be at most {} characters",
                SIGNATURE_MAX_CHARS
            )));
        }

        let profile = self.get_or_create(user_id).await?;
        let mut active: forum_profile::ActiveModel = profile.into();
        active.signature = Set(signature);
        active.updated_at = Set(chrono::Utc::now().naive_utc());
        Ok(active.update(&self.db).await?)
    }
}
