use crate::{
    error::{AppError, AppResult},
    models::{
        attachment, post, topic, Attachment, ForumModel, Post, PostModel, Topic, TopicModel,
        TopicStatus, TopicType,
    },
    services::{
        post::{delete_in, DeletedPost},
        trackers,
    },
};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, JoinType,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, RelationTrait, TransactionTrait,
};

pub struct ModerationService {
    db: DatabaseConnection,
}

impl ModerationService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn lock_topic(&self, existing: TopicModel) -> AppResult<TopicModel> {
        let updated = self.set_status(existing, TopicStatus::Locked).await?;
        tracing::info!(topic_id = updated.id, "Topic locked");
        Ok(updated)
    }

    pub async fn unlock_topic(&self, existing: TopicModel) -> AppResult<TopicModel> {
        let updated = self.set_status(existing, TopicStatus::Unlocked).await?;
        tracing::info!(topic_id = updated.id, "Topic unlocked");
        Ok(updated)
    }

    async fn set_status(&self, existing: TopicModel, status: TopicStatus) -> AppResult<TopicModel> {
        let mut active: topic::ActiveModel = existing.into();
        active.status = Set(status.as_i16());
        active.updated_at = Set(chrono::Utc::now().naive_utc());
        Ok(active.update(&self.db).await?)
    }

    /// Remove a topic with everything in it. Returns the attachment files to
    /// unlink.
    pub async fn delete_topic(&self, existing: &TopicModel) -> AppResult<Vec<String>> {
        let txn = self.db.begin().await?;

        let poster_ids: Vec<i32> = Post::find()
            .select_only()
            .column(post::Column::PosterId)
            .distinct()
            .filter(post::Column::TopicId.eq(existing.id))
            .into_tuple()
            .all(&txn)
            .await?;

        let files: Vec<String> = Attachment::find()
            .select_only()
            .column(attachment::Column::FilePath)
            .join(JoinType::InnerJoin, attachment::Relation::Post.def())
            .filter(post::Column::TopicId.eq(existing.id))
            .into_tuple()
            .all(&txn)
            .await?;

        // Posts, attachments, read tracks and the poll go with the topic.
        Topic::delete_by_id(existing.id).exec(&txn).await?;

        trackers::update_forum_trackers(&txn, existing.forum_id).await?;
        trackers::update_members_posts_count(&txn, poster_ids).await?;

        txn.commit().await?;
        tracing::info!(topic_id = existing.id, forum_id = existing.forum_id, "Topic deleted");
        Ok(files)
    }

    /// Move a topic to another default forum. The topic ends up locked when
    /// `lock_topic` is set and marked as moved otherwise.
    pub async fn move_topic(
        &self,
        existing: TopicModel,
        target: &ForumModel,
        lock_topic: bool,
    ) -> AppResult<TopicModel> {
        if !target.is_forum() {
            return Err(AppError::Validation(
                "Topics can only be moved to a default forum".to_string(),
            ));
        }
        if target.id == existing.forum_id {
            return Err(AppError::Validation(
                "The topic is already in this forum".to_string(),
            ));
        }

        let source_forum_id = existing.forum_id;
        let status = if lock_topic {
            TopicStatus::Locked
        } else {
            TopicStatus::Moved
        };

        let txn = self.db.begin().await?;

        let mut active: topic::ActiveModel = existing.into();
        active.forum_id = Set(target.id);
        active.status = Set(status.as_i16());
        active.updated_at = Set(chrono::Utc::now().naive_utc());
        let moved = active.update(&txn).await?;

        trackers::update_forum_trackers(&txn, target.id).await?;
        trackers::update_forum_trackers(&txn, source_forum_id).await?;

        txn.commit().await?;
        tracing::info!(
            topic_id = moved.id,
            from = source_forum_id,
            to = target.id,
            locked = lock_topic,
            "Topic moved"
        );
        Ok(moved)
    }

    pub async fn update_topic_type(
        &self,
        existing: TopicModel,
        kind: TopicType,
    ) -> AppResult<TopicModel> {
        let mut active: topic::ActiveModel = existing.into();
        active.topic_type = Set(kind.as_i16());
        active.updated_at = Set(chrono::Utc::now().naive_utc());
        let updated = active.update(&self.db).await?;
        tracing::debug!(topic_id = updated.id, topic_type = ?kind, "Topic type changed");
        Ok(updated)
    }

    pub async fn approve_post(&self, existing: PostModel) -> AppResult<PostModel> {
        if existing.approved {
            return Ok(existing);
        }
        let topic_id = existing.topic_id;
        let poster_id = existing.poster_id;

        let txn = self.db.begin().await?;

        let mut active: post::ActiveModel = existing.into();
        active.approved = Set(true);
        let approved = active.update(&txn).await?;

        trackers::update_topic_trackers(&txn, topic_id).await?;
        trackers::update_member_posts_count(&txn, poster_id).await?;

        txn.commit().await?;
        tracing::info!(post_id = approved.id, topic_id, "Post approved");
        Ok(approved)
    }

    /// Disapproving a queued post removes it.
    pub async fn disapprove_post(&self, existing: &PostModel) -> AppResult<DeletedPost> {
        if existing.approved {
            return Err(AppError::Validation(
                "Only posts awaiting approval can be disapproved".to_string(),
            ));
        }

        let txn = self.db.begin().await?;
        let deleted = delete_in(&txn, existing).await?;
        txn.commit().await?;

        tracing::info!(post_id = existing.id, topic_id = existing.topic_id, "Post disapproved");
        Ok(deleted)
    }

    /// Unapproved posts in `forum_ids`, newest first.
    pub async fn moderation_queue(
        &self,
        forum_ids: Vec<i32>,
        page: u64,
        per_page: u64,
    ) -> AppResult<(Vec<PostModel>, u64)> {
        if forum_ids.is_empty() {
            return Ok((Vec::new(), 0));
        }

        let paginator = Post::find()
            .join(JoinType::InnerJoin, post::Relation::Topic.def())
            .filter(topic::Column::ForumId.is_in(forum_ids))
            .filter(post::Column::Approved.eq(false))
            .order_by_desc(post::Column::CreatedAt)
            .order_by_desc(post::Column::Id)
            .paginate(&self.db, per_page);

        let total = paginator.num_items().await?;
        let posts = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((posts, total))
    }
}
