use crate::{
    error::{AppError, AppResult},
    models::{attachment, post, Attachment, Post, PostModel, TopicModel, User},
    services::trackers,
};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, ConnectionTrait,
    DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
    Statement, TransactionTrait,
};
use std::collections::HashMap;

/// A post with its 1-based place in the topic, counted over all posts.
#[derive(Debug, Clone)]
pub struct PositionedPost {
    pub post: PostModel,
    pub position: u64,
}

pub struct NewReply {
    pub poster_id: i32,
    pub subject: Option<String>,
    pub content: String,
    pub approved: bool,
}

pub struct PostEdit {
    pub editor_id: i32,
    pub subject: Option<String>,
    pub content: String,
    pub update_reason: Option<String>,
}

/// What a removed post leaves behind.
#[derive(Debug, Default)]
pub struct DeletedPost {
    pub topic_deleted: bool,
    /// Attachment files to unlink once the transaction has committed.
    pub files: Vec<String>,
}

pub fn reply_subject(topic_subject: &str) -> String {
    if topic_subject.starts_with("Re: ") {
        topic_subject.to_string()
    } else {
        format!("Re: {}", topic_subject)
    }
}

/// Delete a post on the caller's connection and propagate the counters.
pub async fn delete_in<C: ConnectionTrait>(conn: &C, existing: &PostModel) -> AppResult<DeletedPost> {
    let files: Vec<String> = Attachment::find()
        .select_only()
        .column(attachment::Column::FilePath)
        .filter(attachment::Column::PostId.eq(existing.id))
        .into_tuple()
        .all(conn)
        .await?;

    Post::delete_by_id(existing.id).exec(conn).await?;

    let topic = trackers::update_topic_trackers(conn, existing.topic_id).await?;
    trackers::update_member_posts_count(conn, existing.poster_id).await?;

    Ok(DeletedPost {
        topic_deleted: topic.is_none(),
        files,
    })
}

pub struct PostService {
    db: DatabaseConnection,
}

impl PostService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn get_by_id(&self, id: i32) -> AppResult<PostModel> {
        Post::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)
    }

    /// Approved posts of a topic in reading order.
    pub async fn list_by_topic(
        &self,
        topic_id: i32,
        page: u64,
        per_page: u64,
    ) -> AppResult<(Vec<PositionedPost>, u64)> {
        let paginator = Post::find()
            .filter(post::Column::TopicId.eq(topic_id))
            .filter(post::Column::Approved.eq(true))
            .order_by_asc(post::Column::CreatedAt)
            .order_by_asc(post::Column::Id)
            .paginate(&self.db, per_page);

        let total = paginator.num_items().await?;
        let posts = paginator.fetch_page(page.saturating_sub(1)).await?;

        let positions = self.positions(topic_id).await?;
        let items = posts
            .into_iter()
            .map(|post| {
                let position = positions.get(&post.id).copied().unwrap_or_default();
                PositionedPost { post, position }
            })
            .collect();

        Ok((items, total))
    }

    /// Position of every post in the topic, keyed by post id.
    async fn positions(&self, topic_id: i32) -> AppResult<HashMap<i32, u64>> {
        let rows = self
            .db
            .query_all(Statement::from_sql_and_values(
                sea_orm::DatabaseBackend::Postgres,
                "SELECT id, ROW_NUMBER() OVER (ORDER BY created_at, id) AS position \
                 FROM posts WHERE topic_id = $1",
                [topic_id.into()],
            ))
            .await?;

        let mut positions = HashMap::with_capacity(rows.len());
        for row in rows {
            let id: i32 = row.try_get("", "id")?;
            let position: i64 = row.try_get("", "position")?;
            positions.insert(id, position as u64);
        }
        Ok(positions)
    }

    pub async fn position_of(&self, existing: &PostModel) -> AppResult<u64> {
        let earlier_or_same = Post::find()
            .filter(post::Column::TopicId.eq(existing.topic_id))
            .filter(
                Condition::any()
                    .add(post::Column::CreatedAt.lt(existing.created_at))
                    .add(
                        Condition::all()
                            .add(post::Column::CreatedAt.eq(existing.created_at))
                            .add(post::Column::Id.lte(existing.id)),
                    ),
            )
            .count(&self.db)
            .await?;
        Ok(earlier_or_same)
    }

    pub async fn reply(&self, topic: &TopicModel, input: NewReply) -> AppResult<PostModel> {
        let poster = User::find_by_id(input.poster_id)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)?;

        let subject = input
            .subject
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| reply_subject(&topic.subject));

        let now = chrono::Utc::now().naive_utc();
        let txn = self.db.begin().await?;

        let created = post::ActiveModel {
            topic_id: Set(topic.id),
            poster_id: Set(poster.id),
            username: Set(poster.username),
            subject: Set(subject),
            content: Set(input.content),
            approved: Set(input.approved),
            update_reason: Set(None),
            updates_count: Set(0),
            updated_by_id: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        trackers::update_topic_trackers(&txn, topic.id).await?;
        trackers::update_member_posts_count(&txn, poster.id).await?;

        txn.commit().await?;

        tracing::debug!(
            post_id = created.id,
            topic_id = topic.id,
            approved = created.approved,
            "Reply posted"
        );
        Ok(created)
    }

    /// Editing keeps the approval state. A new subject on the first post
    /// renames the topic.
    pub async fn edit(&self, existing: PostModel, input: PostEdit) -> AppResult<PostModel> {
        let topic_id = existing.topic_id;
        let updates_count = existing.updates_count + 1;

        let txn = self.db.begin().await?;

        let mut active: post::ActiveModel = existing.into();
        if let Some(subject) = input.subject.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()) {
            active.subject = Set(subject);
        }
        active.content = Set(input.content);
        active.update_reason = Set(input.update_reason);
        active.updates_count = Set(updates_count);
        active.updated_by_id = Set(Some(input.editor_id));
        active.updated_at = Set(chrono::Utc::now().naive_utc());
        let updated = active.update(&txn).await?;

        trackers::update_topic_trackers(&txn, topic_id).await?;

        txn.commit().await?;
        Ok(updated)
    }

    /// Returns the attachment files that still need removing from disk.
    pub async fn delete(&self, existing: &PostModel) -> AppResult<DeletedPost> {
        let txn = self.db.begin().await?;
        let deleted = delete_in(&txn, existing).await?;
        txn.commit().await?;

        tracing::debug!(
            post_id = existing.id,
            topic_id = existing.topic_id,
            topic_deleted = deleted.topic_deleted,
            "Post deleted"
        );
        Ok(deleted)
    }
}
