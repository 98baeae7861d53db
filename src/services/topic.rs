use crate::{
    error::{AppError, AppResult},
    models::{
        post, topic, ForumModel, Topic, TopicModel, TopicStatus, TopicType, User,
    },
    services::{
        poll::{self, PollInput},
        trackers,
    },
    utils::slugify,
};
use sea_orm::{
    sea_query::{Expr, NullOrdering},
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, Order,
    PaginatorTrait, QueryFilter, QueryOrder, Select, TransactionTrait,
};

pub struct NewTopic {
    pub poster_id: i32,
    pub subject: String,
    pub content: String,
    pub topic_type: TopicType,
    /// Whether the first post skips the moderation queue.
    pub approved: bool,
    pub poll: Option<PollInput>,
}

/// Announces, then stickies, then the most recently active.
fn listing_order(select: Select<Topic>) -> Select<Topic> {
    select
        .order_by_desc(topic::Column::TopicType)
        .order_by_with_nulls(topic::Column::LastPostOn, Order::Desc, NullOrdering::Last)
        .order_by_desc(topic::Column::Id)
}

pub struct TopicService {
    db: DatabaseConnection,
}

impl TopicService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn list_by_forum(
        &self,
        forum_id: i32,
        page: u64,
        per_page: u64,
    ) -> AppResult<(Vec<TopicModel>, u64)> {
        let paginator = listing_order(
            Topic::find()
                .filter(topic::Column::ForumId.eq(forum_id))
                .filter(topic::Column::Approved.eq(true)),
        )
        .paginate(&self.db, per_page);

        let total = paginator.num_items().await?;
        let topics = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((topics, total))
    }

    pub async fn get_by_id(&self, id: i32) -> AppResult<TopicModel> {
        Topic::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)
    }

    pub async fn increment_views(&self, id: i32) -> AppResult<()> {
        Topic::update_many()
            .col_expr(
                topic::Column::ViewsCount,
                Expr::col(topic::Column::ViewsCount).add(1),
            )
            .filter(topic::Column::Id.eq(id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// Create a topic with its first post (and poll) in one transaction.
    pub async fn create(&self, forum: &ForumModel, input: NewTopic) -> AppResult<TopicModel> {
        if !forum.is_forum() {
            return Err(AppError::Validation(
                "Topics can only be posted in a default forum".to_string(),
            ));
        }

        let poster = User::find_by_id(input.poster_id)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)?;

        let now = chrono::Utc::now().naive_utc();
        let txn = self.db.begin().await?;

        let created = topic::ActiveModel {
            forum_id: Set(forum.id),
            poster_id: Set(poster.id),
            slug: Set(slugify(&input.subject)),
            subject: Set(input.subject.clone()),
            topic_type: Set(input.topic_type.as_i16()),
            status: Set(TopicStatus::Unlocked.as_i16()),
            approved: Set(input.approved),
            posts_count: Set(0),
            views_count: Set(0),
            first_post_id: Set(None),
            last_post_id: Set(None),
            last_post_on: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        post::ActiveModel {
            topic_id: Set(created.id),
            poster_id: Set(poster.id),
            username: Set(poster.username.clone()),
            subject: Set(input.subject),
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

        if let Some(poll_input) = input.poll {
            poll::create_in(&txn, created.id, poll_input).await?;
        }

        let topic = trackers::update_topic_trackers(&txn, created.id)
            .await?
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Topic vanished after creation")))?;
        trackers::update_member_posts_count(&txn, poster.id).await?;

        txn.commit().await?;

        tracing::info!(
            topic_id = topic.id,
            forum_id = forum.id,
            approved = topic.approved,
            "Topic created"
        );
        Ok(topic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DbBackend, QueryTrait};

    #[test]
    fn listing_puts_announces_and_stickies_first_then_latest_activity() {
        let sql = listing_order(Topic::find())
            .build(DbBackend::Postgres)
            .to_string();
        let order_by = sql.split("ORDER BY").nth(1).unwrap_or_default();

        let type_pos = order_by.find(r#""topic_type" DESC"#).unwrap();
        let last_pos = order_by.find(r#""last_post_on" DESC NULLS LAST"#).unwrap();
        let id_pos = order_by.find(r#""id" DESC"#).unwrap();
        assert!(type_pos < last_pos && last_pos < id_pos);
    }

    #[test]
    fn topic_type_codes_sort_announce_above_sticky_above_default() {
        assert!(TopicType::Announce.as_i16() > TopicType::Sticky.as_i16());
        assert!(TopicType::Sticky.as_i16() > TopicType::Default.as_i16());
    }
}
