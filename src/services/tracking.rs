use crate::{
    error::AppResult,
    models::{
        forum_read_track, topic, topic_read_track, ForumReadTrack, Topic, TopicModel,
        TopicReadTrack,
    },
    services::forum_tree::ForumTree,
};
use sea_orm::{
    prelude::DateTime, sea_query::OnConflict, ActiveValue::Set, ColumnTrait, ConnectionTrait,
    DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use std::collections::{HashMap, HashSet};

/// A topic is unread when it has an approved last post newer than both the
/// forum-wide and the topic-specific read marks.
pub fn is_topic_unread(
    topic: &TopicModel,
    forum_mark: Option<DateTime>,
    topic_mark: Option<DateTime>,
) -> bool {
    let Some(last_post_on) = topic.last_post_on else {
        return false;
    };
    if !topic.approved {
        return false;
    }
    let read = |mark: Option<DateTime>| mark.is_some_and(|m| m >= last_post_on);
    !(read(forum_mark) || read(topic_mark))
}

/// Lift "has an unread topic" from individual forums to every ancestor.
pub fn propagate_unread(tree: &ForumTree, direct: &HashSet<i32>) -> HashSet<i32> {
    let mut unread = HashSet::new();
    for forum_id in direct {
        if tree.contains(*forum_id) {
            unread.extend(tree.path_to_root(*forum_id));
        }
    }
    unread
}

/// Read marks of one member.
struct Marks {
    forums: HashMap<i32, DateTime>,
    topics: HashMap<i32, DateTime>,
}

impl Marks {
    fn is_unread(&self, topic: &TopicModel) -> bool {
        is_topic_unread(
            topic,
            self.forums.get(&topic.forum_id).copied(),
            self.topics.get(&topic.id).copied(),
        )
    }
}

pub struct TrackingService {
    db: DatabaseConnection,
}

impl TrackingService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn load_marks<C: ConnectionTrait>(
        conn: &C,
        user_id: i32,
        forum_ids: &[i32],
    ) -> AppResult<Marks> {
        let forums = ForumReadTrack::find()
            .filter(forum_read_track::Column::UserId.eq(user_id))
            .filter(forum_read_track::Column::ForumId.is_in(forum_ids.to_vec()))
            .all(conn)
            .await?
            .into_iter()
            .map(|t| (t.forum_id, t.mark_time))
            .collect();

        let topics = TopicReadTrack::find()
            .filter(topic_read_track::Column::UserId.eq(user_id))
            .inner_join(Topic)
            .filter(topic::Column::ForumId.is_in(forum_ids.to_vec()))
            .all(conn)
            .await?
            .into_iter()
            .map(|t| (t.topic_id, t.mark_time))
            .collect();

        Ok(Marks { forums, topics })
    }

    async fn candidate_topics<C: ConnectionTrait>(
        conn: &C,
        forum_ids: &[i32],
    ) -> AppResult<Vec<TopicModel>> {
        Ok(Topic::find()
            .filter(topic::Column::ForumId.is_in(forum_ids.to_vec()))
            .filter(topic::Column::Approved.eq(true))
            .filter(topic::Column::LastPostOn.is_not_null())
            .all(conn)
            .await?)
    }

    /// Ids of the unread topics among `forum_ids`.
    pub async fn unread_topic_ids(
        &self,
        user_id: Option<i32>,
        forum_ids: &[i32],
    ) -> AppResult<HashSet<i32>> {
        let Some(user_id) = user_id else {
            return Ok(HashSet::new());
        };
        if forum_ids.is_empty() {
            return Ok(HashSet::new());
        }

        let marks = Self::load_marks(&self.db, user_id, forum_ids).await?;
        Ok(Self::candidate_topics(&self.db, forum_ids)
            .await?
            .into_iter()
            .filter(|t| marks.is_unread(t))
            .map(|t| t.id)
            .collect())
    }

    /// Forums (among `visible`) that contain an unread topic in their subtree.
    pub async fn unread_forum_ids(
        &self,
        user_id: Option<i32>,
        tree: &ForumTree,
        visible: &HashSet<i32>,
    ) -> AppResult<HashSet<i32>> {
        let Some(user_id) = user_id else {
            return Ok(HashSet::new());
        };
        let forum_ids: Vec<i32> = visible.iter().copied().collect();
        if forum_ids.is_empty() {
            return Ok(HashSet::new());
        }

        let marks = Self::load_marks(&self.db, user_id, &forum_ids).await?;
        let direct: HashSet<i32> = Self::candidate_topics(&self.db, &forum_ids)
            .await?
            .into_iter()
            .filter(|t| marks.is_unread(t))
            .map(|t| t.forum_id)
            .collect();

        Ok(propagate_unread(tree, &direct)
            .into_iter()
            .filter(|id| visible.contains(id))
            .collect())
    }

    /// Unread topics across `forum_ids`, most recently active first.
    pub async fn unread_topics(
        &self,
        user_id: i32,
        forum_ids: &[i32],
        page: u64,
        per_page: u64,
    ) -> AppResult<(Vec<TopicModel>, u64)> {
        let ids: Vec<i32> = self
            .unread_topic_ids(Some(user_id), forum_ids)
            .await?
            .into_iter()
            .collect();
        if ids.is_empty() {
            return Ok((Vec::new(), 0));
        }

        let paginator = Topic::find()
            .filter(topic::Column::Id.is_in(ids))
            .order_by_desc(topic::Column::LastPostOn)
            .order_by_desc(topic::Column::Id)
            .paginate(&self.db, per_page);
        let total = paginator.num_items().await?;
        let topics = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((topics, total))
    }

    /// Record that `user_id` has read `topic`. Once nothing in the forum is
    /// left unread the forum itself is marked and its topic marks dropped.
    pub async fn mark_topic_read(&self, user_id: i32, topic: &TopicModel) -> AppResult<()> {
        if topic.last_post_on.is_none() {
            return Ok(());
        }

        let now = chrono::Utc::now().naive_utc();
        let txn = self.db.begin().await?;

        TopicReadTrack::insert(topic_read_track::ActiveModel {
            user_id: Set(user_id),
            topic_id: Set(topic.id),
            mark_time: Set(now),
        })
        .on_conflict(
            OnConflict::columns([
                topic_read_track::Column::UserId,
                topic_read_track::Column::TopicId,
            ])
            .update_column(topic_read_track::Column::MarkTime)
            .to_owned(),
        )
        .exec(&txn)
        .await?;

        let forum_ids = [topic.forum_id];
        let marks = Self::load_marks(&txn, user_id, &forum_ids).await?;
        let still_unread = Self::candidate_topics(&txn, &forum_ids)
            .await?
            .iter()
            .any(|t| marks.is_unread(t));

        if !still_unread {
            Self::mark_forum_in(&txn, user_id, topic.forum_id, now).await?;
        }

        txn.commit().await?;
        Ok(())
    }

    /// Mark each forum of `forum_ids` read.
    pub async fn mark_forums_read(&self, user_id: i32, forum_ids: &[i32]) -> AppResult<()> {
        let now = chrono::Utc::now().naive_utc();
        let txn = self.db.begin().await?;
        for forum_id in forum_ids {
            Self::mark_forum_in(&txn, user_id, *forum_id, now).await?;
        }
        txn.commit().await?;
        tracing::debug!(user_id, forums = forum_ids.len(), "Marked forums read");
        Ok(())
    }

    async fn mark_forum_in<C: ConnectionTrait>(
        conn: &C,
        user_id: i32,
        forum_id: i32,
        now: DateTime,
    ) -> AppResult<()> {
        ForumReadTrack::insert(forum_read_track::ActiveModel {
            user_id: Set(user_id),
            forum_id: Set(forum_id),
            mark_time: Set(now),
        })
        .on_conflict(
            OnConflict::columns([
                forum_read_track::Column::UserId,
                forum_read_track::Column::ForumId,
            ])
            .update_column(forum_read_track::Column::MarkTime)
            .to_owned(),
        )
        .exec(conn)
        .await?;

        let topic_ids: Vec<i32> = Topic::find()
            .filter(topic::Column::ForumId.eq(forum_id))
            .all(conn)
            .await?
            .into_iter()
            .map(|t| t.id)
            .collect();

        if !topic_ids.is_empty() {
            TopicReadTrack::delete_many()
                .filter(topic_read_track::Column::UserId.eq(user_id))
                .filter(topic_read_track::Column::TopicId.is_in(topic_ids))
                .exec(conn)
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(hour: u32) -> DateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn topic(last_post_on: Option<DateTime>, approved: bool) -> TopicModel {
        TopicModel {
            id: 1,
            forum_id: 1,
            poster_id: 1,
            subject: "s".to_string(),
            slug: "s".to_string(),
            topic_type: 0,
            status: 0,
            approved,
            posts_count: 1,
            views_count: 0,
            first_post_id: Some(1),
            last_post_id: Some(1),
            last_post_on,
            created_at: at(1),
            updated_at: at(1),
        }
    }

    #[test]
    fn topic_without_marks_is_unread() {
        assert!(is_topic_unread(&topic(Some(at(10)), true), None, None));
    }

    #[test]
    fn either_mark_at_or_after_last_post_reads_it() {
        let t = topic(Some(at(10)), true);
        assert!(!is_topic_unread(&t, Some(at(10)), None));
        assert!(!is_topic_unread(&t, None, Some(at(11))));
        assert!(is_topic_unread(&t, Some(at(9)), Some(at(8))));
    }

    #[test]
    fn unapproved_or_empty_topics_are_never_unread() {
        assert!(!is_topic_unread(&topic(Some(at(10)), false), None, None));
        assert!(!is_topic_unread(&topic(None, true), None, None));
    }
}
