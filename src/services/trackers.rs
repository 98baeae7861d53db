//! Denormalized counter maintenance.
//!
//! Every function takes the caller's connection so it runs inside the same
//! transaction as the mutation that made the counters stale.

use crate::{
    error::AppResult,
    models::{forum, forum_profile, post, topic, Forum, ForumProfile, Post, Topic, TopicModel},
    services::forum_tree::ForumTree,
    utils::slugify,
};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait,
    EntityTrait, FromQueryResult, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};

#[derive(Debug, FromQueryResult)]
struct SubtreeAggregate {
    posts: Option<i64>,
}

#[derive(Debug, FromQueryResult)]
struct LatestApproved {
    last_post_on: Option<sea_orm::prelude::DateTime>,
}

/// Recompute a topic from its posts, then its forum chain.
///
/// Returns `None` when the topic had no posts left and was deleted.
pub async fn update_topic_trackers<C: ConnectionTrait>(
    conn: &C,
    topic_id: i32,
) -> AppResult<Option<TopicModel>> {
    let Some(existing) = Topic::find_by_id(topic_id).one(conn).await? else {
        return Ok(None);
    };
    let forum_id = existing.forum_id;

    let first_post = Post::find()
        .filter(post::Column::TopicId.eq(topic_id))
        .order_by_asc(post::Column::CreatedAt)
        .order_by_asc(post::Column::Id)
        .one(conn)
        .await?;

    let Some(first_post) = first_post else {
        Topic::delete_by_id(topic_id).exec(conn).await?;
        tracing::debug!(topic_id, forum_id, "Deleted topic without posts");
        update_forum_trackers(conn, forum_id).await?;
        return Ok(None);
    };

    let last_approved = Post::find()
        .filter(post::Column::TopicId.eq(topic_id))
        .filter(post::Column::Approved.eq(true))
        .order_by_desc(post::Column::CreatedAt)
        .order_by_desc(post::Column::Id)
        .one(conn)
        .await?;

    let posts_count = Post::find()
        .filter(post::Column::TopicId.eq(topic_id))
        .filter(post::Column::Approved.eq(true))
        .count(conn)
        .await?;

    let mut active: topic::ActiveModel = existing.into();
    active.slug = Set(slugify(&first_post.subject));
    active.subject = Set(first_post.subject);
    active.approved = Set(first_post.approved);
    active.first_post_id = Set(Some(first_post.id));
    active.posts_count = Set(posts_count as i32);
    active.last_post_id = Set(last_approved.as_ref().map(|p| p.id));
    active.last_post_on = Set(last_approved.map(|p| p.created_at));
    let updated = active.update(conn).await?;

    update_forum_trackers(conn, forum_id).await?;
    Ok(Some(updated))
}

/// Fold counters over the path from `forum_id` up to its root.
///
/// Each forum counts the approved topics of its whole subtree and sums the
/// posts of every topic in it. A subtree without approved topics gets
/// `last_post_on = now`.
pub async fn update_forum_trackers<C: ConnectionTrait>(conn: &C, forum_id: i32) -> AppResult<()> {
    let tree = ForumTree::new(Forum::find().all(conn).await?);
    if !tree.contains(forum_id) {
        return Ok(());
    }

    let now = chrono::Utc::now().naive_utc();
    for id in tree.path_to_root(forum_id) {
        let forum_ids = tree.subtree(id);

        let topics_count = Topic::find()
            .filter(topic::Column::ForumId.is_in(forum_ids.clone()))
            .filter(topic::Column::Approved.eq(true))
            .count(conn)
            .await?;

        let posts = Topic::find()
            .select_only()
            .column_as(Expr::col(topic::Column::PostsCount).sum(), "posts")
            .filter(topic::Column::ForumId.is_in(forum_ids.clone()))
            .into_model::<SubtreeAggregate>()
            .one(conn)
            .await?
            .and_then(|agg| agg.posts)
            .unwrap_or(0);

        let last_post_on = Topic::find()
            .select_only()
            .column_as(Expr::col(topic::Column::LastPostOn).max(), "last_post_on")
            .filter(topic::Column::ForumId.is_in(forum_ids))
            .filter(topic::Column::Approved.eq(true))
            .into_model::<LatestApproved>()
            .one(conn)
            .await?
            .and_then(|agg| agg.last_post_on);

        // Counter-only update: no reparent checks, no slug recomputation.
        Forum::update_many()
            .col_expr(forum::Column::TopicsCount, Expr::value(topics_count as i32))
            .col_expr(forum::Column::PostsCount, Expr::value(posts as i32))
            .col_expr(
                forum::Column::LastPostOn,
                Expr::value(last_post_on.unwrap_or(now)),
            )
            .filter(forum::Column::Id.eq(id))
            .exec(conn)
            .await?;
    }

    Ok(())
}

/// Recount the approved posts authored by `user_id` into their profile.
pub async fn update_member_posts_count<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
) -> AppResult<()> {
    let count = Post::find()
        .filter(post::Column::PosterId.eq(user_id))
        .filter(post::Column::Approved.eq(true))
        .count(conn)
        .await? as i32;

    let now = chrono::Utc::now().naive_utc();
    match ForumProfile::find_by_id(user_id).one(conn).await? {
        Some(profile) => {
            if profile.posts_count != count {
                let mut active: forum_profile::ActiveModel = profile.into();
                active.posts_count = Set(count);
                active.updated_at = Set(now);
                active.update(conn).await?;
            }
        }
        None => {
            forum_profile::ActiveModel {
                user_id: Set(user_id),
                posts_count: Set(count),
                signature: Set(None),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(conn)
            .await?;
        }
    }

    Ok(())
}

/// Recount several members at once, e.g. after a topic with many posters is
/// removed.
pub async fn update_members_posts_count<C: ConnectionTrait>(
    conn: &C,
    user_ids: impl IntoIterator<Item = i32>,
) -> AppResult<()> {
    let mut ids: Vec<i32> = user_ids.into_iter().collect();
    ids.sort_unstable();
    ids.dedup();
    for user_id in ids {
        update_member_posts_count(conn, user_id).await?;
    }
    Ok(())
}
