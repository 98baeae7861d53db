use crate::{
    error::{AppError, AppResult},
    models::{
        attachment, forum, post, topic, Attachment, Forum, ForumModel, ForumType, Post, Topic,
    },
    services::{
        attachment::AttachmentService, cache::CacheService, forum_tree::ForumTree, trackers,
        upload::UploadConfig,
    },
    utils::slugify,
};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection,
    EntityTrait, JoinType, PaginatorTrait, QueryFilter, QuerySelect, RelationTrait,
    TransactionTrait,
};

const CACHE_KEY_FORUM_TREE: &str = "forums:tree";
const CACHE_TTL_FORUMS: u64 = 300;

/// Everything an administrator sets on a forum. The slug is derived.
#[derive(Debug, Clone)]
pub struct ForumInput {
    pub parent_id: Option<i32>,
    pub name: String,
    pub forum_type: ForumType,
    pub description: Option<String>,
    pub image: Option<String>,
    pub link: Option<String>,
    pub link_redirects: bool,
    pub display_sub_forum_list: bool,
    pub sort_order: i32,
}

/// Structural rules for placing a forum (new when `forum_id` is `None`).
pub fn validate_placement(
    tree: &ForumTree,
    forum_id: Option<i32>,
    input: &ForumInput,
) -> AppResult<()> {
    if input.forum_type == ForumType::Link
        && input.link.as_deref().map_or(true, |l| l.trim().is_empty())
    {
        return Err(AppError::Validation(
            "A link forum must have a link associated with it".to_string(),
        ));
    }

    let Some(parent_id) = input.parent_id else {
        return Ok(());
    };
    let parent = tree
        .get(parent_id)
        .ok_or_else(|| AppError::Validation("Parent forum does not exist".to_string()))?;

    if let Some(id) = forum_id {
        if parent_id == id || tree.is_descendant_of(parent_id, id) {
            return Err(AppError::Validation(
                "A forum cannot be moved under itself or one of its sub-forums".to_string(),
            ));
        }
    }
    if parent.is_link() {
        return Err(AppError::Validation(
            "A forum can not have a link forum as parent".to_string(),
        ));
    }
    if input.forum_type == ForumType::Category && parent.is_category() {
        return Err(AppError::Validation(
            "A category can not have another category as parent".to_string(),
        ));
    }
    Ok(())
}

pub struct ForumService {
    db: DatabaseConnection,
    cache: Option<CacheService>,
}

impl ForumService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db, cache: None }
    }

    pub fn with_cache(mut self, cache: CacheService) -> Self {
        self.cache = Some(cache);
        self
    }

    /// The full tree, served from redis when available.
    pub async fn load_tree(&self) -> AppResult<ForumTree> {
        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get::<Vec<ForumModel>>(CACHE_KEY_FORUM_TREE).await {
                return Ok(ForumTree::new(cached));
            }
        }

        let forums = Forum::find().all(&self.db).await?;

        if let Some(cache) = &self.cache {
            cache.set(CACHE_KEY_FORUM_TREE, &forums, CACHE_TTL_FORUMS).await;
        }

        Ok(ForumTree::new(forums))
    }

    pub async fn get_by_id(&self, id: i32) -> AppResult<ForumModel> {
        Forum::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)
    }

    pub async fn create(&self, input: ForumInput) -> AppResult<ForumModel> {
        let tree = ForumTree::new(Forum::find().all(&self.db).await?);
        validate_placement(&tree, None, &input)?;

        let now = chrono::Utc::now().naive_utc();
        let new_forum = forum::ActiveModel {
            parent_id: Set(input.parent_id),
            slug: Set(slugify(&input.name)),
            name: Set(input.name),
            description: Set(input.description),
            image: Set(input.image),
            link: Set(input.link),
            link_redirects: Set(input.link_redirects),
            forum_type: Set(input.forum_type.as_i16()),
            posts_count: Set(0),
            topics_count: Set(0),
            link_redirects_count: Set(0),
            last_post_on: Set(None),
            display_sub_forum_list: Set(input.display_sub_forum_list),
            sort_order: Set(input.sort_order),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        let forum = new_forum.insert(&self.db).await?;
        tracing::info!(forum_id = forum.id, parent_id = ?forum.parent_id, "Forum created");
        self.invalidate_tree_cache().await;
        Ok(forum)
    }

    /// Replace a forum's settings. A new parent triggers counter propagation
    /// along both the new and the previous ancestor chain.
    pub async fn update(&self, id: i32, input: ForumInput) -> AppResult<ForumModel> {
        let tree = ForumTree::new(Forum::find().all(&self.db).await?);
        let existing = tree.get(id).cloned().ok_or(AppError::NotFound)?;
        validate_placement(&tree, Some(id), &input)?;

        self.validate_type_change(&tree, id, input.forum_type).await?;

        let previous_parent = existing.parent_id;
        let parent_changed = previous_parent != input.parent_id;
        let now = chrono::Utc::now().naive_utc();

        let txn = self.db.begin().await?;

        let mut active: forum::ActiveModel = existing.into();
        active.parent_id = Set(input.parent_id);
        active.slug = Set(slugify(&input.name));
        active.name = Set(input.name);
        active.description = Set(input.description);
        active.image = Set(input.image);
        active.link = Set(input.link);
        active.link_redirects = Set(input.link_redirects);
        active.forum_type = Set(input.forum_type.as_i16());
        active.display_sub_forum_list = Set(input.display_sub_forum_list);
        active.sort_order = Set(input.sort_order);
        active.updated_at = Set(now);
        active.update(&txn).await?;

        if parent_changed {
            trackers::update_forum_trackers(&txn, id).await?;
            if let Some(old_parent) = previous_parent {
                trackers::update_forum_trackers(&txn, old_parent).await?;
            }
        }

        txn.commit().await?;

        if parent_changed {
            tracing::info!(
                forum_id = id,
                from = ?previous_parent,
                to = ?input.parent_id,
                "Forum moved"
            );
        }
        self.invalidate_tree_cache().await;
        self.get_by_id(id).await
    }

    /// Rules a forum's own content and children impose on its type.
    async fn validate_type_change(
        &self,
        tree: &ForumTree,
        id: i32,
        forum_type: ForumType,
    ) -> AppResult<()> {
        if forum_type == ForumType::Forum {
            return Ok(());
        }

        let own_topics = Topic::find()
            .filter(topic::Column::ForumId.eq(id))
            .count(&self.db)
            .await?;
        if own_topics > 0 {
            return Err(AppError::Validation(match forum_type {
                ForumType::Category => "A forum holding topics can not become a category",
                _ => "A forum holding topics can not become a link forum",
            }
            .to_string()));
        }

        let children = tree.children(Some(id));
        match forum_type {
            ForumType::Link if !children.is_empty() => Err(AppError::Validation(
                "A forum with sub-forums can not become a link forum".to_string(),
            )),
            ForumType::Category
                if children
                    .iter()
                    .filter_map(|child| tree.get(*child))
                    .any(|child| child.is_category()) =>
            {
                Err(AppError::Validation(
                    "A category can not have another category as child".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }

    pub async fn set_image(&self, id: i32, url: String) -> AppResult<ForumModel> {
        let existing = self.get_by_id(id).await?;
        let mut active: forum::ActiveModel = existing.into();
        active.image = Set(Some(url));
        active.updated_at = Set(chrono::Utc::now().naive_utc());
        let updated = active.update(&self.db).await?;
        self.invalidate_tree_cache().await;
        Ok(updated)
    }

    /// Delete a forum with its whole subtree and everything posted in it.
    pub async fn delete(&self, config: &UploadConfig, id: i32) -> AppResult<()> {
        let tree = ForumTree::new(Forum::find().all(&self.db).await?);
        let existing = tree.get(id).cloned().ok_or(AppError::NotFound)?;
        let subtree = tree.subtree(id);

        let txn = self.db.begin().await?;

        let poster_ids: Vec<i32> = Post::find()
            .select_only()
            .column(post::Column::PosterId)
            .distinct()
            .join(JoinType::InnerJoin, post::Relation::Topic.def())
            .filter(topic::Column::ForumId.is_in(subtree.clone()))
            .into_tuple()
            .all(&txn)
            .await?;

        let files: Vec<String> = Attachment::find()
            .select_only()
            .column(attachment::Column::FilePath)
            .join(JoinType::InnerJoin, attachment::Relation::Post.def())
            .join(JoinType::InnerJoin, post::Relation::Topic.def())
            .filter(topic::Column::ForumId.is_in(subtree.clone()))
            .into_tuple()
            .all(&txn)
            .await?;

        // FK cascades remove sub-forums, topics, posts and everything hanging off them.
        Forum::delete_by_id(id).exec(&txn).await?;

        if let Some(parent_id) = existing.parent_id {
            trackers::update_forum_trackers(&txn, parent_id).await?;
        }
        trackers::update_members_posts_count(&txn, poster_ids).await?;

        txn.commit().await?;

        AttachmentService::remove_files(config, &files).await;
        tracing::info!(forum_id = id, forums = subtree.len(), "Forum deleted");
        self.invalidate_tree_cache().await;
        Ok(())
    }

    /// Resolve a link forum's target, counting the click when enabled.
    pub async fn follow_link(&self, id: i32) -> AppResult<String> {
        let forum = self.get_by_id(id).await?;
        let link = match (forum.is_link(), forum.link) {
            (true, Some(link)) if !link.trim().is_empty() => link,
            _ => return Err(AppError::NotFound),
        };

        if forum.link_redirects {
            Forum::update_many()
                .col_expr(
                    forum::Column::LinkRedirectsCount,
                    Expr::col(forum::Column::LinkRedirectsCount).add(1),
                )
                .filter(forum::Column::Id.eq(id))
                .exec(&self.db)
                .await?;
            self.invalidate_tree_cache().await;
        }

        Ok(link)
    }

    async fn invalidate_tree_cache(&self) {
        invalidate_tree_cache(self.cache.as_ref()).await;
    }
}

/// Counters live on forum rows, so any content change makes the cached tree
/// stale.
pub async fn invalidate_tree_cache(cache: Option<&CacheService>) {
    if let Some(cache) = cache {
        cache.invalidate(CACHE_KEY_FORUM_TREE).await;
    }
}
