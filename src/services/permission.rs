use crate::{
    config::auth::auth_config,
    error::{AppError, AppResult},
    middleware::AuthUser,
    models::{
        forum_permission, ForumModel, ForumPermission, ForumPermissionModel, PostModel,
        TopicModel, TopicPollModel, TopicType,
    },
    services::forum_tree::ForumTree,
};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;
use utoipa::ToSchema;

/// Forum permission codenames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Perm {
    CanSeeForum,
    CanReadForum,
    CanStartNewTopics,
    CanReplyToTopics,
    CanEditOwnPosts,
    CanPostWithoutApproval,
    CanCreatePolls,
    CanVoteInPolls,
    CanAttachFile,
    CanDownloadFile,
    CanPostStickies,
    CanPostAnnouncements,
    CanReplyToLockedTopics,
    CanDeleteOwnPosts,
    CanEditPosts,
    CanDeletePosts,
    CanLockTopics,
    CanMoveTopics,
    CanApprovePosts,
}

impl Perm {
    pub const ALL: [Perm; 19] = [
        Perm::CanSeeForum,
        Perm::CanReadForum,
        Perm::CanStartNewTopics,
        Perm::CanReplyToTopics,
        Perm::CanEditOwnPosts,
        Perm::CanPostWithoutApproval,
        Perm::CanCreatePolls,
        Perm::CanVoteInPolls,
        Perm::CanAttachFile,
        Perm::CanDownloadFile,
        Perm::CanPostStickies,
        Perm::CanPostAnnouncements,
        Perm::CanReplyToLockedTopics,
        Perm::CanDeleteOwnPosts,
        Perm::CanEditPosts,
        Perm::CanDeletePosts,
        Perm::CanLockTopics,
        Perm::CanMoveTopics,
        Perm::CanApprovePosts,
    ];

    pub fn codename(self) -> &'static str {
        match self {
            Perm::CanSeeForum => "can_see_forum",
            Perm::CanReadForum => "can_read_forum",
            Perm::CanStartNewTopics => "can_start_new_topics",
            Perm::CanReplyToTopics => "can_reply_to_topics",
            Perm::CanEditOwnPosts => "can_edit_own_posts",
            Perm::CanPostWithoutApproval => "can_post_without_approval",
            Perm::CanCreatePolls => "can_create_polls",
            Perm::CanVoteInPolls => "can_vote_in_polls",
            Perm::CanAttachFile => "can_attach_file",
            Perm::CanDownloadFile => "can_download_file",
            Perm::CanPostStickies => "can_post_stickies",
            Perm::CanPostAnnouncements => "can_post_announcements",
            Perm::CanReplyToLockedTopics => "can_reply_to_locked_topics",
            Perm::CanDeleteOwnPosts => "can_delete_own_posts",
            Perm::CanEditPosts => "can_edit_posts",
            Perm::CanDeletePosts => "can_delete_posts",
            Perm::CanLockTopics => "can_lock_topics",
            Perm::CanMoveTopics => "can_move_topics",
            Perm::CanApprovePosts => "can_approve_posts",
        }
    }
}

impl FromStr for Perm {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Perm::ALL
            .into_iter()
            .find(|p| p.codename() == s)
            .ok_or_else(|| AppError::Validation(format!("Unknown permission codename: {}", s)))
    }
}

/// One stored grant or denial that applies to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Grant {
    forum_id: Option<i32>,
    codename: String,
    has_perm: bool,
}

/// Decide one codename for one forum. A per-forum row beats a global row;
/// without either, authenticated members fall back to the default set and
/// anonymous visitors are refused.
fn resolve(
    grants: &[Grant],
    forum_id: i32,
    codename: &str,
    authenticated: bool,
    defaults: &HashSet<String>,
) -> bool {
    let matching = |scope: Option<i32>| {
        grants
            .iter()
            .find(|g| g.forum_id == scope && g.codename == codename)
            .map(|g| g.has_perm)
    };

    matching(Some(forum_id))
        .or_else(|| matching(None))
        .unwrap_or_else(|| authenticated && defaults.contains(codename))
}

/// Answers "may this caller do X here?" for one request.
///
/// The caller's permission rows are loaded once; every check afterwards is
/// in memory.
pub struct PermissionHandler {
    user: Option<AuthUser>,
    grants: Vec<Grant>,
}

impl PermissionHandler {
    pub async fn load(db: &DatabaseConnection, user: Option<&AuthUser>) -> AppResult<Self> {
        let owner = match user {
            Some(u) => forum_permission::Column::UserId.eq(u.user_id),
            None => forum_permission::Column::AnonymousUser.eq(true),
        };

        let grants = match user {
            Some(u) if u.is_superuser() => Vec::new(),
            _ => ForumPermission::find()
                .filter(owner)
                .all(db)
                .await?
                .into_iter()
                .map(|row| Grant {
                    forum_id: row.forum_id,
                    codename: row.codename,
                    has_perm: row.has_perm,
                })
                .collect(),
        };

        Ok(Self {
            user: user.cloned(),
            grants,
        })
    }

    pub fn user_id(&self) -> Option<i32> {
        self.user.as_ref().map(|u| u.user_id)
    }

    fn is_superuser(&self) -> bool {
        self.user.as_ref().is_some_and(AuthUser::is_superuser)
    }

    pub fn has_perm(&self, perm: Perm, forum_id: i32) -> bool {
        self.is_superuser()
            || resolve(
                &self.grants,
                forum_id,
                perm.codename(),
                self.user.is_some(),
                &auth_config().default_authenticated_permissions,
            )
    }

    /// Turn a failed check into a 403.
    pub fn require(&self, allowed: bool) -> AppResult<()> {
        if allowed {
            Ok(())
        } else {
            Err(AppError::Forbidden)
        }
    }

    fn is_poster(&self, post: &PostModel) -> bool {
        self.user_id() == Some(post.poster_id)
    }

    // Forums

    pub fn can_read_forum(&self, forum: &ForumModel) -> bool {
        self.has_perm(Perm::CanReadForum, forum.id)
    }

    /// Ids of every forum the caller may see. A forum is hidden when neither
    /// `can_see_forum` nor `can_read_forum` holds on it or on any ancestor.
    pub fn visible_forum_ids(&self, tree: &ForumTree) -> HashSet<i32> {
        let mut visible = HashSet::new();
        for (forum, _) in tree.walk() {
            let parent_visible = forum.parent_id.map_or(true, |p| visible.contains(&p));
            let own = self.has_perm(Perm::CanSeeForum, forum.id)
                || self.has_perm(Perm::CanReadForum, forum.id);
            if parent_visible && own {
                visible.insert(forum.id);
            }
        }
        visible
    }

    /// A forum is readable only if it is visible and `can_read_forum` holds.
    pub fn can_browse(&self, tree: &ForumTree, forum: &ForumModel) -> bool {
        self.can_read_forum(forum)
            && tree
                .ancestors(forum.id)
                .into_iter()
                .all(|id| self.has_perm(Perm::CanSeeForum, id) || self.has_perm(Perm::CanReadForum, id))
    }

    // Topics and posts

    pub fn can_add_topic(&self, forum: &ForumModel) -> bool {
        self.has_perm(Perm::CanStartNewTopics, forum.id)
    }

    pub fn can_add_stickies(&self, forum: &ForumModel) -> bool {
        self.has_perm(Perm::CanPostStickies, forum.id)
    }

    pub fn can_add_announcements(&self, forum: &ForumModel) -> bool {
        self.has_perm(Perm::CanPostAnnouncements, forum.id)
    }

    /// Whether a new topic of `kind` may be started.
    pub fn can_add_topic_of_type(&self, forum: &ForumModel, kind: TopicType) -> bool {
        self.can_add_topic(forum)
            && match kind {
                TopicType::Default => true,
                TopicType::Sticky => self.can_add_stickies(forum),
                TopicType::Announce => self.can_add_announcements(forum),
            }
    }

    pub fn can_post_without_approval(&self, forum_id: i32) -> bool {
        self.has_perm(Perm::CanPostWithoutApproval, forum_id)
    }

    pub fn can_add_post(&self, topic: &TopicModel) -> bool {
        self.has_perm(Perm::CanReplyToTopics, topic.forum_id)
            && (!topic.is_locked() || self.has_perm(Perm::CanReplyToLockedTopics, topic.forum_id))
    }

    pub fn can_edit_post(&self, post: &PostModel, forum_id: i32) -> bool {
        self.is_superuser()
            || (self.is_poster(post) && self.has_perm(Perm::CanEditOwnPosts, forum_id))
            || self.has_perm(Perm::CanEditPosts, forum_id)
    }

    pub fn can_delete_post(&self, post: &PostModel, forum_id: i32) -> bool {
        self.is_superuser()
            || (self.is_poster(post) && self.has_perm(Perm::CanDeleteOwnPosts, forum_id))
            || self.has_perm(Perm::CanDeletePosts, forum_id)
    }

    // Polls

    pub fn can_create_polls(&self, forum: &ForumModel) -> bool {
        self.has_perm(Perm::CanCreatePolls, forum.id)
    }

    pub fn can_vote_in_poll(
        &self,
        poll: &TopicPollModel,
        topic: &TopicModel,
        already_voted: bool,
        now: sea_orm::prelude::DateTime,
    ) -> bool {
        if self.user.is_none() || !poll.is_open_at(now) {
            return false;
        }
        let can_vote =
            self.has_perm(Perm::CanVoteInPolls, topic.forum_id) && !topic.is_locked();
        if can_vote && already_voted {
            return poll.user_changes;
        }
        can_vote
    }

    // Attachments

    pub fn can_attach_files(&self, forum_id: i32) -> bool {
        self.has_perm(Perm::CanAttachFile, forum_id)
    }

    pub fn can_download_files(&self, forum_id: i32) -> bool {
        self.has_perm(Perm::CanDownloadFile, forum_id)
    }

    // Moderation

    pub fn can_lock_topics(&self, forum_id: i32) -> bool {
        self.has_perm(Perm::CanLockTopics, forum_id)
    }

    pub fn can_move_topics(&self, forum_id: i32) -> bool {
        self.has_perm(Perm::CanMoveTopics, forum_id)
    }

    /// Whoever may delete every post of a topic may delete the topic.
    pub fn can_delete_topics(&self, forum_id: i32) -> bool {
        self.has_perm(Perm::CanDeletePosts, forum_id)
    }

    pub fn can_update_topic_type(&self, forum_id: i32, kind: TopicType) -> bool {
        let can_edit = self.has_perm(Perm::CanEditPosts, forum_id);
        match kind {
            TopicType::Default => can_edit,
            TopicType::Sticky => can_edit && self.has_perm(Perm::CanPostStickies, forum_id),
            TopicType::Announce => {
                can_edit && self.has_perm(Perm::CanPostAnnouncements, forum_id)
            }
        }
    }

    pub fn can_approve_posts(&self, forum_id: i32) -> bool {
        self.has_perm(Perm::CanApprovePosts, forum_id)
    }

    fn forums_with(&self, tree: &ForumTree, perm: Perm) -> Vec<i32> {
        tree.walk()
            .into_iter()
            .map(|(f, _)| f.id)
            .filter(|id| self.has_perm(perm, *id))
            .collect()
    }

    pub fn moderation_queue_forums(&self, tree: &ForumTree) -> Vec<i32> {
        self.forums_with(tree, Perm::CanApprovePosts)
    }

    pub fn can_access_moderation_queue(&self, tree: &ForumTree) -> bool {
        !self.moderation_queue_forums(tree).is_empty()
    }

    /// Forums whose topics the caller may move, and may move topics into.
    pub fn movable_forums(&self, tree: &ForumTree) -> Vec<i32> {
        self.forums_with(tree, Perm::CanMoveTopics)
    }
}

/// Storage for grant rows, used by the superuser administration endpoints.
pub struct PermissionService {
    db: DatabaseConnection,
}

pub struct NewGrant {
    pub user_id: Option<i32>,
    pub forum_id: Option<i32>,
    pub perm: Perm,
    pub has_perm: bool,
}

impl PermissionService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Insert or overwrite the grant for `(owner, forum, codename)`.
    /// `user_id = None` targets anonymous visitors.
    pub async fn set(&self, grant: NewGrant) -> AppResult<ForumPermissionModel> {
        let owner = match grant.user_id {
            Some(id) => forum_permission::Column::UserId.eq(id),
            None => forum_permission::Column::AnonymousUser.eq(true),
        };
        let scope = match grant.forum_id {
            Some(id) => forum_permission::Column::ForumId.eq(id),
            None => forum_permission::Column::ForumId.is_null(),
        };

        let existing = ForumPermission::find()
            .filter(owner)
            .filter(scope)
            .filter(forum_permission::Column::Codename.eq(grant.perm.codename()))
            .one(&self.db)
            .await?;

        let saved = match existing {
            Some(row) => {
                let mut active: forum_permission::ActiveModel = row.into();
                active.has_perm = Set(grant.has_perm);
                active.update(&self.db).await?
            }
            None => {
                forum_permission::ActiveModel {
                    user_id: Set(grant.user_id),
                    anonymous_user: Set(grant.user_id.is_none()),
                    forum_id: Set(grant.forum_id),
                    codename: Set(grant.perm.codename().to_string()),
                    has_perm: Set(grant.has_perm),
                    created_at: Set(chrono::Utc::now().naive_utc()),
                    ..Default::default()
                }
                .insert(&self.db)
                .await?
            }
        };

        tracing::info!(
            user_id = ?saved.user_id,
            forum_id = ?saved.forum_id,
            codename = %saved.codename,
            has_perm = saved.has_perm,
            "Forum permission set"
        );
        Ok(saved)
    }

    pub async fn list(
        &self,
        forum_id: Option<i32>,
        user_id: Option<i32>,
    ) -> AppResult<Vec<ForumPermissionModel>> {
        let mut condition = Condition::all();
        if let Some(forum_id) = forum_id {
            condition = condition.add(forum_permission::Column::ForumId.eq(forum_id));
        }
        if let Some(user_id) = user_id {
            condition = condition.add(forum_permission::Column::UserId.eq(user_id));
        }

        Ok(ForumPermission::find()
            .filter(condition)
            .order_by_asc(forum_permission::Column::Id)
            .all(&self.db)
            .await?)
    }

    pub async fn delete(&self, id: i32) -> AppResult<()> {
        let result = ForumPermission::delete_by_id(id).exec(&self.db).await?;
        if result.rows_affected == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }
}
