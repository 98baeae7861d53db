pub mod attachment;
pub mod forum;
pub mod forum_permission;
pub mod forum_profile;
pub mod forum_read_track;
pub mod post;
pub mod refresh_token;
pub mod topic;
pub mod topic_poll;
pub mod topic_poll_option;
pub mod topic_poll_vote;
pub mod topic_read_track;
pub mod user;

pub use attachment::{Entity as Attachment, Model as AttachmentModel};
pub use forum::{Entity as Forum, ForumType, Model as ForumModel};
pub use forum_permission::{Entity as ForumPermission, Model as ForumPermissionModel};
pub use forum_profile::{Entity as ForumProfile, Model as ForumProfileModel};
pub use forum_read_track::Entity as ForumReadTrack;
pub use post::{Entity as Post, Model as PostModel};
pub use refresh_token::Entity as RefreshToken;
pub use topic::{Entity as Topic, Model as TopicModel, TopicStatus, TopicType};
pub use topic_poll::{Entity as TopicPoll, Model as TopicPollModel};
pub use topic_poll_option::{Entity as TopicPollOption, Model as TopicPollOptionModel};
pub use topic_poll_vote::Entity as TopicPollVote;
pub use topic_read_track::Entity as TopicReadTrack;
pub use user::{Entity as User, Model as UserModel};
