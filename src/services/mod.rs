pub mod attachment;
pub mod auth;
pub mod bootstrap_admin;
pub mod cache;
pub mod forum;
pub mod forum_tree;
pub mod moderation;
pub mod permission;
pub mod poll;
pub mod post;
pub mod profile;
pub mod topic;
pub mod trackers;
pub mod tracking;
pub mod upload;

pub use attachment::AttachmentService;
pub use auth::AuthService;
pub use forum::ForumService;
pub use forum_tree::ForumTree;
pub use moderation::ModerationService;
pub use permission::{PermissionHandler, PermissionService};
pub use poll::PollService;
pub use post::PostService;
pub use profile::ProfileService;
pub use topic::TopicService;
pub use tracking::TrackingService;
