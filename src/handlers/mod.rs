pub mod attachment;
pub mod auth;
pub mod context;
pub mod forum;
pub mod member;
pub mod moderation;
pub mod permission;
pub mod poll;
pub mod post;
pub mod topic;
pub mod tracking;

pub use auth::*;
