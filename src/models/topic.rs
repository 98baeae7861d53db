use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TopicType {
    Default,
    Sticky,
    Announce,
}

impl TopicType {
    pub fn as_i16(self) -> i16 {
        match self {
            TopicType::Default => 0,
            TopicType::Sticky => 1,
            TopicType::Announce => 2,
        }
    }

    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            0 => Some(TopicType::Default),
            1 => Some(TopicType::Sticky),
            2 => Some(TopicType::Announce),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TopicStatus {
    Unlocked,
    Locked,
    Moved,
}

impl TopicStatus {
    pub fn as_i16(self) -> i16 {
        match self {
            TopicStatus::Unlocked => 0,
            TopicStatus::Locked => 1,
            TopicStatus::Moved => 2,
        }
    }

    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            0 => Some(TopicStatus::Unlocked),
            1 => Some(TopicStatus::Locked),
            2 => Some(TopicStatus::Moved),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "topics")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub forum_id: i32,
    pub poster_id: i32,
    pub subject: String,
    pub slug: String,
    pub topic_type: i16,
    pub status: i16,
    pub approved: bool,
    pub posts_count: i32,
    pub views_count: i32,
    pub first_post_id: Option<i32>,
    pub last_post_id: Option<i32>,
    pub last_post_on: Option<DateTime>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Model {
    pub fn kind(&self) -> TopicType {
        TopicType::from_i16(self.topic_type).unwrap_or(TopicType::Default)
    }

    pub fn state(&self) -> TopicStatus {
        TopicStatus::from_i16(self.status).unwrap_or(TopicStatus::Unlocked)
    }

    pub fn is_locked(&self) -> bool {
        self.state() == TopicStatus::Locked
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::forum::Entity",
        from = "Column::ForumId",
        to = "super::forum::Column::Id",
        on_delete = "Cascade"
    )]
    Forum,
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::PosterId",
        to = "super::user::Column::Id"
    )]
    Poster,
    #[sea_orm(has_many = "super::post::Entity")]
    Post,
}

impl Related<super::forum::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Forum.def()
    }
}

impl Related<super::post::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Post.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
