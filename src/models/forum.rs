use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// What a forum node can be: a board holding topics, a category grouping
/// other forums, or a plain link to somewhere else.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ForumType {
    Forum,
    Category,
    Link,
}

impl ForumType {
    pub fn as_i16(self) -> i16 {
        match self {
            ForumType::Forum => 0,
            ForumType::Category => 1,
            ForumType::Link => 2,
        }
    }

    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            0 => Some(ForumType::Forum),
            1 => Some(ForumType::Category),
            2 => Some(ForumType::Link),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "forums")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub parent_id: Option<i32>,
    pub name: String,
    pub slug: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    pub image: Option<String>,
    pub link: Option<String>,
    pub link_redirects: bool,
    pub forum_type: i16,
    pub posts_count: i32,
    pub topics_count: i32,
    pub link_redirects_count: i32,
    pub last_post_on: Option<DateTime>,
    pub display_sub_forum_list: bool,
    pub sort_order: i32,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Model {
    pub fn kind(&self) -> ForumType {
        ForumType::from_i16(self.forum_type).unwrap_or(ForumType::Forum)
    }

    pub fn is_forum(&self) -> bool {
        self.kind() == ForumType::Forum
    }

    pub fn is_category(&self) -> bool {
        self.kind() == ForumType::Category
    }

    pub fn is_link(&self) -> bool {
        self.kind() == ForumType::Link
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "Entity",
        from = "Column::ParentId",
        to = "Column::Id",
        on_delete = "Cascade"
    )]
    Parent,
    #[sea_orm(has_many = "super::topic::Entity")]
    Topic,
}

impl Related<super::topic::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Topic.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
