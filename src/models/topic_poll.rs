use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "topic_polls")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub topic_id: i32,
    pub question: String,
    /// Poll duration in days; `None` keeps the poll open forever.
    pub duration: Option<i32>,
    pub max_options: i16,
    pub user_changes: bool,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Model {
    pub fn closes_at(&self) -> Option<DateTime> {
        self.duration
            .map(|days| self.created_at + chrono::Duration::days(i64::from(days)))
    }

    pub fn is_open_at(&self, now: DateTime) -> bool {
        self.closes_at().map_or(true, |end| now <= end)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::topic::Entity",
        from = "Column::TopicId",
        to = "super::topic::Column::Id",
        on_delete = "Cascade"
    )]
    Topic,
    #[sea_orm(has_many = "super::topic_poll_option::Entity")]
    PollOption,
}

impl Related<super::topic_poll_option::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PollOption.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
