use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(DeriveIden)]
enum Forums {
    Table,
    Id,
    ParentId,
    Name,
    Slug,
    Description,
    Image,
    Link,
    LinkRedirects,
    ForumType,
    PostsCount,
    TopicsCount,
    LinkRedirectsCount,
    LastPostOn,
    DisplaySubForumList,
    SortOrder,
    CreatedAt,
    UpdatedAt,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Forums::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Forums::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Forums::ParentId).integer().null())
                    .col(ColumnDef::new(Forums::Name).string_len(100).not_null())
                    .col(ColumnDef::new(Forums::Slug).string_len(255).not_null())
                    .col(ColumnDef::new(Forums::Description).text().null())
                    .col(ColumnDef::new(Forums::Image).string_len(500).null())
                    .col(ColumnDef::new(Forums::Link).string_len(500).null())
                    .col(
                        ColumnDef::new(Forums::LinkRedirects)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Forums::ForumType)
                            .small_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Forums::PostsCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Forums::TopicsCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Forums::LinkRedirectsCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Forums::LastPostOn).timestamp().null())
                    .col(
                        ColumnDef::new(Forums::DisplaySubForumList)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Forums::SortOrder)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Forums::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Forums::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_forums_parent_id")
                            .from(Forums::Table, Forums::ParentId)
                            .to(Forums::Table, Forums::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_forums_parent_id")
                    .table(Forums::Table)
                    .col(Forums::ParentId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_forums_forum_type")
                    .table(Forums::Table)
                    .col(Forums::ForumType)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Forums::Table).to_owned())
            .await
    }
}
