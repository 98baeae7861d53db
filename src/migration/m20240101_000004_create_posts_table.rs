use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(DeriveIden)]
enum Posts {
    Table,
    Id,
    TopicId,
    PosterId,
    Username,
    Subject,
    Content,
    Approved,
    UpdateReason,
    UpdatesCount,
    UpdatedById,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Topics {
    Table,
    Id,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Posts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Posts::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Posts::TopicId).integer().not_null())
                    .col(ColumnDef::new(Posts::PosterId).integer().not_null())
                    .col(ColumnDef::new(Posts::Username).string_len(50).not_null())
                    .col(ColumnDef::new(Posts::Subject).string_len(255).not_null())
                    .col(ColumnDef::new(Posts::Content).text().not_null())
                    .col(
                        ColumnDef::new(Posts::Approved)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(Posts::UpdateReason).string_len(255).null())
                    .col(
                        ColumnDef::new(Posts::UpdatesCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Posts::UpdatedById).integer().null())
                    .col(
                        ColumnDef::new(Posts::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Posts::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_posts_poster_id")
                            .from(Posts::Table, Posts::PosterId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_posts_updated_by_id")
                            .from(Posts::Table, Posts::UpdatedById)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_posts_topic_id")
                            .from(Posts::Table, Posts::TopicId)
                            .to(Topics::Table, Topics::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_posts_topic_created")
                    .table(Posts::Table)
                    .col(Posts::TopicId)
                    .col(Posts::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_posts_poster_id")
                    .table(Posts::Table)
                    .col(Posts::PosterId)
                    .to_owned(),
            )
            .await?;

        // topics.first_post_id / last_post_id can only reference posts once the table exists
        let db = manager.get_connection();
        db.execute_unprepared(
            "ALTER TABLE topics
                ADD CONSTRAINT fk_topics_first_post_id
                    FOREIGN KEY (first_post_id) REFERENCES posts(id) ON DELETE SET NULL,
                ADD CONSTRAINT fk_topics_last_post_id
                    FOREIGN KEY (last_post_id) REFERENCES posts(id) ON DELETE SET NULL",
        )
        .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(
            "ALTER TABLE topics
                DROP CONSTRAINT IF EXISTS fk_topics_first_post_id,
                DROP CONSTRAINT IF EXISTS fk_topics_last_post_id",
        )
        .await?;

        manager
            .drop_table(Table::drop().table(Posts::Table).to_owned())
            .await
    }
}
