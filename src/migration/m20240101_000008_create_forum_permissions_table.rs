use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        db.execute_unprepared(
            "CREATE TABLE IF NOT EXISTS forum_permissions (
                id SERIAL PRIMARY KEY,
                user_id INTEGER REFERENCES users(id) ON DELETE CASCADE,
                anonymous_user BOOLEAN NOT NULL DEFAULT FALSE,
                forum_id INTEGER REFERENCES forums(id) ON DELETE CASCADE,
                codename VARCHAR(100) NOT NULL,
                has_perm BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                CHECK ((user_id IS NULL) = anonymous_user)
            )",
        )
        .await?;

        // NULL forum_id means a global grant; COALESCE keeps those unique as well
        db.execute_unprepared(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_forum_permissions_unique
                ON forum_permissions (COALESCE(user_id, 0), anonymous_user, COALESCE(forum_id, 0), codename)",
        )
        .await?;

        db.execute_unprepared(
            "CREATE INDEX IF NOT EXISTS idx_forum_permissions_user ON forum_permissions(user_id)",
        )
        .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared("DROP TABLE IF EXISTS forum_permissions")
            .await?;
        Ok(())
    }
}
