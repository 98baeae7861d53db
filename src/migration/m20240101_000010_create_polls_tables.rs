use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        db.execute_unprepared(
            "CREATE TABLE IF NOT EXISTS topic_polls (
                id SERIAL PRIMARY KEY,
                topic_id INTEGER NOT NULL UNIQUE REFERENCES topics(id) ON DELETE CASCADE,
                question VARCHAR(255) NOT NULL,
                duration INTEGER CHECK (duration IS NULL OR duration > 0),
                max_options SMALLINT NOT NULL DEFAULT 1 CHECK (max_options BETWEEN 1 AND 10),
                user_changes BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )",
        )
        .await?;

        db.execute_unprepared(
            "CREATE TABLE IF NOT EXISTS topic_poll_options (
                id SERIAL PRIMARY KEY,
                poll_id INTEGER NOT NULL REFERENCES topic_polls(id) ON DELETE CASCADE,
                text VARCHAR(255) NOT NULL
            )",
        )
        .await?;

        db.execute_unprepared(
            "CREATE TABLE IF NOT EXISTS topic_poll_votes (
                id SERIAL PRIMARY KEY,
                poll_option_id INTEGER NOT NULL REFERENCES topic_poll_options(id) ON DELETE CASCADE,
                voter_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                timestamp TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )",
        )
        .await?;

        db.execute_unprepared(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_topic_poll_votes_pair
                ON topic_poll_votes(poll_option_id, voter_id)",
        )
        .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared("DROP TABLE IF EXISTS topic_poll_votes")
            .await?;
        db.execute_unprepared("DROP TABLE IF EXISTS topic_poll_options")
            .await?;
        db.execute_unprepared("DROP TABLE IF EXISTS topic_polls")
            .await?;
        Ok(())
    }
}
