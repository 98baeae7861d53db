use sea_orm_migration::prelude::*;

mod m20240101_000001_create_users_table;
mod m20240101_000002_create_forums_table;
mod m20240101_000003_create_topics_table;
mod m20240101_000004_create_posts_table;
mod m20240101_000005_create_attachments_table;
mod m20240101_000006_create_forum_profiles_table;
mod m20240101_000007_create_read_tracks_tables;
mod m20240101_000008_create_forum_permissions_table;
mod m20240101_000009_create_refresh_tokens;
mod m20240101_000010_create_polls_tables;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_users_table::Migration),
            Box::new(m20240101_000002_create_forums_table::Migration),
            Box::new(m20240101_000003_create_topics_table::Migration),
            Box::new(m20240101_000004_create_posts_table::Migration),
            Box::new(m20240101_000005_create_attachments_table::Migration),
            Box::new(m20240101_000006_create_forum_profiles_table::Migration),
            Box::new(m20240101_000007_create_read_tracks_tables::Migration),
            Box::new(m20240101_000008_create_forum_permissions_table::Migration),
            Box::new(m20240101_000009_create_refresh_tokens::Migration),
            Box::new(m20240101_000010_create_polls_tables::Migration),
        ]
    }
}
