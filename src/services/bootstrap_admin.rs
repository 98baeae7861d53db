use crate::config::parse_bool_env;
use crate::error::AppResult;
use crate::models::{forum_profile, user, ForumProfile, User};
use crate::utils::hash_password;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, DatabaseConnection, EntityTrait,
    QueryFilter, TransactionTrait,
};
use std::env;

#[derive(Debug, Clone)]
pub struct BootstrapAdminConfig {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl BootstrapAdminConfig {
    pub fn from_env() -> Option<Self> {
        if !parse_bool_env("BOOTSTRAP_ADMIN_ENABLED", false) {
            return None;
        }

        Some(Self {
            username: env::var("BOOTSTRAP_ADMIN_USERNAME").ok()?,
            email: env::var("BOOTSTRAP_ADMIN_EMAIL").ok()?.to_ascii_lowercase(),
            password: env::var("BOOTSTRAP_ADMIN_PASSWORD").ok()?,
        })
    }
}

/// Make sure a superuser exists at startup.
///
/// Nothing happens when an admin is already present. A configured user that
/// already exists is promoted; otherwise a new admin is created.
pub async fn ensure_bootstrap_admin(db: &DatabaseConnection) -> AppResult<()> {
    let Some(cfg) = BootstrapAdminConfig::from_env() else {
        return Ok(());
    };

    let admin_exists = User::find()
        .filter(user::Column::Role.eq("admin"))
        .one(db)
        .await?
        .is_some();
    if admin_exists {
        return Ok(());
    }

    let existing = User::find()
        .filter(
            Condition::any()
                .add(user::Column::Email.eq(cfg.email.clone()))
                .add(user::Column::Username.eq(cfg.username.clone())),
        )
        .one(db)
        .await?;

    let now = chrono::Utc::now().naive_utc();
    let txn = db.begin().await?;

    let admin = match existing {
        Some(found) => {
            let mut active: user::ActiveModel = found.into();
            active.role = Set("admin".to_string());
            active.updated_at = Set(now);
            active.update(&txn).await?
        }
        None => {
            user::ActiveModel {
                username: Set(cfg.username),
                email: Set(cfg.email),
                password_hash: Set(hash_password(&cfg.password)?),
                role: Set("admin".to_string()),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            }
            .insert(&txn)
            .await?
        }
    };

    if ForumProfile::find_by_id(admin.id).one(&txn).await?.is_none() {
        forum_profile::ActiveModel {
            user_id: Set(admin.id),
            posts_count: Set(0),
            signature: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;
    }

    txn.commit().await?;
    tracing::info!(user_id = admin.id, username = %admin.username, "Bootstrap admin ready");
    Ok(())
}
