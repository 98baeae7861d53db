use crate::{
    error::{AppError, AppResult},
    models::{forum_profile, refresh_token, user, RefreshToken, User, UserModel},
    utils::{encode_access_token, encode_refresh_token, hash_password, verify_password},
};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, ConnectionTrait,
    DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, TransactionTrait,
};

/// Access token, refresh token.
pub type TokenPair = (String, String);

/// Logins accept either the username or the email address.
fn login_condition(identifier: &str) -> Condition {
    let identifier = identifier.trim();
    if identifier.contains('@') {
        Condition::all().add(user::Column::Email.eq(identifier.to_ascii_lowercase()))
    } else {
        Condition::all().add(user::Column::Username.eq(identifier))
    }
}

pub struct AuthService {
    db: DatabaseConnection,
}

impl AuthService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create the account together with its forum profile.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> AppResult<(UserModel, TokenPair)> {
        let email = email.trim().to_ascii_lowercase();
        if self.user_exists(username, &email).await? {
            return Err(AppError::Conflict(
                "Username or email already exists".to_string(),
            ));
        }

        let password_hash = hash_password(password)?;
        let now = chrono::Utc::now().naive_utc();

        let txn = self.db.begin().await?;

        let user = user::ActiveModel {
            username: Set(username.to_string()),
            email: Set(email),
            password_hash: Set(password_hash),
            role: Set("user".to_string()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        forum_profile::ActiveModel {
            user_id: Set(user.id),
            posts_count: Set(0),
            signature: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let tokens = self.issue_tokens(&txn, user.id).await?;
        txn.commit().await?;

        tracing::info!(user_id = user.id, "User registered");
        Ok((user, tokens))
    }

    pub async fn login(&self, identifier: &str, password: &str) -> AppResult<(UserModel, TokenPair)> {
        let user = User::find()
            .filter(login_condition(identifier))
            .one(&self.db)
            .await?
            .ok_or(AppError::Unauthorized)?;

        if !verify_password(password, &user.password_hash)? {
            return Err(AppError::Unauthorized);
        }
        if user.is_banned() {
            return Err(AppError::Forbidden);
        }

        let tokens = self.issue_tokens(&self.db, user.id).await?;
        Ok((user, tokens))
    }

    /// Swap a stored refresh token for a fresh pair. The old one is consumed.
    pub async fn rotate_refresh_token(
        &self,
        user_id: i32,
        current_refresh_token: &str,
    ) -> AppResult<TokenPair> {
        let token_hash = crate::utils::jwt::hash_refresh_token(current_refresh_token);
        let now = chrono::Utc::now().naive_utc();

        let existing = RefreshToken::find()
            .filter(refresh_token::Column::UserId.eq(user_id))
            .filter(refresh_token::Column::Token.eq(token_hash))
            .one(&self.db)
            .await?
            .ok_or(AppError::Unauthorized)?;

        if existing.expires_at <= now {
            RefreshToken::delete_by_id(existing.id).exec(&self.db).await?;
            return Err(AppError::Unauthorized);
        }

        let txn = self.db.begin().await?;
        RefreshToken::delete_by_id(existing.id).exec(&txn).await?;
        let tokens = self.issue_tokens(&txn, user_id).await?;
        txn.commit().await?;
        Ok(tokens)
    }

    pub async fn revoke_refresh_token(&self, refresh_token: &str) -> AppResult<()> {
        let token_hash = crate::utils::jwt::hash_refresh_token(refresh_token);
        RefreshToken::delete_many()
            .filter(refresh_token::Column::Token.eq(token_hash))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    pub async fn get_user_by_id(&self, id: i32) -> AppResult<UserModel> {
        User::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)
    }

    /// Also signs the user out everywhere else.
    pub async fn change_password(
        &self,
        user_id: i32,
        current_password: &str,
        new_password: &str,
    ) -> AppResult<()> {
        let user = self.get_user_by_id(user_id).await?;
        if !verify_password(current_password, &user.password_hash)? {
            return Err(AppError::Validation(
                "Current password is incorrect".to_string(),
            ));
        }

        let txn = self.db.begin().await?;
        let mut active: user::ActiveModel = user.into();
        active.password_hash = Set(hash_password(new_password)?);
        active.updated_at = Set(chrono::Utc::now().naive_utc());
        active.update(&txn).await?;
        RefreshToken::delete_many()
            .filter(refresh_token::Column::UserId.eq(user_id))
            .exec(&txn)
            .await?;
        txn.commit().await?;
        Ok(())
    }

    async fn user_exists(&self, username: &str, email: &str) -> AppResult<bool> {
        let count = User::find()
            .filter(
                Condition::any()
                    .add(user::Column::Username.eq(username))
                    .add(user::Column::Email.eq(email)),
            )
            .count(&self.db)
            .await?;
        Ok(count > 0)
    }

    async fn issue_tokens<C: ConnectionTrait>(&self, conn: &C, user_id: i32) -> AppResult<TokenPair> {
        let subject = user_id.to_string();
        let access_token = encode_access_token(&subject)?;
        let refresh_token = encode_refresh_token(&subject)?;

        let now = chrono::Utc::now().naive_utc();
        let expires_at = now
            + chrono::Duration::seconds(crate::utils::jwt::refresh_token_expiry_seconds() as i64);

        refresh_token::ActiveModel {
            user_id: Set(user_id),
            token: Set(crate::utils::jwt::hash_refresh_token(&refresh_token)),
            expires_at: Set(expires_at),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(conn)
        .await?;

        Ok((access_token, refresh_token))
    }
}
