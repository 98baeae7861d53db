use crate::{
    error::{AppError, AppResult},
    models::{User, UserModel},
    utils::{
        cookie::{extract_cookie, ACCESS_TOKEN_COOKIE},
        jwt::{decode_jwt, is_access_token},
    },
};
use axum::{
    extract::{FromRequestParts, Request},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
    Extension,
};
use sea_orm::{DatabaseConnection, EntityTrait};

/// The authenticated caller, resolved from the access token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i32,
    pub role: String,
}

impl AuthUser {
    pub fn is_superuser(&self) -> bool {
        self.role == "admin"
    }

    pub fn is_staff(&self) -> bool {
        self.role == "admin" || self.role == "moderator"
    }
}

impl From<&UserModel> for AuthUser {
    fn from(user: &UserModel) -> Self {
        Self {
            user_id: user.id,
            role: user.role.clone(),
        }
    }
}

/// Caller on public routes: `None` for anonymous visitors.
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<AuthUser>);

/// Rejects the request unless a valid access token for a non-banned user is
/// presented (Authorization header first, then the HttpOnly cookie).
pub async fn auth_middleware(
    Extension(db): Extension<DatabaseConnection>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token(&headers).ok_or(AppError::Unauthorized)?;
    let auth_user = resolve_user(&db, &token).await?;
    request.extensions_mut().insert(auth_user);
    Ok(next.run(request).await)
}

/// Attaches the caller when a usable token is present; anonymous otherwise.
/// A banned account is still refused.
pub async fn optional_auth_middleware(
    Extension(db): Extension<DatabaseConnection>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let caller = match extract_token(&headers) {
        Some(token) => match resolve_user(&db, &token).await {
            Ok(user) => Some(user),
            Err(AppError::Forbidden) => return Err(AppError::Forbidden),
            Err(_) => None,
        },
        None => None,
    };
    request.extensions_mut().insert(MaybeAuthUser(caller));
    Ok(next.run(request).await)
}

fn extract_token(headers: &HeaderMap) -> Option<String> {
    extract_bearer_token(headers).or_else(|| extract_cookie(headers, ACCESS_TOKEN_COOKIE))
}

async fn resolve_user(db: &DatabaseConnection, token: &str) -> AppResult<AuthUser> {
    let claims = decode_jwt(token).map_err(|_| AppError::Unauthorized)?;
    if !is_access_token(&claims) {
        return Err(AppError::Unauthorized);
    }
    let user_id = claims.user_id().ok_or(AppError::Unauthorized)?;

    let user = User::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or(AppError::Unauthorized)?;

    if user.is_banned() {
        return Err(AppError::Forbidden);
    }

    Ok(AuthUser::from(&user))
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let auth_header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())?;
    let token = auth_header.strip_prefix("Bearer ")?;
    (!token.is_empty()).then(|| token.to_string())
}

/// Forum-tree management is open to admins and moderators.
pub fn require_staff(auth_user: &AuthUser) -> AppResult<i32> {
    if !auth_user.is_staff() {
        return Err(AppError::Forbidden);
    }
    Ok(auth_user.user_id)
}

pub fn require_admin(auth_user: &AuthUser) -> AppResult<i32> {
    if !auth_user.is_superuser() {
        return Err(AppError::Forbidden);
    }
    Ok(auth_user.user_id)
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}

impl<S> FromRequestParts<S> for MaybeAuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Protected routes insert a plain AuthUser instead.
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(MaybeAuthUser(Some(user.clone())));
        }
        Ok(parts
            .extensions
            .get::<MaybeAuthUser>()
            .cloned()
            .unwrap_or(MaybeAuthUser(None)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn user(role: &str) -> AuthUser {
        AuthUser {
            user_id: 3,
            role: role.to_string(),
        }
    }

    #[test]
    fn moderators_are_staff_but_not_superusers() {
        assert!(require_staff(&user("moderator")).is_ok());
        assert!(matches!(
            require_admin(&user("moderator")),
            Err(AppError::Forbidden)
        ));
        assert!(require_admin(&user("admin")).is_ok());
        assert!(require_staff(&user("user")).is_err());
    }

    #[test]
    fn bearer_prefix_is_required() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Token abc"),
        );
        assert!(extract_bearer_token(&headers).is_none());

        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc"),
        );
        assert_eq!(extract_bearer_token(&headers).as_deref(), Some("abc"));
    }
}
