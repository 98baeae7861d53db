use anyhow::Result;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

use crate::config::jwt::JwtConfig;

static JWT_CONFIG: OnceLock<JwtConfig> = OnceLock::new();

/// Must be called once at startup, before any token is issued or checked.
pub fn init_jwt_config(config: JwtConfig) -> Result<()> {
    JWT_CONFIG
        .set(config)
        .map_err(|_| anyhow::anyhow!("JWT config already initialized"))?;
    Ok(())
}

fn get_config() -> Result<&'static JwtConfig> {
    JWT_CONFIG
        .get()
        .ok_or_else(|| anyhow::anyhow!("JWT config not initialized"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
    /// Unique per token, so two tokens minted in the same second differ.
    pub jti: String,
    pub token_type: TokenKind,
}

impl Claims {
    pub fn user_id(&self) -> Option<i32> {
        self.sub.parse().ok()
    }
}

fn encode_token(user_id: &str, kind: TokenKind) -> Result<String> {
    let config = get_config()?;
    let ttl = match kind {
        TokenKind::Access => config.access_token_expiry,
        TokenKind::Refresh => config.refresh_token_expiry,
    };
    let now = chrono::Utc::now().timestamp() as usize;
    let claims = Claims {
        sub: user_id.to_owned(),
        exp: now + ttl as usize,
        iat: now,
        jti: uuid::Uuid::new_v4().to_string(),
        token_type: kind,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
    .map_err(|e| anyhow::anyhow!("Failed to encode {:?} token: {}", kind, e))
}

pub fn encode_access_token(user_id: &str) -> Result<String> {
    encode_token(user_id, TokenKind::Access)
}

pub fn encode_refresh_token(user_id: &str) -> Result<String> {
    encode_token(user_id, TokenKind::Refresh)
}

pub fn decode_jwt(token: &str) -> Result<Claims> {
    let config = get_config()?;
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| anyhow::anyhow!("Failed to decode JWT: {}", e))
}

pub fn is_access_token(claims: &Claims) -> bool {
    claims.token_type == TokenKind::Access
}

pub fn is_refresh_token(claims: &Claims) -> bool {
    claims.token_type == TokenKind::Refresh
}

/// Refresh tokens are stored hashed so a leaked table cannot be replayed.
pub fn hash_refresh_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

pub fn access_token_expiry_seconds() -> u64 {
    get_config().map(|c| c.access_token_expiry).unwrap_or(900)
}

pub fn refresh_token_expiry_seconds() -> u64 {
    get_config().map(|c| c.refresh_token_expiry).unwrap_or(604_800)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Once;

    static INIT: Once = Once::new();

    fn ensure_config() {
        INIT.call_once(|| {
            let _ = init_jwt_config(JwtConfig {
                secret: "a_very_long_secret_key_that_is_at_least_32_chars".to_string(),
                access_token_expiry: 900,
                refresh_token_expiry: 604_800,
            });
        });
    }

    #[test]
    fn access_token_carries_user_and_kind() {
        ensure_config();
        let token = encode_access_token("42").unwrap();
        let claims = decode_jwt(&token).unwrap();
        assert_eq!(claims.user_id(), Some(42));
        assert!(is_access_token(&claims));
        assert!(!is_refresh_token(&claims));
    }

    #[test]
    fn refresh_token_outlives_access_token() {
        ensure_config();
        let access = decode_jwt(&encode_access_token("7").unwrap()).unwrap();
        let refresh = decode_jwt(&encode_refresh_token("7").unwrap()).unwrap();
        assert!(is_refresh_token(&refresh));
        assert!(refresh.exp > access.exp);
    }

    #[test]
    fn tokens_minted_together_differ() {
        ensure_config();
        assert_ne!(
            encode_refresh_token("7").unwrap(),
            encode_refresh_token("7").unwrap()
        );
    }

    #[test]
    fn tampered_token_fails() {
        ensure_config();
        let token = encode_access_token("42").unwrap();
        let mut chars: Vec<char> = token.chars().collect();
        let mid = chars.len() / 2;
        chars[mid] = if chars[mid] == 'A' { 'B' } else { 'A' };
        let tampered: String = chars.into_iter().collect();
        assert!(decode_jwt(&tampered).is_err());
    }

    #[test]
    fn expired_token_fails() {
        ensure_config();
        let config = get_config().unwrap();
        let now = chrono::Utc::now().timestamp() as usize;
        let claims = Claims {
            sub: "42".to_string(),
            exp: now - 3600,
            iat: now - 7200,
            jti: "expired".to_string(),
            token_type: TokenKind::Access,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.secret.as_bytes()),
        )
        .unwrap();
        assert!(decode_jwt(&token).is_err());
    }

    #[test]
    fn refresh_hash_is_stable_hex() {
        let a = hash_refresh_token("abc");
        assert_eq!(a, hash_refresh_token("abc"));
        assert_ne!(a, hash_refresh_token("abd"));
        assert_eq!(a.len(), 64);
    }
}
