use axum::http::{header, HeaderMap};
use std::{env, sync::OnceLock};

use crate::config::parse_bool_env;

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";

#[derive(Debug, Clone)]
struct AuthCookieConfig {
    secure: bool,
    same_site: &'static str,
    domain: Option<String>,
}

impl AuthCookieConfig {
    fn from_env() -> Self {
        let same_site = match env::var("AUTH_COOKIE_SAMESITE")
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
            .as_str()
        {
            "strict" => "Strict",
            "none" => "None",
            _ => "Lax",
        };
        let domain = env::var("AUTH_COOKIE_DOMAIN")
            .ok()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        // SameSite=None is only accepted by browsers together with Secure.
        let secure = same_site == "None" || parse_bool_env("AUTH_COOKIE_SECURE", false);

        Self {
            secure,
            same_site,
            domain,
        }
    }

    fn render(&self, name: &str, value: &str, max_age_seconds: u64, expired: bool) -> String {
        let mut cookie = format!("{name}={value}; Path=/; Max-Age={max_age_seconds}");
        if expired {
            cookie.push_str("; Expires=Thu, 01 Jan 1970 00:00:00 GMT");
        }
        cookie.push_str("; HttpOnly; SameSite=");
        cookie.push_str(self.same_site);
        if self.secure {
            cookie.push_str("; Secure");
        }
        if let Some(domain) = &self.domain {
            cookie.push_str("; Domain=");
            cookie.push_str(domain);
        }
        cookie
    }
}

fn auth_cookie_config() -> &'static AuthCookieConfig {
    static CONFIG: OnceLock<AuthCookieConfig> = OnceLock::new();
    CONFIG.get_or_init(AuthCookieConfig::from_env)
}

pub fn build_auth_cookie(name: &str, value: &str, max_age_seconds: u64) -> String {
    auth_cookie_config().render(name, value, max_age_seconds, false)
}

pub fn build_clear_cookie(name: &str) -> String {
    auth_cookie_config().render(name, "", 0, true)
}

pub fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookie_header| cookie_header.split(';'))
        .find_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key.trim() == name).then(|| value.trim().to_string())
        })
}
