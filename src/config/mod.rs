pub mod auth;
pub mod database;
pub mod jwt;
pub mod rate_limit;
pub mod redis;

use std::env;

/// Reads a boolean flag such as `1`, `yes` or `off`; anything else falls back
/// to `default`.
pub fn parse_bool_env(var_name: &str, default: bool) -> bool {
    env::var(var_name)
        .ok()
        .and_then(|value| match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "y" | "on" => Some(true),
            "0" | "false" | "no" | "n" | "off" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}
