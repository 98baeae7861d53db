use std::collections::HashSet;
use std::env;
use std::sync::OnceLock;

/// Codenames granted to any authenticated member when no per-forum or global
/// row decides otherwise. Moderation codenames are left out.
pub const DEFAULT_AUTHENTICATED_PERMISSIONS: &[&str] = &[
    "can_see_forum",
    "can_read_forum",
    "can_start_new_topics",
    "can_reply_to_topics",
    "can_edit_own_posts",
    "can_post_without_approval",
    "can_create_polls",
    "can_vote_in_polls",
    "can_attach_file",
    "can_download_file",
    "can_delete_own_posts",
];

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub default_authenticated_permissions: HashSet<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            default_authenticated_permissions: DEFAULT_AUTHENTICATED_PERMISSIONS
                .iter()
                .map(|c| c.to_string())
                .collect(),
        }
    }
}

impl AuthConfig {
    pub fn from_env() -> Self {
        match env::var("DEFAULT_AUTHENTICATED_USER_FORUM_PERMISSIONS") {
            Ok(raw) => Self {
                default_authenticated_permissions: parse_codename_list(&raw),
            },
            Err(_) => Self::default(),
        }
    }
}

/// Process-wide configuration, read from the environment on first use.
pub fn auth_config() -> &'static AuthConfig {
    static CONFIG: OnceLock<AuthConfig> = OnceLock::new();
    CONFIG.get_or_init(AuthConfig::from_env)
}

fn parse_codename_list(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_set_leaves_out_moderation() {
        let cfg = AuthConfig::default();
        assert!(cfg.default_authenticated_permissions.contains("can_read_forum"));
        assert!(!cfg.default_authenticated_permissions.contains("can_lock_topics"));
        assert!(!cfg.default_authenticated_permissions.contains("can_approve_posts"));
    }

    #[test]
    fn codename_list_ignores_blanks() {
        let parsed = parse_codename_list(" can_see_forum, ,can_read_forum,");
        assert_eq!(parsed.len(), 2);
        assert!(parsed.contains("can_see_forum"));
    }

    #[test]
    fn empty_list_grants_nothing() {
        assert!(parse_codename_list("").is_empty());
    }
}
