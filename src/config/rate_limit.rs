use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRule {
    pub per_second: u64,
    pub burst_size: u32,
}

impl RateLimitRule {
    const fn new(per_second: u64, burst_size: u32) -> Self {
        Self {
            per_second,
            burst_size,
        }
    }
}

impl FromStr for RateLimitRule {
    type Err = String;

    /// Parses `per_second:burst`, e.g. `10:20`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (per_second, burst) = raw
            .split_once(':')
            .ok_or_else(|| format!("invalid rule '{}', expected per:burst", raw))?;

        let per_second: u64 = per_second
            .trim()
            .parse()
            .map_err(|_| format!("invalid per_second '{}'", per_second.trim()))?;
        let burst_size: u32 = burst
            .trim()
            .parse()
            .map_err(|_| format!("invalid burst_size '{}'", burst.trim()))?;

        if per_second == 0 || burst_size == 0 {
            return Err("per_second and burst_size must be > 0".to_string());
        }

        Ok(Self::new(per_second, burst_size))
    }
}

/// Route groups that get their own governor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteGroup {
    Auth,
    PublicRead,
    Protected,
}

impl FromStr for RouteGroup {
    type Err = String;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.trim().to_ascii_lowercase().as_str() {
            "auth" => Ok(Self::Auth),
            "public" | "public_read" | "public-read" => Ok(Self::PublicRead),
            "protected" => Ok(Self::Protected),
            other => Err(format!(
                "unknown group '{}', expected auth/public/protected",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub auth: RateLimitRule,
    pub public_read: RateLimitRule,
    pub protected: RateLimitRule,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auth: RateLimitRule::new(5, 10),
            public_read: RateLimitRule::new(30, 60),
            protected: RateLimitRule::new(10, 20),
        }
    }
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.enabled = super::parse_bool_env("RATE_LIMIT_ENABLED", cfg.enabled);

        if let Ok(raw) = env::var("RATE_LIMIT_CONFIG") {
            if let Err(err) = cfg.apply(&raw) {
                tracing::warn!("Invalid RATE_LIMIT_CONFIG '{}': {}", raw, err);
            }
        }

        cfg
    }

    pub fn rule_for(&self, group: RouteGroup) -> RateLimitRule {
        match group {
            RouteGroup::Auth => self.auth,
            RouteGroup::PublicRead => self.public_read,
            RouteGroup::Protected => self.protected,
        }
    }

    fn set(&mut self, group: RouteGroup, rule: RateLimitRule) {
        match group {
            RouteGroup::Auth => self.auth = rule,
            RouteGroup::PublicRead => self.public_read = rule,
            RouteGroup::Protected => self.protected = rule,
        }
    }

    /// Accepts either a single `per:burst` applied to every group, or a
    /// comma list such as `auth=5:10,public=30:60`. Nothing is applied
    /// unless the whole value parses.
    fn apply(&mut self, raw: &str) -> Result<(), String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err("empty value".to_string());
        }

        if !trimmed.contains('=') {
            let rule: RateLimitRule = trimmed.parse()?;
            for group in [RouteGroup::Auth, RouteGroup::PublicRead, RouteGroup::Protected] {
                self.set(group, rule);
            }
            return Ok(());
        }

        let mut parsed = Vec::new();
        for item in trimmed.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (name, rule) = item
                .split_once('=')
                .ok_or_else(|| format!("invalid item '{}', expected name=per:burst", item))?;
            parsed.push((name.parse::<RouteGroup>()?, rule.trim().parse::<RateLimitRule>()?));
        }
        for (group, rule) in parsed {
            self.set(group, rule);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_rule_applies_to_every_group() {
        let mut cfg = RateLimitConfig::default();
        cfg.apply("12:24").unwrap();
        assert_eq!(cfg.auth, RateLimitRule::new(12, 24));
        assert_eq!(cfg.protected, RateLimitRule::new(12, 24));
    }

    #[test]
    fn grouped_rules_only_touch_named_groups() {
        let mut cfg = RateLimitConfig::default();
        cfg.apply("auth=1:2, public-read=3:4").unwrap();
        assert_eq!(cfg.rule_for(RouteGroup::Auth), RateLimitRule::new(1, 2));
        assert_eq!(cfg.rule_for(RouteGroup::PublicRead), RateLimitRule::new(3, 4));
        assert_eq!(cfg.rule_for(RouteGroup::Protected), RateLimitRule::new(10, 20));
    }

    #[test]
    fn bad_item_leaves_config_untouched() {
        let mut cfg = RateLimitConfig::default();
        let err = cfg.apply("auth=1:2,moderation=3:4").unwrap_err();
        assert!(err.contains("unknown group"));
        assert_eq!(cfg.auth, RateLimitRule::new(5, 10));
    }

    #[test]
    fn zero_rate_is_rejected() {
        assert!("0:5".parse::<RateLimitRule>().is_err());
        assert!("abc".parse::<RateLimitRule>().is_err());
    }
}
