// Configuration module.
// The config document is the only durable artifact: watched repos, lookback
// window, refresh interval, and the optional API token.

pub mod store;

pub use store::ConfigStore;

use serde::{Deserialize, Serialize};

use crate::error::{RelwatchError, Result};

/// Token prefixes GitHub currently issues. Advisory only; an unrecognized
/// prefix is logged, not rejected.
const KNOWN_TOKEN_PREFIXES: &[&str] = &["ghp_", "gho_", "github_pat_"];

fn default_lookback_days() -> u32 {
    30
}

fn default_refresh_interval_minutes() -> u64 {
    60
}

/// User-editable configuration, persisted as JSON after every mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Watched repositories as "owner/name" slugs, insertion order, unique.
    #[serde(default)]
    pub repos: Vec<String>,
    /// Releases older than this many days are hidden and pruned.
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
    /// Minutes between scheduled refreshes.
    #[serde(default = "default_refresh_interval_minutes")]
    pub refresh_interval_minutes: u64,
    /// Optional GitHub API token, stored as-is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repos: Vec::new(),
            lookback_days: default_lookback_days(),
            refresh_interval_minutes: default_refresh_interval_minutes(),
            token: None,
        }
    }
}

impl Config {
    /// Cutoff timestamp for the current lookback window.
    pub fn cutoff(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::Utc::now() - chrono::Duration::days(self.lookback_days as i64)
    }

    /// Add a normalized slug, rejecting duplicates.
    pub fn add_repo(&mut self, slug: &str) -> Result<()> {
        if self.repos.iter().any(|r| r == slug) {
            return Err(RelwatchError::DuplicateRepo(slug.to_string()));
        }
        self.repos.push(slug.to_string());
        Ok(())
    }

    /// Remove a slug. Returns true when it was present.
    pub fn remove_repo(&mut self, slug: &str) -> bool {
        let before = self.repos.len();
        self.repos.retain(|r| r != slug);
        self.repos.len() != before
    }

    /// Set the lookback window; zero is rejected.
    pub fn set_lookback_days(&mut self, days: u32) -> Result<()> {
        if days == 0 {
            return Err(RelwatchError::Other(
                "lookback window must be at least one day".to_string(),
            ));
        }
        self.lookback_days = days;
        Ok(())
    }

    /// Store a token (or clear it). The prefix check is advisory.
    pub fn set_token(&mut self, token: Option<String>) {
        if let Some(token) = token.as_deref()
            && !KNOWN_TOKEN_PREFIXES.iter().any(|p| token.starts_with(p))
        {
            tracing::warn!("token does not match a known GitHub token prefix");
        }
        self.token = token.filter(|t| !t.is_empty());
    }
}

/// Normalize user input into an "owner/name" slug. Accepts either a bare
/// slug or a GitHub URL (with optional `.git` suffix or trailing slash).
pub fn normalize_slug(input: &str) -> Result<String> {
    let mut s = input.trim();

    for prefix in ["https://github.com/", "http://github.com/", "github.com/"] {
        if let Some(rest) = s.strip_prefix(prefix) {
            s = rest;
            break;
        }
    }
    if let Some(rest) = s.strip_prefix("git@github.com:") {
        s = rest;
    }
    let s = s.trim_matches('/');
    let s = s.strip_suffix(".git").unwrap_or(s);

    let mut parts = s.split('/');
    let (Some(owner), Some(name), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(RelwatchError::InvalidRepo(input.to_string()));
    };
    if owner.is_empty() || name.is_empty() || !valid_segment(owner) || !valid_segment(name) {
        return Err(RelwatchError::InvalidRepo(input.to_string()));
    }

    Ok(format!("{}/{}", owner, name))
}

fn valid_segment(s: &str) -> bool {
    s.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_bare_slug() {
        assert_eq!(normalize_slug("acme/widget").unwrap(), "acme/widget");
        assert_eq!(normalize_slug("  acme/widget  ").unwrap(), "acme/widget");
    }

    #[test]
    fn test_normalize_urls() {
        assert_eq!(
            normalize_slug("https://github.com/acme/widget").unwrap(),
            "acme/widget"
        );
        assert_eq!(
            normalize_slug("https://github.com/acme/widget/").unwrap(),
            "acme/widget"
        );
        assert_eq!(
            normalize_slug("https://github.com/acme/widget.git").unwrap(),
            "acme/widget"
        );
        assert_eq!(
            normalize_slug("git@github.com:acme/widget.git").unwrap(),
            "acme/widget"
        );
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        assert!(normalize_slug("").is_err());
        assert!(normalize_slug("widget").is_err());
        assert!(normalize_slug("a/b/c").is_err());
        assert!(normalize_slug("acme/wid get").is_err());
    }

    #[test]
    fn test_add_repo_rejects_duplicates() {
        let mut config = Config::default();
        config.add_repo("acme/widget").unwrap();
        let err = config.add_repo("acme/widget").unwrap_err();
        assert!(matches!(err, RelwatchError::DuplicateRepo(_)));
        assert_eq!(config.repos.len(), 1);
    }

    #[test]
    fn test_remove_repo() {
        let mut config = Config::default();
        config.add_repo("acme/widget").unwrap();
        assert!(config.remove_repo("acme/widget"));
        assert!(!config.remove_repo("acme/widget"));
        assert!(config.repos.is_empty());
    }

    #[test]
    fn test_set_lookback_rejects_zero() {
        let mut config = Config::default();
        assert!(config.set_lookback_days(0).is_err());
        config.set_lookback_days(7).unwrap();
        assert_eq!(config.lookback_days, 7);
    }

    #[test]
    fn test_set_token_clears_empty() {
        let mut config = Config::default();
        config.set_token(Some("ghp_abc123".to_string()));
        assert!(config.token.is_some());
        config.set_token(Some(String::new()));
        assert!(config.token.is_none());
    }

    #[test]
    fn test_config_defaults_from_partial_json() {
        let config: Config = serde_json::from_str(r#"{"repos":["acme/widget"]}"#).unwrap();
        assert_eq!(config.lookback_days, 30);
        assert_eq!(config.refresh_interval_minutes, 60);
        assert!(config.token.is_none());
    }
}
