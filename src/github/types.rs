// GitHub API response types.
// Defines structs for deserializing GitHub REST API responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A published release as returned by the releases listing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
    pub id: u64,
    pub name: Option<String>,
    pub tag_name: String,
    pub published_at: Option<DateTime<Utc>>,
    pub body: Option<String>,
    pub draft: bool,
    pub prerelease: bool,
}

impl Release {
    /// Display title: the release name when set, otherwise the tag.
    pub fn title(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.tag_name,
        }
    }
}

/// Minimal repository payload, used only to validate existence on add.
#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    pub id: u64,
    pub full_name: String,
}

/// Request body for the markdown rendering endpoint.
#[derive(Debug, Serialize)]
pub struct MarkdownRequest<'a> {
    pub text: &'a str,
    pub mode: &'a str,
    pub context: &'a str,
}

/// Rate limit information from response headers.
#[derive(Debug, Clone, Copy, Default)]
pub struct RateLimit {
    pub limit: u64,
    pub remaining: u64,
    pub reset: u64,
}

impl RateLimit {
    /// Reset time as a UTC timestamp, when the header has been seen.
    pub fn reset_at(&self) -> Option<DateTime<Utc>> {
        if self.reset == 0 {
            return None;
        }
        DateTime::from_timestamp(self.reset as i64, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_prefers_name() {
        let release = Release {
            id: 1,
            name: Some("v1.0 – Big Bang".to_string()),
            tag_name: "v1.0.0".to_string(),
            published_at: None,
            body: None,
            draft: false,
            prerelease: false,
        };
        assert_eq!(release.title(), "v1.0 – Big Bang");
    }

    #[test]
    fn test_title_falls_back_to_tag() {
        let release = Release {
            id: 2,
            name: Some(String::new()),
            tag_name: "v2.0.0".to_string(),
            published_at: None,
            body: None,
            draft: false,
            prerelease: false,
        };
        assert_eq!(release.title(), "v2.0.0");
    }

    #[test]
    fn test_release_deserializes_from_api_shape() {
        let json = r#"{
            "id": 42,
            "name": null,
            "tag_name": "v0.3.1",
            "published_at": "2024-05-01T12:00:00Z",
            "body": "Bug fixes",
            "draft": false,
            "prerelease": true,
            "html_url": "https://github.com/acme/widget/releases/tag/v0.3.1"
        }"#;
        let release: Release = serde_json::from_str(json).unwrap();
        assert_eq!(release.id, 42);
        assert!(release.prerelease);
        assert!(release.published_at.is_some());
    }
}
