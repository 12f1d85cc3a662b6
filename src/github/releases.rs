// Release listing endpoint.
// Paginates through a repository's releases, stopping at the lookback cutoff,
// with conditional-request support to save quota.

use chrono::{DateTime, Utc};
use reqwest::header::ETAG;

use crate::error::{RelwatchError, Result};

use super::client::{Conditional, GitHubClient};
use super::types::{Release, Repository};

const PER_PAGE: usize = 100;

/// Result of fetching a repository's releases.
pub enum FetchOutcome {
    /// Fresh data: non-draft, non-prerelease releases newer than the cutoff,
    /// newest first, plus the etag of the first page.
    Fetched {
        releases: Vec<Release>,
        etag: Option<String>,
    },
    /// The conditional request reported no change; the caller keeps its
    /// cached list. Only valid while the lookback window is unchanged, so
    /// callers must re-filter against the current cutoff.
    NotModified,
}

impl GitHubClient {
    /// Fetch a repository, used to validate existence before adding it.
    /// A missing repo surfaces as [`RelwatchError::NotFound`] with the slug.
    pub async fn get_repo(&self, slug: &str) -> Result<Repository> {
        let response = self.get(&format!("/repos/{}", slug)).await.map_err(|e| {
            match e {
                RelwatchError::NotFound(_) => RelwatchError::NotFound(slug.to_string()),
                other => other,
            }
        })?;
        let repository: Repository = response.json().await?;
        Ok(repository)
    }

    /// Fetch releases for a repository, paginating until a release older
    /// than `cutoff` or an exhausted page. The cached `etag` is sent on the
    /// first page unless `force` is set.
    pub async fn get_releases(
        &self,
        slug: &str,
        cutoff: DateTime<Utc>,
        etag: Option<&str>,
        force: bool,
    ) -> Result<FetchOutcome> {
        let endpoint = format!("/repos/{}/releases", slug);
        let mut releases = Vec::new();
        let mut new_etag = None;

        for page in 1u32.. {
            let params = [
                ("page", page.to_string()),
                ("per_page", PER_PAGE.to_string()),
            ];
            // Only the first page participates in conditional caching.
            let conditional_etag = if page == 1 && !force { etag } else { None };
            let response = match self
                .get_conditional(&endpoint, &params, conditional_etag)
                .await
                .map_err(|e| match e {
                    RelwatchError::NotFound(_) => RelwatchError::NotFound(slug.to_string()),
                    other => other,
                })? {
                Conditional::NotModified => return Ok(FetchOutcome::NotModified),
                Conditional::Modified(response) => response,
            };

            if page == 1 {
                new_etag = response
                    .headers()
                    .get(ETAG)
                    .and_then(|v| v.to_str().ok())
                    .map(String::from);
            }

            let page_releases: Vec<Release> = response.json().await?;
            let page_len = page_releases.len();
            let reached_cutoff = collect_in_window(page_releases, cutoff, &mut releases);

            if reached_cutoff || page_len < PER_PAGE {
                break;
            }
        }

        Ok(FetchOutcome::Fetched {
            releases,
            etag: new_etag,
        })
    }
}

/// Append the in-window, non-draft, non-prerelease releases from one page to
/// `out`. Returns true when a release older than `cutoff` was seen, which
/// ends pagination (releases arrive newest first).
fn collect_in_window(page: Vec<Release>, cutoff: DateTime<Utc>, out: &mut Vec<Release>) -> bool {
    for release in page {
        let Some(published_at) = release.published_at else {
            // Unpublished entries (drafts) carry no timestamp; skip them
            // without treating them as a cutoff signal.
            continue;
        };
        if published_at < cutoff {
            return true;
        }
        if release.draft || release.prerelease {
            continue;
        }
        out.push(release);
    }
    false
}
