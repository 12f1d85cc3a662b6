// In-memory release cache.
// Holds per-repository releases, the conditional-request etag, and rendered
// HTML keyed by release id. Process-lifetime only; rebuilt from the API if
// lost.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::github::Release;

/// Cached state for one repository.
#[derive(Debug, Clone, Default)]
pub struct CacheEntry {
    /// Etag of the last successful first-page fetch.
    pub etag: Option<String>,
    /// In-window, non-draft, non-prerelease releases, newest first.
    pub releases: Vec<Release>,
    /// Rendered HTML by release id. Keys are always a subset of `releases`.
    pub rendered_html: HashMap<u64, String>,
}

/// Per-repository release cache, keyed by "owner/name" slug.
///
/// Created once at startup and owned by the refresh engine; mutated by at
/// most one refresh at a time (the engine serializes refreshes).
#[derive(Debug, Default)]
pub struct ReleaseCache {
    entries: HashMap<String, CacheEntry>,
}

impl ReleaseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current entry for a repo, if any.
    pub fn get(&self, repo: &str) -> Option<&CacheEntry> {
        self.entries.get(repo)
    }

    /// Replace a repo's releases and etag. Rendered HTML for release ids
    /// still present is preserved; HTML for dropped releases is discarded.
    pub fn upsert(&mut self, repo: &str, etag: Option<String>, releases: Vec<Release>) {
        let entry = self.entries.entry(repo.to_string()).or_default();
        entry.etag = etag;
        entry
            .rendered_html
            .retain(|id, _| releases.iter().any(|r| r.id == *id));
        entry.releases = releases;
    }

    /// Store rendered HTML for one release. Ignored when the repo is not
    /// cached or the release is no longer present, so a delayed render
    /// landing after a prune cannot violate the subset invariant.
    pub fn set_rendered(&mut self, repo: &str, release_id: u64, html: String) {
        if let Some(entry) = self.entries.get_mut(repo)
            && entry.releases.iter().any(|r| r.id == release_id)
        {
            entry.rendered_html.insert(release_id, html);
        }
    }

    /// Drop one repo's releases (and their rendered HTML) older than
    /// `cutoff`, leaving other repos untouched. Used when a conditional
    /// fetch reports no change but the window may have shrunk.
    pub fn retain_window(&mut self, repo: &str, cutoff: DateTime<Utc>) {
        if let Some(entry) = self.entries.get_mut(repo) {
            entry
                .releases
                .retain(|r| r.published_at.is_some_and(|at| at >= cutoff));
            let releases = &entry.releases;
            entry
                .rendered_html
                .retain(|id, _| releases.iter().any(|r| r.id == *id));
        }
    }

    /// Drop entries for repos not in `known_repos`, then drop releases (and
    /// their rendered HTML) older than `cutoff`. Idempotent.
    pub fn prune(&mut self, known_repos: &[String], cutoff: DateTime<Utc>) {
        self.entries.retain(|repo, _| known_repos.contains(repo));
        for entry in self.entries.values_mut() {
            entry
                .releases
                .retain(|r| r.published_at.is_some_and(|at| at >= cutoff));
            let releases = &entry.releases;
            entry
                .rendered_html
                .retain(|id, _| releases.iter().any(|r| r.id == *id));
        }
    }

    /// Number of cached repos.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
