// Presentation builder.
// Turns cache + config into view data: per-repo release lists with
// breaking-change flags, counts, and the global rate-limit banner state.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::cache::ReleaseCache;
use crate::config::Config;
use crate::refresh::RefreshResult;
use crate::render::fallback_html;

/// Case-insensitive substrings that flag a release as potentially
/// disruptive.
const BREAKING_KEYWORDS: &[&str] =
    &["breaking change", "breaking changes", "caution", "important"];

/// One release, ready for display.
#[derive(Debug, Clone)]
pub struct ReleaseView {
    pub title: String,
    pub published_at: Option<DateTime<Utc>>,
    pub html: String,
    pub flagged: bool,
}

/// One repo's feed. `error` is set when the last refresh failed, so the
/// page can show a placeholder instead of a silent gap.
#[derive(Debug, Clone)]
pub struct RepoView {
    pub repo: String,
    pub releases: Vec<ReleaseView>,
    pub release_count: usize,
    pub breaking_count: usize,
    pub error: Option<String>,
}

/// The whole dashboard, risky repos first.
#[derive(Debug, Clone)]
pub struct DashboardView {
    pub repos: Vec<RepoView>,
    pub rate_limit_hit: bool,
    pub last_update: Option<DateTime<Utc>>,
}

/// Whether a release body mentions a breaking-change keyword.
pub fn is_flagged(body: &str) -> bool {
    let body = body.to_lowercase();
    BREAKING_KEYWORDS.iter().any(|kw| body.contains(kw))
}

/// Build the view model from the current cache and refresh state.
pub fn build(
    config: &Config,
    cache: &ReleaseCache,
    statuses: &HashMap<String, RefreshResult>,
    rate_limit_hit: bool,
    last_update: Option<DateTime<Utc>>,
) -> DashboardView {
    let cutoff = config.cutoff();

    let mut repos: Vec<RepoView> = config
        .repos
        .iter()
        .map(|slug| build_repo(slug, cache, statuses, cutoff))
        .collect();

    // Risky first: more flagged releases, then more releases overall. The
    // sort is stable, so ties keep config order.
    repos.sort_by(|a, b| {
        b.breaking_count
            .cmp(&a.breaking_count)
            .then(b.release_count.cmp(&a.release_count))
    });

    DashboardView {
        repos,
        rate_limit_hit,
        last_update,
    }
}

fn build_repo(
    slug: &str,
    cache: &ReleaseCache,
    statuses: &HashMap<String, RefreshResult>,
    cutoff: DateTime<Utc>,
) -> RepoView {
    let error = match statuses.get(slug) {
        Some(RefreshResult::Failure { reason }) => Some(reason.clone()),
        Some(RefreshResult::RateLimited { reset_at }) => {
            Some(format!("rate limited until {}", reset_at.format("%H:%M:%S")))
        }
        _ => None,
    };

    let mut releases: Vec<ReleaseView> = cache
        .get(slug)
        .map(|entry| {
            entry
                .releases
                .iter()
                // The cache holds in-window releases, but the window can
                // shrink between refreshes; filter at view time too.
                .filter(|r| r.published_at.is_some_and(|at| at >= cutoff))
                .map(|release| {
                    let body = release.body.as_deref().unwrap_or_default();
                    let html = match entry.rendered_html.get(&release.id) {
                        Some(html) => html.clone(),
                        None if body.is_empty() => String::new(),
                        None => fallback_html(body),
                    };
                    ReleaseView {
                        title: release.title().to_string(),
                        published_at: release.published_at,
                        html,
                        flagged: is_flagged(body),
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    // Flagged releases first; stable, so upstream (newest-first) order is
    // kept within each group.
    releases.sort_by_key(|r| !r.flagged);

    let release_count = releases.len();
    let breaking_count = releases.iter().filter(|r| r.flagged).count();

    RepoView {
        repo: slug.to_string(),
        releases,
        release_count,
        breaking_count,
        error,
    }
}
