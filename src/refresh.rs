// Refresh orchestration.
// Fans fetch+render work out across all configured repos with bounded
// concurrency, isolates per-repo failures, and keeps the cache plus
// aggregate rate-limit state coherent.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::cache::ReleaseCache;
use crate::config::Config;
use crate::error::RelwatchError;
use crate::github::{FetchOutcome, GitHubClient, Release};
use crate::render::{BodyRenderer, RenderOutcome};

/// Concurrency ceiling for per-repo fetch+render tasks.
const MAX_CONCURRENT_REPOS: usize = 5;

/// Outcome of one repo's refresh, retained until the next cycle so the view
/// can render a placeholder for failed feeds.
#[derive(Debug, Clone)]
pub enum RefreshResult {
    Success { count: usize },
    RateLimited { reset_at: DateTime<Utc> },
    Failure { reason: String },
}

/// Owns the release cache and serializes refreshes against it.
///
/// Exactly one refresh runs at a time: timer-driven refreshes coalesce
/// (skipped while one is in flight), forced refreshes queue behind the
/// running one so a semantics change is never dropped. The single lock also
/// guarantees no two refreshes touch the same repo's entry concurrently.
pub struct RefreshEngine {
    cache: RwLock<ReleaseCache>,
    statuses: RwLock<HashMap<String, RefreshResult>>,
    rate_limit_hit: RwLock<bool>,
    last_update: RwLock<Option<DateTime<Utc>>>,
    refresh_lock: Mutex<()>,
    api_base: String,
}

impl RefreshEngine {
    pub fn new() -> Arc<Self> {
        Self::build(crate::github::client::GITHUB_API_BASE.to_string())
    }

    /// Engine talking to a non-default API base. Test hook only.
    #[cfg(test)]
    fn with_api_base(base: &str) -> Arc<Self> {
        Self::build(base.to_string())
    }

    fn build(api_base: String) -> Arc<Self> {
        Arc::new(Self {
            cache: RwLock::new(ReleaseCache::new()),
            statuses: RwLock::new(HashMap::new()),
            rate_limit_hit: RwLock::new(false),
            last_update: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            api_base,
        })
    }

    /// Refresh all repos, bypassing conditional-request caching. Waits for
    /// any in-flight refresh to finish first.
    pub async fn refresh_forced(self: &Arc<Self>, config: &Config) {
        let _guard = self.refresh_lock.lock().await;
        self.run(config, true).await;
    }

    /// Scheduled refresh. Returns false without doing anything when another
    /// refresh is already running (coalesced).
    pub async fn refresh_if_idle(self: &Arc<Self>, config: &Config) -> bool {
        let Ok(_guard) = self.refresh_lock.try_lock() else {
            debug!("refresh already in flight, coalescing");
            return false;
        };
        self.run(config, false).await;
        true
    }

    /// Drop cache entries that no longer belong to the config (removed repos
    /// or a shrunken lookback window).
    pub async fn prune_for(&self, config: &Config) {
        let mut cache = self.cache.write().await;
        cache.prune(&config.repos, config.cutoff());
        let mut statuses = self.statuses.write().await;
        statuses.retain(|repo, _| config.repos.contains(repo));
    }

    /// Read-only view state for the presentation builder.
    pub async fn view_state(&self) -> ViewState<'_> {
        ViewState {
            cache: self.cache.read().await,
            statuses: self.statuses.read().await,
            rate_limit_hit: *self.rate_limit_hit.read().await,
            last_update: *self.last_update.read().await,
        }
    }

    /// Reset all engine state. Test hook only.
    #[cfg(test)]
    pub async fn reset(&self) {
        *self.cache.write().await = ReleaseCache::new();
        self.statuses.write().await.clear();
        *self.rate_limit_hit.write().await = false;
        *self.last_update.write().await = None;
    }

    /// One refresh cycle. Caller must hold `refresh_lock`.
    async fn run(self: &Arc<Self>, config: &Config, force: bool) {
        let cutoff = config.cutoff();
        self.cache.write().await.prune(&config.repos, cutoff);

        let client = match GitHubClient::with_base_url(config.token.as_deref(), &self.api_base) {
            Ok(client) => Arc::new(client),
            Err(e) => {
                warn!(error = %e, "could not build GitHub client, skipping refresh");
                return;
            }
        };
        let renderer = Arc::new(BodyRenderer::new());
        let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_REPOS));

        let mut tasks = JoinSet::new();
        for slug in &config.repos {
            let engine = Arc::clone(self);
            let client = Arc::clone(&client);
            let renderer = Arc::clone(&renderer);
            let semaphore = Arc::clone(&semaphore);
            let slug = slug.clone();
            tasks.spawn(async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        // A closed pool means no fetch happened; record the
                        // repo as failed rather than panic the cycle.
                        warn!(repo = %slug, "refresh pool closed");
                        return (slug, RepoRefresh::failed("refresh pool closed"));
                    }
                };
                let result = engine
                    .refresh_repo(&client, &renderer, &slug, cutoff, force)
                    .await;
                (slug, result)
            });
        }

        let mut statuses = HashMap::new();
        let mut rate_limit_hit = false;
        while let Some(joined) = tasks.join_next().await {
            let (slug, result) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "repo refresh task failed to join");
                    continue;
                }
            };
            match &result.outcome {
                RefreshResult::Success { count } => {
                    debug!(repo = %slug, releases = count, "refreshed");
                }
                RefreshResult::RateLimited { reset_at } => {
                    warn!(repo = %slug, %reset_at, "rate limited");
                }
                RefreshResult::Failure { reason } => {
                    warn!(repo = %slug, %reason, "refresh failed");
                }
            }
            rate_limit_hit |= result.rate_limited;
            statuses.insert(slug, result.outcome);
        }

        // Re-derive aggregate state wholesale so a redundant cycle after a
        // forced refresh stays harmless.
        *self.statuses.write().await = statuses;
        *self.rate_limit_hit.write().await = rate_limit_hit;
        *self.last_update.write().await = Some(Utc::now());

        let rate = client.rate_limit();
        debug!(
            remaining = rate.remaining,
            limit = rate.limit,
            reset = ?rate.reset_at(),
            "rate limit quota after cycle"
        );
        info!(repos = config.repos.len(), force, "refresh cycle complete");
    }

    /// Fetch one repo, update its cache entry, and render any release body
    /// that lacks cached HTML. Errors are converted to results, never
    /// propagated.
    async fn refresh_repo(
        &self,
        client: &GitHubClient,
        renderer: &BodyRenderer,
        slug: &str,
        cutoff: DateTime<Utc>,
        force: bool,
    ) -> RepoRefresh {
        let etag = if force {
            None
        } else {
            self.cache
                .read()
                .await
                .get(slug)
                .and_then(|entry| entry.etag.clone())
        };

        let releases: Vec<Release> = match client
            .get_releases(slug, cutoff, etag.as_deref(), force)
            .await
        {
            Ok(FetchOutcome::Fetched { releases, etag }) => {
                let mut cache = self.cache.write().await;
                cache.upsert(slug, etag, releases.clone());
                releases
            }
            Ok(FetchOutcome::NotModified) => {
                // Upstream content is unchanged, but the window may not be:
                // re-filter the cached list against the current cutoff.
                let mut cache = self.cache.write().await;
                cache.retain_window(slug, cutoff);
                cache
                    .get(slug)
                    .map(|entry| entry.releases.clone())
                    .unwrap_or_default()
            }
            Err(RelwatchError::RateLimited { reset_at }) => {
                return RepoRefresh {
                    outcome: RefreshResult::RateLimited { reset_at },
                    rate_limited: true,
                };
            }
            Err(RelwatchError::NotFound(_)) => {
                return RepoRefresh::failed("repository not found");
            }
            Err(e) => return RepoRefresh::failed(e.to_string()),
        };

        let mut rate_limited = false;
        for release in &releases {
            let cached = self
                .cache
                .read()
                .await
                .get(slug)
                .is_some_and(|entry| entry.rendered_html.contains_key(&release.id));
            if cached {
                continue;
            }
            let body = release.body.as_deref().unwrap_or_default();
            match renderer.render(client, slug, release.id, body).await {
                RenderOutcome::Html(html) => {
                    self.cache.write().await.set_rendered(slug, release.id, html);
                }
                RenderOutcome::RateLimited { reset_at } => {
                    // Leave uncached so the next cycle retries; further
                    // renders this cycle would just burn the same quota.
                    warn!(repo = %slug, %reset_at, "markdown rendering rate limited");
                    rate_limited = true;
                    break;
                }
                RenderOutcome::Failed(reason) => {
                    // The view falls back to escaped raw text.
                    debug!(repo = %slug, release = release.id, %reason, "render failed");
                }
            }
        }

        RepoRefresh {
            outcome: RefreshResult::Success {
                count: releases.len(),
            },
            rate_limited,
        }
    }
}

/// Per-repo refresh outcome plus whether a rate limit was hit on the way.
struct RepoRefresh {
    outcome: RefreshResult,
    rate_limited: bool,
}

impl RepoRefresh {
    fn failed(reason: impl Into<String>) -> Self {
        Self {
            outcome: RefreshResult::Failure {
                reason: reason.into(),
            },
            rate_limited: false,
        }
    }
}

/// Locked snapshot of engine state for building the view model.
pub struct ViewState<'a> {
    pub cache: tokio::sync::RwLockReadGuard<'a, ReleaseCache>,
    pub statuses: tokio::sync::RwLockReadGuard<'a, HashMap<String, RefreshResult>>,
    pub rate_limit_hit: bool,
    pub last_update: Option<DateTime<Utc>>,
}
