// Dashboard facade.
// Owns the config and the refresh engine, and exposes the surface the
// presentation layer talks to: the view model and the config mutations with
// their refresh triggers.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use crate::config::{Config, ConfigStore, normalize_slug};
use crate::error::{RelwatchError, Result};
use crate::github::GitHubClient;
use crate::refresh::RefreshEngine;
use crate::view::{self, DashboardView};

pub struct Dashboard {
    store: ConfigStore,
    config: RwLock<Config>,
    engine: Arc<RefreshEngine>,
}

impl Dashboard {
    /// Load the config (defaults when absent) and set up an empty engine.
    /// The cache is warmed by the first refresh.
    pub fn new(store: ConfigStore) -> Result<Self> {
        let config = store.load()?;
        Ok(Self {
            store,
            config: RwLock::new(config),
            engine: RefreshEngine::new(),
        })
    }

    /// Snapshot of the current config.
    pub async fn config(&self) -> Config {
        self.config.read().await.clone()
    }

    /// Build the current view model from cache + config.
    pub async fn view_model(&self) -> DashboardView {
        let config = self.config.read().await.clone();
        let state = self.engine.view_state().await;
        view::build(
            &config,
            &state.cache,
            &state.statuses,
            state.rate_limit_hit,
            state.last_update,
        )
    }

    /// Forced refresh: bypasses etags, waits for any running refresh.
    pub async fn refresh_forced(&self) {
        let config = self.config.read().await.clone();
        self.engine.refresh_forced(&config).await;
    }

    /// Scheduled refresh; skipped when one is already running. Returns
    /// whether it ran.
    pub async fn refresh_scheduled(&self) -> bool {
        let config = self.config.read().await.clone();
        self.engine.refresh_if_idle(&config).await
    }

    /// Add a repository from a slug or GitHub URL. Validates existence
    /// upstream before accepting, then force-refreshes so the new feed is
    /// populated immediately.
    pub async fn add_repo(&self, input: &str) -> Result<String> {
        let slug = normalize_slug(input)?;

        if self.config.read().await.repos.iter().any(|r| *r == slug) {
            return Err(RelwatchError::DuplicateRepo(slug));
        }

        // Validate before mutating, so a typo never lands in the config.
        let token = self.config.read().await.token.clone();
        let client = GitHubClient::new(token.as_deref())?;
        let repo = client.get_repo(&slug).await?;

        {
            let mut config = self.config.write().await;
            config.add_repo(&slug)?;
            self.store.save(&config)?;
        }
        info!(repo = %repo.full_name, id = repo.id, "repository added");

        self.refresh_forced().await;
        Ok(slug)
    }

    /// Remove a repository and its cache entry.
    pub async fn remove_repo(&self, input: &str) -> Result<()> {
        let slug = normalize_slug(input)?;

        let config = {
            let mut config = self.config.write().await;
            if !config.remove_repo(&slug) {
                return Err(RelwatchError::NotFound(slug));
            }
            self.store.save(&config)?;
            config.clone()
        };
        info!(repo = %slug, "repository removed");

        self.engine.prune_for(&config).await;
        Ok(())
    }

    /// Change the lookback window and force a refresh; the refresh prunes
    /// releases that fell out of the new window.
    pub async fn set_lookback_days(&self, days: u32) -> Result<()> {
        {
            let mut config = self.config.write().await;
            config.set_lookback_days(days)?;
            self.store.save(&config)?;
        }
        info!(days, "lookback window changed");

        self.refresh_forced().await;
        Ok(())
    }

    /// Change (or clear) the API token and force a refresh with it.
    pub async fn set_token(&self, token: Option<String>) -> Result<()> {
        {
            let mut config = self.config.write().await;
            config.set_token(token);
            self.store.save(&config)?;
        }
        info!("token updated");

        self.refresh_forced().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn dashboard_with_config(dir: &TempDir, config: &Config) -> Dashboard {
        let store = ConfigStore::new(dir.path().join("config.json"));
        store.save(config).unwrap();
        Dashboard::new(ConfigStore::new(dir.path().join("config.json"))).unwrap()
    }

    #[tokio::test]
    async fn test_add_repo_rejects_duplicate_before_any_network() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.add_repo("acme/widget").unwrap();
        let dashboard = dashboard_with_config(&dir, &config);

        let err = dashboard
            .add_repo("https://github.com/acme/widget")
            .await
            .unwrap_err();
        assert!(matches!(err, RelwatchError::DuplicateRepo(_)));
    }

    #[tokio::test]
    async fn test_add_repo_rejects_invalid_input() {
        let dir = TempDir::new().unwrap();
        let dashboard = dashboard_with_config(&dir, &Config::default());

        let err = dashboard.add_repo("not a repo").await.unwrap_err();
        assert!(matches!(err, RelwatchError::InvalidRepo(_)));
    }

    #[tokio::test]
    async fn test_remove_repo_persists_and_errors_on_missing() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.add_repo("acme/widget").unwrap();
        let dashboard = dashboard_with_config(&dir, &config);

        dashboard.remove_repo("acme/widget").await.unwrap();
        assert!(dashboard.config().await.repos.is_empty());

        // The removal reached the file, not just memory.
        let reloaded = ConfigStore::new(dir.path().join("config.json"))
            .load()
            .unwrap();
        assert!(reloaded.repos.is_empty());

        let err = dashboard.remove_repo("acme/widget").await.unwrap_err();
        assert!(matches!(err, RelwatchError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_view_model_lists_configured_repos() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.add_repo("acme/widget").unwrap();
        let dashboard = dashboard_with_config(&dir, &config);

        let view = dashboard.view_model().await;
        assert_eq!(view.repos.len(), 1);
        assert_eq!(view.repos[0].repo, "acme/widget");
        assert!(!view.rate_limit_hit);
        assert!(view.last_update.is_none());
    }
}
