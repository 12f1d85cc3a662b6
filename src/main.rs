// relwatch: polls GitHub releases for a configured set of repositories and
// keeps a breaking-change dashboard view model warm. Runs a startup refresh,
// then a coalescing timer loop.

mod app;
mod cache;
mod config;
mod error;
mod github;
mod refresh;
mod render;
mod view;

use std::path::PathBuf;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::app::Dashboard;
use crate::config::ConfigStore;
use crate::error::Result;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("relwatch=info")),
        )
        .init();

    let store = match std::env::var("RELWATCH_CONFIG") {
        Ok(path) => ConfigStore::new(PathBuf::from(path)),
        Err(_) => ConfigStore::at_default_path()?,
    };
    info!(path = %store.path().display(), "using config");

    let dashboard = Dashboard::new(store)?;
    let config = dashboard.config().await;
    info!(
        repos = config.repos.len(),
        lookback_days = config.lookback_days,
        "starting"
    );

    // Warm the cache before anything reads the view model.
    dashboard.refresh_forced().await;
    log_summary(&dashboard).await;

    loop {
        let minutes = dashboard.config().await.refresh_interval_minutes.max(1);
        tokio::time::sleep(Duration::from_secs(minutes * 60)).await;

        if dashboard.refresh_scheduled().await {
            log_summary(&dashboard).await;
        }
    }
}

async fn log_summary(dashboard: &Dashboard) {
    let view = dashboard.view_model().await;
    let releases: usize = view.repos.iter().map(|r| r.release_count).sum();
    let breaking: usize = view.repos.iter().map(|r| r.breaking_count).sum();
    info!(
        repos = view.repos.len(),
        releases,
        breaking,
        rate_limited = view.rate_limit_hit,
        "dashboard state"
    );
}
