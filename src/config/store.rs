// Config persistence.
// Loads the JSON config document, creating defaults when absent, and saves
// it atomically via a temp file.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use directories::ProjectDirs;

use crate::error::{RelwatchError, Result};

use super::Config;

/// Default config path (~/.config/relwatch/config.json on Linux).
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "relwatch").map(|dirs| dirs.config_dir().join("config.json"))
}

/// Handle to the config file at a fixed path.
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Store at the platform default location.
    pub fn at_default_path() -> Result<Self> {
        let path = default_config_path()
            .ok_or_else(|| RelwatchError::Other("no home directory found".to_string()))?;
        Ok(Self::new(path))
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Load the config, falling back to defaults when the file is absent.
    pub fn load(&self) -> Result<Config> {
        if !self.path.exists() {
            return Ok(Config::default());
        }
        let contents = fs::read_to_string(&self.path)?;
        let config: Config = serde_json::from_str(&contents)?;
        Ok(config)
    }

    /// Persist the config atomically (temp file, fsync, rename).
    pub fn save(&self, config: &Config) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(config)?;

        let temp_path = self.path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        fs::rename(&temp_path, &self.path)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_returns_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let store = ConfigStore::new(temp_dir.path().join("config.json"));

        let config = store.load().unwrap();
        assert!(config.repos.is_empty());
        assert_eq!(config.lookback_days, 30);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let store = ConfigStore::new(temp_dir.path().join("nested").join("config.json"));

        let mut config = Config::default();
        config.add_repo("acme/widget").unwrap();
        config.set_lookback_days(14).unwrap();
        config.set_token(Some("ghp_secret".to_string()));
        store.save(&config).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.repos, vec!["acme/widget"]);
        assert_eq!(loaded.lookback_days, 14);
        assert_eq!(loaded.token.as_deref(), Some("ghp_secret"));
    }

    #[test]
    fn test_save_leaves_no_temp_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        let store = ConfigStore::new(path.clone());

        store.save(&Config::default()).unwrap();

        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());
    }
}
