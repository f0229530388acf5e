use crate::core::pfctl::{
    DEFAULT_ANCHOR_NAME, DEFAULT_ANCHOR_PATH, DEFAULT_PF_CONF_PATH, DEFAULT_STARTUP_PLIST_PATH,
    PfPaths,
};
use crate::utils::{default_rules_path, get_config_dir};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

pub const CONFIG_FILE_NAME: &str = "config.json";

/// Application configuration
///
/// Every field has a default, so a partial `config.json` is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Rule document location; `None` uses the data directory
    #[serde(default)]
    pub rules_path: Option<PathBuf>,
    #[serde(default = "default_anchor_name")]
    pub anchor_name: String,
    #[serde(default = "default_anchor_path")]
    pub anchor_path: PathBuf,
    #[serde(default = "default_pf_conf_path")]
    pub pf_conf_path: PathBuf,
    #[serde(default = "default_startup_plist_path")]
    pub startup_plist_path: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            rules_path: None,
            anchor_name: default_anchor_name(),
            anchor_path: default_anchor_path(),
            pf_conf_path: default_pf_conf_path(),
            startup_plist_path: default_startup_plist_path(),
        }
    }
}

impl AppConfig {
    /// The configured rule document path, falling back to the data directory.
    pub fn resolved_rules_path(&self) -> Option<PathBuf> {
        self.rules_path.clone().or_else(default_rules_path)
    }

    /// System paths for the engine operations.
    pub fn pf_paths(&self) -> PfPaths {
        PfPaths {
            anchor_name: self.anchor_name.clone(),
            anchor_path: self.anchor_path.clone(),
            pf_conf_path: self.pf_conf_path.clone(),
            startup_plist_path: self.startup_plist_path.clone(),
        }
    }
}

fn default_anchor_name() -> String {
    DEFAULT_ANCHOR_NAME.to_string()
}

fn default_anchor_path() -> PathBuf {
    PathBuf::from(DEFAULT_ANCHOR_PATH)
}

fn default_pf_conf_path() -> PathBuf {
    PathBuf::from(DEFAULT_PF_CONF_PATH)
}

fn default_startup_plist_path() -> PathBuf {
    PathBuf::from(DEFAULT_STARTUP_PLIST_PATH)
}

/// Loads the config from `path`, or returns the default if the file is
/// missing or invalid.
pub async fn load_config_from(path: &Path) -> AppConfig {
    match tokio::fs::read_to_string(path).await {
        Ok(json) => match serde_json::from_str::<AppConfig>(&json) {
            Ok(config) => config,
            Err(e) => {
                warn!("Ignoring invalid config {}: {e}", path.display());
                AppConfig::default()
            }
        },
        Err(_) => AppConfig::default(),
    }
}

/// Loads the app config from the config directory, or returns default if not found.
pub async fn load_config() -> AppConfig {
    match get_config_dir() {
        Some(dir) => load_config_from(&dir.join(CONFIG_FILE_NAME)).await,
        None => AppConfig::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_config_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load_config_from(&dir.path().join(CONFIG_FILE_NAME)).await;
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.pf_paths(), PfPaths::default());
    }

    #[tokio::test]
    async fn test_partial_config_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        tokio::fs::write(&path, r#"{ "anchor_name": "lab", "rules_path": "/tmp/lab.json" }"#)
            .await
            .unwrap();

        let config = load_config_from(&path).await;
        assert_eq!(config.anchor_name, "lab");
        assert_eq!(config.resolved_rules_path(), Some(PathBuf::from("/tmp/lab.json")));
        assert_eq!(config.pf_conf_path, PathBuf::from(DEFAULT_PF_CONF_PATH));
        assert_eq!(config.pf_paths().anchor_name, "lab");
    }

    #[tokio::test]
    async fn test_invalid_config_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        tokio::fs::write(&path, "{ not json").await.unwrap();

        assert_eq!(load_config_from(&path).await, AppConfig::default());
    }
}
