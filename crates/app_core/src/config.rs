//! Application configuration

use crate::AppError;
use app_net::{TagPolicy, Url};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Number of folders kept in `recent_folders`
const RECENT_FOLDER_LIMIT: usize = 10;

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Most recently visited folders, newest first
    pub recent_folders: Vec<String>,
    pub server: ServerConfig,
    pub timing: TimingConfig,
    pub preview: PreviewConfig,
    pub download: DownloadConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub base_url: String,
    /// What a request does when another one with the same tag is in flight
    pub tag_policy: TagPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:7001/".to_string(),
            tag_policy: TagPolicy::Coalesce,
        }
    }
}

/// Delays for the debounced and idle-driven behaviors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub search_debounce_ms: u64,
    pub thumbnail_hide_ms: u64,
    pub pointer_sample_ms: u64,
    pub speed_window_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            search_debounce_ms: 300,
            thumbnail_hide_ms: 2000,
            pointer_sample_ms: 100,
            speed_window_ms: 5000,
        }
    }
}

impl TimingConfig {
    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }

    pub fn thumbnail_hide(&self) -> Duration {
        Duration::from_millis(self.thumbnail_hide_ms)
    }

    pub fn pointer_sample(&self) -> Duration {
        Duration::from_millis(self.pointer_sample_ms)
    }

    pub fn speed_window(&self) -> Duration {
        Duration::from_millis(self.speed_window_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Files at or above this size are never fetched for text preview
    pub text_size_limit: u64,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            text_size_limit: 1024 * 1024 * 1024,
        }
    }
}

/// External download manager settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    pub aria2_enabled: bool,
    pub aria2_rpc_url: String,
}

impl AppConfig {
    /// Load configuration from the default location
    pub fn load() -> anyhow::Result<Self> {
        Ok(Self::load_from(&Self::config_path())?)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> anyhow::Result<()> {
        Ok(self.save_to(&Self::config_path())?)
    }

    /// Load configuration from a file, falling back to defaults if it is missing
    pub fn load_from(config_path: &Path) -> Result<Self, AppError> {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)?;
            let config: Self = toml::from_str(&content)?;
            tracing::info!("Configuration loaded from {:?}", config_path);
            Ok(config)
        } else {
            tracing::info!("Using default configuration");
            Ok(Self::default())
        }
    }

    /// Save configuration to a file
    pub fn save_to(&self, config_path: &Path) -> Result<(), AppError> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;

        tracing::info!("Configuration saved to {:?}", config_path);
        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path() -> PathBuf {
        ProjectDirs::from("com", "WebFiler", "WebFiler")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("./config.toml"))
    }

    /// Parsed server URL; always ends with a slash so endpoints join under it
    pub fn base_url(&self) -> Result<Url, AppError> {
        let mut raw = self.server.base_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        Url::parse(&raw)
            .map_err(|e| AppError::Config(format!("invalid server.base_url '{}': {}", raw, e)))
    }

    pub fn enable_aria2(&mut self) {
        self.download.aria2_enabled = true;
    }

    pub fn disable_aria2(&mut self) {
        self.download.aria2_enabled = false;
    }

    pub fn set_aria2_rpc_url(&mut self, url: &str) {
        self.download.aria2_rpc_url = url.to_string();
    }

    /// Move `folder` to the front of the recent list; false if it already was
    pub fn remember_folder(&mut self, folder: &str) -> bool {
        if self.recent_folders.first().is_some_and(|f| f == folder) {
            return false;
        }
        self.recent_folders.retain(|f| f != folder);
        self.recent_folders.insert(0, folder.to_string());
        self.recent_folders.truncate(RECENT_FOLDER_LIMIT);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.timing.search_debounce(), Duration::from_millis(300));
        assert_eq!(config.timing.thumbnail_hide(), Duration::from_secs(2));
        assert_eq!(config.timing.pointer_sample(), Duration::from_millis(100));
        assert_eq!(config.timing.speed_window(), Duration::from_secs(5));
        assert_eq!(config.preview.text_size_limit, 1 << 30);
        assert_eq!(config.server.tag_policy, TagPolicy::Coalesce);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = AppConfig::default();
        config.server.tag_policy = TagPolicy::Preempt;
        config.enable_aria2();
        config.set_aria2_rpc_url("http://localhost:6800/jsonrpc");
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = AppConfig::load_from(&dir.path().join("none.toml")).unwrap();
        assert_eq!(loaded, AppConfig::default());
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[timing]\nsearch_debounce_ms = 50\n").unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.timing.search_debounce_ms, 50);
        assert_eq!(loaded.timing.thumbnail_hide_ms, 2000);
    }

    #[test]
    fn test_base_url_normalized() {
        let mut config = AppConfig::default();
        config.server.base_url = "http://files.local:8080/api".into();
        let url = config.base_url().unwrap();
        assert_eq!(url.join("file/read_dir").unwrap().as_str(), "http://files.local:8080/api/file/read_dir");

        config.server.base_url = "not a url".into();
        assert!(config.base_url().is_err());
    }

    #[test]
    fn test_recent_folders() {
        let mut config = AppConfig::default();
        for i in 0..12 {
            config.remember_folder(&format!("dir{}", i));
        }
        assert!(config.remember_folder("dir5"));
        assert!(!config.remember_folder("dir5"));
        assert_eq!(config.recent_folders.len(), RECENT_FOLDER_LIMIT);
        assert_eq!(config.recent_folders[0], "dir5");
        assert_eq!(config.recent_folders.iter().filter(|f| *f == "dir5").count(), 1);
    }
}
