//! File-backed [`CastConfig`] storage.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;

use super::default_config_dir;
use crate::config::CastConfig;
use crate::error::SettingsError;

const SETTINGS_FILE: &str = "settings.json";

/// Loads and saves settings as pretty-printed JSON.
///
/// Takes the file path in the constructor so callers can point it anywhere;
/// [`SettingsStorage::default_location`] resolves the platform default.
pub struct SettingsStorage {
    path: PathBuf,
}

impl SettingsStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_location() -> Result<Self, SettingsError> {
        let dir = default_config_dir().ok_or(SettingsError::NoConfigDir)?;
        Ok(Self::new(dir.join(SETTINGS_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read settings. A missing file yields the defaults.
    pub async fn load(&self) -> Result<CastConfig, SettingsError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no settings file, using defaults");
            return Ok(CastConfig::default());
        }

        let content = fs::read_to_string(&self.path).await?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Write settings, creating parent directories as needed.
    pub async fn save(&self, config: &CastConfig) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(config)?;
        fs::write(&self.path, content).await?;

        debug!(path = %self.path.display(), "settings saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DiscoveryStrategy;

    fn create_test_storage() -> (SettingsStorage, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = SettingsStorage::new(temp_dir.path().join("nested").join(SETTINGS_FILE));
        (storage, temp_dir)
    }

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let (storage, _dir) = create_test_storage();

        assert!(!storage.exists());
        let config = storage.load().await.unwrap();
        assert_eq!(config.session.control_port, 3000);
        assert_eq!(config.discovery.strategy, DiscoveryStrategy::Broadcast);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let (storage, _dir) = create_test_storage();

        let mut config = CastConfig::default();
        config.discovery.strategy = DiscoveryStrategy::Static;
        config.discovery.static_addresses = vec!["10.0.0.9".to_string()];
        config.media.default_reference = "http://host/clip.mp4".to_string();

        storage.save(&config).await.unwrap();
        assert!(storage.exists());

        let loaded = storage.load().await.unwrap();
        assert_eq!(loaded.discovery.strategy, DiscoveryStrategy::Static);
        assert_eq!(loaded.discovery.static_addresses, vec!["10.0.0.9"]);
        assert_eq!(loaded.media.default_reference, "http://host/clip.mp4");
    }

    #[tokio::test]
    async fn test_partial_file_fills_defaults() {
        let (storage, _dir) = create_test_storage();
        std::fs::create_dir_all(storage.path().parent().unwrap()).unwrap();
        std::fs::write(storage.path(), r#"{"session":{"connectTimeoutMs":750}}"#).unwrap();

        let loaded = storage.load().await.unwrap();
        assert_eq!(loaded.session.connect_timeout_ms, 750);
        assert_eq!(loaded.session.control_port, 3000);
        assert_eq!(loaded.registry.max_age_secs, 30);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let (storage, _dir) = create_test_storage();
        std::fs::create_dir_all(storage.path().parent().unwrap()).unwrap();
        std::fs::write(storage.path(), "{ not json").unwrap();

        assert!(matches!(
            storage.load().await,
            Err(SettingsError::Serialization(_))
        ));
    }
}
