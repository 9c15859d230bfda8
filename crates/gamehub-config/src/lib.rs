//! Configuration management for Game Hub
//!
//! Handles the user settings file and the layout of the application data
//! directory (catalog database, manual games list, legacy cache).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("No data directory available for this user")]
    NoDataDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Name of the application folder inside the platform data directory
pub const APP_DIR_NAME: &str = "Game Hub";

/// Environment variable overriding the data directory
pub const DATA_DIR_ENV: &str = "GAMEHUB_DATA_DIR";

pub const CONFIG_FILE: &str = "config.toml";
pub const DATABASE_FILE: &str = "library.db";
pub const MANUAL_GAMES_FILE: &str = "manual_games.json";
pub const LEGACY_CACHE_FILE: &str = "game_cache.json";

/// User settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubConfig {
    /// Extra directories to scan (and watch) for Steam libraries
    #[serde(default)]
    pub scan_paths: Vec<PathBuf>,

    /// SteamGridDB API key used for cover art lookups
    #[serde(default)]
    pub steamgriddb_api_key: Option<String>,
}

impl HubConfig {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file is absent
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::NotFound(_)) => {
                tracing::warn!("No configuration file at {}, using defaults", path.display());
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        tracing::info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// The API key, if one is configured and not blank
    pub fn api_key(&self) -> Option<&str> {
        self.steamgriddb_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

/// Application data directory and the files it holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve from `GAMEHUB_DATA_DIR` or the platform local data directory
    pub fn resolve() -> Result<Self, ConfigError> {
        if let Some(dir) = std::env::var_os(DATA_DIR_ENV) {
            return Ok(Self::new(dir));
        }

        let base = directories::BaseDirs::new().ok_or(ConfigError::NoDataDir)?;
        Ok(Self::new(base.data_local_dir().join(APP_DIR_NAME)))
    }

    /// Create the directory if it does not exist
    pub fn ensure(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.root)?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    pub fn database_file(&self) -> PathBuf {
        self.root.join(DATABASE_FILE)
    }

    pub fn manual_games_file(&self) -> PathBuf {
        self.root.join(MANUAL_GAMES_FILE)
    }

    pub fn legacy_cache_file(&self) -> PathBuf {
        self.root.join(LEGACY_CACHE_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_default_config() {
        let config = HubConfig::default();
        assert!(config.scan_paths.is_empty());
        assert!(config.api_key().is_none());
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        let config_content = r#"
scan_paths = ["D:/SteamLibrary/steamapps"]
steamgriddb_api_key = "abc123"
"#;
        write!(temp_file, "{}", config_content).unwrap();

        let config = HubConfig::load(temp_file.path()).unwrap();
        assert_eq!(config.scan_paths, vec![PathBuf::from("D:/SteamLibrary/steamapps")]);
        assert_eq!(config.api_key(), Some("abc123"));
    }

    #[test]
    fn test_blank_api_key_is_absent() {
        let config = HubConfig {
            scan_paths: Vec::new(),
            steamgriddb_api_key: Some("   ".to_string()),
        };
        assert!(config.api_key().is_none());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        assert!(matches!(HubConfig::load(&path), Err(ConfigError::NotFound(_))));
        assert_eq!(HubConfig::load_or_default(&path).unwrap(), HubConfig::default());
    }

    #[test]
    fn test_save_config_creates_parent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = HubConfig {
            scan_paths: vec![PathBuf::from("/mnt/games/steamapps")],
            steamgriddb_api_key: Some("key".to_string()),
        };

        config.save(&path).unwrap();

        let loaded = HubConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_data_dir_layout() {
        let data = DataDir::new("/tmp/hub");
        assert_eq!(data.config_file(), PathBuf::from("/tmp/hub/config.toml"));
        assert_eq!(data.database_file(), PathBuf::from("/tmp/hub/library.db"));
        assert_eq!(
            data.manual_games_file(),
            PathBuf::from("/tmp/hub/manual_games.json")
        );
        assert_eq!(
            data.legacy_cache_file(),
            PathBuf::from("/tmp/hub/game_cache.json")
        );
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::NotFound(PathBuf::from("/hub/config.toml"));
        assert!(format!("{}", err).contains("not found"));
    }
}
