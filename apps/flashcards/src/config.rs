//! Configuration for flashcards.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Overrides the config file location.
pub const CONFIG_ENV: &str = "FLASHCARDS_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub study: StudyConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load from the default location. A missing file yields defaults.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn config_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }
        directories::ProjectDirs::from("", "", "flashcards")
            .map(|d| d.config_dir().join("config.toml"))
    }

    fn data_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "flashcards").map(|d| d.data_dir().to_path_buf())
    }

    pub fn db_path(&self) -> PathBuf {
        self.storage
            .database
            .clone()
            .or_else(|| Self::data_dir().map(|d| d.join("flashcards.db")))
            .unwrap_or_else(|| "flashcards.db".into())
    }

    pub fn log_path() -> PathBuf {
        Self::data_dir()
            .map(|d| d.join("flashcards.log"))
            .unwrap_or_else(|| "flashcards.log".into())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database file. Defaults to the platform data directory.
    #[serde(default)]
    pub database: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyConfig {
    /// Reviews per session; 0 for no limit.
    #[serde(default = "default_session_limit")]
    pub session_limit: usize,
}

fn default_session_limit() -> usize { 200 }

impl StudyConfig {
    pub fn limit(&self) -> Option<usize> {
        (self.session_limit > 0).then_some(self.session_limit)
    }
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            session_limit: default_session_limit(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_true")]
    pub show_answer_timer: bool,
    #[serde(default = "default_true")]
    pub show_next_review: bool,
}

fn default_true() -> bool { true }

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            show_answer_timer: true,
            show_next_review: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_level() -> String { "info".to_string() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_level() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.study.limit(), Some(200));
        assert!(config.display.show_next_review);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            [storage]
            database = "/tmp/cards.db"

            [display]
            show_answer_timer = false
            "#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.db_path(), PathBuf::from("/tmp/cards.db"));
        assert!(!config.display.show_answer_timer);
        assert!(config.display.show_next_review);
        assert_eq!(config.study, StudyConfig::default());
    }

    #[test]
    fn test_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[study]\nsession_limit = \"lots\"\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn test_round_trip() {
        let mut config = Config::default();
        config.study.session_limit = 0;
        config.logging.level = "debug".to_string();

        let content = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&content).unwrap();
        assert_eq!(parsed, config);
        assert_eq!(parsed.study.limit(), None);
    }
}
