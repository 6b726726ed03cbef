//! Engine configuration
//!
//! Read from YAML, then overridden by `EQUALIFY_*` environment variables.
//! Every field has a default, so an absent file is a valid configuration.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const ENV_DB_PATH: &str = "EQUALIFY_DB_PATH";
pub const ENV_BUSY_TIMEOUT_MS: &str = "EQUALIFY_BUSY_TIMEOUT_MS";
pub const ENV_LOG: &str = "EQUALIFY_LOG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Database file; `None` means the per-user data directory
    pub path: Option<PathBuf>,
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, the user config file
    /// (`~/.config/equalify/config.yaml`) is used when present.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&raw).map_err(|err| match err {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        // An empty file deserializes as YAML null
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `EQUALIFY_*` overrides from the process environment
    pub fn with_env(self) -> Result<Self, ConfigError> {
        self.apply_env(|key| std::env::var(key).ok())
    }

    /// Apply overrides read through `lookup`
    pub fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(path) = lookup(ENV_DB_PATH).filter(|v| !v.is_empty()) {
            self.database.path = Some(PathBuf::from(path));
        }
        if let Some(raw) = lookup(ENV_BUSY_TIMEOUT_MS) {
            self.database.busy_timeout_ms = raw.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("{ENV_BUSY_TIMEOUT_MS} must be milliseconds, got `{raw}`"))
            })?;
        }
        if let Some(filter) = lookup(ENV_LOG).filter(|v| !v.is_empty()) {
            self.logging.filter = filter;
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.busy_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "database.busy_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.logging.filter.trim().is_empty() {
            return Err(ConfigError::Invalid("logging.filter must not be empty".to_string()));
        }
        Ok(())
    }

    /// Configured database path, or `~/.local/share/equalify/equalify.db`
    pub fn db_path(&self) -> PathBuf {
        self.database.path.clone().unwrap_or_else(default_db_path)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.database.busy_timeout_ms)
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("equalify").join("config.yaml"))
}

fn default_db_path() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    data_dir.join("equalify").join("equalify.db")
}
