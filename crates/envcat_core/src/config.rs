//! Catalog configuration.
//!
//! Values are passed explicitly into the services that need them; nothing in
//! core reads configuration from a global.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Calendar years an embargo lasts when no explicit end is given.
pub const DEFAULT_EMBARGO_PERIOD_YEARS: u32 = 2;
/// Hit limit for full-text search when the caller gives none.
pub const DEFAULT_SEARCH_LIMIT: u32 = 20;

/// Runtime settings for catalog services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CatalogConfig {
    pub embargo_period_years: u32,
    pub default_search_limit: u32,
    /// One of trace|debug|info|warn|error.
    pub log_level: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            embargo_period_years: DEFAULT_EMBARGO_PERIOD_YEARS,
            default_search_limit: DEFAULT_SEARCH_LIMIT,
            log_level: crate::logging::default_log_level().to_string(),
        }
    }
}

/// Error raised while loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config document: {err}"),
            Self::Invalid(message) => write!(f, "invalid config value: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

impl CatalogConfig {
    /// Parses a JSON document; absent fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_search_limit == 0 {
            return Err(ConfigError::Invalid(
                "default_search_limit must be positive".to_string(),
            ));
        }
        match self.log_level.trim().to_ascii_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "warning" | "error" => Ok(()),
            other => Err(ConfigError::Invalid(format!(
                "unsupported log_level `{other}`"
            ))),
        }
    }
}
