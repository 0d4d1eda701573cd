//! # Application Config
//!
//! `strata.toml` layout:
//!
//! ```toml
//! [history]
//! existing_tags = 3
//! summary_tags = 1
//! text_index_namespaces = [0]
//!
//! [storage]
//! path = "strata.redb"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use strata_core::{HistoryConfig, StrataError};

/// Default database file when neither the CLI nor the config names one.
pub const DEFAULT_DATABASE: &str = "strata.redb";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Path of the redb file.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub history: HistoryConfig,
    pub storage: StorageConfig,
}

impl AppConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, StrataError> {
        let config: Self =
            toml::from_str(input).map_err(|e| StrataError::InvalidConfig(e.to_string()))?;
        config.history.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, StrataError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            StrataError::IoError(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Load `path` when given, else the defaults.
    pub fn resolve(path: Option<&Path>) -> Result<Self, StrataError> {
        match path {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading config");
                Self::load(path)
            }
            None => Ok(Self::default()),
        }
    }

    /// The database to open: the CLI flag wins over `[storage] path`.
    #[must_use]
    pub fn database(&self, cli: Option<&Path>) -> PathBuf {
        cli.map(Path::to_path_buf)
            .or_else(|| self.storage.path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use strata_core::MessageTags;

    #[test]
    fn parse_both_tables() {
        let config = AppConfig::from_toml_str(
            r#"
            [history]
            existing_tags = 3
            summary_tags = 1

            [storage]
            path = "data/history.redb"
            "#,
        )
        .expect("parse");

        assert_eq!(config.history.existing_tags, MessageTags(3));
        assert_eq!(
            config.database(None),
            PathBuf::from("data/history.redb")
        );
        assert_eq!(
            config.database(Some(Path::new("cli.redb"))),
            PathBuf::from("cli.redb")
        );
    }

    #[test]
    fn defaults_without_file() {
        let config = AppConfig::resolve(None).expect("defaults");
        assert_eq!(config.database(None), PathBuf::from(DEFAULT_DATABASE));
    }

    #[test]
    fn invalid_history_rejected() {
        let result = AppConfig::from_toml_str("[history]\nexisting_tags = 1\nsummary_tags = 2\n");
        assert!(matches!(result, Err(StrataError::InvalidConfig(_))));
    }
}
