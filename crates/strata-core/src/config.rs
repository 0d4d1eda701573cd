//! # History Configuration
//!
//! Static configuration of a history store: which tag views exist, which tags
//! maintain summaries and which namespaces feed the full-text index.
//!
//! ## Example
//!
//! ```toml
//! existing_tags = 7
//! summary_tags = 1
//! text_index_namespaces = [0]
//! ```

use crate::{MessageTags, StrataError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// Configuration of one history store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct HistoryConfig {
    /// Every tag bit that has a tag-scoped view. New holes carry this mask.
    pub existing_tags: MessageTags,
    /// Tags that maintain a summary counter. Subset of `existing_tags`.
    pub summary_tags: MessageTags,
    /// Namespaces indexed for full-text search. `None` indexes all of them.
    pub text_index_namespaces: Option<BTreeSet<i32>>,
}

impl HistoryConfig {
    /// Create a config with the given tag masks and indexing for all namespaces.
    #[must_use]
    pub fn new(existing_tags: MessageTags, summary_tags: MessageTags) -> Self {
        Self {
            existing_tags,
            summary_tags,
            text_index_namespaces: None,
        }
    }

    /// Restrict automatic text indexing to the given namespaces.
    #[must_use]
    pub fn with_text_index_namespaces(
        mut self,
        namespaces: impl IntoIterator<Item = i32>,
    ) -> Self {
        self.text_index_namespaces = Some(namespaces.into_iter().collect());
        self
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(input: &str) -> Result<Self, StrataError> {
        let config: Self =
            toml::from_str(input).map_err(|e| StrataError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StrataError> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| StrataError::IoError(e.to_string()))?;
        Self::from_toml_str(&text)
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<(), StrataError> {
        if !self.existing_tags.contains(self.summary_tags) {
            return Err(StrataError::InvalidConfig(format!(
                "summary_tags {:#x} not a subset of existing_tags {:#x}",
                self.summary_tags.bits(),
                self.existing_tags.bits()
            )));
        }
        Ok(())
    }

    /// Whether messages of `namespace` are added to the text index on insert.
    #[must_use]
    pub fn indexes_namespace(&self, namespace: i32) -> bool {
        self.text_index_namespaces
            .as_ref()
            .is_none_or(|namespaces| namespaces.contains(&namespace))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_document() {
        let config = HistoryConfig::from_toml_str(
            "existing_tags = 7\nsummary_tags = 1\ntext_index_namespaces = [0, 2]\n",
        )
        .expect("parse");
        assert_eq!(config.existing_tags, MessageTags(7));
        assert_eq!(config.summary_tags, MessageTags(1));
        assert!(config.indexes_namespace(0));
        assert!(!config.indexes_namespace(1));
    }

    #[test]
    fn empty_document_is_default() {
        let config = HistoryConfig::from_toml_str("").expect("parse");
        assert_eq!(config, HistoryConfig::default());
        assert!(config.indexes_namespace(42));
    }

    #[test]
    fn summary_tags_must_exist() {
        let result = HistoryConfig::from_toml_str("existing_tags = 1\nsummary_tags = 2\n");
        assert!(matches!(result, Err(StrataError::InvalidConfig(_))));
    }

    #[test]
    fn unknown_keys_rejected() {
        let result = HistoryConfig::from_toml_str("existing = 1\n");
        assert!(matches!(result, Err(StrataError::InvalidConfig(_))));
    }

    #[test]
    fn empty_namespace_set_disables_indexing() {
        let config = HistoryConfig::default().with_text_index_namespaces([]);
        assert!(!config.indexes_namespace(0));
    }
}
