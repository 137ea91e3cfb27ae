//! Reconciler configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration for the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconcilerConfig {
    /// Condition type the reconciler owns on the parent.
    #[serde(default = "default_condition_type")]
    pub condition_type: String,

    /// Label binding a child to the name of its parent.
    #[serde(default = "default_encompassed_by_label")]
    pub encompassed_by_label: String,

    /// Whether children inherit identity mappings for unmapped definition fields.
    #[serde(default = "default_default_mappings")]
    pub default_mappings: bool,

    /// Longest generate-name prefix handed to the store.
    #[serde(default = "default_max_generate_name_prefix")]
    pub max_generate_name_prefix: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            condition_type: default_condition_type(),
            encompassed_by_label: default_encompassed_by_label(),
            default_mappings: default_default_mappings(),
            max_generate_name_prefix: default_max_generate_name_prefix(),
        }
    }
}

impl ReconcilerConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document.
    ///
    /// # Errors
    ///
    /// Returns a document error for malformed TOML, or `InvalidConfig` if validation fails.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| canopy_core::Error::toml_parse_failed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a document error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| canopy_core::Error::file_read_failed(path, e.to_string()))?;
        Self::from_toml_str(&text)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.condition_type.trim().is_empty() {
            return Err(Error::invalid_config("condition_type must not be empty"));
        }

        if self.encompassed_by_label.trim().is_empty() {
            return Err(Error::invalid_config("encompassed_by_label must not be empty"));
        }

        if self.max_generate_name_prefix == 0 {
            return Err(Error::invalid_config(
                "max_generate_name_prefix must be greater than 0",
            ));
        }

        Ok(())
    }
}

fn default_condition_type() -> String {
    "EnsureChildren".to_string()
}

fn default_encompassed_by_label() -> String {
    "canopy.io/encompassed-by".to_string()
}

fn default_default_mappings() -> bool {
    true
}

fn default_max_generate_name_prefix() -> usize {
    // 63 character names minus the 5 character random suffix
    58
}
