//! Configuration for the resolver

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Resolver settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Pass budget of the read and construct phases
    #[serde(default = "default_max_passes")]
    pub max_passes: usize,

    /// Top-level names excluded from flattening
    #[serde(default = "default_skip_names")]
    pub skip_names: Vec<String>,
}

fn default_max_passes() -> usize {
    10
}

fn default_skip_names() -> Vec<String> {
    // Embedded schema text, not data
    vec!["specifications".to_string()]
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_passes: default_max_passes(),
            skip_names: default_skip_names(),
        }
    }
}

impl ResolverConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
