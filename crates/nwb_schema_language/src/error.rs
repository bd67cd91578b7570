//! Error types for loading schema-language documents.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading namespace or schema documents.
#[derive(Debug, Error)]
pub enum SchemaLanguageError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid schema YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),
}

pub type Result<T> = std::result::Result<T, SchemaLanguageError>;
