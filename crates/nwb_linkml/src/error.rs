//! Error types for schema translation.

use nwb_schema_language::SchemaLanguageError;
use thiserror::Error;

/// Errors raised while adapting schema-language nodes into LinkML artifacts.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error(transparent)]
    SchemaLanguage(#[from] SchemaLanguageError),

    #[error("No schema defines type '{0}'")]
    TypeNotFound(String),

    #[error("Invalid dtype '{dtype}' on '{name}'")]
    InvalidDtype { name: String, dtype: String },

    #[error("Namespace '{namespace}' imports '{import}', which was not provided")]
    MissingImport { namespace: String, import: String },

    #[error("Namespace '{0}' not found in namespace file")]
    MissingNamespace(String),

    #[error("Top-level {kind} in schema '{schema}' has no neurodata_type_def")]
    MissingTypeDef { schema: String, kind: &'static str },

    #[error("Nested node under '{0}' has neither a name nor a neurodata_type_inc")]
    AnonymousNode(String),

    #[error("Inheritance cycle through type '{0}'")]
    InheritanceCycle(String),
}

pub type Result<T> = std::result::Result<T, AdapterError>;
