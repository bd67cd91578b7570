//! Error types for file access, model construction and resolution.

use crate::h5::EntryKind;
use crate::rules::Phase;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// A selection that does not fit the array it is applied to.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct SelectionError(pub String);

/// Errors from the hierarchical file backends.
#[derive(Debug, Error)]
pub enum H5Error {
    #[error("No object at '{0}'")]
    NotFound(String),

    #[error("'{path}' is a {actual}, expected a {expected}")]
    WrongKind {
        path: String,
        expected: EntryKind,
        actual: EntryKind,
    },

    #[error("'{path}' already exists")]
    AlreadyExists { path: String },

    #[error("Invalid selection on '{path}': {source}")]
    Selection {
        path: String,
        #[source]
        source: SelectionError,
    },

    #[error("Object reference {0} does not point at any object")]
    DanglingReference(u64),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("HDF5 backend error: {0}")]
    Backend(String),
}

/// A model class rejected its constructor arguments.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("{class}: missing required field '{field}'")]
    MissingField { class: String, field: String },

    #[error("{class}: unknown field '{field}'")]
    UnknownField { class: String, field: String },

    #[error("{class}.{field}: expected {expected}, found {found}")]
    TypeMismatch {
        class: String,
        field: String,
        expected: String,
        found: String,
    },
}

/// Errors from dynamic-table access and validation.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("Table '{table}' has no column '{column}'")]
    UnknownColumn { table: String, column: String },

    #[error("Table '{table}' has {expected} rows but {}", format_lengths(.mismatches))]
    LengthMismatch {
        table: String,
        expected: usize,
        mismatches: Vec<(String, usize)>,
    },

    #[error("Row {row} out of range for table '{table}' ({len} rows)")]
    RowOutOfRange { table: String, row: usize, len: usize },

    #[error(transparent)]
    H5(#[from] H5Error),
}

fn format_lengths(mismatches: &[(String, usize)]) -> String {
    mismatches
        .iter()
        .map(|(column, len)| format!("column '{column}' has {len}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors assembling the model registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Class '{class}' inherits from unknown class '{parent}'")]
    UnknownParent { class: String, parent: String },

    #[error("Inheritance cycle through class '{0}'")]
    InheritanceCycle(String),
}

/// Errors loading or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// One path still queued when a phase gave up.
#[derive(Debug, Clone, PartialEq)]
pub struct UnresolvedItem {
    pub phase: Phase,
    pub path: String,
    /// Rules applied to the item so far, in order
    pub rules: Vec<&'static str>,
    /// Dependencies that never resolved
    pub missing: Vec<String>,
    pub errors: Vec<String>,
}

impl fmt::Display for UnresolvedItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.phase, self.path)?;
        if !self.rules.is_empty() {
            write!(f, " (rules: {})", self.rules.join(" -> "))?;
        }
        if !self.missing.is_empty() {
            write!(f, " missing: {}", self.missing.join(", "))?;
        }
        for error in &self.errors {
            write!(f, "; {error}")?;
        }
        Ok(())
    }
}

/// Errors from resolving a whole file.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    H5(#[from] H5Error),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("File has no root object after resolution")]
    MissingRoot,

    #[error("Failed to construct {class} at '{path}': {source}")]
    Construct {
        path: String,
        class: String,
        #[source]
        source: ValidationError,
    },

    #[error("{} item(s) unresolved in {phase} phase:\n{}", .items.len(), format_unresolved(.items))]
    Unresolved {
        phase: Phase,
        items: Vec<UnresolvedItem>,
    },

    #[error("{} item(s) resolved with errors:\n{}", .items.len(), format_unresolved(.items))]
    Incomplete { items: Vec<UnresolvedItem> },
}

fn format_unresolved(items: &[UnresolvedItem]) -> String {
    items
        .iter()
        .map(|item| format!("  {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}

pub type Result<T> = std::result::Result<T, ResolveError>;
