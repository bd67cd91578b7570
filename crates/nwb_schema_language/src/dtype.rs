//! Dtype variants and dimension specs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Storage type of an attribute or dataset.
///
/// Serialized untagged, as in the YAML: a bare string is a flat dtype, a
/// mapping with `target_type` is a reference, and a list is a compound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Dtype {
    Flat(FlatDtype),
    Reference(ReferenceDtype),
    Compound(Vec<CompoundDtype>),
}

impl Dtype {
    pub fn flat(name: impl Into<String>) -> Self {
        Dtype::Flat(FlatDtype(name.into()))
    }

    pub fn as_flat(&self) -> Option<&FlatDtype> {
        match self {
            Dtype::Flat(flat) => Some(flat),
            _ => None,
        }
    }

    pub fn is_compound(&self) -> bool {
        matches!(self, Dtype::Compound(_))
    }
}

/// A scalar dtype name such as `float32`, `text` or `isodatetime`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlatDtype(pub String);

impl FlatDtype {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FlatDtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A reference to another typed object (or a region of it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceDtype {
    pub target_type: String,
    #[serde(default)]
    pub reftype: RefType,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefType {
    #[default]
    #[serde(alias = "ref", alias = "reference")]
    Object,
    Region,
}

impl fmt::Display for RefType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefType::Object => write!(f, "object"),
            RefType::Region => write!(f, "region"),
        }
    }
}

/// One named field of a compound dtype.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompoundDtype {
    pub name: String,
    #[serde(default)]
    pub doc: String,
    pub dtype: Dtype,
}

/// A list that is either flat (one candidate) or a list of lists (several
/// alternative candidates).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Nested<T> {
    Flat(Vec<T>),
    Nested(Vec<Vec<T>>),
}

impl<T> Nested<T> {
    pub fn is_nested(&self) -> bool {
        matches!(self, Nested::Nested(_))
    }

    /// Number of candidates (1 for a flat list)
    pub fn candidates(&self) -> usize {
        match self {
            Nested::Flat(_) => 1,
            Nested::Nested(lists) => lists.len(),
        }
    }
}

/// Dimension names of an array.
pub type Dims = Nested<String>;

/// Dimension cardinalities of an array; `None` (YAML `null`) is any size.
pub type Shape = Nested<Option<u64>>;
