//! Hierarchical file access.
//!
//! A [`H5Source`] names a file and opens short-lived [`H5Handle`]s onto it.
//! Handles expose groups, datasets, their attributes, hard-link
//! canonicalization and object-reference dereferencing. Nothing above this
//! module holds a handle past the operation that opened it.

mod memory;
#[cfg(feature = "native")]
mod native;

pub use memory::{MemoryFile, MemoryFileBuilder};
#[cfg(feature = "native")]
pub use native::NativeFile;

use crate::array::{ArrayData, DType, ObjectRef, Scalar, Selection};
use crate::error::H5Error;
use indexmap::IndexMap;
use std::fmt;

/// Attribute naming the namespace of an element's declared type.
pub const NAMESPACE_ATTR: &str = "namespace";
/// Attribute naming an element's declared type.
pub const TYPE_ATTR: &str = "neurodata_type";
/// Attribute carrying a unique object id; bookkeeping, not model data.
pub const OBJECT_ID_ATTR: &str = "object_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Group,
    Dataset,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::Group => write!(f, "group"),
            EntryKind::Dataset => write!(f, "dataset"),
        }
    }
}

/// Attribute value: a single element or an array.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Scalar(Scalar),
    Array(ArrayData),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Scalar(Scalar::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// Text elements of an array attribute (or a single text scalar).
    pub fn as_texts(&self) -> Option<Vec<String>> {
        match self {
            AttrValue::Scalar(Scalar::Text(s)) => Some(vec![s.clone()]),
            AttrValue::Array(ArrayData::Text(a)) => Some(a.iter().cloned().collect()),
            _ => None,
        }
    }

    pub fn refs(&self) -> Vec<ObjectRef> {
        match self {
            AttrValue::Scalar(Scalar::Ref(r)) => vec![*r],
            AttrValue::Array(data) => data.refs_iter(),
            _ => Vec::new(),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Scalar(Scalar::Text(value.to_string()))
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Scalar(Scalar::Text(value))
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Scalar(Scalar::Int(value))
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Scalar(Scalar::Float(value))
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Scalar(Scalar::Bool(value))
    }
}

impl From<ObjectRef> for AttrValue {
    fn from(value: ObjectRef) -> Self {
        AttrValue::Scalar(Scalar::Ref(value))
    }
}

impl From<Scalar> for AttrValue {
    fn from(value: Scalar) -> Self {
        AttrValue::Scalar(value)
    }
}

impl From<ArrayData> for AttrValue {
    fn from(value: ArrayData) -> Self {
        AttrValue::Array(value)
    }
}

/// Metadata of one group or dataset, without its data.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// Canonical path
    pub path: String,
    pub kind: EntryKind,
    pub attrs: IndexMap<String, AttrValue>,
    /// Dataset shape; empty for groups and scalar datasets
    pub shape: Vec<usize>,
    /// Dataset element type; `None` for groups
    pub dtype: Option<DType>,
}

impl Entry {
    pub fn is_scalar(&self) -> bool {
        self.kind == EntryKind::Dataset && self.shape.is_empty()
    }
}

/// A file that can be opened repeatedly.
pub trait H5Source: Send + Sync {
    /// Identifies the file (usually its path).
    fn locator(&self) -> &str;

    /// Open a read-only handle. The file stays open until the handle drops.
    fn open(&self) -> Result<Box<dyn H5Handle + '_>, H5Error>;
}

/// An open, read-only view of a file.
pub trait H5Handle {
    fn entry(&self, path: &str) -> Result<Entry, H5Error>;

    /// Children of a group as `(link name, path as reached through that link)`.
    fn children(&self, path: &str) -> Result<Vec<(String, String)>, H5Error>;

    /// The canonical path of the object at `path`. Hard links to the same
    /// object share one canonical path.
    fn canonical(&self, path: &str) -> Result<String, H5Error>;

    fn dereference(&self, reference: ObjectRef) -> Result<String, H5Error>;

    fn read(&self, path: &str, selection: &Selection) -> Result<ArrayData, H5Error>;
}

/// Join a parent path and a child name.
pub fn join(parent: &str, name: &str) -> String {
    if parent == "/" || parent.is_empty() {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// Last segment of a path; `/` for the root.
pub fn basename(path: &str) -> &str {
    match path.trim_end_matches('/').rsplit_once('/') {
        Some((_, name)) if !name.is_empty() => name,
        _ => "/",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_and_basename() {
        assert_eq!(join("/", "acquisition"), "/acquisition");
        assert_eq!(join("/units", "id"), "/units/id");
        assert_eq!(basename("/units/id"), "id");
        assert_eq!(basename("/"), "/");
    }

    #[test]
    fn test_attr_value_accessors() {
        let colnames = AttrValue::from(ArrayData::texts(["a", "b"]));
        assert_eq!(colnames.as_texts().unwrap(), vec!["a", "b"]);
        assert_eq!(AttrValue::from("x").as_str(), Some("x"));
        assert_eq!(AttrValue::from(ObjectRef(4)).refs(), vec![ObjectRef(4)]);
        assert!(AttrValue::from(3i64).refs().is_empty());
    }
}
