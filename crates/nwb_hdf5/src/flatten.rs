//! Flatten a file into one [`SourceItem`] per object.

use crate::array::{DType, ObjectRef, Selection};
use crate::error::H5Error;
use crate::h5::{AttrValue, EntryKind, H5Handle, NAMESPACE_ATTR, TYPE_ATTR};
use indexmap::{IndexMap, IndexSet};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Prefix of the placeholder path recorded for a reference to no object.
pub const DANGLING_PREFIX: &str = "<dangling>:";

/// The declared type of an element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeRef {
    pub namespace: Option<String>,
    pub name: String,
}

/// One group or dataset, as discovered. Immutable after flattening.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceItem {
    /// Canonical path
    pub path: String,
    pub locator: String,
    pub is_leaf: bool,
    pub kind: EntryKind,
    /// Paths that must resolve before this one
    pub depends_on: IndexSet<String>,
    pub attrs: IndexMap<String, AttrValue>,
    pub neurodata_type: Option<TypeRef>,
    pub shape: Vec<usize>,
    pub dtype: Option<DType>,
    /// Link name -> canonical path of the child
    pub children: IndexMap<String, String>,
}

impl SourceItem {
    pub fn is_group(&self) -> bool {
        self.kind == EntryKind::Group
    }

    pub fn is_dataset(&self) -> bool {
        self.kind == EntryKind::Dataset
    }

    pub fn is_scalar(&self) -> bool {
        self.is_dataset() && self.shape.is_empty()
    }

    /// Attributes other than the type-identifying ones.
    pub fn data_attrs(&self) -> impl Iterator<Item = (&String, &AttrValue)> {
        self.attrs.iter().filter(|(name, _)| !is_bookkeeping_attr(name))
    }

    pub fn has_data_attrs(&self) -> bool {
        self.data_attrs().next().is_some()
    }
}

/// Attributes describing how an element is stored rather than its content.
pub fn is_bookkeeping_attr(name: &str) -> bool {
    matches!(name, NAMESPACE_ATTR | TYPE_ATTR | crate::h5::OBJECT_ID_ATTR)
}

/// Canonical path of the object a reference points to. References to no
/// object become a placeholder path that never resolves.
pub fn reference_path(handle: &dyn H5Handle, reference: ObjectRef) -> Result<String, H5Error> {
    match handle.dereference(reference) {
        Ok(path) => Ok(path),
        Err(H5Error::DanglingReference(id)) => {
            warn!(reference = id, "Object reference points at nothing");
            Ok(format!("{DANGLING_PREFIX}{id}"))
        }
        Err(err) => Err(err),
    }
}

fn type_ref(attrs: &IndexMap<String, AttrValue>) -> Option<TypeRef> {
    let name = attrs.get(TYPE_ATTR)?.as_str()?;
    Some(TypeRef {
        namespace: attrs.get(NAMESPACE_ATTR).and_then(AttrValue::as_str).map(str::to_string),
        name: name.to_string(),
    })
}

/// Walk the file depth first from `/`, producing items keyed by canonical
/// path. Hard-linked objects appear once. Top-level children named in
/// `skip_names` are not visited.
pub fn flatten_hdf(
    handle: &dyn H5Handle,
    locator: &str,
    skip_names: &[String],
) -> Result<IndexMap<String, SourceItem>, H5Error> {
    let mut items = IndexMap::new();
    let mut seen = HashSet::new();
    let mut stack = vec![handle.canonical("/")?];

    while let Some(path) = stack.pop() {
        if !seen.insert(path.clone()) {
            continue;
        }
        let entry = handle.entry(&path)?;
        let mut depends_on = IndexSet::new();
        let mut children = IndexMap::new();

        if entry.kind == EntryKind::Group {
            for (name, reached_as) in handle.children(&path)? {
                if path == "/" && skip_names.iter().any(|skip| *skip == name) {
                    continue;
                }
                let canonical = handle.canonical(&reached_as)?;
                if canonical != reached_as {
                    depends_on.insert(canonical.clone());
                }
                children.insert(name, canonical);
            }
            stack.extend(children.values().rev().cloned());
        }

        for value in entry.attrs.values() {
            for reference in value.refs() {
                depends_on.insert(reference_path(handle, reference)?);
            }
        }
        if entry.dtype.as_ref().is_some_and(DType::has_refs) {
            for reference in handle.read(&path, &Selection::All)?.refs_iter() {
                depends_on.insert(reference_path(handle, reference)?);
            }
        }
        depends_on.shift_remove(&path);

        let item = SourceItem {
            is_leaf: entry.kind == EntryKind::Dataset || children.is_empty(),
            locator: locator.to_string(),
            kind: entry.kind,
            depends_on,
            neurodata_type: type_ref(&entry.attrs),
            attrs: entry.attrs,
            shape: entry.shape,
            dtype: entry.dtype,
            children,
            path: path.clone(),
        };
        items.insert(path, item);
    }

    debug!(items = items.len(), locator, "Flattened file");
    Ok(items)
}
