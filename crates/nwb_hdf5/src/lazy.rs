//! Lazy array proxy.
//!
//! A [`LazyArray`] names a dataset (optionally one field of a compound
//! dataset) in a file without reading it. Every access opens the file,
//! reads exactly what was asked for, and drops the handle before
//! returning. Proxies are read-only.

use crate::array::{ArrayData, DType, Scalar, Selection};
use crate::error::H5Error;
use crate::h5::H5Source;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

#[derive(Clone)]
pub struct LazyArray {
    source: Arc<dyn H5Source>,
    path: String,
    field: Option<String>,
}

impl LazyArray {
    pub fn new(source: Arc<dyn H5Source>, path: impl Into<String>) -> Self {
        Self {
            source,
            path: path.into(),
            field: None,
        }
    }

    /// A proxy over one field of a compound dataset.
    pub fn field(&self, name: impl Into<String>) -> Self {
        Self {
            source: Arc::clone(&self.source),
            path: self.path.clone(),
            field: Some(name.into()),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn locator(&self) -> &str {
        self.source.locator()
    }

    pub fn field_name(&self) -> Option<&str> {
        self.field.as_deref()
    }

    pub fn shape(&self) -> Result<Vec<usize>, H5Error> {
        let handle = self.source.open()?;
        Ok(handle.entry(&self.path)?.shape)
    }

    pub fn dtype(&self) -> Result<DType, H5Error> {
        let handle = self.source.open()?;
        let dtype = handle.entry(&self.path)?.dtype.ok_or_else(|| H5Error::WrongKind {
            path: self.path.clone(),
            expected: crate::h5::EntryKind::Dataset,
            actual: crate::h5::EntryKind::Group,
        })?;
        match (&self.field, dtype) {
            (None, dtype) => Ok(dtype),
            (Some(field), DType::Compound(fields)) => fields
                .into_iter()
                .find(|(name, _)| name == field)
                .map(|(_, dtype)| dtype)
                .ok_or_else(|| H5Error::NotFound(format!("{}[{field}]", self.path))),
            (Some(field), _) => Err(H5Error::NotFound(format!("{}[{field}]", self.path))),
        }
    }

    /// Length of the first axis; scalars have length 1.
    pub fn len(&self) -> Result<usize, H5Error> {
        Ok(self.shape()?.first().copied().unwrap_or(1))
    }

    pub fn is_empty(&self) -> Result<bool, H5Error> {
        Ok(self.len()? == 0)
    }

    pub fn select(&self, selection: &Selection) -> Result<ArrayData, H5Error> {
        let data = {
            let handle = self.source.open()?;
            handle.read(&self.path, selection)?
        };
        match &self.field {
            None => Ok(data),
            Some(field) => data
                .field(field)
                .cloned()
                .ok_or_else(|| H5Error::NotFound(format!("{}[{field}]", self.path))),
        }
    }

    pub fn read(&self) -> Result<ArrayData, H5Error> {
        self.select(&Selection::All)
    }

    /// The element (or sub-array, for rank > 1) at `index`.
    pub fn get(&self, index: usize) -> Result<ArrayData, H5Error> {
        self.select(&Selection::Index(index))
    }

    pub fn slice(&self, range: Range<usize>) -> Result<ArrayData, H5Error> {
        self.select(&Selection::Range(range))
    }

    pub fn take(&self, indices: &[usize]) -> Result<ArrayData, H5Error> {
        self.select(&Selection::Points(indices.to_vec()))
    }

    pub fn mask(&self, mask: &[bool]) -> Result<ArrayData, H5Error> {
        self.select(&Selection::Mask(mask.to_vec()))
    }

    /// Read a single element as a scalar.
    pub fn scalar(&self, index: usize) -> Result<Scalar, H5Error> {
        let data = self.get(index)?;
        data.as_scalar().ok_or_else(|| H5Error::Selection {
            path: self.path.clone(),
            source: crate::error::SelectionError(format!(
                "element {index} has shape {:?}, not a scalar",
                data.shape()
            )),
        })
    }

    /// Whether both proxies hold equal data. Reads both arrays.
    pub fn same_data(&self, other: &LazyArray) -> Result<bool, H5Error> {
        Ok(self.read()? == other.read()?)
    }
}

/// Proxies are equal when they name the same array in the same file.
impl PartialEq for LazyArray {
    fn eq(&self, other: &Self) -> bool {
        self.source.locator() == other.source.locator() && self.path == other.path && self.field == other.field
    }
}

impl fmt::Debug for LazyArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("LazyArray");
        s.field("file", &self.source.locator()).field("path", &self.path);
        if let Some(field) = &self.field {
            s.field("field", field);
        }
        s.finish()
    }
}
