//! libhdf5-backed files, through the `hdf5` crate.
//!
//! Object references and compound element data are not read by this
//! backend. An entry holding an attribute of such a type fails with
//! [`H5Error::Unsupported`] instead of losing the attribute, and so does
//! reading the data of a compound dataset. Compound datasets still report
//! their field layout through [`Entry::dtype`].

use super::{join, AttrValue, Entry, EntryKind, H5Handle, H5Source};
use crate::array::{ArrayData, DType, ObjectRef, Scalar, Selection};
use crate::error::H5Error;
use hdf5::types::{TypeDescriptor, VarLenAscii, VarLenUnicode};
use hdf5::{Attribute, Container, Dataset, File, Group, Location};
use indexmap::IndexMap;
use ndarray::ArrayD;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

fn backend(err: hdf5::Error) -> H5Error {
    H5Error::Backend(err.to_string())
}

/// A file on disk, opened read-only for each operation.
#[derive(Debug, Clone)]
pub struct NativeFile {
    path: PathBuf,
    locator: String,
}

impl NativeFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            locator: path.display().to_string(),
            path,
        }
    }
}

impl H5Source for NativeFile {
    fn locator(&self) -> &str {
        &self.locator
    }

    fn open(&self) -> Result<Box<dyn H5Handle + '_>, H5Error> {
        let file = File::open(&self.path).map_err(backend)?;
        Ok(Box::new(NativeHandle {
            file,
            canonical: RefCell::new(None),
        }))
    }
}

struct NativeHandle {
    file: File,
    /// Location token -> first path reaching it in traversal order
    canonical: RefCell<Option<HashMap<String, String>>>,
}

enum Object {
    Group(Group),
    Dataset(Dataset),
}

impl Object {
    fn location(&self) -> &Location {
        match self {
            Object::Group(g) => g,
            Object::Dataset(d) => d,
        }
    }
}

fn token_key(location: &Location) -> Result<String, H5Error> {
    let info = location.loc_info().map_err(backend)?;
    Ok(format!("{:?}", info.token))
}

fn map_descriptor(descriptor: &TypeDescriptor) -> Result<DType, H5Error> {
    Ok(match descriptor {
        TypeDescriptor::Integer(_) | TypeDescriptor::Unsigned(_) | TypeDescriptor::Enum(_) => DType::Int,
        TypeDescriptor::Float(_) => DType::Float,
        TypeDescriptor::Boolean => DType::Bool,
        TypeDescriptor::VarLenUnicode
        | TypeDescriptor::VarLenAscii
        | TypeDescriptor::FixedAscii(_)
        | TypeDescriptor::FixedUnicode(_) => DType::Text,
        TypeDescriptor::Compound(compound) => DType::Compound(
            compound
                .fields
                .iter()
                .map(|field| Ok((field.name.clone(), map_descriptor(&field.ty)?)))
                .collect::<Result<_, H5Error>>()?,
        ),
        other => return Err(H5Error::Unsupported(format!("element type {other:?}"))),
    })
}

fn read_container(container: &Container, descriptor: &TypeDescriptor) -> Result<ArrayData, H5Error> {
    Ok(match descriptor {
        TypeDescriptor::Integer(_) | TypeDescriptor::Unsigned(_) | TypeDescriptor::Enum(_) => {
            ArrayData::Int(container.read_dyn::<i64>().map_err(backend)?)
        }
        TypeDescriptor::Float(_) => ArrayData::Float(container.read_dyn::<f64>().map_err(backend)?),
        TypeDescriptor::Boolean => ArrayData::Bool(container.read_dyn::<bool>().map_err(backend)?),
        TypeDescriptor::VarLenUnicode => {
            let raw: ArrayD<VarLenUnicode> = container.read_dyn().map_err(backend)?;
            ArrayData::Text(raw.mapv(|s| s.as_str().to_string()))
        }
        TypeDescriptor::VarLenAscii => {
            let raw: ArrayD<VarLenAscii> = container.read_dyn().map_err(backend)?;
            ArrayData::Text(raw.mapv(|s| s.as_str().to_string()))
        }
        other => return Err(H5Error::Unsupported(format!("reading element type {other:?}"))),
    })
}

fn read_attr(attr: &Attribute) -> Result<AttrValue, H5Error> {
    let descriptor = attr.dtype().and_then(|t| t.to_descriptor()).map_err(backend)?;
    let data = read_container(attr, &descriptor)?;
    if attr.shape().is_empty() {
        if let Some(scalar) = data.as_scalar() {
            return Ok(AttrValue::Scalar(scalar));
        }
    }
    Ok(AttrValue::Array(data))
}

impl NativeHandle {
    fn object(&self, path: &str) -> Result<Object, H5Error> {
        if path != "/" && !self.file.link_exists(path) {
            return Err(H5Error::NotFound(path.to_string()));
        }
        if let Ok(group) = self.file.group(path) {
            return Ok(Object::Group(group));
        }
        self.file
            .dataset(path)
            .map(Object::Dataset)
            .map_err(|_| H5Error::NotFound(path.to_string()))
    }

    fn build_canonical_index(&self) -> Result<HashMap<String, String>, H5Error> {
        let mut index = HashMap::new();
        let mut stack = vec!["/".to_string()];
        while let Some(path) = stack.pop() {
            let object = self.object(&path)?;
            let key = token_key(object.location())?;
            if index.contains_key(&key) {
                continue;
            }
            index.insert(key, path.clone());
            if let Object::Group(group) = object {
                let mut names = group.member_names().map_err(backend)?;
                names.sort();
                stack.extend(names.iter().rev().map(|name| join(&path, name)));
            }
        }
        Ok(index)
    }
}

impl H5Handle for NativeHandle {
    fn entry(&self, path: &str) -> Result<Entry, H5Error> {
        let object = self.object(path)?;
        let location = object.location();
        let mut attrs = IndexMap::new();
        for name in location.attr_names().map_err(backend)? {
            let attr = location.attr(&name).map_err(backend)?;
            let value = read_attr(&attr).map_err(|err| match err {
                H5Error::Unsupported(what) => H5Error::Unsupported(format!("attribute '{name}' of '{path}': {what}")),
                other => other,
            })?;
            attrs.insert(name, value);
        }
        let (kind, shape, dtype) = match &object {
            Object::Group(_) => (EntryKind::Group, Vec::new(), None),
            Object::Dataset(ds) => {
                let descriptor = ds.dtype().and_then(|t| t.to_descriptor()).map_err(backend)?;
                (EntryKind::Dataset, ds.shape(), Some(map_descriptor(&descriptor)?))
            }
        };
        Ok(Entry {
            path: self.canonical(path)?,
            kind,
            attrs,
            shape,
            dtype,
        })
    }

    fn children(&self, path: &str) -> Result<Vec<(String, String)>, H5Error> {
        match self.object(path)? {
            Object::Group(group) => Ok(group
                .member_names()
                .map_err(backend)?
                .into_iter()
                .map(|name| {
                    let child = join(path, &name);
                    (name, child)
                })
                .collect()),
            Object::Dataset(_) => Err(H5Error::WrongKind {
                path: path.to_string(),
                expected: EntryKind::Group,
                actual: EntryKind::Dataset,
            }),
        }
    }

    fn canonical(&self, path: &str) -> Result<String, H5Error> {
        let key = token_key(self.object(path)?.location())?;
        let mut cache = self.canonical.borrow_mut();
        if cache.is_none() {
            *cache = Some(self.build_canonical_index()?);
        }
        Ok(cache
            .as_ref()
            .and_then(|index| index.get(&key).cloned())
            .unwrap_or_else(|| path.to_string()))
    }

    fn dereference(&self, reference: ObjectRef) -> Result<String, H5Error> {
        Err(H5Error::Unsupported(format!("object reference {reference}")))
    }

    fn read(&self, path: &str, selection: &Selection) -> Result<ArrayData, H5Error> {
        let dataset = match self.object(path)? {
            Object::Dataset(ds) => ds,
            Object::Group(_) => {
                return Err(H5Error::WrongKind {
                    path: path.to_string(),
                    expected: EntryKind::Dataset,
                    actual: EntryKind::Group,
                })
            }
        };
        let descriptor = dataset.dtype().and_then(|t| t.to_descriptor()).map_err(backend)?;
        let data = read_container(&dataset, &descriptor)?;
        data.select(selection).map_err(|source| H5Error::Selection {
            path: path.to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_groups_and_datasets_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.h5");
        {
            let file = File::create(&path).unwrap();
            let group = file.create_group("acquisition").unwrap();
            let attr = group.new_attr::<VarLenUnicode>().create("neurodata_type").unwrap();
            let value: VarLenUnicode = "TimeSeries".parse().unwrap();
            attr.write_scalar(&value).unwrap();
            group
                .new_dataset_builder()
                .with_data(&[1.0f64, 2.0, 3.0])
                .create("data")
                .unwrap();
        }

        let source = NativeFile::new(&path);
        let handle = source.open().unwrap();
        let entry = handle.entry("/acquisition").unwrap();
        assert_eq!(entry.kind, EntryKind::Group);
        assert_eq!(entry.attrs["neurodata_type"].as_str(), Some("TimeSeries"));
        let value = handle.read("/acquisition/data", &Selection::Index(2)).unwrap();
        assert_eq!(value.as_scalar(), Some(Scalar::Float(3.0)));
    }

    #[derive(hdf5::H5Type, Clone, Copy, Debug)]
    #[repr(C)]
    struct Interval {
        start: f64,
        stop: f64,
    }

    #[test]
    fn test_unreadable_types_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("compound.h5");
        {
            let file = File::create(&path).unwrap();
            file.new_dataset_builder()
                .with_data(&[Interval { start: 0.0, stop: 1.0 }])
                .create("epochs")
                .unwrap();
            let group = file.create_group("trials").unwrap();
            let attr = group.new_attr::<Interval>().create("window").unwrap();
            attr.write_scalar(&Interval { start: 0.5, stop: 2.0 }).unwrap();
        }

        let source = NativeFile::new(&path);
        let handle = source.open().unwrap();
        let entry = handle.entry("/epochs").unwrap();
        assert_eq!(
            entry.dtype,
            Some(DType::Compound(vec![
                ("start".to_string(), DType::Float),
                ("stop".to_string(), DType::Float),
            ]))
        );
        assert!(matches!(
            handle.read("/epochs", &Selection::All),
            Err(H5Error::Unsupported(_))
        ));
        match handle.entry("/trials") {
            Err(H5Error::Unsupported(what)) => assert!(what.contains("attribute 'window' of '/trials'")),
            other => panic!("expected the attribute to be reported, got {other:?}"),
        }
    }
}
