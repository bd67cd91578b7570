//! In-memory file image.
//!
//! Mirrors the object model of an HDF5 file: objects live in a table and
//! are addressed by index, groups map link names to object indices, and an
//! object's canonical path is the first path it was created under. Hard
//! links add a second name for an existing object. [`ObjectRef`] values
//! are object indices.

use super::{join, AttrValue, Entry, EntryKind, H5Handle, H5Source};
use crate::array::{ArrayData, ObjectRef, Selection};
use crate::error::H5Error;
use indexmap::IndexMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const ROOT: usize = 0;

#[derive(Debug, Clone)]
struct MemObject {
    canonical: String,
    kind: EntryKind,
    attrs: IndexMap<String, AttrValue>,
    data: Option<ArrayData>,
    links: IndexMap<String, usize>,
}

impl MemObject {
    fn group(canonical: String) -> Self {
        Self {
            canonical,
            kind: EntryKind::Group,
            attrs: IndexMap::new(),
            data: None,
            links: IndexMap::new(),
        }
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

fn lookup(objects: &[MemObject], path: &str) -> Result<usize, H5Error> {
    let mut current = ROOT;
    for segment in segments(path) {
        current = *objects[current]
            .links
            .get(segment)
            .ok_or_else(|| H5Error::NotFound(path.to_string()))?;
    }
    Ok(current)
}

/// Split `/a/b/c` into (`/a/b`, `c`).
fn split_parent(path: &str) -> Result<(&str, &str), H5Error> {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some((parent, name)) if !name.is_empty() => Ok((if parent.is_empty() { "/" } else { parent }, name)),
        _ => Err(H5Error::AlreadyExists { path: "/".to_string() }),
    }
}

/// An immutable in-memory file.
#[derive(Debug)]
pub struct MemoryFile {
    locator: String,
    objects: Vec<MemObject>,
    opens: AtomicUsize,
    live: Arc<AtomicUsize>,
}

impl MemoryFile {
    pub fn builder(locator: impl Into<String>) -> MemoryFileBuilder {
        MemoryFileBuilder {
            locator: locator.into(),
            objects: vec![MemObject::group("/".to_string())],
        }
    }

    /// Total number of handles opened so far.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Handles currently open.
    pub fn live_handles(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    fn object(&self, path: &str) -> Result<&MemObject, H5Error> {
        lookup(&self.objects, path).map(|index| &self.objects[index])
    }
}

impl H5Source for MemoryFile {
    fn locator(&self) -> &str {
        &self.locator
    }

    fn open(&self) -> Result<Box<dyn H5Handle + '_>, H5Error> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryHandle {
            file: self,
            live: Arc::clone(&self.live),
        }))
    }
}

struct MemoryHandle<'a> {
    file: &'a MemoryFile,
    live: Arc<AtomicUsize>,
}

impl Drop for MemoryHandle<'_> {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl H5Handle for MemoryHandle<'_> {
    fn entry(&self, path: &str) -> Result<Entry, H5Error> {
        let object = self.file.object(path)?;
        let (shape, dtype) = match &object.data {
            Some(data) => (data.shape(), Some(data.dtype())),
            None => (Vec::new(), None),
        };
        Ok(Entry {
            path: object.canonical.clone(),
            kind: object.kind,
            attrs: object.attrs.clone(),
            shape,
            dtype,
        })
    }

    fn children(&self, path: &str) -> Result<Vec<(String, String)>, H5Error> {
        let object = self.file.object(path)?;
        if object.kind != EntryKind::Group {
            return Err(H5Error::WrongKind {
                path: path.to_string(),
                expected: EntryKind::Group,
                actual: object.kind,
            });
        }
        Ok(object
            .links
            .keys()
            .map(|name| (name.clone(), join(path, name)))
            .collect())
    }

    fn canonical(&self, path: &str) -> Result<String, H5Error> {
        self.file.object(path).map(|object| object.canonical.clone())
    }

    fn dereference(&self, reference: ObjectRef) -> Result<String, H5Error> {
        usize::try_from(reference.0)
            .ok()
            .and_then(|index| self.file.objects.get(index))
            .map(|object| object.canonical.clone())
            .ok_or(H5Error::DanglingReference(reference.0))
    }

    fn read(&self, path: &str, selection: &Selection) -> Result<ArrayData, H5Error> {
        let object = self.file.object(path)?;
        let data = object.data.as_ref().ok_or_else(|| H5Error::WrongKind {
            path: path.to_string(),
            expected: EntryKind::Dataset,
            actual: object.kind,
        })?;
        data.select(selection).map_err(|source| H5Error::Selection {
            path: path.to_string(),
            source,
        })
    }
}

/// Builds a [`MemoryFile`]. Every method returns the reference of the
/// object it created or modified.
#[derive(Debug)]
pub struct MemoryFileBuilder {
    locator: String,
    objects: Vec<MemObject>,
}

impl MemoryFileBuilder {
    fn reference(index: usize) -> ObjectRef {
        ObjectRef(index as u64)
    }

    fn ensure_group(&mut self, path: &str) -> Result<usize, H5Error> {
        let mut current = ROOT;
        let mut current_path = "/".to_string();
        for segment in segments(path) {
            current_path = join(&current_path, segment);
            current = match self.objects[current].links.get(segment) {
                Some(&index) => {
                    let kind = self.objects[index].kind;
                    if kind != EntryKind::Group {
                        return Err(H5Error::WrongKind {
                            path: current_path,
                            expected: EntryKind::Group,
                            actual: kind,
                        });
                    }
                    index
                }
                None => {
                    let index = self.objects.len();
                    self.objects.push(MemObject::group(current_path.clone()));
                    self.objects[current].links.insert(segment.to_string(), index);
                    index
                }
            };
        }
        Ok(current)
    }

    /// Create a group and any missing parents. Existing groups are reused.
    pub fn group(&mut self, path: &str) -> Result<ObjectRef, H5Error> {
        self.ensure_group(path).map(Self::reference)
    }

    pub fn dataset(&mut self, path: &str, data: ArrayData) -> Result<ObjectRef, H5Error> {
        let (parent, name) = split_parent(path)?;
        let parent = self.ensure_group(parent)?;
        if self.objects[parent].links.contains_key(name) {
            return Err(H5Error::AlreadyExists { path: path.to_string() });
        }
        let index = self.objects.len();
        self.objects.push(MemObject {
            canonical: join(&self.objects[parent].canonical, name),
            kind: EntryKind::Dataset,
            attrs: IndexMap::new(),
            data: Some(data),
            links: IndexMap::new(),
        });
        self.objects[parent].links.insert(name.to_string(), index);
        Ok(Self::reference(index))
    }

    pub fn attr(&mut self, path: &str, name: &str, value: impl Into<AttrValue>) -> Result<ObjectRef, H5Error> {
        let index = lookup(&self.objects, path)?;
        self.objects[index].attrs.insert(name.to_string(), value.into());
        Ok(Self::reference(index))
    }

    /// Give the object at `target` a second name, `link`.
    pub fn hard_link(&mut self, target: &str, link: &str) -> Result<ObjectRef, H5Error> {
        let index = lookup(&self.objects, target)?;
        let (parent, name) = split_parent(link)?;
        let parent = self.ensure_group(parent)?;
        if self.objects[parent].links.contains_key(name) {
            return Err(H5Error::AlreadyExists { path: link.to_string() });
        }
        self.objects[parent].links.insert(name.to_string(), index);
        Ok(Self::reference(index))
    }

    pub fn build(self) -> MemoryFile {
        MemoryFile {
            locator: self.locator,
            objects: self.objects,
            opens: AtomicUsize::new(0),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }
}
