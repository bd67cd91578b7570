//! Hierarchical NWB file resolution
//!
//! Reads an HDF5-style file into typed model instances. The file is
//! flattened into one item per object, then driven through three phases of
//! prioritized rules:
//!
//! 1. **plan**: prune empty groups (one pass)
//! 2. **read**: turn each item into a mapping, value, or dynamic table,
//!    with placeholders for the paths it refers to
//! 3. **construct**: substitute placeholders with settled values and
//!    instantiate model classes, repeating until nothing is left
//!
//! Array data is never read eagerly: datasets become [`LazyArray`] proxies
//! that open the file for each access.
//!
//! # Example
//!
//! ```rust,ignore
//! use nwb_hdf5::{resolve, ModelRegistry, NativeFile};
//! use std::sync::Arc;
//!
//! let registry = ModelRegistry::from_build(&core.build(false)?)?;
//! let file = resolve(Arc::new(NativeFile::new("session.nwb")), &registry)?;
//! println!("{}", serde_json::to_string_pretty(&file.to_json())?);
//! ```

pub mod array;
pub mod config;
pub mod error;
pub mod flatten;
pub mod h5;
pub mod ids;
pub mod lazy;
pub mod queue;
pub mod reader;
pub mod registry;
pub mod result;
pub mod rules;
pub mod table;
pub mod value;

pub use array::{ArrayData, DType, ObjectRef, Scalar, Selection};
pub use config::ResolverConfig;
pub use error::{
    ConfigError, H5Error, RegistryError, ResolveError, Result, TableError, UnresolvedItem, ValidationError,
};
pub use flatten::{flatten_hdf, SourceItem, TypeRef};
#[cfg(feature = "native")]
pub use h5::NativeFile;
pub use h5::{AttrValue, EntryKind, H5Handle, H5Source, MemoryFile, MemoryFileBuilder};
pub use ids::{ColumnId, ObjectId};
pub use lazy::LazyArray;
pub use queue::ReadQueue;
pub use reader::{resolve, Hdf5Reader, Resolution, ResolvedFile};
pub use registry::{ClassKey, DynamicClass, FieldSpec, ModelClass, ModelRegistry, Primitive, Range};
pub use result::{Payload, QueueItem, ReadResult};
pub use rules::{Phase, Rule, RuleContext, RuleSet};
pub use table::{Cell, Column, DynamicTable};
pub use value::{Arena, ColumnRef, Instance, Object, Value};
