//! NWB Schema Language
//!
//! Serde model of the schema language used to describe hierarchical
//! scientific data files: a *namespace* file lists *schema* files, and each
//! schema file declares groups and datasets, which in turn carry attributes,
//! nested groups/datasets and links.
//!
//! # Modules
//!
//! - [`namespace`]: Namespace collections and schema references
//! - [`schema`]: Schema files and their node kinds (Group, Dataset, Attribute, Link)
//! - [`dtype`]: Dtype variants (flat, compound, reference) and dims/shape specs
//! - [`walk`]: Restartable depth-first traversal over any node tree

pub mod dtype;
pub mod error;
pub mod namespace;
pub mod schema;
pub mod walk;

pub use dtype::{CompoundDtype, Dims, Dtype, FlatDtype, Nested, RefType, ReferenceDtype, Shape};
pub use error::{Result, SchemaLanguageError};
pub use namespace::{Namespace, Namespaces, SchemaRef};
pub use schema::{Attribute, Dataset, Group, Link, NodeMut, Quantity, Schema};
pub use walk::{Node, NodeKind, Walk, WalkFields, WalkTypes, Walkable};
