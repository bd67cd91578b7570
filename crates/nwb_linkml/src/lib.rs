//! NWB → LinkML translation
//!
//! Walks NWB schema-language namespaces and emits LinkML schemas, classes,
//! slots and types.
//!
//! # Modules
//!
//! - [`linkml`]: The target schema model
//! - [`build_result`]: Deduplicating accumulator of emitted artifacts
//! - [`adapters`]: One adapter per source node kind, plus namespace composition
//! - [`lang`]: The `nwb.language` primitive-type schema
//!
//! # Example
//!
//! ```rust,ignore
//! use nwb_linkml::NamespacesAdapter;
//!
//! let common = NamespacesAdapter::from_yaml("hdmf-common/namespace.yaml".as_ref(), vec![])?;
//! let core = NamespacesAdapter::from_yaml("core/nwb.namespace.yaml".as_ref(), vec![common])?;
//! let build = core.build(false)?;
//! for schema in &build.schemas {
//!     println!("{} ({} classes)", schema.name, schema.classes.len());
//! }
//! ```

pub mod adapters;
pub mod build_result;
pub mod error;
pub mod lang;
pub mod linkml;

pub use adapters::{Adapter, NamespacesAdapter, SchemaAdapter, ShapeExpression};
pub use build_result::{ArtifactKind, BuildResult, Collision};
pub use error::{AdapterError, Result};
pub use linkml::{
    AnonymousSlotExpression, ArrayExpression, ClassDefinition, DimensionExpression, SchemaDefinition,
    SlotDefinition, TypeDefinition,
};
