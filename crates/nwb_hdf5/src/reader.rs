//! Entry point: resolve a whole file into model instances.

use crate::config::ResolverConfig;
use crate::error::{ResolveError, Result};
use crate::h5::H5Source;
use crate::ids::ObjectId;
use crate::queue::ReadQueue;
use crate::registry::ModelRegistry;
use crate::rules::{Phase, RuleSet};
use crate::table::DynamicTable;
use crate::value::{Arena, Instance, Value};
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::info;

/// How one flattened path ended up.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Constructed into the arena
    Object(ObjectId),
    /// A plain value or mapping
    Value(Value),
    /// Empty group, dropped
    Pruned,
    /// Resolved as part of another object
    Absorbed { owner: String, column: String },
}

/// Everything resolved from one file.
#[derive(Debug)]
pub struct ResolvedFile {
    pub locator: String,
    pub arena: Arena,
    pub root: Value,
    pub entries: IndexMap<String, Resolution>,
    /// Passes each phase took
    pub passes: IndexMap<Phase, usize>,
}

impl ResolvedFile {
    pub fn root_instance(&self) -> Option<&Instance> {
        self.root.as_object().and_then(|id| self.arena.instance(id))
    }

    pub fn get(&self, path: &str) -> Option<&Resolution> {
        self.entries.get(path)
    }

    /// The instance constructed from `path`, if it became one.
    pub fn instance(&self, path: &str) -> Option<&Instance> {
        match self.entries.get(path)? {
            Resolution::Object(id) => self.arena.instance(*id),
            _ => None,
        }
    }

    /// The table materialized from `path`, if it became one.
    pub fn table(&self, path: &str) -> Option<&DynamicTable> {
        match self.entries.get(path)? {
            Resolution::Object(id) => self.arena.table(*id),
            _ => None,
        }
    }

    /// Follow an object-valued field of an instance.
    pub fn follow(&self, value: &Value) -> Option<&crate::value::Object> {
        value.as_object().and_then(|id| self.arena.get(id))
    }

    /// JSON rendering of the root, with objects expanded inline and arrays
    /// left as references into the file.
    pub fn to_json(&self) -> serde_json::Value {
        self.root.to_json(&self.arena)
    }
}

/// Resolves files against a model registry.
pub struct Hdf5Reader<'a> {
    source: Arc<dyn H5Source>,
    registry: &'a ModelRegistry,
    config: ResolverConfig,
    rules: RuleSet,
}

impl<'a> Hdf5Reader<'a> {
    pub fn new(source: Arc<dyn H5Source>, registry: &'a ModelRegistry) -> Self {
        Self {
            source,
            registry,
            config: ResolverConfig::default(),
            rules: RuleSet::standard(),
        }
    }

    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }

    /// Flatten, then plan, read and construct.
    pub fn read(&self) -> Result<ResolvedFile> {
        info!(file = %self.source.locator(), "Resolving file");
        let mut queue = ReadQueue::new(Arc::clone(&self.source), self.registry, &self.rules, &self.config)?;
        queue.apply_phase(Phase::Plan)?;
        queue.handoff();
        queue.apply_phase(Phase::Read)?;
        queue.handoff();
        queue.apply_phase(Phase::Construct)?;
        let resolved = queue.finish()?;
        info!(
            file = %resolved.locator,
            objects = resolved.arena.len(),
            entries = resolved.entries.len(),
            "Resolved file"
        );
        Ok(resolved)
    }

    /// Resolve and return the root instance's arena id.
    pub fn read_root(&self) -> Result<(ResolvedFile, ObjectId)> {
        let resolved = self.read()?;
        let id = resolved.root.as_object().ok_or(ResolveError::MissingRoot)?;
        Ok((resolved, id))
    }
}

/// Resolve `source` with the default configuration.
pub fn resolve(source: Arc<dyn H5Source>, registry: &ModelRegistry) -> Result<ResolvedFile> {
    Hdf5Reader::new(source, registry).read()
}
