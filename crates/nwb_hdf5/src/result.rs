//! Outputs of rule application.

use crate::flatten::{SourceItem, TypeRef};
use crate::ids::ObjectId;
use crate::registry::ModelClass;
use crate::table::DynamicTable;
use crate::value::{Instance, Value};
use indexmap::{IndexMap, IndexSet};
use std::sync::Arc;

/// What a rule produced for one path.
#[derive(Debug, Clone)]
pub enum Payload {
    /// Field values still to be substituted and, for typed items,
    /// passed to a constructor
    Mapping(IndexMap<String, Value>),
    Value(Value),
    Model(Instance),
    Table(DynamicTable),
    /// Already moved into the arena
    Object(ObjectId),
    /// A table already in the arena, with its placeholders substituted
    TableUpdate(ObjectId, Box<DynamicTable>),
}

impl Payload {
    /// The value a reference to this payload's path resolves to.
    pub fn as_value(&self) -> Value {
        match self {
            Payload::Mapping(map) => Value::Map(map.clone()),
            Payload::Value(value) => value.clone(),
            Payload::Object(id) | Payload::TableUpdate(id, _) => Value::Object(*id),
            // Model and table payloads are moved into the arena before
            // anything can depend on them.
            Payload::Model(_) | Payload::Table(_) => Value::Null,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReadResult {
    pub path: String,
    pub source: SourceItem,
    pub completed: bool,
    /// `None` marks a pruned item once `completed` is set
    pub payload: Option<Payload>,
    /// Class to construct during the construct phase
    pub model: Option<Arc<dyn ModelClass>>,
    /// Other paths this result resolves as a side effect
    pub completes: Vec<String>,
    pub neurodata_type: Option<TypeRef>,
    /// Names of rules applied so far, in order
    pub applied: Vec<&'static str>,
    pub errors: Vec<String>,
    /// Paths whose resolved values this result still needs
    pub depends: IndexSet<String>,
}

impl ReadResult {
    pub fn new(source: &SourceItem, rule: &'static str) -> Self {
        Self {
            path: source.path.clone(),
            source: source.clone(),
            completed: false,
            payload: None,
            model: None,
            completes: Vec::new(),
            neurodata_type: source.neurodata_type.clone(),
            applied: vec![rule],
            errors: Vec::new(),
            depends: IndexSet::new(),
        }
    }

    pub fn complete(mut self, payload: Option<Payload>) -> Self {
        self.completed = true;
        self.payload = payload;
        self
    }

    pub fn with_model(mut self, model: Arc<dyn ModelClass>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_depends(mut self, depends: impl IntoIterator<Item = String>) -> Self {
        self.depends.extend(depends);
        self
    }

    pub fn is_pruned(&self) -> bool {
        self.completed && self.payload.is_none()
    }
}

/// An entry of the read queue: a fresh source item, or a result carried
/// between phases.
#[derive(Debug, Clone)]
pub enum QueueItem {
    Source(SourceItem),
    Result(Box<ReadResult>),
}

impl QueueItem {
    pub fn path(&self) -> &str {
        match self {
            QueueItem::Source(item) => &item.path,
            QueueItem::Result(result) => &result.path,
        }
    }

    pub fn source(&self) -> &SourceItem {
        match self {
            QueueItem::Source(item) => item,
            QueueItem::Result(result) => &result.source,
        }
    }

    pub fn result(&self) -> Option<&ReadResult> {
        match self {
            QueueItem::Source(_) => None,
            QueueItem::Result(result) => Some(result),
        }
    }

    /// Dependencies still outstanding.
    pub fn depends(&self) -> impl Iterator<Item = &String> {
        match self {
            QueueItem::Source(item) => item.depends_on.iter(),
            QueueItem::Result(result) => result.depends.iter(),
        }
    }

    pub fn applied(&self) -> &[&'static str] {
        match self {
            QueueItem::Source(_) => &[],
            QueueItem::Result(result) => &result.applied,
        }
    }

    pub fn errors(&self) -> &[String] {
        match self {
            QueueItem::Source(_) => &[],
            QueueItem::Result(result) => &result.errors,
        }
    }
}
