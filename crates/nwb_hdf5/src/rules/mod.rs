//! Resolution rules.
//!
//! Each phase has an ordered list of rules. For every queued item the
//! first rule (lowest priority number) whose `check` accepts it is
//! applied. Rules never touch the queue: they return a [`ReadResult`] and
//! the queue applies it at the end of the pass.

mod construct;
mod plan;
mod read;

pub use construct::{CompleteContainerGroup, CompleteModelGroup, CompleteTable, Passthrough};
pub use plan::PruneEmptyGroups;
pub use read::{
    ResolveAttributedGroup, ResolveContainerGroup, ResolveDataset, ResolveDynamicTable, ResolveModelDataset,
    ResolveModelGroup, ResolveScalar,
};

use crate::error::Result;
use crate::flatten::SourceItem;
use crate::h5::{H5Handle, H5Source};
use crate::ids::ObjectId;
use crate::registry::{ModelClass, ModelRegistry};
use crate::result::{Payload, QueueItem, ReadResult};
use crate::value::{Arena, ColumnRef, Value};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Plan,
    Read,
    Construct,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Plan => write!(f, "plan"),
            Phase::Read => write!(f, "read"),
            Phase::Construct => write!(f, "construct"),
        }
    }
}

/// A path resolved as a side effect of another path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Absorbed {
    pub owner: String,
    /// Name under which the owner holds it
    pub name: String,
}

/// Everything a rule may read while deciding and applying. Frozen for the
/// duration of a pass.
pub struct RuleContext<'a> {
    pub handle: &'a dyn H5Handle,
    pub source: &'a Arc<dyn H5Source>,
    pub registry: &'a ModelRegistry,
    /// Every flattened item, by canonical path
    pub items: &'a IndexMap<String, SourceItem>,
    /// Objects moved into the arena by earlier passes
    pub arena: &'a Arena,
    pub completed: &'a IndexMap<String, ReadResult>,
    pub absorbed: &'a IndexMap<String, Absorbed>,
    pub pruned: &'a IndexSet<String>,
}

impl RuleContext<'_> {
    /// Class an item declares, if the registry knows it.
    pub fn model_for(&self, item: &SourceItem) -> Option<Arc<dyn ModelClass>> {
        let declared = item.neurodata_type.as_ref()?;
        self.registry.get_class(declared.namespace.as_deref(), &declared.name)
    }

    pub fn is_satisfied(&self, path: &str) -> bool {
        is_settled(path, self.completed, self.absorbed, self.pruned)
    }

    /// Value a placeholder for `path` resolves to, once `path` is settled.
    pub fn lookup(&self, path: &str) -> Option<Value> {
        if self.pruned.contains(path) {
            return Some(Value::Null);
        }
        if let Some(absorbed) = self.absorbed.get(path) {
            let table = self.object_id(&absorbed.owner)?;
            return Some(Value::Column(ColumnRef {
                table,
                column: absorbed.name.clone(),
            }));
        }
        self.completed
            .get(path)
            .and_then(|result| result.payload.as_ref())
            .map(Payload::as_value)
    }

    fn object_id(&self, path: &str) -> Option<ObjectId> {
        match self.completed.get(path)?.payload.as_ref()? {
            Payload::Object(id) => Some(*id),
            _ => None,
        }
    }
}

/// Whether a dependency on `path` can be substituted. An absorbed path
/// settles with its owner.
pub(crate) fn is_settled(
    path: &str,
    completed: &IndexMap<String, ReadResult>,
    absorbed: &IndexMap<String, Absorbed>,
    pruned: &IndexSet<String>,
) -> bool {
    completed.contains_key(path)
        || pruned.contains(path)
        || absorbed
            .get(path)
            .is_some_and(|absorbed| completed.contains_key(&absorbed.owner))
}

pub trait Rule: Send + Sync {
    fn name(&self) -> &'static str;

    fn phase(&self) -> Phase;

    /// Lower runs first.
    fn priority(&self) -> u32;

    fn check(&self, item: &QueueItem, ctx: &RuleContext<'_>) -> bool;

    fn apply(&self, item: &QueueItem, ctx: &RuleContext<'_>) -> Result<ReadResult>;
}

/// Rules of every phase, sorted by priority.
pub struct RuleSet {
    rules: Vec<Box<dyn Rule>>,
}

impl RuleSet {
    /// Rules sort stably by priority; equal priorities keep the given order.
    pub fn new(mut rules: Vec<Box<dyn Rule>>) -> Self {
        rules.sort_by_key(|rule| rule.priority());
        Self { rules }
    }

    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(PruneEmptyGroups),
            Box::new(ResolveDynamicTable),
            Box::new(ResolveContainerGroup),
            Box::new(ResolveModelGroup),
            Box::new(ResolveModelDataset),
            Box::new(ResolveDataset),
            Box::new(ResolveScalar),
            Box::new(ResolveAttributedGroup),
            Box::new(Passthrough),
            Box::new(CompleteTable),
            Box::new(CompleteContainerGroup),
            Box::new(CompleteModelGroup),
        ])
    }

    /// Add a rule, keeping the priority order.
    pub fn with(mut self, rule: Box<dyn Rule>) -> Self {
        self.rules.push(rule);
        self.rules.sort_by_key(|rule| rule.priority());
        self
    }

    pub fn for_phase(&self, phase: Phase) -> impl Iterator<Item = &dyn Rule> {
        self.rules
            .iter()
            .map(|rule| rule.as_ref())
            .filter(move |rule| rule.phase() == phase)
    }

    pub fn first_match(&self, phase: Phase, item: &QueueItem, ctx: &RuleContext<'_>) -> Option<&dyn Rule> {
        self.for_phase(phase).find(|rule| rule.check(item, ctx))
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.rules.iter().map(|r| format!("{}:{}:{}", r.phase(), r.priority(), r.name())))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_rules_sorted_per_phase() {
        let rules = RuleSet::standard();
        let read: Vec<(u32, &str)> = rules
            .for_phase(Phase::Read)
            .map(|r| (r.priority(), r.name()))
            .collect();
        assert_eq!(
            read,
            vec![
                (1, "dynamic_table"),
                (9, "container_group"),
                (10, "model_group"),
                (10, "model_dataset"),
                (11, "dataset"),
                (11, "scalar"),
                (12, "attributed_group"),
            ]
        );
        let construct: Vec<&str> = rules.for_phase(Phase::Construct).map(|r| r.name()).collect();
        assert_eq!(
            construct,
            vec!["passthrough", "complete_table", "complete_container", "complete_model"]
        );
        assert_eq!(rules.for_phase(Phase::Plan).count(), 1);
    }
}
