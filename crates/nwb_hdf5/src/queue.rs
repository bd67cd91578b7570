//! The read queue: drives items through plan, read and construct.
//!
//! Each pass opens the file once, applies the first matching rule to every
//! queued item against the state frozen at pass start, then applies all
//! results together. Results of a pass are only visible to later passes.

use crate::config::ResolverConfig;
use crate::error::{ResolveError, Result, UnresolvedItem};
use crate::flatten::{flatten_hdf, SourceItem};
use crate::h5::H5Source;
use crate::reader::{Resolution, ResolvedFile};
use crate::registry::ModelRegistry;
use crate::result::{Payload, QueueItem, ReadResult};
use crate::rules::{is_settled, Absorbed, Phase, RuleContext, RuleSet};
use crate::value::{Arena, Object};
use indexmap::{IndexMap, IndexSet};
use std::sync::Arc;
use tracing::{debug, info};

pub struct ReadQueue<'a> {
    source: Arc<dyn H5Source>,
    registry: &'a ModelRegistry,
    rules: &'a RuleSet,
    max_passes: usize,
    items: IndexMap<String, SourceItem>,
    queue: IndexMap<String, QueueItem>,
    completed: IndexMap<String, ReadResult>,
    absorbed: IndexMap<String, Absorbed>,
    pruned: IndexSet<String>,
    arena: Arena,
    passes: IndexMap<Phase, usize>,
}

impl<'a> ReadQueue<'a> {
    /// Flatten the file and queue every item.
    pub fn new(
        source: Arc<dyn H5Source>,
        registry: &'a ModelRegistry,
        rules: &'a RuleSet,
        config: &ResolverConfig,
    ) -> Result<Self> {
        let items = {
            let handle = source.open()?;
            flatten_hdf(handle.as_ref(), source.locator(), &config.skip_names)?
        };
        let queue = items
            .iter()
            .map(|(path, item)| (path.clone(), QueueItem::Source(item.clone())))
            .collect();
        Ok(Self {
            source,
            registry,
            rules,
            max_passes: config.max_passes,
            items,
            queue,
            completed: IndexMap::new(),
            absorbed: IndexMap::new(),
            pruned: IndexSet::new(),
            arena: Arena::new(),
            passes: IndexMap::new(),
        })
    }

    pub fn queue(&self) -> &IndexMap<String, QueueItem> {
        &self.queue
    }

    pub fn completed(&self) -> &IndexMap<String, ReadResult> {
        &self.completed
    }

    pub fn items(&self) -> &IndexMap<String, SourceItem> {
        &self.items
    }

    /// Run one phase to its fixed point. Plan runs exactly one pass; read
    /// and construct run until the queue empties, a pass settles nothing,
    /// or the pass budget runs out.
    pub fn apply_phase(&mut self, phase: Phase) -> Result<()> {
        let budget = match phase {
            Phase::Plan => 1,
            _ => self.max_passes,
        };
        let mut passes = 0;
        let mut stalled = false;
        while passes < budget && (phase == Phase::Plan || !self.queue.is_empty()) {
            passes += 1;
            let settled = self.run_pass(phase)?;
            debug!(%phase, pass = passes, settled, queued = self.queue.len(), "Pass complete");
            if settled == 0 {
                stalled = true;
                break;
            }
        }
        self.passes.insert(phase, passes);

        if phase != Phase::Plan && !self.queue.is_empty() {
            let reason = if stalled {
                format!("no {phase} rule applies")
            } else {
                format!("pass budget of {budget} exhausted")
            };
            return Err(ResolveError::Unresolved {
                phase,
                items: self.unresolved(phase, &reason),
            });
        }
        info!(
            %phase,
            passes,
            completed = self.completed.len(),
            pruned = self.pruned.len(),
            absorbed = self.absorbed.len(),
            "Phase complete"
        );
        Ok(())
    }

    /// Returns how many items settled.
    fn run_pass(&mut self, phase: Phase) -> Result<usize> {
        let staged = {
            let handle = self.source.open()?;
            let ctx = RuleContext {
                handle: handle.as_ref(),
                source: &self.source,
                registry: self.registry,
                items: &self.items,
                arena: &self.arena,
                completed: &self.completed,
                absorbed: &self.absorbed,
                pruned: &self.pruned,
            };
            let mut staged = Vec::new();
            for (path, item) in &self.queue {
                if let Some(rule) = self.rules.first_match(phase, item, &ctx) {
                    staged.push((path.clone(), rule.apply(item, &ctx)?));
                }
            }
            staged
        };

        let mut settled = 0;
        let mut retire = Vec::new();
        for (path, mut result) in staged {
            let Some(original) = self.queue.shift_remove(&path) else {
                continue;
            };
            if !result.completed {
                let requeued = match phase {
                    Phase::Construct => QueueItem::Result(Box::new(result)),
                    _ => original,
                };
                self.queue.insert(path, requeued);
                continue;
            }
            settled += 1;
            for done in &result.completes {
                let name = result
                    .source
                    .children
                    .iter()
                    .find(|(_, child)| *child == done)
                    .map(|(name, _)| name.clone())
                    .unwrap_or_else(|| crate::h5::basename(done).to_string());
                retire.push((
                    done.clone(),
                    Absorbed {
                        owner: path.clone(),
                        name,
                    },
                ));
            }
            result.payload = match result.payload.take() {
                None => {
                    self.pruned.insert(path);
                    continue;
                }
                Some(Payload::Model(instance)) => Some(Payload::Object(self.arena.push(Object::Model(instance)))),
                Some(Payload::Table(table)) => Some(Payload::Object(self.arena.push(Object::Table(table)))),
                Some(Payload::TableUpdate(id, table)) => {
                    self.arena.replace(id, Object::Table(*table));
                    Some(Payload::Object(id))
                }
                other => other,
            };
            self.completed.insert(path, result);
        }

        for (path, absorbed) in retire {
            self.queue.shift_remove(&path);
            self.completed.shift_remove(&path);
            self.absorbed.insert(path, absorbed);
        }
        Ok(settled)
    }

    /// Move every completed result back into the queue for the next phase.
    pub fn handoff(&mut self) {
        for (path, result) in self.completed.drain(..) {
            self.queue.insert(path, QueueItem::Result(Box::new(result)));
        }
    }

    fn unresolved(&self, phase: Phase, reason: &str) -> Vec<UnresolvedItem> {
        self.queue
            .iter()
            .map(|(path, item)| {
                let missing: Vec<String> = item
                    .depends()
                    .filter(|dep| !is_settled(dep, &self.completed, &self.absorbed, &self.pruned))
                    .cloned()
                    .collect();
                let mut errors = item.errors().to_vec();
                for dep in &missing {
                    if !self.items.contains_key(dep) {
                        errors.push(format!("'{dep}' is not present in file"));
                    }
                }
                if missing.is_empty() {
                    errors.push(reason.to_string());
                }
                UnresolvedItem {
                    phase,
                    path: path.clone(),
                    rules: item.applied().to_vec(),
                    missing,
                    errors,
                }
            })
            .collect()
    }

    /// Completed results that recorded errors along the way.
    fn item_errors(&self) -> Vec<UnresolvedItem> {
        self.completed
            .iter()
            .filter(|(_, result)| !result.errors.is_empty())
            .map(|(path, result)| UnresolvedItem {
                phase: Phase::Construct,
                path: path.clone(),
                rules: result.applied.clone(),
                missing: Vec::new(),
                errors: result.errors.clone(),
            })
            .collect()
    }

    /// The final state: every flattened path settled one way or another.
    /// Fails if any settled result carries errors.
    pub fn finish(self) -> Result<ResolvedFile> {
        let failed = self.item_errors();
        if !failed.is_empty() {
            return Err(ResolveError::Incomplete { items: failed });
        }

        let mut entries = IndexMap::new();
        for path in self.items.keys() {
            let resolution = if let Some(result) = self.completed.get(path) {
                match &result.payload {
                    Some(Payload::Object(id)) => Resolution::Object(*id),
                    Some(payload) => Resolution::Value(payload.as_value()),
                    None => Resolution::Pruned,
                }
            } else if self.pruned.contains(path) {
                Resolution::Pruned
            } else if let Some(absorbed) = self.absorbed.get(path) {
                Resolution::Absorbed {
                    owner: absorbed.owner.clone(),
                    column: absorbed.name.clone(),
                }
            } else {
                continue;
            };
            entries.insert(path.clone(), resolution);
        }

        let root = self
            .completed
            .get("/")
            .and_then(|result| result.payload.as_ref())
            .map(Payload::as_value)
            .ok_or(ResolveError::MissingRoot)?;
        Ok(ResolvedFile {
            locator: self.source.locator().to_string(),
            arena: self.arena,
            root,
            entries,
            passes: self.passes,
        })
    }
}
