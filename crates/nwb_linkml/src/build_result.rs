//! Accumulator for the artifacts emitted by the adapters.

use crate::linkml::{ClassDefinition, Named, SchemaDefinition, SlotDefinition, TypeDefinition};
use serde::Serialize;
use std::fmt;
use std::ops::{Add, AddAssign};
use tracing::warn;

/// The four artifact kinds a [`BuildResult`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Schema,
    Class,
    Slot,
    Type,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Schema => write!(f, "schema"),
            ArtifactKind::Class => write!(f, "class"),
            ArtifactKind::Slot => write!(f, "slot"),
            ArtifactKind::Type => write!(f, "type"),
        }
    }
}

/// Two different definitions shared a name during a merge; the left one was kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Collision {
    pub kind: ArtifactKind,
    pub name: String,
}

/// Schemas, classes, slots and types produced by building a node tree.
///
/// Merging (`+`, `+=`) deduplicates by name: an artifact already present on
/// the left is never duplicated from the right. When the right-hand artifact
/// differs from the kept one the clash is recorded in
/// [`BuildResult::collisions`] instead of being silently shadowed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BuildResult {
    pub schemas: Vec<SchemaDefinition>,
    pub classes: Vec<ClassDefinition>,
    pub slots: Vec<SlotDefinition>,
    pub types: Vec<TypeDefinition>,
    #[serde(skip)]
    pub collisions: Vec<Collision>,
}

impl BuildResult {
    pub fn with_class(class: ClassDefinition) -> Self {
        Self {
            classes: vec![class],
            ..Default::default()
        }
    }

    pub fn with_slot(slot: SlotDefinition) -> Self {
        Self {
            slots: vec![slot],
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
            && self.classes.is_empty()
            && self.slots.is_empty()
            && self.types.is_empty()
    }

    pub fn schema(&self, name: &str) -> Option<&SchemaDefinition> {
        self.schemas.iter().find(|s| s.name == name)
    }

    pub fn class(&self, name: &str) -> Option<&ClassDefinition> {
        self.classes.iter().find(|c| c.name == name)
    }

    pub fn slot(&self, name: &str) -> Option<&SlotDefinition> {
        self.slots.iter().find(|s| s.name == name)
    }

    pub fn type_def(&self, name: &str) -> Option<&TypeDefinition> {
        self.types.iter().find(|t| t.name == name)
    }

    /// Take the slots out, leaving everything else in place.
    pub fn take_slots(&mut self) -> Vec<SlotDefinition> {
        std::mem::take(&mut self.slots)
    }

    fn merge(&mut self, other: BuildResult) {
        let collisions = &mut self.collisions;
        merge_named(&mut self.schemas, other.schemas, ArtifactKind::Schema, collisions);
        merge_named(&mut self.classes, other.classes, ArtifactKind::Class, collisions);
        merge_named(&mut self.slots, other.slots, ArtifactKind::Slot, collisions);
        merge_named(&mut self.types, other.types, ArtifactKind::Type, collisions);
        for collision in other.collisions {
            if !collisions.contains(&collision) {
                collisions.push(collision);
            }
        }
    }
}

fn merge_named<T>(left: &mut Vec<T>, right: Vec<T>, kind: ArtifactKind, collisions: &mut Vec<Collision>)
where
    T: Named + PartialEq,
{
    for item in right {
        match left.iter().find(|existing| existing.name() == item.name()) {
            Some(existing) => {
                if *existing != item {
                    warn!("{} '{}' defined twice with different content; keeping the first", kind, item.name());
                    let collision = Collision {
                        kind,
                        name: item.name().to_string(),
                    };
                    if !collisions.contains(&collision) {
                        collisions.push(collision);
                    }
                }
            }
            None => left.push(item),
        }
    }
}

impl AddAssign for BuildResult {
    fn add_assign(&mut self, other: BuildResult) {
        self.merge(other);
    }
}

impl Add for BuildResult {
    type Output = BuildResult;

    fn add(mut self, other: BuildResult) -> BuildResult {
        self.merge(other);
        self
    }
}
