//! Adapters from schema-language nodes to LinkML artifacts.
//!
//! Every adapter borrows one source node, can be walked like it, and builds a
//! [`BuildResult`]. Nested adapters return their parent-facing slot in
//! `BuildResult::slots`; the enclosing adapter moves those slots into its own
//! class and merges everything else upward.

pub mod attribute;
pub mod dataset;
pub mod dtype;
pub mod group;
pub mod link;
pub mod namespaces;
pub mod schema;
pub mod shape;

pub use attribute::AttributeAdapter;
pub use dataset::DatasetAdapter;
pub use dtype::{DtypeAdapter, DtypeRange};
pub use group::GroupAdapter;
pub use link::LinkAdapter;
pub use namespaces::NamespacesAdapter;
pub use schema::SchemaAdapter;
pub use shape::{shape_expression, ShapeExpression};

use crate::build_result::BuildResult;
use crate::error::Result;
use crate::linkml::{AnonymousSlotExpression, SlotDefinition};
use nwb_schema_language::{Quantity, Walkable};

/// Range used when a node declares no dtype.
pub const ANY_TYPE: &str = "AnyType";

/// Slot holding a container's unnamed, typed children.
pub const CHILDREN_SLOT: &str = "children";

/// Annotation key marking where a slot came from in the source schema.
pub const SOURCE_TYPE_ANNOTATION: &str = "source_type";

pub trait Adapter: Walkable {
    fn build(&self) -> Result<BuildResult>;
}

pub(crate) fn apply_quantity(slot: &mut SlotDefinition, quantity: Quantity) {
    slot.required = quantity.required();
    slot.multivalued = quantity.multivalued();
}

/// The `name` slot every class carries.
pub(crate) fn name_slot(fixed: Option<&str>) -> SlotDefinition {
    let mut slot = SlotDefinition::new("name").with_range("string");
    slot.required = true;
    slot.ifabsent = fixed.map(|name| format!("string({name})"));
    slot
}

/// Name of a nested class generated for an untyped child of `parent`.
pub(crate) fn nested_class_name(parent: &str, name: &str) -> String {
    format!("{parent}__{name}")
}

/// Collects unnamed typed children into one multivalued slot.
#[derive(Debug, Default)]
pub(crate) struct ChildrenSlot {
    ranges: Vec<String>,
    required: bool,
    description: Vec<String>,
}

impl ChildrenSlot {
    pub(crate) fn push(&mut self, range: &str, quantity: Quantity, doc: &str) {
        if !self.ranges.iter().any(|r| r == range) {
            self.ranges.push(range.to_string());
        }
        self.required |= quantity.required();
        if !doc.is_empty() {
            self.description.push(doc.to_string());
        }
    }

    pub(crate) fn finish(self) -> Option<SlotDefinition> {
        if self.ranges.is_empty() {
            return None;
        }
        let mut slot = SlotDefinition::new(CHILDREN_SLOT).with_description(&self.description.join(" "));
        slot.multivalued = true;
        slot.inlined = true;
        slot.required = self.required;
        if self.ranges.len() == 1 {
            slot.range = self.ranges.into_iter().next();
        } else {
            slot.any_of = self
                .ranges
                .into_iter()
                .map(|range| AnonymousSlotExpression {
                    range: Some(range),
                    array: None,
                })
                .collect();
        }
        Some(slot)
    }
}
