use crate::adapters::attribute::AttributeAdapter;
use crate::adapters::dataset::DatasetAdapter;
use crate::adapters::link::LinkAdapter;
use crate::adapters::{apply_quantity, name_slot, nested_class_name, Adapter, ChildrenSlot};
use crate::build_result::BuildResult;
use crate::error::{AdapterError, Result};
use crate::linkml::{ClassDefinition, SlotDefinition};
use nwb_schema_language::{Group, Node, Walkable};
use tracing::trace;

/// Adapts one group, top-level (`parent: None`) or nested in a class.
pub struct GroupAdapter<'a> {
    group: &'a Group,
    parent: Option<&'a str>,
}

impl<'a> GroupAdapter<'a> {
    pub fn new(group: &'a Group) -> Self {
        Self { group, parent: None }
    }

    pub fn nested(group: &'a Group, parent: &'a str) -> Self {
        Self {
            group,
            parent: Some(parent),
        }
    }

    pub fn is_anonymous_child(&self) -> bool {
        let g = self.group;
        g.name.is_none() && g.neurodata_type_def.is_none() && g.neurodata_type_inc.is_some()
    }

    /// Build the class for this group, named `class_name`, moving every
    /// child's parent-facing slot into it.
    fn class(&self, class_name: &str) -> Result<BuildResult> {
        let g = self.group;
        trace!("building class {}", class_name);
        let mut class = ClassDefinition::new(class_name);
        if !g.doc.is_empty() {
            class.description = Some(g.doc.clone());
        }
        class.is_a = g.neurodata_type_inc.clone();
        let fixed = g.name.as_deref().or(g.default_name.as_deref());
        class.attributes.insert("name".to_string(), name_slot(fixed));

        let mut result = BuildResult::default();
        let mut children = ChildrenSlot::default();

        for attribute in &g.attributes {
            result += AttributeAdapter::new(attribute).build()?;
        }
        for dataset in &g.datasets {
            let adapter = DatasetAdapter::nested(dataset, class_name);
            if adapter.is_anonymous_child() {
                if let Some(inc) = dataset.neurodata_type_inc.as_deref() {
                    children.push(inc, dataset.quantity(), &dataset.doc);
                }
                continue;
            }
            result += adapter.build()?;
        }
        for group in &g.groups {
            let adapter = GroupAdapter::nested(group, class_name);
            if adapter.is_anonymous_child() {
                if let Some(inc) = group.neurodata_type_inc.as_deref() {
                    children.push(inc, group.quantity(), &group.doc);
                }
                continue;
            }
            result += adapter.build()?;
        }
        for link in &g.links {
            let adapter = LinkAdapter::new(link);
            if adapter.is_anonymous_child() {
                children.push(&link.target_type, link.quantity(), &link.doc);
                continue;
            }
            result += adapter.build()?;
        }

        for slot in result.take_slots().into_iter().chain(children.finish()) {
            class.attributes.insert(slot.name.clone(), slot);
        }
        Ok(result + BuildResult::with_class(class))
    }

    fn parent_slot(&self, name: &str, range: &str) -> SlotDefinition {
        let g = self.group;
        let mut slot = SlotDefinition::new(name)
            .with_range(range)
            .with_description(&g.doc);
        apply_quantity(&mut slot, g.quantity());
        slot.inlined = true;
        slot
    }
}

impl Walkable for GroupAdapter<'_> {
    fn as_node(&self) -> Node<'_> {
        Node::Group(self.group)
    }
}

impl Adapter for GroupAdapter<'_> {
    fn build(&self) -> Result<BuildResult> {
        let g = self.group;

        if let Some(def) = g.neurodata_type_def.as_deref() {
            let mut result = self.class(def)?;
            if self.parent.is_some() {
                let name = g.name.clone().unwrap_or_else(|| def.to_string());
                result.slots.push(self.parent_slot(&name, def));
            }
            return Ok(result);
        }

        let Some(parent) = self.parent else {
            return Err(AdapterError::MissingTypeDef {
                schema: g.name.clone().or_else(|| g.neurodata_type_inc.clone()).unwrap_or_default(),
                kind: "group",
            });
        };
        let name = g
            .name
            .as_deref()
            .ok_or_else(|| AdapterError::AnonymousNode(parent.to_string()))?;

        if let Some(inc) = g.neurodata_type_inc.as_deref() {
            return Ok(BuildResult::with_slot(self.parent_slot(name, inc)));
        }

        let class_name = nested_class_name(parent, name);
        let mut result = self.class(&class_name)?;
        result.slots.push(self.parent_slot(name, &class_name));
        Ok(result)
    }
}
