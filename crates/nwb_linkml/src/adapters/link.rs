use crate::adapters::{apply_quantity, Adapter, SOURCE_TYPE_ANNOTATION};
use crate::build_result::BuildResult;
use crate::error::{AdapterError, Result};
use crate::linkml::SlotDefinition;
use nwb_schema_language::{Link, Node, Walkable};

/// A link becomes a non-inlined slot ranged on its target type.
pub struct LinkAdapter<'a> {
    link: &'a Link,
}

impl<'a> LinkAdapter<'a> {
    pub fn new(link: &'a Link) -> Self {
        Self { link }
    }

    pub fn is_anonymous_child(&self) -> bool {
        self.link.name.is_none()
    }
}

impl Walkable for LinkAdapter<'_> {
    fn as_node(&self) -> Node<'_> {
        Node::Link(self.link)
    }
}

impl Adapter for LinkAdapter<'_> {
    fn build(&self) -> Result<BuildResult> {
        let link = self.link;
        let name = link
            .name
            .as_deref()
            .ok_or_else(|| AdapterError::AnonymousNode(link.target_type.clone()))?;
        let mut slot = SlotDefinition::new(name)
            .with_range(&link.target_type)
            .with_description(&link.doc)
            .with_annotation(SOURCE_TYPE_ANNOTATION, "link");
        apply_quantity(&mut slot, link.quantity());
        Ok(BuildResult::with_slot(slot))
    }
}
