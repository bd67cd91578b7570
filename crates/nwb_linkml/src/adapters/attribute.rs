use crate::adapters::dtype::DtypeAdapter;
use crate::adapters::{shape, Adapter};
use crate::build_result::BuildResult;
use crate::error::Result;
use crate::linkml::SlotDefinition;
use nwb_schema_language::{Attribute, Node, Walkable};

pub struct AttributeAdapter<'a> {
    attribute: &'a Attribute,
}

impl<'a> AttributeAdapter<'a> {
    pub fn new(attribute: &'a Attribute) -> Self {
        Self { attribute }
    }

    pub fn slot(&self) -> Result<SlotDefinition> {
        let attr = self.attribute;
        let mut slot = SlotDefinition::new(&attr.name).with_description(&attr.doc);
        slot.required = attr.required;
        DtypeAdapter::new(&attr.name, &attr.dtype).apply_to(&mut slot)?;
        if let Some(expr) = shape::from_parts(attr.dims.as_ref(), attr.shape.as_ref()) {
            expr.apply_to(&mut slot);
        }
        let fixed = attr.value.as_ref().or(attr.default_value.as_ref());
        if let (Some(value), Some(range)) = (fixed, slot.range.as_deref()) {
            slot.ifabsent = ifabsent(range, value);
        }
        Ok(slot)
    }
}

impl Walkable for AttributeAdapter<'_> {
    fn as_node(&self) -> Node<'_> {
        Node::Attribute(self.attribute)
    }
}

impl Adapter for AttributeAdapter<'_> {
    fn build(&self) -> Result<BuildResult> {
        Ok(BuildResult::with_slot(self.slot()?))
    }
}

/// LinkML `ifabsent` expression for a fixed or default value.
pub(crate) fn ifabsent(range: &str, value: &serde_yaml::Value) -> Option<String> {
    use serde_yaml::Value;
    match (range, value) {
        ("string" | "datetime", Value::String(s)) => Some(format!("string({s})")),
        ("integer", Value::Number(n)) if n.is_i64() || n.is_u64() => Some(format!("integer({n})")),
        ("float", Value::Number(n)) => Some(format!("float({n})")),
        ("boolean", Value::Bool(b)) => Some(if *b { "True" } else { "False" }.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::dtype::REFTYPE_ANNOTATION;

    fn attribute(yaml: &str) -> Attribute {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_scalar_attribute_slot() {
        let attr = attribute("name: unit\ndtype: text\ndoc: SI unit.\nvalue: volts\nrequired: false");
        let result = AttributeAdapter::new(&attr).build().unwrap();
        let slot = result.slot("unit").unwrap();
        assert_eq!(slot.range.as_deref(), Some("string"));
        assert!(!slot.required);
        assert_eq!(slot.ifabsent.as_deref(), Some("string(volts)"));
        assert_eq!(slot.description.as_deref(), Some("SI unit."));
    }

    #[test]
    fn test_array_attribute_slot() {
        let attr = attribute("name: colnames\ndtype: ascii\ndims: [num_columns]\nshape: [null]\ndoc: names");
        let slot = AttributeAdapter::new(&attr).slot().unwrap();
        let array = slot.array.unwrap();
        assert_eq!(array.rank(), 1);
        assert_eq!(array.dimensions[0].alias, "num_columns");
        assert_eq!(array.dimensions[0].exact_cardinality, None);
    }

    #[test]
    fn test_reference_attribute_slot() {
        let attr = attribute("name: table\ndtype:\n  target_type: DynamicTable\n  reftype: object\ndoc: t");
        let slot = AttributeAdapter::new(&attr).slot().unwrap();
        assert_eq!(slot.range.as_deref(), Some("DynamicTable"));
        assert_eq!(slot.annotations.get(REFTYPE_ANNOTATION).map(String::as_str), Some("object"));
    }

    #[test]
    fn test_numeric_ifabsent() {
        let attr = attribute("name: conversion\ndtype: float32\ndefault_value: 0.5\ndoc: c\nrequired: false");
        let slot = AttributeAdapter::new(&attr).slot().unwrap();
        assert_eq!(slot.ifabsent.as_deref(), Some("float(0.5)"));
    }
}
