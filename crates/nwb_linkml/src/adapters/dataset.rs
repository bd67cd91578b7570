use crate::adapters::attribute::{ifabsent, AttributeAdapter};
use crate::adapters::dtype::{DtypeAdapter, DtypeRange};
use crate::adapters::{apply_quantity, name_slot, nested_class_name, shape, Adapter, ANY_TYPE};
use crate::build_result::BuildResult;
use crate::error::{AdapterError, Result};
use crate::linkml::{ClassDefinition, SlotDefinition};
use nwb_schema_language::{Dataset, Node, Walkable};

/// Slot carrying a dataset's own array (or scalar) value.
pub const VALUE_SLOT: &str = "value";

/// Adapts one dataset, top-level (`parent: None`) or nested in a class.
pub struct DatasetAdapter<'a> {
    dataset: &'a Dataset,
    parent: Option<&'a str>,
}

impl<'a> DatasetAdapter<'a> {
    pub fn new(dataset: &'a Dataset) -> Self {
        Self { dataset, parent: None }
    }

    pub fn nested(dataset: &'a Dataset, parent: &'a str) -> Self {
        Self {
            dataset,
            parent: Some(parent),
        }
    }

    /// Unnamed datasets that only include a type go into the parent's
    /// `children` slot rather than getting a slot of their own.
    pub fn is_anonymous_child(&self) -> bool {
        let d = self.dataset;
        d.name.is_none() && d.neurodata_type_def.is_none() && d.neurodata_type_inc.is_some()
    }

    fn label(&self) -> String {
        let d = self.dataset;
        d.name
            .clone()
            .or_else(|| d.neurodata_type_def.clone())
            .or_else(|| d.neurodata_type_inc.clone())
            .unwrap_or_default()
    }

    /// The class for a dataset that defines a type, or an untyped one with
    /// attributes. `class_name` is the emitted class's name.
    fn class(&self, class_name: &str) -> Result<BuildResult> {
        let d = self.dataset;
        let mut class = ClassDefinition::new(class_name);
        if !d.doc.is_empty() {
            class.description = Some(d.doc.clone());
        }
        class.is_a = d.neurodata_type_inc.clone();

        let fixed = d.name.as_deref().or(d.default_name.as_deref());
        class.attributes.insert("name".to_string(), name_slot(fixed));

        let mut result = BuildResult::default();
        for attribute in &d.attributes {
            let mut built = AttributeAdapter::new(attribute).build()?;
            for slot in built.take_slots() {
                class.attributes.insert(slot.name.clone(), slot);
            }
            result += built;
        }

        match d.dtype.as_ref() {
            Some(dtype) if dtype.is_compound() => {
                let DtypeRange::Compound(fields) = DtypeAdapter::new(class_name, dtype).range()? else {
                    return Err(AdapterError::InvalidDtype {
                        name: class_name.to_string(),
                        dtype: "compound".to_string(),
                    });
                };
                let expr = shape::from_parts(d.dims.as_ref(), d.shape.as_ref());
                for mut field in fields {
                    if let Some(expr) = expr.clone() {
                        expr.apply_to(&mut field);
                    }
                    class.attributes.insert(field.name.clone(), field);
                }
            }
            _ => {
                let value = self.value_slot(VALUE_SLOT)?;
                class.attributes.insert(value.name.clone(), value);
            }
        }

        Ok(result + BuildResult::with_class(class))
    }

    /// A slot holding the dataset's array directly.
    fn value_slot(&self, name: &str) -> Result<SlotDefinition> {
        let d = self.dataset;
        let mut slot = SlotDefinition::new(name);
        match d.dtype.as_ref() {
            Some(dtype) => {
                DtypeAdapter::new(name, dtype).apply_to(&mut slot)?;
                slot.required = true;
            }
            None => slot.range = Some(ANY_TYPE.to_string()),
        }
        if let Some(expr) = shape::from_parts(d.dims.as_ref(), d.shape.as_ref()) {
            expr.apply_to(&mut slot);
        }
        let fixed = d.value.as_ref().or(d.default_value.as_ref());
        if let (Some(value), Some(range)) = (fixed, slot.range.clone()) {
            slot.ifabsent = ifabsent(&range, value);
        }
        Ok(slot)
    }

    fn parent_slot(&self, name: &str, range: &str) -> SlotDefinition {
        let d = self.dataset;
        let mut slot = SlotDefinition::new(name)
            .with_range(range)
            .with_description(&d.doc);
        apply_quantity(&mut slot, d.quantity());
        slot.inlined = true;
        slot
    }
}

impl Walkable for DatasetAdapter<'_> {
    fn as_node(&self) -> Node<'_> {
        Node::Dataset(self.dataset)
    }
}

impl Adapter for DatasetAdapter<'_> {
    fn build(&self) -> Result<BuildResult> {
        let d = self.dataset;

        if let Some(def) = d.neurodata_type_def.as_deref() {
            let mut result = self.class(def)?;
            if self.parent.is_some() {
                let name = d.name.clone().unwrap_or_else(|| def.to_string());
                result.slots.push(self.parent_slot(&name, def));
            }
            return Ok(result);
        }

        let parent = self.parent.ok_or_else(|| AdapterError::MissingTypeDef {
            schema: self.label(),
            kind: "dataset",
        })?;
        let name = d
            .name
            .as_deref()
            .ok_or_else(|| AdapterError::AnonymousNode(parent.to_string()))?;

        if let Some(inc) = d.neurodata_type_inc.as_deref() {
            return Ok(BuildResult::with_slot(self.parent_slot(name, inc)));
        }

        if d.attributes.is_empty() {
            let mut slot = self.value_slot(name)?.with_description(&d.doc);
            apply_quantity(&mut slot, d.quantity());
            return Ok(BuildResult::with_slot(slot));
        }

        let class_name = nested_class_name(parent, name);
        let mut result = self.class(&class_name)?;
        result.slots.push(self.parent_slot(name, &class_name));
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(yaml: &str) -> Dataset {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_type_defining_dataset() {
        let d = dataset(
            "neurodata_type_def: VectorData\nneurodata_type_inc: Data\ndoc: A column.\ndims: [dim0]\nshape: [null]\ndtype: float32\nattributes:\n- name: description\n  dtype: text\n  doc: d",
        );
        let result = DatasetAdapter::new(&d).build().unwrap();
        assert!(result.slots.is_empty());
        let class = result.class("VectorData").unwrap();
        assert_eq!(class.is_a.as_deref(), Some("Data"));
        let names: Vec<&str> = class.attributes.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["name", "description", "value"]);
        let value = &class.attributes["value"];
        assert_eq!(value.range.as_deref(), Some("float"));
        assert_eq!(value.array.as_ref().unwrap().rank(), 1);
    }

    #[test]
    fn test_untyped_dataset_is_plain_slot() {
        let d = dataset("name: timestamps\ndtype: float64\ndims: [num_times]\nshape: [null]\nquantity: '?'\ndoc: t");
        let result = DatasetAdapter::nested(&d, "TimeSeries").build().unwrap();
        assert!(result.classes.is_empty());
        let slot = result.slot("timestamps").unwrap();
        assert_eq!(slot.range.as_deref(), Some("float"));
        assert!(!slot.required);
        assert!(slot.array.is_some());
    }

    #[test]
    fn test_untyped_dataset_with_attributes_becomes_class() {
        let d = dataset("name: data\ndtype: numeric\ndoc: d\nattributes:\n- name: unit\n  dtype: text\n  doc: u");
        let result = DatasetAdapter::nested(&d, "TimeSeries").build().unwrap();
        let class = result.class("TimeSeries__data").unwrap();
        assert_eq!(class.attributes["name"].ifabsent.as_deref(), Some("string(data)"));
        assert!(class.attributes.contains_key("unit"));
        assert!(class.attributes.contains_key("value"));
        let slot = result.slot("data").unwrap();
        assert_eq!(slot.range.as_deref(), Some("TimeSeries__data"));
        assert!(slot.required);
    }

    #[test]
    fn test_compound_dataset_gets_field_slots() {
        let d = dataset(
            "neurodata_type_def: TimeSeriesReferenceVectorData\ndoc: refs\ndtype:\n- name: idx_start\n  dtype: int32\n  doc: s\n- name: timeseries\n  dtype:\n    target_type: TimeSeries\n    reftype: object\n  doc: ts",
        );
        let result = DatasetAdapter::new(&d).build().unwrap();
        let class = result.class("TimeSeriesReferenceVectorData").unwrap();
        assert!(!class.attributes.contains_key("value"));
        assert_eq!(class.attributes["idx_start"].range.as_deref(), Some("integer"));
        assert_eq!(class.attributes["timeseries"].range.as_deref(), Some("TimeSeries"));
    }

    #[test]
    fn test_top_level_without_def_is_rejected() {
        let d = dataset("name: orphan\ndtype: int\ndoc: o");
        let err = DatasetAdapter::new(&d).build().unwrap_err();
        assert!(matches!(err, AdapterError::MissingTypeDef { .. }));
    }
}
