//! Dtype variants to slot ranges.

use crate::error::{AdapterError, Result};
use crate::linkml::SlotDefinition;
use nwb_schema_language::{CompoundDtype, Dtype, FlatDtype, ReferenceDtype};

/// Annotation key carrying a reference slot's reftype (`object` / `region`).
pub const REFTYPE_ANNOTATION: &str = "reftype";

/// Source flat dtype names and the target primitive each maps to.
pub const FLAT_DTYPES: &[(&str, &str)] = &[
    ("float", "float"),
    ("float32", "float"),
    ("double", "float"),
    ("float64", "float"),
    ("long", "integer"),
    ("int64", "integer"),
    ("int", "integer"),
    ("int32", "integer"),
    ("int16", "integer"),
    ("short", "integer"),
    ("int8", "integer"),
    ("uint", "integer"),
    ("uint32", "integer"),
    ("uint16", "integer"),
    ("uint8", "integer"),
    ("uint64", "integer"),
    ("numeric", "float"),
    ("text", "string"),
    ("utf", "string"),
    ("utf8", "string"),
    ("utf_8", "string"),
    ("utf-8", "string"),
    ("ascii", "string"),
    ("str", "string"),
    ("bool", "boolean"),
    ("boolean", "boolean"),
    ("isodatetime", "datetime"),
    ("datetime", "datetime"),
];

/// Target primitive for a flat dtype name, if it is one.
pub fn flat_to_primitive(dtype: &str) -> Option<&'static str> {
    FLAT_DTYPES
        .iter()
        .find(|(name, _)| *name == dtype)
        .map(|(_, primitive)| *primitive)
}

/// Resolved range of a dtype, before it is attached to a slot.
#[derive(Debug, Clone, PartialEq)]
pub enum DtypeRange {
    Primitive(&'static str),
    Reference(ReferenceDtype),
    /// One slot per compound field.
    Compound(Vec<SlotDefinition>),
}

pub struct DtypeAdapter<'a> {
    owner: &'a str,
    dtype: &'a Dtype,
}

impl<'a> DtypeAdapter<'a> {
    /// `owner` names the attribute/dataset carrying the dtype, for error reporting
    pub fn new(owner: &'a str, dtype: &'a Dtype) -> Self {
        Self { owner, dtype }
    }

    pub fn range(&self) -> Result<DtypeRange> {
        match self.dtype {
            Dtype::Flat(flat) => self.flat(flat).map(DtypeRange::Primitive),
            Dtype::Reference(reference) => Ok(DtypeRange::Reference(reference.clone())),
            Dtype::Compound(fields) => fields
                .iter()
                .map(|field| self.compound_field(field))
                .collect::<Result<Vec<_>>>()
                .map(DtypeRange::Compound),
        }
    }

    /// Apply a non-compound range to a slot. Compound dtypes are rejected
    /// here; callers expand them with [`DtypeAdapter::range`].
    pub fn apply_to(&self, slot: &mut SlotDefinition) -> Result<()> {
        match self.range()? {
            DtypeRange::Primitive(primitive) => slot.range = Some(primitive.to_string()),
            DtypeRange::Reference(reference) => apply_reference(&reference, slot),
            DtypeRange::Compound(_) => {
                return Err(AdapterError::InvalidDtype {
                    name: self.owner.to_string(),
                    dtype: "compound".to_string(),
                })
            }
        }
        Ok(())
    }

    fn flat(&self, flat: &FlatDtype) -> Result<&'static str> {
        flat_to_primitive(flat.as_str()).ok_or_else(|| AdapterError::InvalidDtype {
            name: self.owner.to_string(),
            dtype: flat.to_string(),
        })
    }

    fn compound_field(&self, field: &CompoundDtype) -> Result<SlotDefinition> {
        let mut slot = SlotDefinition::new(&field.name).with_description(&field.doc);
        slot.required = true;
        match &field.dtype {
            Dtype::Flat(flat) => slot.range = Some(self.flat(flat)?.to_string()),
            Dtype::Reference(reference) => apply_reference(reference, &mut slot),
            Dtype::Compound(_) => {
                return Err(AdapterError::InvalidDtype {
                    name: format!("{}.{}", self.owner, field.name),
                    dtype: "nested compound".to_string(),
                })
            }
        }
        Ok(slot)
    }
}

fn apply_reference(reference: &ReferenceDtype, slot: &mut SlotDefinition) {
    slot.range = Some(reference.target_type.clone());
    slot.annotations
        .insert(REFTYPE_ANNOTATION.to_string(), reference.reftype.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_lookup() {
        assert_eq!(flat_to_primitive("float32"), Some("float"));
        assert_eq!(flat_to_primitive("int8"), Some("integer"));
        assert_eq!(flat_to_primitive("uint64"), Some("integer"));
        assert_eq!(flat_to_primitive("utf8"), Some("string"));
        assert_eq!(flat_to_primitive("ascii"), Some("string"));
        assert_eq!(flat_to_primitive("bool"), Some("boolean"));
        assert_eq!(flat_to_primitive("isodatetime"), Some("datetime"));
        assert_eq!(flat_to_primitive("numeric"), Some("float"));
        assert_eq!(flat_to_primitive("complex"), None);
    }

    #[test]
    fn test_unknown_flat_dtype_is_invalid() {
        let dtype = Dtype::flat("complex128");
        let err = DtypeAdapter::new("data", &dtype).range().unwrap_err();
        assert!(matches!(err, AdapterError::InvalidDtype { ref name, .. } if name == "data"));
    }

    #[test]
    fn test_reference_slot_is_annotated() {
        let dtype: Dtype = serde_yaml::from_str("target_type: DynamicTable\nreftype: region").unwrap();
        let mut slot = SlotDefinition::new("table");
        DtypeAdapter::new("table", &dtype).apply_to(&mut slot).unwrap();
        assert_eq!(slot.range.as_deref(), Some("DynamicTable"));
        assert_eq!(slot.annotations.get(REFTYPE_ANNOTATION).map(String::as_str), Some("region"));
    }

    #[test]
    fn test_compound_emits_slot_per_field() {
        let dtype: Dtype = serde_yaml::from_str(
            "- name: idx_start\n  dtype: int32\n  doc: start\n- name: count\n  dtype: int32\n- name: timeseries\n  dtype:\n    target_type: TimeSeries",
        )
        .unwrap();
        let range = DtypeAdapter::new("timeseries", &dtype).range().unwrap();
        let DtypeRange::Compound(slots) = range else {
            panic!("expected compound range");
        };
        let names: Vec<&str> = slots.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["idx_start", "count", "timeseries"]);
        assert_eq!(slots[0].range.as_deref(), Some("integer"));
        assert_eq!(slots[0].description.as_deref(), Some("start"));
        assert_eq!(slots[2].range.as_deref(), Some("TimeSeries"));
    }
}
