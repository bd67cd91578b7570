//! The `nwb.language` schema: primitive types every built schema imports.

use crate::adapters::dtype::FLAT_DTYPES;
use crate::adapters::ANY_TYPE;
use crate::build_result::BuildResult;
use crate::linkml::{ClassDefinition, SchemaDefinition, TypeDefinition};

pub const LANGUAGE_SCHEMA: &str = "nwb.language";

/// Built-in primitive types the flat dtypes resolve to.
pub const PRIMITIVES: &[&str] = &["float", "integer", "string", "boolean", "datetime"];

pub fn language_types() -> Vec<TypeDefinition> {
    FLAT_DTYPES
        .iter()
        .filter(|(name, _)| !PRIMITIVES.contains(name))
        .map(|(name, primitive)| TypeDefinition {
            name: name.to_string(),
            type_of: Some(primitive.to_string()),
            description: None,
        })
        .collect()
}

pub fn language_schema() -> SchemaDefinition {
    let mut schema = SchemaDefinition::new(LANGUAGE_SCHEMA);
    schema.description = Some("Primitive types of the source schema language".to_string());
    for ty in language_types() {
        schema.types.insert(ty.name.clone(), ty);
    }
    let mut any = ClassDefinition::new(ANY_TYPE);
    any.description = Some("Any value".to_string());
    schema.classes.insert(any.name.clone(), any);
    schema
}

pub fn language_build() -> BuildResult {
    let schema = language_schema();
    BuildResult {
        types: schema.types.values().cloned().collect(),
        classes: schema.classes.values().cloned().collect(),
        schemas: vec![schema],
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_types_point_at_primitives() {
        let types = language_types();
        let float32 = types.iter().find(|t| t.name == "float32").unwrap();
        assert_eq!(float32.type_of.as_deref(), Some("float"));
        assert!(types.iter().all(|t| !PRIMITIVES.contains(&t.name.as_str())));
        assert!(types
            .iter()
            .all(|t| PRIMITIVES.contains(&t.type_of.as_deref().unwrap_or_default())));
    }

    #[test]
    fn test_language_build_has_schema() {
        let build = language_build();
        assert!(build.schema(LANGUAGE_SCHEMA).is_some());
        assert!(build.class(ANY_TYPE).is_some());
        assert!(build.type_def("isodatetime").is_some());
    }
}
