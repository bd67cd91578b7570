use crate::adapters::dataset::DatasetAdapter;
use crate::adapters::group::GroupAdapter;
use crate::adapters::Adapter;
use crate::build_result::BuildResult;
use crate::error::{AdapterError, Result};
use crate::lang::LANGUAGE_SCHEMA;
use crate::linkml::{SchemaDefinition, NAMESPACE_ANNOTATION};
use indexmap::IndexSet;
use nwb_schema_language::{Node, Schema, Walkable};
use std::path::{Path, PathBuf};
use tracing::debug;

/// One schema file of a namespace, plus the schemas it needs to import.
#[derive(Debug, Clone)]
pub struct SchemaAdapter {
    /// `<namespace>.<file stem>`
    pub name: String,
    pub namespace: String,
    pub version: Option<String>,
    pub path: Option<PathBuf>,
    pub schema: Schema,
    /// Names of the schemas (in this or other namespaces) owning types this one uses
    pub imports: IndexSet<String>,
}

impl SchemaAdapter {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            version: None,
            path: None,
            schema,
            imports: IndexSet::new(),
        }
    }

    /// Load a schema file, naming it after the namespace and the file stem.
    pub fn from_path(namespace: &str, path: &Path) -> Result<Self> {
        let schema = Schema::from_path(path)?;
        let stem = path
            .file_name()
            .and_then(|f| f.to_str())
            .map(|f| f.trim_end_matches(".yaml").trim_end_matches(".yml"))
            .unwrap_or_default();
        let mut adapter = Self::new(format!("{namespace}.{stem}"), namespace, schema);
        adapter.path = Some(path.to_path_buf());
        Ok(adapter)
    }

    /// Types this schema declares with `neurodata_type_def`.
    pub fn defined_types(&self) -> Vec<&str> {
        self.walk_fields("neurodata_type_def").map(|(_, v)| v).collect()
    }

    pub fn defines(&self, type_name: &str) -> bool {
        self.walk_fields("neurodata_type_def").any(|(_, v)| v == type_name)
    }

    /// Types this schema refers to by inclusion or as a link/reference target.
    pub fn used_types(&self) -> IndexSet<&str> {
        self.walk_fields("neurodata_type_inc")
            .chain(self.walk_fields("target_type"))
            .map(|(_, v)| v)
            .collect()
    }
}

impl Walkable for SchemaAdapter {
    fn as_node(&self) -> Node<'_> {
        Node::Schema(&self.schema)
    }
}

impl Adapter for SchemaAdapter {
    fn build(&self) -> Result<BuildResult> {
        debug!("building schema {}", self.name);
        let mut result = BuildResult::default();
        for group in &self.schema.groups {
            if group.neurodata_type_def.is_none() {
                return Err(AdapterError::MissingTypeDef {
                    schema: self.name.clone(),
                    kind: "group",
                });
            }
            result += GroupAdapter::new(group).build()?;
        }
        for dataset in &self.schema.datasets {
            if dataset.neurodata_type_def.is_none() {
                return Err(AdapterError::MissingTypeDef {
                    schema: self.name.clone(),
                    kind: "dataset",
                });
            }
            result += DatasetAdapter::new(dataset).build()?;
        }

        let mut schema = SchemaDefinition::new(&self.name);
        schema.version = self.version.clone();
        schema
            .annotations
            .insert(NAMESPACE_ANNOTATION.to_string(), self.namespace.clone());
        schema.imports.push(LANGUAGE_SCHEMA.to_string());
        schema.imports.extend(self.imports.iter().cloned());
        for class in &result.classes {
            schema.classes.insert(class.name.clone(), class.clone());
        }
        result.schemas.insert(0, schema);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = r#"
groups:
- neurodata_type_def: Container
  doc: Base container.
- neurodata_type_def: TimeSeries
  neurodata_type_inc: Container
  doc: Time series.
  links:
  - name: device
    target_type: Device
datasets:
- neurodata_type_def: Data
  doc: Base data.
"#;

    fn adapter() -> SchemaAdapter {
        SchemaAdapter::new("core.base", "core", Schema::from_yaml_str(BASE).unwrap())
    }

    #[test]
    fn test_defined_and_used_types() {
        let a = adapter();
        assert_eq!(a.defined_types(), vec!["Container", "TimeSeries", "Data"]);
        assert!(a.defines("TimeSeries"));
        assert!(!a.defines("Device"));
        let used: Vec<&str> = a.used_types().into_iter().collect();
        assert_eq!(used, vec!["Container", "Device"]);
    }

    #[test]
    fn test_build_schema_definition() {
        let mut a = adapter();
        a.imports.insert("core.device".to_string());
        let result = a.build().unwrap();
        let schema = result.schema("core.base").unwrap();
        assert_eq!(schema.namespace(), Some("core"));
        assert_eq!(schema.imports, vec!["nwb.language", "core.device"]);
        let classes: Vec<&str> = schema.classes.keys().map(String::as_str).collect();
        assert_eq!(classes, vec!["Container", "TimeSeries", "Data"]);
        assert_eq!(result.classes.len(), 3);
    }

    #[test]
    fn test_top_level_node_needs_type_def() {
        let schema = Schema::from_yaml_str("groups:\n- name: loose\n  doc: l").unwrap();
        let err = SchemaAdapter::new("x.y", "x", schema).build().unwrap_err();
        assert!(matches!(err, AdapterError::MissingTypeDef { ref schema, kind: "group" } if schema == "x.y"));
    }
}
