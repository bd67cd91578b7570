//! Namespace-level composition: type ownership, imports, inheritance roll-down.

use crate::adapters::schema::SchemaAdapter;
use crate::adapters::Adapter;
use crate::build_result::BuildResult;
use crate::error::{AdapterError, Result};
use crate::lang::language_build;
use crate::linkml::{SchemaDefinition, NAMESPACE_ANNOTATION};
use indexmap::IndexMap;
use nwb_schema_language::{
    Attribute, Dataset, Group, Namespaces, Node, NodeKind, NodeMut, Walkable,
};
use std::path::Path;
use tracing::{debug, info, warn};

const DEFINITION_KINDS: &[NodeKind] = &[NodeKind::Group, NodeKind::Dataset];

/// A namespace file, its schema files, and the namespaces it imports.
///
/// Construction rolls inherited attributes and datasets down into every
/// subtype and then resolves cross-schema imports, so the adapter is
/// ready to [`build`](NamespacesAdapter::build) afterwards.
#[derive(Debug, Clone)]
pub struct NamespacesAdapter {
    pub namespaces: Namespaces,
    pub schemas: Vec<SchemaAdapter>,
    pub imported: Vec<NamespacesAdapter>,
}

/// A completed copy of a type definition.
#[derive(Debug, Clone)]
enum Definition {
    Group(Group),
    Dataset(Dataset),
}

impl NamespacesAdapter {
    pub fn new(
        namespaces: Namespaces,
        schemas: Vec<SchemaAdapter>,
        imported: Vec<NamespacesAdapter>,
    ) -> Result<Self> {
        let mut adapter = Self {
            namespaces,
            schemas,
            imported,
        };
        adapter.complete_namespaces()?;
        adapter.populate_imports()?;
        Ok(adapter)
    }

    /// Load a namespace file and every schema file it lists.
    ///
    /// Schema sources are relative to the namespace file. Namespace imports
    /// are satisfied from `imported`, which must already be loaded.
    pub fn from_yaml(path: &Path, imported: Vec<NamespacesAdapter>) -> Result<Self> {
        let namespaces = Namespaces::from_path(path)?;
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut schemas = Vec::new();

        for namespace in &namespaces.namespaces {
            for import in namespace.imports() {
                if !imported.iter().any(|adapter| adapter.owns_namespace(import)) {
                    return Err(AdapterError::MissingImport {
                        namespace: namespace.name.clone(),
                        import: import.to_string(),
                    });
                }
            }
            for source in namespace.sources().filter_map(|s| s.source.as_deref()) {
                let mut schema = SchemaAdapter::from_path(&namespace.name, &dir.join(source))?;
                schema.version = Some(namespace.version.clone());
                schemas.push(schema);
            }
        }

        info!(
            "loaded {} schema files from {}",
            schemas.len(),
            path.display()
        );
        Self::new(namespaces, schemas, imported)
    }

    pub fn namespace_names(&self) -> Vec<&str> {
        self.namespaces.namespaces.iter().map(|ns| ns.name.as_str()).collect()
    }

    pub fn owns_namespace(&self, name: &str) -> bool {
        self.namespaces.get(name).is_some()
    }

    /// Version of a namespace declared here or in any import.
    pub fn version_of(&self, namespace: &str) -> Option<&str> {
        self.namespaces
            .get(namespace)
            .map(|ns| ns.version.as_str())
            .or_else(|| self.imported.iter().find_map(|i| i.version_of(namespace)))
    }

    pub fn schema(&self, name: &str) -> Option<&SchemaAdapter> {
        self.schemas.iter().find(|s| s.name == name)
    }

    /// The schema that defines `type_name`, searching this namespace first and
    /// then its imports transitively.
    pub fn find_type_source(&self, type_name: &str) -> Result<&SchemaAdapter> {
        self.find_type_source_opt(type_name)
            .ok_or_else(|| AdapterError::TypeNotFound(type_name.to_string()))
    }

    fn find_type_source_opt(&self, type_name: &str) -> Option<&SchemaAdapter> {
        self.schemas
            .iter()
            .find(|schema| {
                schema.walk_types(DEFINITION_KINDS).any(|node| {
                    node.field_values("neurodata_type_def").contains(&type_name)
                })
            })
            .or_else(|| {
                self.imported
                    .iter()
                    .find_map(|adapter| adapter.find_type_source_opt(type_name))
            })
    }

    /// Record, for every schema, an import of each schema owning a type it
    /// uses but does not define. Running it again changes nothing.
    pub fn populate_imports(&mut self) -> Result<()> {
        let mut edges: Vec<(usize, String)> = Vec::new();
        for (index, schema) in self.schemas.iter().enumerate() {
            for used in schema.used_types() {
                if schema.defines(used) {
                    continue;
                }
                let owner = self.find_type_source(used)?;
                if owner.name != schema.name {
                    edges.push((index, owner.name.clone()));
                }
            }
        }
        for (index, import) in edges {
            self.schemas[index].imports.insert(import);
        }
        Ok(())
    }

    /// Roll every parent type's attributes (and, for datasets, storage
    /// fields; for groups, nested datasets) down into its subtypes.
    ///
    /// A child's attribute or dataset with the same name as the parent's
    /// replaces it whole; parent-only entries are copied down. Applied
    /// transitively, grandparent first.
    pub fn complete_namespaces(&mut self) -> Result<()> {
        let mut completed: IndexMap<String, Definition> = IndexMap::new();
        let defined: Vec<String> = self
            .schemas
            .iter()
            .flat_map(|s| s.defined_types())
            .map(str::to_string)
            .collect();
        for name in &defined {
            self.complete_type(name, &mut completed, &mut Vec::new())?;
        }

        for schema in &mut self.schemas {
            schema.schema.visit_mut(&mut |node| match node {
                NodeMut::Group(group) => {
                    let def = group.neurodata_type_def.as_deref();
                    if let Some(Definition::Group(done)) = def.and_then(|d| completed.get(d)) {
                        *group = done.clone();
                    }
                }
                NodeMut::Dataset(dataset) => {
                    let def = dataset.neurodata_type_def.as_deref();
                    if let Some(Definition::Dataset(done)) = def.and_then(|d| completed.get(d)) {
                        *dataset = done.clone();
                    }
                }
            });
        }
        debug!("completed {} type definitions", completed.len());
        Ok(())
    }

    fn complete_type(
        &self,
        name: &str,
        completed: &mut IndexMap<String, Definition>,
        visiting: &mut Vec<String>,
    ) -> Result<Definition> {
        if let Some(done) = completed.get(name) {
            return Ok(done.clone());
        }
        if visiting.iter().any(|v| v == name) {
            return Err(AdapterError::InheritanceCycle(name.to_string()));
        }

        let Some(own) = self.own_definition(name) else {
            // Imported namespaces were completed when they were constructed.
            return self
                .imported
                .iter()
                .find_map(|adapter| adapter.completed_definition(name))
                .ok_or_else(|| AdapterError::TypeNotFound(name.to_string()));
        };

        let parent_name = match &own {
            Definition::Group(g) => g.neurodata_type_inc.clone(),
            Definition::Dataset(d) => d.neurodata_type_inc.clone(),
        };
        let result = match parent_name {
            None => own,
            Some(parent_name) => {
                visiting.push(name.to_string());
                let parent = self.complete_type(&parent_name, completed, visiting)?;
                visiting.pop();
                match (own, parent) {
                    (Definition::Group(child), Definition::Group(parent)) => {
                        Definition::Group(roll_down_group(child, &parent))
                    }
                    (Definition::Dataset(child), Definition::Dataset(parent)) => {
                        Definition::Dataset(roll_down_dataset(child, &parent))
                    }
                    (own, _) => {
                        warn!("type '{}' and its parent '{}' are different node kinds", name, parent_name);
                        own
                    }
                }
            }
        };
        completed.insert(name.to_string(), result.clone());
        Ok(result)
    }

    fn own_definition(&self, name: &str) -> Option<Definition> {
        self.schemas
            .iter()
            .flat_map(|s| s.walk_types(DEFINITION_KINDS))
            .find_map(|node| definition_named(node, name))
    }

    fn completed_definition(&self, name: &str) -> Option<Definition> {
        self.own_definition(name).or_else(|| {
            self.imported
                .iter()
                .find_map(|adapter| adapter.completed_definition(name))
        })
    }

    /// Build every schema of this namespace, and unless `skip_imports`, of
    /// every imported namespace plus the `nwb.language` schema.
    ///
    /// With `skip_imports` only artifacts owned by this adapter's namespaces
    /// are emitted.
    pub fn build(&self, skip_imports: bool) -> Result<BuildResult> {
        let mut result = BuildResult::default();
        for schema in &self.schemas {
            result += schema.build()?;
        }
        for namespace in &self.namespaces.namespaces {
            let mut definition = SchemaDefinition::new(&namespace.name);
            definition.version = Some(namespace.version.clone());
            if !namespace.doc.is_empty() {
                definition.description = Some(namespace.doc.clone());
            }
            definition
                .annotations
                .insert(NAMESPACE_ANNOTATION.to_string(), namespace.name.clone());
            definition.imports = self
                .schemas
                .iter()
                .filter(|s| s.namespace == namespace.name)
                .map(|s| s.name.clone())
                .chain(namespace.imports().map(str::to_string))
                .collect();
            result += BuildResult {
                schemas: vec![definition],
                ..Default::default()
            };
        }

        if skip_imports {
            let own = self.namespace_names();
            result
                .schemas
                .retain(|schema| schema.namespace().map_or(false, |ns| own.contains(&ns)));
        } else {
            for imported in &self.imported {
                result += imported.build(false)?;
            }
            result += language_build();
        }
        Ok(result)
    }
}

impl Walkable for NamespacesAdapter {
    fn as_node(&self) -> Node<'_> {
        Node::Namespaces(&self.namespaces)
    }
}

fn definition_named(node: Node<'_>, name: &str) -> Option<Definition> {
    match node {
        Node::Group(g) if g.neurodata_type_def.as_deref() == Some(name) => {
            Some(Definition::Group(g.clone()))
        }
        Node::Dataset(d) if d.neurodata_type_def.as_deref() == Some(name) => {
            Some(Definition::Dataset(d.clone()))
        }
        _ => None,
    }
}

fn merge_by_key<T: Clone>(child: Vec<T>, parent: &[T], key: impl Fn(&T) -> Option<String>) -> Vec<T> {
    let mut child = child;
    let mut merged = Vec::with_capacity(parent.len() + child.len());
    for inherited in parent {
        let position = key(inherited).and_then(|k| child.iter().position(|c| key(c).as_deref() == Some(k.as_str())));
        match position {
            Some(index) => merged.push(child.remove(index)),
            None => merged.push(inherited.clone()),
        }
    }
    merged.extend(child);
    merged
}

fn attribute_key(attribute: &Attribute) -> Option<String> {
    Some(attribute.name.clone())
}

fn dataset_key(dataset: &Dataset) -> Option<String> {
    dataset
        .name
        .clone()
        .or_else(|| dataset.neurodata_type_inc.as_ref().map(|inc| format!("<{inc}>")))
}

fn roll_down_group(mut child: Group, parent: &Group) -> Group {
    child.attributes = merge_by_key(std::mem::take(&mut child.attributes), &parent.attributes, attribute_key);
    child.datasets = merge_by_key(std::mem::take(&mut child.datasets), &parent.datasets, dataset_key);
    child
}

fn roll_down_dataset(mut child: Dataset, parent: &Dataset) -> Dataset {
    child.attributes = merge_by_key(std::mem::take(&mut child.attributes), &parent.attributes, attribute_key);
    if child.dtype.is_none() {
        child.dtype = parent.dtype.clone();
    }
    if child.dims.is_none() && child.shape.is_none() {
        child.dims = parent.dims.clone();
        child.shape = parent.shape.clone();
    }
    child
}
