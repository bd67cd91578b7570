//! Runtime model registry.
//!
//! Maps `(namespace, version, type name)` to a [`ModelClass`]: the field
//! list of a type (inherited fields included) and a validating
//! constructor. The registry is built once and passed to the reader; there
//! is no global class table.

use crate::error::{RegistryError, ValidationError};
use crate::value::{Instance, Value};
use chrono::{NaiveDate, NaiveDateTime};
use indexmap::IndexMap;
use nwb_linkml::adapters::dtype::flat_to_primitive;
use nwb_linkml::adapters::ANY_TYPE;
use nwb_linkml::{BuildResult, ClassDefinition, SlotDefinition};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Name of the base class whose subclasses are materialized as tables.
pub const DYNAMIC_TABLE: &str = "DynamicTable";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassKey {
    pub namespace: String,
    pub version: String,
    pub name: String,
}

impl ClassKey {
    pub fn new(namespace: impl Into<String>, version: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            version: version.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ClassKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.namespace, self.name, self.version)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    String,
    Integer,
    Float,
    Boolean,
    DateTime,
}

impl Primitive {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "string" => Primitive::String,
            "integer" => Primitive::Integer,
            "float" => Primitive::Float,
            "boolean" => Primitive::Boolean,
            "datetime" => Primitive::DateTime,
            other => return flat_to_primitive(other).and_then(Self::from_name),
        })
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Primitive::String => "string",
            Primitive::Integer => "integer",
            Primitive::Float => "float",
            Primitive::Boolean => "boolean",
            Primitive::DateTime => "datetime",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Range {
    Primitive(Primitive),
    Class(String),
    Any,
}

impl Range {
    pub fn from_name(name: &str) -> Self {
        if name == ANY_TYPE {
            return Range::Any;
        }
        Primitive::from_name(name)
            .map(Range::Primitive)
            .unwrap_or_else(|| Range::Class(name.to_string()))
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Range::Primitive(p) => write!(f, "{p}"),
            Range::Class(name) => write!(f, "{name}"),
            Range::Any => write!(f, "any"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub range: Range,
    pub required: bool,
    pub multivalued: bool,
    /// Holds an n-dimensional array
    pub array: bool,
    pub ifabsent: Option<Value>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, range: Range) -> Self {
        Self {
            name: name.into(),
            range,
            required: false,
            multivalued: false,
            array: false,
            ifabsent: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn multivalued(mut self) -> Self {
        self.multivalued = true;
        self
    }

    pub fn array(mut self) -> Self {
        self.array = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.ifabsent = Some(value);
        self
    }

    fn from_slot(slot: &SlotDefinition) -> Self {
        let range = slot
            .range
            .as_deref()
            .or_else(|| slot.any_of.iter().find_map(|alt| alt.range.as_deref()))
            .map(Range::from_name)
            .unwrap_or(Range::Any);
        Self {
            name: slot.name.clone(),
            range,
            required: slot.required,
            multivalued: slot.multivalued,
            array: slot.array.is_some() || slot.any_of.iter().any(|alt| alt.array.is_some()),
            ifabsent: slot.ifabsent.as_deref().and_then(parse_ifabsent),
        }
    }
}

/// Parse `string(x)`, `integer(3)`, `float(0.5)`, `True`/`False`.
fn parse_ifabsent(text: &str) -> Option<Value> {
    match text {
        "True" => return Some(Value::Bool(true)),
        "False" => return Some(Value::Bool(false)),
        _ => {}
    }
    let (kind, rest) = text.split_once('(')?;
    let inner = rest.strip_suffix(')')?;
    match kind {
        "string" => Some(Value::Text(inner.to_string())),
        "integer" => inner.parse().ok().map(Value::Int),
        "float" => inner.parse().ok().map(Value::Float),
        _ => None,
    }
}

/// A type the reader can instantiate.
pub trait ModelClass: Send + Sync + fmt::Debug {
    fn key(&self) -> &ClassKey;

    fn parent(&self) -> Option<&str>;

    /// Ancestor names, nearest first.
    fn ancestors(&self) -> &[String];

    /// Every field, inherited ones first.
    fn fields(&self) -> &IndexMap<String, FieldSpec>;

    /// Validate and coerce `fields` into an instance.
    fn construct(&self, path: &str, fields: IndexMap<String, Value>) -> Result<Instance, ValidationError>;

    /// Whether this class is `name` or inherits from a class named `name`.
    /// Compared by name, so every version's base class matches.
    fn is_a(&self, name: &str) -> bool {
        self.key().name == name || self.ancestors().iter().any(|a| a == name)
    }
}

/// A class assembled at runtime from a field list.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicClass {
    key: ClassKey,
    parent: Option<String>,
    ancestors: Vec<String>,
    fields: IndexMap<String, FieldSpec>,
}

impl DynamicClass {
    pub fn new(key: ClassKey) -> Self {
        Self {
            key,
            parent: None,
            ancestors: Vec::new(),
            fields: IndexMap::new(),
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_field(mut self, field: FieldSpec) -> Self {
        self.fields.insert(field.name.clone(), field);
        self
    }

    pub fn from_definition(key: ClassKey, class: &ClassDefinition) -> Self {
        Self {
            key,
            parent: class.is_a.clone(),
            ancestors: Vec::new(),
            fields: class
                .attributes
                .values()
                .map(|slot| (slot.name.clone(), FieldSpec::from_slot(slot)))
                .collect(),
        }
    }

    /// A subclass of `base` with extra fields appended after the inherited
    /// ones. Used for per-instance table classes.
    pub fn derived_from(base: &dyn ModelClass, key: ClassKey, extra: impl IntoIterator<Item = FieldSpec>) -> Self {
        let mut ancestors = vec![base.key().name.clone()];
        ancestors.extend(base.ancestors().iter().cloned());
        let mut fields = base.fields().clone();
        for field in extra {
            fields.insert(field.name.clone(), field);
        }
        Self {
            key,
            parent: Some(base.key().name.clone()),
            ancestors,
            fields,
        }
    }
}

impl ModelClass for DynamicClass {
    fn key(&self) -> &ClassKey {
        &self.key
    }

    fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    fn ancestors(&self) -> &[String] {
        &self.ancestors
    }

    fn fields(&self) -> &IndexMap<String, FieldSpec> {
        &self.fields
    }

    fn construct(&self, path: &str, mut fields: IndexMap<String, Value>) -> Result<Instance, ValidationError> {
        let class = &self.key.name;
        if let Some(unknown) = fields.keys().find(|name| !self.fields.contains_key(*name)) {
            return Err(ValidationError::UnknownField {
                class: class.clone(),
                field: unknown.clone(),
            });
        }
        let mut out = IndexMap::new();
        for (name, spec) in &self.fields {
            let value = match fields.shift_remove(name) {
                Some(Value::Null) | None => spec.ifabsent.clone(),
                Some(value) => Some(value),
            };
            match value {
                Some(value) => {
                    out.insert(name.clone(), coerce(class, spec, value)?);
                }
                None if spec.required => {
                    return Err(ValidationError::MissingField {
                        class: class.clone(),
                        field: name.clone(),
                    })
                }
                None => {}
            }
        }
        Ok(Instance {
            class: self.key.clone(),
            path: path.to_string(),
            fields: out,
        })
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Int(_) => "integer",
        Value::Float(_) => "float",
        Value::Text(_) => "string",
        Value::DateTime(_) => "datetime",
        Value::List(_) => "list",
        Value::Map(_) => "mapping",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
        Value::Column(_) => "column",
        Value::Pending(_) => "unresolved reference",
    }
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    chrono::DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.naive_utc())
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f").ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn coerce(class: &str, spec: &FieldSpec, value: Value) -> Result<Value, ValidationError> {
    let mismatch = |value: &Value| ValidationError::TypeMismatch {
        class: class.to_string(),
        field: spec.name.clone(),
        expected: spec.range.to_string(),
        found: kind_of(value).to_string(),
    };

    match value {
        Value::Pending(_) => Err(mismatch(&value)),
        Value::Array(_) if spec.array || spec.multivalued || spec.range == Range::Any => Ok(value),
        Value::List(items) if spec.multivalued || spec.array || spec.range == Range::Any => items
            .into_iter()
            .map(|item| coerce_single(spec, item).ok_or_else(|| mismatch(&Value::List(Vec::new()))))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        value => {
            let found = kind_of(&value);
            coerce_single(spec, value).ok_or_else(|| ValidationError::TypeMismatch {
                class: class.to_string(),
                field: spec.name.clone(),
                expected: spec.range.to_string(),
                found: found.to_string(),
            })
        }
    }
}

fn coerce_single(spec: &FieldSpec, value: Value) -> Option<Value> {
    match (&spec.range, value) {
        (Range::Any, value) => Some(value),
        (Range::Class(_), value @ (Value::Object(_) | Value::Map(_) | Value::Column(_) | Value::Array(_) | Value::List(_))) => {
            Some(value)
        }
        (Range::Class(_), _) => None,
        (Range::Primitive(_), value @ Value::Array(_)) if spec.array => Some(value),
        (Range::Primitive(p), value) => coerce_primitive(*p, value),
    }
}

fn coerce_primitive(primitive: Primitive, value: Value) -> Option<Value> {
    match (primitive, value) {
        (Primitive::String, value @ Value::Text(_)) => Some(value),
        (Primitive::Integer, value @ Value::Int(_)) => Some(value),
        (Primitive::Float, value @ Value::Float(_)) => Some(value),
        (Primitive::Float, Value::Int(v)) => Some(Value::Float(v as f64)),
        (Primitive::Boolean, value @ Value::Bool(_)) => Some(value),
        (Primitive::Boolean, Value::Int(v @ (0 | 1))) => Some(Value::Bool(v == 1)),
        (Primitive::DateTime, value @ Value::DateTime(_)) => Some(value),
        (Primitive::DateTime, Value::Text(text)) => parse_datetime(&text).map(Value::DateTime),
        _ => None,
    }
}

/// Lookup table of model classes.
#[derive(Debug, Default, Clone)]
pub struct ModelRegistry {
    classes: IndexMap<ClassKey, Arc<dyn ModelClass>>,
    /// namespace -> version used for lookups
    active: IndexMap<String, String>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register classes, resolving `parent` links among them by name.
    pub fn from_classes(classes: Vec<DynamicClass>) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for class in resolve_inheritance(classes)? {
            registry.register(Arc::new(class));
        }
        Ok(registry)
    }

    /// Classes of every schema in a build that names its namespace and
    /// version. The first version seen per namespace becomes active.
    pub fn from_build(build: &BuildResult) -> Result<Self, RegistryError> {
        let mut classes = Vec::new();
        for schema in &build.schemas {
            let (Some(namespace), Some(version)) = (schema.namespace(), schema.version.as_deref()) else {
                continue;
            };
            for class in schema.classes.values() {
                classes.push(DynamicClass::from_definition(
                    ClassKey::new(namespace, version, &class.name),
                    class,
                ));
            }
        }
        debug!(classes = classes.len(), "Building model registry");
        Self::from_classes(classes)
    }

    pub fn register(&mut self, class: Arc<dyn ModelClass>) {
        let key = class.key().clone();
        self.active
            .entry(key.namespace.clone())
            .or_insert_with(|| key.version.clone());
        self.classes.insert(key, class);
    }

    /// Select which registered version of a namespace lookups use.
    /// Returns false if no class of that version is registered.
    pub fn set_active_version(&mut self, namespace: &str, version: &str) -> bool {
        let known = self
            .classes
            .keys()
            .any(|k| k.namespace == namespace && k.version == version);
        if known {
            self.active.insert(namespace.to_string(), version.to_string());
        }
        known
    }

    pub fn active_version(&self, namespace: &str) -> Option<&str> {
        self.active.get(namespace).map(String::as_str)
    }

    pub fn get(&self, key: &ClassKey) -> Option<Arc<dyn ModelClass>> {
        self.classes.get(key).cloned()
    }

    /// Find a class by name in the active version of `namespace`, or of any
    /// namespace when none is given.
    pub fn get_class(&self, namespace: Option<&str>, name: &str) -> Option<Arc<dyn ModelClass>> {
        let lookup = |ns: &str, version: &str| self.classes.get(&ClassKey::new(ns, version, name)).cloned();
        match namespace {
            Some(ns) => self.active.get(ns).and_then(|version| lookup(ns, version)),
            None => self.active.iter().find_map(|(ns, version)| lookup(ns, version)),
        }
    }

    pub fn is_dynamic_table(&self, class: &dyn ModelClass) -> bool {
        class.is_a(DYNAMIC_TABLE)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

fn find_parent(classes: &[DynamicClass], child: &DynamicClass, parent: &str) -> Option<usize> {
    let same_namespace = classes.iter().position(|c| {
        c.key.name == parent && c.key.namespace == child.key.namespace && c.key.version == child.key.version
    });
    same_namespace.or_else(|| classes.iter().position(|c| c.key.name == parent))
}

fn resolve_inheritance(mut classes: Vec<DynamicClass>) -> Result<Vec<DynamicClass>, RegistryError> {
    let parents = classes
        .iter()
        .map(|class| match &class.parent {
            None => Ok(None),
            Some(parent) => find_parent(&classes, class, parent)
                .map(Some)
                .ok_or_else(|| RegistryError::UnknownParent {
                    class: class.key.name.clone(),
                    parent: parent.clone(),
                }),
        })
        .collect::<Result<Vec<_>, _>>()?;

    #[derive(Clone, Copy, PartialEq)]
    enum State {
        New,
        Visiting,
        Done,
    }

    fn visit(
        index: usize,
        classes: &mut [DynamicClass],
        parents: &[Option<usize>],
        state: &mut [State],
    ) -> Result<(), RegistryError> {
        match state[index] {
            State::Done => return Ok(()),
            State::Visiting => return Err(RegistryError::InheritanceCycle(classes[index].key.name.clone())),
            State::New => {}
        }
        state[index] = State::Visiting;
        if let Some(parent) = parents[index] {
            visit(parent, classes, parents, state)?;
            let mut ancestors = vec![classes[parent].key.name.clone()];
            ancestors.extend(classes[parent].ancestors.iter().cloned());
            let mut fields = classes[parent].fields.clone();
            for (name, spec) in std::mem::take(&mut classes[index].fields) {
                fields.insert(name, spec);
            }
            classes[index].fields = fields;
            classes[index].ancestors = ancestors;
        }
        state[index] = State::Done;
        Ok(())
    }

    let mut state = vec![State::New; classes.len()];
    for index in 0..classes.len() {
        visit(index, &mut classes, &parents, &mut state)?;
    }
    Ok(classes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> ClassKey {
        ClassKey::new("core", "2.0.0", name)
    }

    fn registry() -> ModelRegistry {
        ModelRegistry::from_classes(vec![
            DynamicClass::new(key("Units"))
                .with_parent("DynamicTable")
                .with_field(FieldSpec::new("spike_times", Range::Class("VectorData".into()))),
            DynamicClass::new(key("DynamicTable"))
                .with_field(FieldSpec::new("name", Range::Primitive(Primitive::String)).required())
                .with_field(FieldSpec::new("description", Range::Primitive(Primitive::String))),
            DynamicClass::new(key("Subject"))
                .with_field(FieldSpec::new("age", Range::Primitive(Primitive::Float)))
                .with_field(FieldSpec::new("alive", Range::Primitive(Primitive::Boolean)))
                .with_field(FieldSpec::new("born", Range::Primitive(Primitive::DateTime)))
                .with_field(
                    FieldSpec::new("species", Range::Primitive(Primitive::String))
                        .with_default(Value::Text("mouse".into())),
                ),
        ])
        .unwrap()
    }

    #[test]
    fn test_inherited_fields_come_first() {
        let registry = registry();
        let units = registry.get_class(Some("core"), "Units").unwrap();
        let names: Vec<&str> = units.fields().keys().map(String::as_str).collect();
        assert_eq!(names, vec!["name", "description", "spike_times"]);
        assert!(registry.is_dynamic_table(units.as_ref()));
        assert_eq!(units.ancestors(), ["DynamicTable".to_string()]);
    }

    #[test]
    fn test_lookup_without_namespace() {
        let registry = registry();
        assert!(registry.get_class(None, "Subject").is_some());
        assert!(registry.get_class(Some("hdmf-common"), "Subject").is_none());
    }

    #[test]
    fn test_construct_coerces_values() {
        let registry = registry();
        let subject = registry.get_class(None, "Subject").unwrap();
        let instance = subject
            .construct(
                "/general/subject",
                IndexMap::from([
                    ("age".to_string(), Value::Int(3)),
                    ("alive".to_string(), Value::Int(1)),
                    ("born".to_string(), Value::Text("2024-01-02T03:04:05".into())),
                ]),
            )
            .unwrap();
        assert_eq!(instance.get("age"), Some(&Value::Float(3.0)));
        assert_eq!(instance.get("alive"), Some(&Value::Bool(true)));
        assert!(matches!(instance.get("born"), Some(Value::DateTime(_))));
        assert_eq!(instance.get("species"), Some(&Value::Text("mouse".into())));
    }

    #[test]
    fn test_construct_rejects_bad_input() {
        let registry = registry();
        let table = registry.get_class(None, "DynamicTable").unwrap();
        assert!(matches!(
            table.construct("/t", IndexMap::new()),
            Err(ValidationError::MissingField { .. })
        ));
        assert!(matches!(
            table.construct(
                "/t",
                IndexMap::from([
                    ("name".to_string(), Value::Text("t".into())),
                    ("bogus".to_string(), Value::Int(1)),
                ])
            ),
            Err(ValidationError::UnknownField { .. })
        ));
        assert!(matches!(
            table.construct("/t", IndexMap::from([("name".to_string(), Value::Int(1))])),
            Err(ValidationError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_inheritance_errors() {
        let cycle = ModelRegistry::from_classes(vec![
            DynamicClass::new(key("A")).with_parent("B"),
            DynamicClass::new(key("B")).with_parent("A"),
        ]);
        assert!(matches!(cycle, Err(RegistryError::InheritanceCycle(_))));
        let missing = ModelRegistry::from_classes(vec![DynamicClass::new(key("A")).with_parent("Nope")]);
        assert!(matches!(missing, Err(RegistryError::UnknownParent { .. })));
    }

    #[test]
    fn test_ifabsent_parsing() {
        assert_eq!(parse_ifabsent("string(units)"), Some(Value::Text("units".into())));
        assert_eq!(parse_ifabsent("float(0.5)"), Some(Value::Float(0.5)));
        assert_eq!(parse_ifabsent("True"), Some(Value::Bool(true)));
        assert_eq!(parse_ifabsent("nonsense"), None);
    }
}
