//! Resolved values and the object arena.

use crate::ids::ObjectId;
use crate::lazy::LazyArray;
use crate::registry::ClassKey;
use crate::table::DynamicTable;
use chrono::NaiveDateTime;
use indexmap::IndexMap;
use serde_json::json;

/// A column of a dynamic table, addressed through the table's arena id.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRef {
    pub table: ObjectId,
    pub column: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    DateTime(NaiveDateTime),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
    Array(LazyArray),
    Object(ObjectId),
    Column(ColumnRef),
    /// Placeholder for the value at another path, substituted during the
    /// construct phase
    Pending(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            Value::Object(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&LazyArray> {
        match self {
            Value::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Paths of every placeholder in this value, depth first.
    pub fn pending_paths(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_pending(&mut out);
        out
    }

    fn collect_pending<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Value::Pending(path) => out.push(path),
            Value::List(items) => items.iter().for_each(|v| v.collect_pending(out)),
            Value::Map(map) => map.values().for_each(|v| v.collect_pending(out)),
            _ => {}
        }
    }

    /// Replace every placeholder using `lookup`. Placeholders resolving to
    /// `Null` are removed from maps.
    pub fn substitute(self, lookup: &mut impl FnMut(&str) -> Option<Value>) -> Value {
        match self {
            Value::Pending(path) => match lookup(&path) {
                Some(value) => value,
                None => Value::Pending(path),
            },
            Value::List(items) => Value::List(items.into_iter().map(|v| v.substitute(lookup)).collect()),
            Value::Map(map) => Value::Map(substitute_map(map, lookup)),
            other => other,
        }
    }

    /// JSON summary. Objects are expanded through the arena; arrays are
    /// described, not read.
    pub fn to_json(&self, arena: &Arena) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(v) => json!(v),
            Value::Int(v) => json!(v),
            Value::Float(v) => json!(v),
            Value::Text(v) => json!(v),
            Value::DateTime(v) => json!(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
            Value::List(items) => items.iter().map(|v| v.to_json(arena)).collect(),
            Value::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json(arena))).collect(),
            ),
            Value::Array(array) => {
                let mut out = json!({ "array": array.path(), "file": array.locator() });
                if let Some(field) = array.field_name() {
                    out["field"] = json!(field);
                }
                out
            }
            Value::Object(id) => arena.object_json(*id),
            Value::Column(column) => json!({
                "table": arena.path_of(column.table),
                "column": column.column,
            }),
            Value::Pending(path) => json!({ "unresolved": path }),
        }
    }
}

/// Substitute placeholders in every value of `map`, dropping entries whose
/// placeholder resolves to `Null`.
pub fn substitute_map(
    map: IndexMap<String, Value>,
    lookup: &mut impl FnMut(&str) -> Option<Value>,
) -> IndexMap<String, Value> {
    map.into_iter()
        .filter_map(|(k, v)| {
            let was_pending = matches!(v, Value::Pending(_));
            let v = v.substitute(lookup);
            (!(was_pending && v.is_null())).then_some((k, v))
        })
        .collect()
}

impl From<crate::array::Scalar> for Value {
    fn from(scalar: crate::array::Scalar) -> Self {
        use crate::array::Scalar;
        match scalar {
            Scalar::Bool(v) => Value::Bool(v),
            Scalar::Int(v) => Value::Int(v),
            Scalar::Float(v) => Value::Float(v),
            Scalar::Text(v) => Value::Text(v),
            // References are turned into placeholders by the read rules;
            // a stray one is kept as its raw number.
            Scalar::Ref(r) => Value::Int(r.0 as i64),
        }
    }
}

/// A validated model instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub class: ClassKey,
    pub path: String,
    pub fields: IndexMap<String, Value>,
}

impl Instance {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

#[derive(Debug)]
pub enum Object {
    Model(Instance),
    Table(DynamicTable),
}

impl Object {
    pub fn path(&self) -> &str {
        match self {
            Object::Model(instance) => &instance.path,
            Object::Table(table) => &table.path,
        }
    }
}

/// Owns every object resolved from one file.
#[derive(Debug, Default)]
pub struct Arena {
    objects: Vec<Object>,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, object: Object) -> ObjectId {
        self.objects.push(object);
        ObjectId::new(self.objects.len() - 1)
    }

    pub fn get(&self, id: ObjectId) -> Option<&Object> {
        self.objects.get(id.index())
    }

    pub fn instance(&self, id: ObjectId) -> Option<&Instance> {
        match self.get(id)? {
            Object::Model(instance) => Some(instance),
            Object::Table(_) => None,
        }
    }

    pub fn table(&self, id: ObjectId) -> Option<&DynamicTable> {
        match self.get(id)? {
            Object::Table(table) => Some(table),
            Object::Model(_) => None,
        }
    }

    /// Swap the object stored under `id`; unknown ids are ignored.
    pub fn replace(&mut self, id: ObjectId, object: Object) {
        if let Some(slot) = self.objects.get_mut(id.index()) {
            *slot = object;
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &Object)> {
        self.objects.iter().enumerate().map(|(i, o)| (ObjectId::new(i), o))
    }

    fn path_of(&self, id: ObjectId) -> Option<&str> {
        self.get(id).map(Object::path)
    }

    fn object_json(&self, id: ObjectId) -> serde_json::Value {
        match self.get(id) {
            Some(Object::Model(instance)) => {
                let mut fields: serde_json::Map<String, serde_json::Value> = instance
                    .fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json(self)))
                    .collect();
                fields.insert("@type".to_string(), json!(instance.class.to_string()));
                serde_json::Value::Object(fields)
            }
            Some(Object::Table(table)) => table.to_json(self),
            None => json!({ "dangling": id.index() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitute_drops_pruned_placeholders() {
        let value = Value::Map(IndexMap::from([
            ("kept".to_string(), Value::Pending("/a".into())),
            ("pruned".to_string(), Value::Pending("/empty".into())),
            ("plain".to_string(), Value::Int(1)),
        ]));
        let out = value.substitute(&mut |path| match path {
            "/a" => Some(Value::Float(2.0)),
            "/empty" => Some(Value::Null),
            _ => None,
        });
        let map = out.as_map().unwrap();
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["kept", "plain"]);
        assert_eq!(map["kept"], Value::Float(2.0));
    }

    #[test]
    fn test_pending_paths_are_depth_first() {
        let value = Value::List(vec![
            Value::Pending("/x".into()),
            Value::Map(IndexMap::from([("y".to_string(), Value::Pending("/y".into()))])),
        ]);
        assert_eq!(value.pending_paths(), vec!["/x", "/y"]);
    }
}
