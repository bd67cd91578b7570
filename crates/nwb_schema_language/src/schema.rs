//! Schema files and their node kinds.

use crate::dtype::{Dims, Dtype, Shape};
use crate::error::{Result, SchemaLanguageError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// A single schema file: top-level group and dataset declarations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Schema {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<Group>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub datasets: Vec<Dataset>,
}

impl Schema {
    /// Parse a schema file from YAML text
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Read and parse a schema file
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| SchemaLanguageError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    /// Visit every group and dataset (top-level and nested) mutably.
    ///
    /// Groups are visited before their children.
    pub fn visit_mut<F>(&mut self, f: &mut F)
    where
        F: FnMut(NodeMut<'_>),
    {
        for group in &mut self.groups {
            group.visit_mut(f);
        }
        for dataset in &mut self.datasets {
            f(NodeMut::Dataset(dataset));
        }
    }
}

/// Mutable handle on a type-carrying node, used by [`Schema::visit_mut`].
pub enum NodeMut<'a> {
    Group(&'a mut Group),
    Dataset(&'a mut Dataset),
}

/// A group: a container of attributes, datasets, nested groups and links.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Group {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub neurodata_type_def: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub neurodata_type_inc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_name: Option<String>,
    pub doc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<Quantity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linkable: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<Attribute>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub datasets: Vec<Dataset>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<Group>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<Link>,
}

impl Group {
    fn visit_mut<F>(&mut self, f: &mut F)
    where
        F: FnMut(NodeMut<'_>),
    {
        f(NodeMut::Group(self));
        for dataset in &mut self.datasets {
            f(NodeMut::Dataset(dataset));
        }
        for group in &mut self.groups {
            group.visit_mut(f);
        }
    }

    pub fn quantity(&self) -> Quantity {
        self.quantity.unwrap_or_default()
    }
}

/// A dataset: an n-dimensional array (or scalar) with attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dataset {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub neurodata_type_def: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub neurodata_type_inc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_name: Option<String>,
    pub doc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<Quantity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linkable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dtype: Option<Dtype>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dims: Option<Dims>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shape: Option<Shape>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_yaml::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<serde_yaml::Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<Attribute>,
}

impl Dataset {
    pub fn quantity(&self) -> Quantity {
        self.quantity.unwrap_or_default()
    }
}

/// A small named value attached to a group or dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub dtype: Dtype,
    #[serde(default)]
    pub doc: String,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dims: Option<Dims>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<Shape>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_yaml::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<serde_yaml::Value>,
}

fn default_required() -> bool {
    true
}

/// A link to an object of another type, stored elsewhere in the file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Link {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub doc: String,
    pub target_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<Quantity>,
}

impl Link {
    pub fn quantity(&self) -> Quantity {
        self.quantity.unwrap_or_default()
    }
}

/// How many instances of a node may appear.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "QuantityRepr", into = "QuantityRepr")]
pub enum Quantity {
    /// `?`
    ZeroOrOne,
    /// `*`
    ZeroOrMany,
    /// `+`
    OneOrMany,
    /// An exact count; the default is exactly one.
    Exactly(u64),
    #[default]
    One,
}

impl Quantity {
    pub fn required(self) -> bool {
        !matches!(self, Quantity::ZeroOrOne | Quantity::ZeroOrMany | Quantity::Exactly(0))
    }

    pub fn multivalued(self) -> bool {
        match self {
            Quantity::ZeroOrMany | Quantity::OneOrMany => true,
            Quantity::Exactly(n) => n > 1,
            Quantity::ZeroOrOne | Quantity::One => false,
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quantity::ZeroOrOne => write!(f, "?"),
            Quantity::ZeroOrMany => write!(f, "*"),
            Quantity::OneOrMany => write!(f, "+"),
            Quantity::Exactly(n) => write!(f, "{n}"),
            Quantity::One => write!(f, "1"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum QuantityRepr {
    Count(u64),
    Symbol(String),
}

impl TryFrom<QuantityRepr> for Quantity {
    type Error = SchemaLanguageError;

    fn try_from(repr: QuantityRepr) -> Result<Self> {
        match repr {
            QuantityRepr::Count(1) => Ok(Quantity::One),
            QuantityRepr::Count(n) => Ok(Quantity::Exactly(n)),
            QuantityRepr::Symbol(symbol) => match symbol.as_str() {
                "?" | "zero_or_one" => Ok(Quantity::ZeroOrOne),
                "*" | "zero_or_many" => Ok(Quantity::ZeroOrMany),
                "+" | "one_or_many" => Ok(Quantity::OneOrMany),
                _ => Err(SchemaLanguageError::InvalidQuantity(symbol)),
            },
        }
    }
}

impl From<Quantity> for QuantityRepr {
    fn from(quantity: Quantity) -> Self {
        match quantity {
            Quantity::One => QuantityRepr::Count(1),
            Quantity::Exactly(n) => QuantityRepr::Count(n),
            other => QuantityRepr::Symbol(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = r#"
groups:
- neurodata_type_def: DynamicTable
  neurodata_type_inc: Container
  doc: A column-centric table.
  attributes:
  - name: colnames
    dtype: ascii
    dims: [num_columns]
    shape: [null]
    doc: Column names.
  - name: description
    dtype: text
    doc: Description of the table.
  datasets:
  - name: id
    neurodata_type_inc: ElementIdentifiers
    dtype: int
    dims: [num_rows]
    shape: [null]
    doc: Row ids.
  - neurodata_type_inc: VectorData
    doc: Columns.
    quantity: '*'
"#;

    #[test]
    fn test_parse_schema_file() {
        let schema = Schema::from_yaml_str(TABLE).unwrap();
        assert_eq!(schema.groups.len(), 1);
        let table = &schema.groups[0];
        assert_eq!(table.neurodata_type_def.as_deref(), Some("DynamicTable"));
        assert_eq!(table.attributes.len(), 2);
        assert!(table.attributes.iter().all(|a| a.required));
        assert_eq!(table.datasets[0].quantity(), Quantity::One);
        assert_eq!(table.datasets[1].quantity(), Quantity::ZeroOrMany);
    }

    #[test]
    fn test_quantity_flags() {
        assert!(Quantity::One.required());
        assert!(!Quantity::One.multivalued());
        assert!(!Quantity::ZeroOrMany.required());
        assert!(Quantity::ZeroOrMany.multivalued());
        assert!(Quantity::OneOrMany.required());
        assert!(Quantity::Exactly(3).multivalued());
        assert!(!Quantity::ZeroOrOne.required());
    }

    #[test]
    fn test_quantity_rejects_unknown_symbol() {
        let err = serde_yaml::from_str::<Quantity>("'!'").unwrap_err();
        assert!(err.to_string().contains("Invalid quantity"));
    }

    #[test]
    fn test_visit_mut_reaches_nested_nodes() {
        let mut schema = Schema::from_yaml_str(TABLE).unwrap();
        let mut seen = Vec::new();
        schema.visit_mut(&mut |node| match node {
            NodeMut::Group(g) => seen.push(format!("group:{}", g.neurodata_type_def.clone().unwrap_or_default())),
            NodeMut::Dataset(d) => seen.push(format!("dataset:{}", d.name.clone().unwrap_or_default())),
        });
        assert_eq!(seen, vec!["group:DynamicTable", "dataset:id", "dataset:"]);
    }
}
