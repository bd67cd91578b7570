//! Namespace documents.
//!
//! A namespace file is the entry point of a schema: it names and versions a
//! collection of schema files, and may pull in every type of another
//! namespace (`- namespace: hdmf-common`).

use crate::error::{Result, SchemaLanguageError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// The top-level document of a namespace file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Namespaces {
    pub namespaces: Vec<Namespace>,
}

impl Namespaces {
    /// Parse a namespace document from YAML text
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Read and parse a namespace file
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| SchemaLanguageError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    /// Find a namespace by name
    pub fn get(&self, name: &str) -> Option<&Namespace> {
        self.namespaces.iter().find(|ns| ns.name == name)
    }
}

/// A named, versioned collection of schema files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Namespace {
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    pub doc: String,
    #[serde(deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub author: Vec<String>,
    #[serde(deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub contact: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    pub schema: Vec<SchemaRef>,
}

impl Namespace {
    /// Schema entries that point at a file in this namespace
    pub fn sources(&self) -> impl Iterator<Item = &SchemaRef> {
        self.schema.iter().filter(|s| s.source.is_some())
    }

    /// Schema entries that import another namespace wholesale
    pub fn imports(&self) -> impl Iterator<Item = &str> {
        self.schema.iter().filter_map(|s| s.namespace.as_deref())
    }
}

/// One entry of a namespace's `schema:` list: either a schema file
/// (`source`) or another namespace (`namespace`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub neurodata_types: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(value) => vec![value],
        OneOrMany::Many(values) => values,
    })
}
