//! Dynamic tables.
//!
//! A dynamic table's columns are whatever datasets the group holds, in
//! `colnames` order first. Column data stays in the file behind
//! [`LazyArray`] proxies. A column `X` and a column `X_index` form a
//! ragged pair: the index holds the end offset of each row into `X`.

use crate::array::{ArrayData, Scalar};
use crate::error::{H5Error, TableError};
use crate::ids::ColumnId;
use crate::lazy::LazyArray;
use crate::registry::{ClassKey, DynamicClass, FieldSpec, ModelClass, Range};
use crate::value::{substitute_map, Arena, Value};
use indexmap::IndexMap;
use serde_json::json;
use std::sync::Arc;

/// Suffix naming the index column of a ragged column.
pub const INDEX_SUFFIX: &str = "_index";
/// Name of the row-identifier column.
pub const ID_COLUMN: &str = "id";

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub path: String,
    pub data: LazyArray,
    pub neurodata_type: Option<String>,
    pub description: Option<String>,
    /// Index column over this one, for ragged columns
    pub index: Option<ColumnId>,
    /// Data column this index addresses
    pub target: Option<ColumnId>,
    /// Remaining dataset attributes (`unit`, `resolution`, a region's
    /// `table`, ...)
    pub attrs: IndexMap<String, Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, data: LazyArray) -> Self {
        Self {
            name: name.into(),
            path: data.path().to_string(),
            data,
            neurodata_type: None,
            description: None,
            index: None,
            target: None,
            attrs: IndexMap::new(),
        }
    }

    pub fn is_index(&self) -> bool {
        self.target.is_some()
    }
}

/// One cell of a row.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Scalar(Scalar),
    Array(ArrayData),
}

#[derive(Debug, Clone)]
pub struct DynamicTable {
    pub path: String,
    /// Declared class of the group
    pub class: ClassKey,
    /// Per-instance class: the declared fields plus one per column
    pub derived: Arc<DynamicClass>,
    /// Non-column fields (name, description, colnames, ...)
    pub fields: IndexMap<String, Value>,
    columns: Vec<Column>,
    by_name: IndexMap<String, ColumnId>,
    id: Option<ColumnId>,
}

impl DynamicTable {
    /// Assemble a table from its columns. Columns named in `colnames` come
    /// first, in that order; ragged pairs are linked both ways.
    pub fn new(
        path: impl Into<String>,
        base: &dyn ModelClass,
        colnames: &[String],
        columns: Vec<Column>,
        fields: IndexMap<String, Value>,
    ) -> Self {
        let path = path.into();
        let mut ordered: Vec<Column> = Vec::with_capacity(columns.len());
        let mut rest = columns;
        for name in colnames {
            if let Some(pos) = rest.iter().position(|c| &c.name == name) {
                ordered.push(rest.remove(pos));
            }
        }
        ordered.extend(rest);

        let by_name: IndexMap<String, ColumnId> = ordered
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.clone(), ColumnId::new(i)))
            .collect();
        for i in 0..ordered.len() {
            let Some(data_name) = ordered[i].name.strip_suffix(INDEX_SUFFIX) else {
                continue;
            };
            if let Some(&data) = by_name.get(data_name) {
                ordered[i].target = Some(data);
                ordered[data.index()].index = Some(ColumnId::new(i));
            }
        }

        let class = base.key().clone();
        let key = ClassKey::new(
            class.namespace.clone(),
            class.version.clone(),
            format!("{}__{}", class.name, crate::h5::basename(&path)),
        );
        let extra = ordered.iter().map(|c| {
            FieldSpec::new(
                c.name.clone(),
                Range::Class(c.neurodata_type.clone().unwrap_or_else(|| "VectorData".to_string())),
            )
            .array()
        });
        let derived = Arc::new(DynamicClass::derived_from(base, key, extra));

        Self {
            id: by_name.get(ID_COLUMN).copied(),
            path,
            class,
            derived,
            fields,
            columns: ordered,
            by_name,
        }
    }

    /// Paths still referenced by placeholders in fields or column
    /// attributes.
    pub fn pending_paths(&self) -> Vec<String> {
        self.fields
            .values()
            .chain(self.columns.iter().flat_map(|c| c.attrs.values()))
            .flat_map(|v| v.pending_paths())
            .map(str::to_string)
            .collect()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending_paths().is_empty()
    }

    /// Replace placeholders in fields and column attributes.
    pub fn substitute(&mut self, lookup: &mut impl FnMut(&str) -> Option<Value>) {
        self.fields = substitute_map(std::mem::take(&mut self.fields), lookup);
        for column in &mut self.columns {
            column.attrs = substitute_map(std::mem::take(&mut column.attrs), lookup);
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.by_name.get(name).map(|id| &self.columns[id.index()])
    }

    pub fn column_by_id(&self, id: ColumnId) -> Option<&Column> {
        self.columns.get(id.index())
    }

    /// Data of a column, for indexing.
    pub fn get(&self, name: &str) -> Option<&LazyArray> {
        self.column(name).map(|c| &c.data)
    }

    fn require(&self, name: &str) -> Result<&Column, TableError> {
        self.column(name).ok_or_else(|| TableError::UnknownColumn {
            table: self.path.clone(),
            column: name.to_string(),
        })
    }

    /// Row count: the length of the id column, or of the first row-aligned
    /// column when there is no id.
    pub fn len(&self) -> Result<usize, H5Error> {
        let column = self
            .id
            .map(|id| &self.columns[id.index()])
            .or_else(|| self.columns.iter().find(|c| c.index.is_none()));
        match column {
            Some(column) => column.data.len(),
            None => Ok(0),
        }
    }

    pub fn is_empty(&self) -> Result<bool, H5Error> {
        Ok(self.len()? == 0)
    }

    /// One cell. Ragged columns return the slice of the data column the
    /// row's index entry spans.
    pub fn cell(&self, column: &str, row: usize) -> Result<Cell, TableError> {
        let len = self.len()?;
        if row >= len {
            return Err(TableError::RowOutOfRange {
                table: self.path.clone(),
                row,
                len,
            });
        }
        let column = self.require(column)?;
        if let Some(index) = column.index {
            let ends = &self.columns[index.index()].data;
            let end = offset(ends, row)?;
            let start = if row == 0 { 0 } else { offset(ends, row - 1)? };
            return Ok(Cell::Array(column.data.slice(start..end)?));
        }
        let data = column.data.get(row)?;
        Ok(match data.as_scalar() {
            Some(scalar) if data.shape().is_empty() => Cell::Scalar(scalar),
            _ => Cell::Array(data),
        })
    }

    /// Every user-facing column of one row; index columns are folded into
    /// their data columns.
    pub fn row(&self, row: usize) -> Result<IndexMap<String, Cell>, TableError> {
        self.columns
            .iter()
            .filter(|c| !c.is_index())
            .map(|c| Ok((c.name.clone(), self.cell(&c.name, row)?)))
            .collect()
    }

    /// Check every row-aligned column has the table's row count. Data
    /// columns of ragged pairs are exempt; their index columns are checked.
    pub fn validate_lengths(&self) -> Result<(), TableError> {
        let expected = self.len()?;
        let mut mismatches = Vec::new();
        for column in self.columns.iter().filter(|c| c.index.is_none()) {
            let len = column.data.len()?;
            if len != expected {
                mismatches.push((column.name.clone(), len));
            }
        }
        if mismatches.is_empty() {
            Ok(())
        } else {
            Err(TableError::LengthMismatch {
                table: self.path.clone(),
                expected,
                mismatches,
            })
        }
    }

    pub(crate) fn to_json(&self, arena: &Arena) -> serde_json::Value {
        let mut out: serde_json::Map<String, serde_json::Value> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json(arena)))
            .collect();
        out.insert("@type".to_string(), json!(self.class.to_string()));
        let columns: serde_json::Map<String, serde_json::Value> = self
            .columns
            .iter()
            .map(|c| {
                let mut column = json!({ "path": c.path });
                if let Some(index) = c.index {
                    column["index"] = json!(self.columns[index.index()].name);
                }
                if let Some(target) = c.target {
                    column["target"] = json!(self.columns[target.index()].name);
                }
                if let Some(description) = &c.description {
                    column["description"] = json!(description);
                }
                if !c.attrs.is_empty() {
                    column["attrs"] = serde_json::Value::Object(
                        c.attrs.iter().map(|(k, v)| (k.clone(), v.to_json(arena))).collect(),
                    );
                }
                (c.name.clone(), column)
            })
            .collect();
        out.insert("columns".to_string(), serde_json::Value::Object(columns));
        serde_json::Value::Object(out)
    }
}

fn offset(index: &LazyArray, row: usize) -> Result<usize, H5Error> {
    match index.scalar(row)? {
        Scalar::Int(v) if v >= 0 => Ok(v as usize),
        other => Err(H5Error::Selection {
            path: index.path().to_string(),
            source: crate::error::SelectionError(format!("invalid offset {other:?} at row {row}")),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::h5::MemoryFile;

    fn base() -> DynamicClass {
        DynamicClass::new(ClassKey::new("hdmf-common", "1.8.0", "DynamicTable"))
    }

    fn table(spike_count: usize) -> DynamicTable {
        let mut b = MemoryFile::builder("mem://table");
        b.dataset("/units/id", ArrayData::ints([0, 1, 2])).unwrap();
        b.dataset("/units/quality", ArrayData::texts(["good", "bad", "good"]))
            .unwrap();
        b.dataset(
            "/units/spike_times",
            ArrayData::floats((0..spike_count).map(|i| i as f64 * 0.5)),
        )
        .unwrap();
        b.dataset("/units/spike_times_index", ArrayData::ints([2, 3, 5]))
            .unwrap();
        let file: Arc<MemoryFile> = Arc::new(b.build());
        let column = |name: &str| Column::new(name, LazyArray::new(file.clone(), format!("/units/{name}")));
        DynamicTable::new(
            "/units",
            &base(),
            &["spike_times".to_string(), "quality".to_string()],
            vec![
                column("id"),
                column("quality"),
                column("spike_times"),
                column("spike_times_index"),
            ],
            IndexMap::new(),
        )
    }

    #[test]
    fn test_colnames_order_first() {
        let table = table(5);
        let names: Vec<&str> = table.column_names().collect();
        assert_eq!(names, vec!["spike_times", "quality", "id", "spike_times_index"]);
        assert_eq!(table.derived.key().name, "DynamicTable__units");
        assert!(table.derived.fields().contains_key("spike_times"));
        assert!(table.derived.is_a("DynamicTable"));
    }

    #[test]
    fn test_ragged_pair_is_linked_both_ways() {
        let table = table(5);
        let data = table.column("spike_times").unwrap();
        let index = table.column("spike_times_index").unwrap();
        assert_eq!(table.column_by_id(data.index.unwrap()).unwrap().name, "spike_times_index");
        assert_eq!(table.column_by_id(index.target.unwrap()).unwrap().name, "spike_times");
        assert!(table.column("quality").unwrap().index.is_none());
        assert!(table.column("id").unwrap().target.is_none());
    }

    #[test]
    fn test_ragged_cells() {
        let table = table(5);
        assert_eq!(table.len().unwrap(), 3);
        assert_eq!(
            table.cell("spike_times", 0).unwrap(),
            Cell::Array(ArrayData::floats([0.0, 0.5]))
        );
        assert_eq!(
            table.cell("spike_times", 2).unwrap(),
            Cell::Array(ArrayData::floats([1.5, 2.0]))
        );
        let row = table.row(1).unwrap();
        assert_eq!(row["quality"], Cell::Scalar(Scalar::Text("bad".into())));
        assert!(!row.contains_key("spike_times_index"));
        assert!(matches!(table.cell("quality", 3), Err(TableError::RowOutOfRange { .. })));
        assert!(matches!(table.cell("nope", 0), Err(TableError::UnknownColumn { .. })));
    }

    #[test]
    fn test_substitute_fills_fields_and_column_attrs() {
        let mut table = table(5);
        table.fields.insert("source".into(), Value::Pending("/data".into()));
        table.fields.insert("gone".into(), Value::Pending("/empty".into()));
        let mut column = table.columns[0].clone();
        column.attrs.insert("unit".into(), Value::Text("s".into()));
        column.attrs.insert("table".into(), Value::Pending("/electrodes".into()));
        table.columns[0] = column;
        assert_eq!(table.pending_paths(), vec!["/data", "/empty", "/electrodes"]);

        table.substitute(&mut |path| match path {
            "/data" => Some(Value::Int(1)),
            "/empty" => Some(Value::Null),
            _ => None,
        });
        assert_eq!(table.fields["source"], Value::Int(1));
        assert!(!table.fields.contains_key("gone"));
        assert_eq!(table.columns[0].attrs["unit"], Value::Text("s".into()));
        assert_eq!(table.pending_paths(), vec!["/electrodes"]);
        assert!(table.has_pending());
    }

    #[test]
    fn test_validate_lengths_skips_ragged_data() {
        assert!(table(5).validate_lengths().is_ok());
        assert!(table(9).validate_lengths().is_ok());
    }
}
