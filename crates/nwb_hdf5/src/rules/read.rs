use super::{Phase, Rule, RuleContext};
use crate::array::{ArrayData, DType, Scalar, Selection};
use crate::error::Result;
use crate::flatten::{is_bookkeeping_attr, reference_path, SourceItem};
use crate::h5::{basename, AttrValue, H5Handle};
use crate::lazy::LazyArray;
use crate::result::{Payload, QueueItem, ReadResult};
use crate::table::{Column, DynamicTable};
use crate::value::Value;
use indexmap::{IndexMap, IndexSet};
use nwb_linkml::adapters::CHILDREN_SLOT;
use std::sync::Arc;
use tracing::debug;

const NAME_FIELD: &str = "name";
const VALUE_FIELD: &str = "value";
const COLNAMES_ATTR: &str = "colnames";
const DESCRIPTION_ATTR: &str = "description";

/// Name of the object at `path`; the file root is conventionally `root`.
fn instance_name(path: &str) -> String {
    if path == "/" {
        "root".to_string()
    } else {
        basename(path).to_string()
    }
}

fn source_item(item: &QueueItem) -> Option<&SourceItem> {
    match item {
        QueueItem::Source(item) => Some(item),
        QueueItem::Result(_) => None,
    }
}

fn scalar_value(handle: &dyn H5Handle, scalar: Scalar, depends: &mut IndexSet<String>) -> Result<Value> {
    Ok(match scalar {
        Scalar::Ref(reference) => {
            let path = reference_path(handle, reference)?;
            depends.insert(path.clone());
            Value::Pending(path)
        }
        other => Value::from(other),
    })
}

/// Field values of one item plus the paths they refer to.
#[derive(Default)]
struct Fields {
    values: IndexMap<String, Value>,
    depends: IndexSet<String>,
}

impl Fields {
    fn attr(&mut self, handle: &dyn H5Handle, name: &str, value: &AttrValue) -> Result<()> {
        let value = match value {
            AttrValue::Scalar(scalar) => scalar_value(handle, scalar.clone(), &mut self.depends)?,
            AttrValue::Array(data) => Value::List(
                data.to_scalars()
                    .into_iter()
                    .map(|s| scalar_value(handle, s, &mut self.depends))
                    .collect::<Result<_>>()?,
            ),
        };
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    fn child(&mut self, name: &str, path: &str) {
        self.depends.insert(path.to_string());
        self.values.insert(name.to_string(), Value::Pending(path.to_string()));
    }

    fn children(&mut self, item: &SourceItem) {
        for (name, path) in &item.children {
            self.child(name, path);
        }
    }

    fn data_attrs(&mut self, handle: &dyn H5Handle, item: &SourceItem) -> Result<()> {
        for (name, value) in item.data_attrs() {
            self.attr(handle, name, value)?;
        }
        Ok(())
    }

    fn into_result(self, item: &SourceItem, rule: &'static str) -> ReadResult {
        ReadResult::new(item, rule)
            .with_depends(self.depends)
            .complete(Some(Payload::Mapping(self.values)))
    }
}

/// Groups whose declared type is, or inherits from, `DynamicTable`.
/// Dataset children become lazy columns and are absorbed into the table.
/// Group children resolve on their own.
pub struct ResolveDynamicTable;

impl Rule for ResolveDynamicTable {
    fn name(&self) -> &'static str {
        "dynamic_table"
    }

    fn phase(&self) -> Phase {
        Phase::Read
    }

    fn priority(&self) -> u32 {
        1
    }

    fn check(&self, item: &QueueItem, ctx: &RuleContext<'_>) -> bool {
        source_item(item).is_some_and(|item| {
            item.is_group()
                && ctx
                    .model_for(item)
                    .is_some_and(|model| ctx.registry.is_dynamic_table(model.as_ref()))
        })
    }

    fn apply(&self, item: &QueueItem, ctx: &RuleContext<'_>) -> Result<ReadResult> {
        let item = item.source();
        let mut result = ReadResult::new(item, self.name());
        let Some(model) = ctx.model_for(item) else {
            return Ok(result);
        };

        let mut depends = IndexSet::new();
        let mut columns = Vec::new();
        for (name, path) in &item.children {
            let Some(child) = ctx.items.get(path).filter(|c| c.is_dataset()) else {
                continue;
            };
            let mut column = Column::new(name.clone(), LazyArray::new(Arc::clone(ctx.source), path.clone()));
            column.neurodata_type = child.neurodata_type.as_ref().map(|t| t.name.clone());
            column.description = child
                .attrs
                .get(DESCRIPTION_ATTR)
                .and_then(AttrValue::as_str)
                .map(str::to_string);
            let mut attrs = Fields::default();
            for (attr, value) in child.data_attrs().filter(|(attr, _)| attr.as_str() != DESCRIPTION_ATTR) {
                attrs.attr(ctx.handle, attr, value)?;
            }
            column.attrs = attrs.values;
            depends.extend(attrs.depends);
            columns.push(column);
            result.completes.push(path.clone());
        }

        let colnames = item
            .attrs
            .get(COLNAMES_ATTR)
            .and_then(AttrValue::as_texts)
            .unwrap_or_default();
        let mut fields = Fields::default();
        fields
            .values
            .insert(NAME_FIELD.to_string(), Value::Text(instance_name(&item.path)));
        fields.data_attrs(ctx.handle, item)?;
        depends.extend(fields.depends);
        // the table's own columns and the table itself settle with it
        depends.retain(|path| *path != item.path && !result.completes.contains(path));

        debug!(path = %item.path, columns = columns.len(), "Materialized dynamic table");
        let table = DynamicTable::new(item.path.clone(), model.as_ref(), &colnames, columns, fields.values);
        Ok(result
            .with_model(model)
            .with_depends(depends)
            .complete(Some(Payload::Table(table))))
    }
}

/// Untyped groups without attributes: a mapping of their children.
pub struct ResolveContainerGroup;

impl Rule for ResolveContainerGroup {
    fn name(&self) -> &'static str {
        "container_group"
    }

    fn phase(&self) -> Phase {
        Phase::Read
    }

    fn priority(&self) -> u32 {
        9
    }

    fn check(&self, item: &QueueItem, _ctx: &RuleContext<'_>) -> bool {
        source_item(item).is_some_and(|item| item.is_group() && item.neurodata_type.is_none() && item.attrs.is_empty())
    }

    fn apply(&self, item: &QueueItem, _ctx: &RuleContext<'_>) -> Result<ReadResult> {
        let item = item.source();
        let mut fields = Fields::default();
        fields.children(item);
        Ok(fields.into_result(item, self.name()))
    }
}

/// Groups of a registered type: one value per class field.
pub struct ResolveModelGroup;

impl Rule for ResolveModelGroup {
    fn name(&self) -> &'static str {
        "model_group"
    }

    fn phase(&self) -> Phase {
        Phase::Read
    }

    fn priority(&self) -> u32 {
        10
    }

    fn check(&self, item: &QueueItem, ctx: &RuleContext<'_>) -> bool {
        source_item(item).is_some_and(|item| item.is_group() && ctx.model_for(item).is_some())
    }

    fn apply(&self, item: &QueueItem, ctx: &RuleContext<'_>) -> Result<ReadResult> {
        let item = item.source();
        let Some(model) = ctx.model_for(item) else {
            return Ok(ReadResult::new(item, self.name()));
        };
        let mut fields = Fields::default();
        for field in model.fields().keys() {
            if field == NAME_FIELD {
                fields
                    .values
                    .insert(field.clone(), Value::Text(instance_name(&item.path)));
            } else if field == CHILDREN_SLOT {
                let mut children = Fields::default();
                children.children(item);
                fields.depends.extend(children.depends);
                fields.values.insert(field.clone(), Value::Map(children.values));
            } else if let Some(value) = item.attrs.get(field).filter(|_| !is_bookkeeping_attr(field)) {
                fields.attr(ctx.handle, field, value)?;
            } else if let Some(child) = item.children.get(field) {
                fields.child(field, child);
            }
        }
        Ok(fields.into_result(item, self.name()).with_model(model))
    }
}

/// Datasets of a registered type. Scalars are read now; arrays become lazy
/// proxies, per compound field when the class names them.
pub struct ResolveModelDataset;

impl Rule for ResolveModelDataset {
    fn name(&self) -> &'static str {
        "model_dataset"
    }

    fn phase(&self) -> Phase {
        Phase::Read
    }

    fn priority(&self) -> u32 {
        10
    }

    fn check(&self, item: &QueueItem, ctx: &RuleContext<'_>) -> bool {
        source_item(item).is_some_and(|item| item.is_dataset() && ctx.model_for(item).is_some())
    }

    fn apply(&self, item: &QueueItem, ctx: &RuleContext<'_>) -> Result<ReadResult> {
        let item = item.source();
        let Some(model) = ctx.model_for(item) else {
            return Ok(ReadResult::new(item, self.name()));
        };
        let proxy = LazyArray::new(Arc::clone(ctx.source), item.path.clone());
        let compound: Vec<String> = match &item.dtype {
            Some(DType::Compound(members)) => members.iter().map(|(name, _)| name.clone()).collect(),
            _ => Vec::new(),
        };

        let mut fields = Fields::default();
        for field in model.fields().keys() {
            if field == NAME_FIELD {
                fields
                    .values
                    .insert(field.clone(), Value::Text(instance_name(&item.path)));
            } else if let Some(value) = item.attrs.get(field).filter(|_| !is_bookkeeping_attr(field)) {
                fields.attr(ctx.handle, field, value)?;
            } else if compound.contains(field) {
                fields.values.insert(field.clone(), Value::Array(proxy.field(field.clone())));
            } else if field == VALUE_FIELD {
                let value = if item.is_scalar() {
                    read_scalar(ctx.handle, item, &mut fields.depends)?
                } else {
                    Value::Array(proxy.clone())
                };
                fields.values.insert(field.clone(), value);
            }
        }
        Ok(fields.into_result(item, self.name()).with_model(model))
    }
}

fn read_scalar(handle: &dyn H5Handle, item: &SourceItem, depends: &mut IndexSet<String>) -> Result<Value> {
    let data = handle.read(&item.path, &Selection::All)?;
    match data.as_scalar() {
        Some(scalar) => scalar_value(handle, scalar, depends),
        None => Ok(Value::List(
            data.to_scalars()
                .into_iter()
                .map(|s| scalar_value(handle, s, depends))
                .collect::<Result<_>>()?,
        )),
    }
}

/// Untyped (or unregistered) array datasets: the bare lazy proxy, or a
/// mapping of `value` plus attributes when the dataset has attributes.
pub struct ResolveDataset;

impl Rule for ResolveDataset {
    fn name(&self) -> &'static str {
        "dataset"
    }

    fn phase(&self) -> Phase {
        Phase::Read
    }

    fn priority(&self) -> u32 {
        11
    }

    fn check(&self, item: &QueueItem, ctx: &RuleContext<'_>) -> bool {
        source_item(item).is_some_and(|item| item.is_dataset() && !item.is_scalar() && ctx.model_for(item).is_none())
    }

    fn apply(&self, item: &QueueItem, ctx: &RuleContext<'_>) -> Result<ReadResult> {
        let item = item.source();
        let proxy = Value::Array(LazyArray::new(Arc::clone(ctx.source), item.path.clone()));
        if !item.has_data_attrs() {
            return Ok(ReadResult::new(item, self.name()).complete(Some(Payload::Value(proxy))));
        }
        let mut fields = Fields::default();
        fields.values.insert(VALUE_FIELD.to_string(), proxy);
        fields.data_attrs(ctx.handle, item)?;
        Ok(fields.into_result(item, self.name()))
    }
}

/// Untyped rank-0 datasets, read eagerly.
pub struct ResolveScalar;

impl Rule for ResolveScalar {
    fn name(&self) -> &'static str {
        "scalar"
    }

    fn phase(&self) -> Phase {
        Phase::Read
    }

    fn priority(&self) -> u32 {
        11
    }

    fn check(&self, item: &QueueItem, ctx: &RuleContext<'_>) -> bool {
        source_item(item).is_some_and(|item| item.is_scalar() && ctx.model_for(item).is_none())
    }

    fn apply(&self, item: &QueueItem, ctx: &RuleContext<'_>) -> Result<ReadResult> {
        let item = item.source();
        let mut depends = IndexSet::new();
        let value = read_scalar(ctx.handle, item, &mut depends)?;
        Ok(ReadResult::new(item, self.name())
            .with_depends(depends)
            .complete(Some(Payload::Value(value))))
    }
}

/// Any remaining group (untyped with attributes, or of a type the registry
/// does not know): its attributes plus its children.
pub struct ResolveAttributedGroup;

impl Rule for ResolveAttributedGroup {
    fn name(&self) -> &'static str {
        "attributed_group"
    }

    fn phase(&self) -> Phase {
        Phase::Read
    }

    fn priority(&self) -> u32 {
        12
    }

    fn check(&self, item: &QueueItem, _ctx: &RuleContext<'_>) -> bool {
        source_item(item).is_some_and(SourceItem::is_group)
    }

    fn apply(&self, item: &QueueItem, ctx: &RuleContext<'_>) -> Result<ReadResult> {
        let item = item.source();
        if let Some(declared) = &item.neurodata_type {
            debug!(path = %item.path, type_name = %declared.name, "No registered class; reading as mapping");
        }
        let mut fields = Fields::default();
        fields.data_attrs(ctx.handle, item)?;
        fields.children(item);
        Ok(fields.into_result(item, self.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_name() {
        assert_eq!(instance_name("/"), "root");
        assert_eq!(instance_name("/units"), "units");
    }

    #[test]
    fn test_array_attr_becomes_list() {
        let mut b = crate::h5::MemoryFile::builder("mem://attrs");
        b.group("/g").unwrap();
        let file = b.build();
        let handle = crate::h5::H5Source::open(&file).unwrap();
        let mut fields = Fields::default();
        fields
            .attr(handle.as_ref(), "colnames", &AttrValue::from(ArrayData::texts(["a", "b"])))
            .unwrap();
        assert_eq!(
            fields.values["colnames"],
            Value::List(vec![Value::Text("a".into()), Value::Text("b".into())])
        );
        assert!(fields.depends.is_empty());
    }
}
