//! End-to-end resolution tests
//!
//! Builds small files in memory, resolves them against hand-made and
//! schema-built registries, and checks the resulting objects, tables and
//! failure reports.

use nwb_hdf5::h5::{NAMESPACE_ATTR, TYPE_ATTR};
use nwb_hdf5::{
    resolve, ArrayData, Cell, ClassKey, ColumnRef, DynamicClass, FieldSpec, H5Source, Hdf5Reader, MemoryFile,
    ModelClass, ModelRegistry, Phase, Primitive, QueueItem, Range, ReadResult, Resolution, ResolveError, ResolverConfig, Rule,
    RuleContext, RuleSet, Scalar, TableError, ValidationError, Value,
};
use nwb_linkml::NamespacesAdapter;
use std::path::PathBuf;
use std::sync::Arc;

fn registry() -> ModelRegistry {
    let root = DynamicClass::new(ClassKey::new("core", "2.0.0", "Root"))
        .with_field(FieldSpec::new("name", Range::Primitive(Primitive::String)).required())
        .with_field(FieldSpec::new("count", Range::Primitive(Primitive::Integer)).required())
        .with_field(FieldSpec::new("table", Range::Class("DynamicTable".into())).required());
    let table = DynamicClass::new(ClassKey::new("hdmf-common", "1.8.0", "DynamicTable"))
        .with_field(FieldSpec::new("name", Range::Primitive(Primitive::String)).required())
        .with_field(FieldSpec::new("colnames", Range::Primitive(Primitive::String)).array())
        .with_field(FieldSpec::new("description", Range::Primitive(Primitive::String)))
        .with_field(FieldSpec::new("id", Range::Class("ElementIdentifiers".into())).required());
    ModelRegistry::from_classes(vec![root, table]).unwrap()
}

fn typed(b: &mut nwb_hdf5::MemoryFileBuilder, path: &str, namespace: &str, type_name: &str) {
    b.attr(path, NAMESPACE_ATTR, namespace).unwrap();
    b.attr(path, TYPE_ATTR, type_name).unwrap();
}

/// Root with a scalar count and a three-row table of two columns.
fn table_file(count: bool, b_column: Vec<i64>) -> Arc<MemoryFile> {
    let mut b = MemoryFile::builder("mem://table.nwb");
    typed(&mut b, "/", "core", "Root");
    if count {
        b.dataset("/count", ArrayData::scalar(Scalar::Int(5))).unwrap();
    }
    b.group("/table").unwrap();
    typed(&mut b, "/table", "hdmf-common", "DynamicTable");
    b.attr("/table", "colnames", ArrayData::texts(["a", "b"])).unwrap();
    b.attr("/table", "description", "two columns").unwrap();
    b.dataset("/table/a", ArrayData::ints([1, 2, 3])).unwrap();
    b.dataset("/table/b", ArrayData::ints(b_column)).unwrap();
    b.dataset("/table/id", ArrayData::ints([0, 1, 2])).unwrap();
    Arc::new(b.build())
}

fn fixture(path: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../nwb_linkml/tests/fixtures")
        .join(path)
}

fn schema_registry() -> ModelRegistry {
    let common = NamespacesAdapter::from_yaml(&fixture("hdmf-common/namespace.yaml"), Vec::new()).unwrap();
    let core = NamespacesAdapter::from_yaml(&fixture("core/namespace.yaml"), vec![common]).unwrap();
    ModelRegistry::from_build(&core.build(false).unwrap()).unwrap()
}

// =============================================================================
// MODEL CONSTRUCTION
// =============================================================================

#[test]
fn test_root_with_table_resolves() {
    nwb_logging::init_test_logging();
    let file = table_file(true, vec![4, 5, 6]);
    let resolved = resolve(file, &registry()).unwrap();

    let root = resolved.root_instance().unwrap();
    assert_eq!(root.class.name, "Root");
    assert_eq!(root.get("name"), Some(&Value::Text("root".into())));
    assert_eq!(root.get("count").and_then(Value::as_int), Some(5));

    let table_id = root.get("table").and_then(Value::as_object).unwrap();
    let table = resolved.arena.table(table_id).unwrap();
    assert_eq!(table.len().unwrap(), 3);
    assert_eq!(table.column_names().collect::<Vec<_>>(), vec!["a", "b", "id"]);
    assert_eq!(table.cell("a", 1).unwrap(), Cell::Scalar(Scalar::Int(2)));
    assert_eq!(table.cell("b", 2).unwrap(), Cell::Scalar(Scalar::Int(6)));
    assert_eq!(table.get("a").unwrap().read().unwrap(), ArrayData::ints([1, 2, 3]));
    assert_eq!(table.fields["description"], Value::Text("two columns".into()));
    assert!(table.validate_lengths().is_ok());
    assert!(table.derived.fields().contains_key("a"));
}

#[test]
fn test_every_flattened_path_is_settled() {
    let file = table_file(true, vec![4, 5, 6]);
    let resolved = resolve(file, &registry()).unwrap();

    let paths: Vec<&str> = resolved.entries.keys().map(String::as_str).collect();
    assert_eq!(paths, vec!["/", "/count", "/table", "/table/a", "/table/b", "/table/id"]);
    assert!(matches!(resolved.get("/"), Some(Resolution::Object(_))));
    assert_eq!(resolved.get("/count"), Some(&Resolution::Value(Value::Int(5))));
    assert_eq!(
        resolved.get("/table/b"),
        Some(&Resolution::Absorbed {
            owner: "/table".into(),
            column: "b".into()
        })
    );
    assert!(resolved.table("/table").is_some());
    assert!(resolved.instance("/table").is_none());
}

#[test]
fn test_phases_settle_within_budget() {
    let file = table_file(true, vec![4, 5, 6]);
    let resolved = resolve(file, &registry()).unwrap();
    assert_eq!(resolved.passes[&Phase::Plan], 1);
    assert_eq!(resolved.passes[&Phase::Read], 1);
    // leaves pass through first, the root substitutes them next
    assert_eq!(resolved.passes[&Phase::Construct], 2);
}

#[test]
fn test_json_expands_objects() {
    let file = table_file(true, vec![4, 5, 6]);
    let resolved = resolve(file, &registry()).unwrap();
    let json = resolved.to_json();
    assert_eq!(json["count"], 5);
    assert_eq!(json["@type"], "core:Root@2.0.0");
    assert_eq!(json["table"]["columns"]["a"]["path"], "/table/a");
    assert_eq!(json["table"]["colnames"][1], "b");
}

fn dataset_registry() -> ModelRegistry {
    let name = || FieldSpec::new("name", Range::Primitive(Primitive::String)).required();
    let data = DynamicClass::new(ClassKey::new("core", "2.0.0", "Data"))
        .with_field(name())
        .with_field(FieldSpec::new("unit", Range::Primitive(Primitive::String)).required())
        .with_field(FieldSpec::new("value", Range::Primitive(Primitive::Float)).array().required());
    let events = DynamicClass::new(ClassKey::new("core", "2.0.0", "Events"))
        .with_field(name())
        .with_field(FieldSpec::new("start", Range::Primitive(Primitive::Float)).array().required())
        .with_field(FieldSpec::new("label", Range::Primitive(Primitive::String)).array());
    let count = DynamicClass::new(ClassKey::new("core", "2.0.0", "Count"))
        .with_field(name())
        .with_field(FieldSpec::new("value", Range::Primitive(Primitive::Integer)).required());
    ModelRegistry::from_classes(vec![data, events, count]).unwrap()
}

#[test]
fn test_typed_datasets_construct_models() {
    nwb_logging::init_test_logging();
    let mut b = MemoryFile::builder("mem://datasets.nwb");
    b.dataset("/d", ArrayData::floats([0.5, 1.0, 1.5])).unwrap();
    typed(&mut b, "/d", "core", "Data");
    b.attr("/d", "unit", "volts").unwrap();
    b.dataset(
        "/events",
        ArrayData::compound([
            ("start", ArrayData::floats([0.0, 1.5])),
            ("label", ArrayData::texts(["on", "off"])),
        ]),
    )
    .unwrap();
    typed(&mut b, "/events", "core", "Events");
    b.dataset("/n", ArrayData::scalar(Scalar::Int(7))).unwrap();
    typed(&mut b, "/n", "core", "Count");
    let file = Arc::new(b.build());
    let resolved = resolve(file.clone(), &dataset_registry()).unwrap();

    let data = resolved.instance("/d").unwrap();
    assert_eq!(data.class.name, "Data");
    assert_eq!(data.get("name"), Some(&Value::Text("d".into())));
    assert_eq!(data.get("unit"), Some(&Value::Text("volts".into())));
    let value = data.get("value").and_then(Value::as_array).unwrap();
    assert_eq!(value.path(), "/d");
    assert_eq!(value.read().unwrap(), ArrayData::floats([0.5, 1.0, 1.5]));

    let events = resolved.instance("/events").unwrap();
    let start = events.get("start").and_then(Value::as_array).unwrap();
    assert_eq!(start.field_name(), Some("start"));
    assert_eq!(start.read().unwrap(), ArrayData::floats([0.0, 1.5]));
    let label = events.get("label").and_then(Value::as_array).unwrap();
    assert_eq!(label.scalar(1).unwrap(), Scalar::Text("off".into()));

    let count = resolved.instance("/n").unwrap();
    assert_eq!(count.get("value"), Some(&Value::Int(7)));

    let root = resolved.root.as_map().unwrap();
    assert_eq!(resolved.follow(&root["d"]).unwrap().path(), "/d");
    assert_eq!(file.live_handles(), 0);
}

#[test]
fn test_table_references_resolve() {
    nwb_logging::init_test_logging();
    let mut b = MemoryFile::builder("mem://tablerefs.nwb");
    let data = b.dataset("/data", ArrayData::floats([0.5, 1.5])).unwrap();

    let electrodes = b.group("/electrodes").unwrap();
    typed(&mut b, "/electrodes", "hdmf-common", "DynamicTable");
    b.attr("/electrodes", "colnames", ArrayData::texts(["x"])).unwrap();
    b.dataset("/electrodes/x", ArrayData::floats([1.0, 2.0])).unwrap();
    b.dataset("/electrodes/id", ArrayData::ints([0, 1])).unwrap();

    b.group("/table").unwrap();
    typed(&mut b, "/table", "hdmf-common", "DynamicTable");
    b.attr("/table", "colnames", ArrayData::texts(["a", "region"])).unwrap();
    b.attr("/table", "source", data).unwrap();
    b.dataset("/table/a", ArrayData::ints([1, 2])).unwrap();
    b.attr("/table/a", "description", "first column").unwrap();
    b.attr("/table/a", "unit", "mV").unwrap();
    b.dataset("/table/region", ArrayData::ints([0, 1])).unwrap();
    typed(&mut b, "/table/region", "hdmf-common", "DynamicTableRegion");
    b.attr("/table/region", "table", electrodes).unwrap();
    b.dataset("/table/id", ArrayData::ints([0, 1])).unwrap();
    let resolved = resolve(Arc::new(b.build()), &registry()).unwrap();

    let table = resolved.table("/table").unwrap();
    assert_eq!(table.fields["source"].as_array().unwrap().path(), "/data");
    assert!(!table.has_pending());

    let a = table.column("a").unwrap();
    assert_eq!(a.description.as_deref(), Some("first column"));
    assert_eq!(a.attrs["unit"], Value::Text("mV".into()));
    assert!(!a.attrs.contains_key("description"));

    let Some(Resolution::Object(electrodes_id)) = resolved.get("/electrodes") else {
        panic!("electrodes table was not materialized");
    };
    assert_eq!(table.column("region").unwrap().attrs["table"], Value::Object(*electrodes_id));

    let json = resolved.to_json();
    assert_eq!(json["table"]["columns"]["a"]["attrs"]["unit"], "mV");
    assert_eq!(json["table"]["source"]["array"], "/data");
}

// =============================================================================
// FILE ACCESS
// =============================================================================

#[test]
fn test_file_access_is_scoped() {
    let file = table_file(true, vec![4, 5, 6]);
    let resolved = resolve(file.clone(), &registry()).unwrap();
    assert!(file.open_count() > 0);
    assert_eq!(file.live_handles(), 0);

    let opened = file.open_count();
    let table = resolved.table("/table").unwrap();
    assert_eq!(table.get("a").unwrap().get(0).unwrap().as_scalar(), Some(Scalar::Int(1)));
    assert!(file.open_count() > opened);
    assert_eq!(file.live_handles(), 0);
}

#[test]
fn test_hard_links_resolve_once() {
    let mut b = MemoryFile::builder("mem://links.nwb");
    b.dataset("/data", ArrayData::floats([0.5, 1.5])).unwrap();
    b.group("/acquisition").unwrap();
    b.hard_link("/data", "/acquisition/alias").unwrap();
    let resolved = resolve(Arc::new(b.build()), &ModelRegistry::new()).unwrap();

    assert_eq!(
        resolved.entries.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["/", "/data", "/acquisition"]
    );
    let root = resolved.root.as_map().unwrap();
    let direct = root["data"].as_array().unwrap();
    let linked = root["acquisition"].as_map().unwrap()["alias"].as_array().unwrap();
    assert_eq!(direct, linked);
    assert_eq!(linked.path(), "/data");
    // root waits on acquisition, which waits on the shared dataset
    assert_eq!(resolved.passes[&Phase::Construct], 3);
}

#[test]
fn test_empty_groups_are_pruned() {
    let mut b = MemoryFile::builder("mem://sparse.nwb");
    b.group("/processing/behavior").unwrap();
    b.group("/general").unwrap();
    b.attr("/general", "lab", "Test Lab").unwrap();
    let resolved = resolve(Arc::new(b.build()), &ModelRegistry::new()).unwrap();

    assert_eq!(resolved.get("/processing"), Some(&Resolution::Pruned));
    assert_eq!(resolved.get("/processing/behavior"), Some(&Resolution::Pruned));
    let root = resolved.root.as_map().unwrap();
    assert!(!root.contains_key("processing"));
    assert_eq!(root["general"].as_map().unwrap()["lab"], Value::Text("Test Lab".into()));
}

#[test]
fn test_skipped_top_level_names() {
    let mut b = MemoryFile::builder("mem://spec.nwb");
    b.dataset("/specifications/core", ArrayData::texts(["{}"])).unwrap();
    b.dataset("/data", ArrayData::ints([1])).unwrap();
    let resolved = resolve(Arc::new(b.build()), &ModelRegistry::new()).unwrap();
    assert!(resolved.get("/specifications").is_none());
    assert!(!resolved.root.as_map().unwrap().contains_key("specifications"));
}

#[test]
fn test_object_references_become_values() {
    let mut b = MemoryFile::builder("mem://refs.nwb");
    let target = b.dataset("/data", ArrayData::ints([1, 2])).unwrap();
    b.group("/meta").unwrap();
    b.attr("/meta", "source", target).unwrap();
    let resolved = resolve(Arc::new(b.build()), &ModelRegistry::new()).unwrap();

    let meta = resolved.root.as_map().unwrap()["meta"].as_map().unwrap();
    assert_eq!(meta["source"].as_array().unwrap().path(), "/data");
}

// =============================================================================
// FAILURES
// =============================================================================

#[test]
fn test_constructor_failure_is_fatal() {
    let file = table_file(false, vec![4, 5, 6]);
    match resolve(file, &registry()) {
        Err(ResolveError::Construct { path, class, source }) => {
            assert_eq!(path, "/");
            assert_eq!(class, "core:Root@2.0.0");
            assert!(matches!(source, ValidationError::MissingField { ref field, .. } if field == "count"));
        }
        other => panic!("expected construct failure, got {other:?}"),
    }
}

#[test]
fn test_dangling_reference_is_reported() {
    nwb_logging::init_test_logging();
    let mut b = MemoryFile::builder("mem://dangling.nwb");
    b.group("/meta").unwrap();
    b.attr("/meta", "source", nwb_hdf5::ObjectRef(999)).unwrap();
    let err = resolve(Arc::new(b.build()), &ModelRegistry::new()).unwrap_err();

    let ResolveError::Unresolved { phase, items } = &err else {
        panic!("expected unresolved items, got {err:?}");
    };
    assert_eq!(*phase, Phase::Construct);
    let meta = items.iter().find(|item| item.path == "/meta").unwrap();
    assert_eq!(meta.missing, vec!["<dangling>:999"]);
    assert!(meta
        .errors
        .iter()
        .any(|e| e.contains("'<dangling>:999' is not present in file")));
    let root = items.iter().find(|item| item.path == "/").unwrap();
    assert_eq!(root.missing, vec!["/meta"]);
    assert!(err.to_string().contains("unresolved in construct phase"));
}

#[test]
fn test_pass_budget_exhaustion() {
    let mut b = MemoryFile::builder("mem://deep.nwb");
    b.dataset("/a/b/c", ArrayData::ints([1])).unwrap();
    let registry = ModelRegistry::new();
    let reader = Hdf5Reader::new(Arc::new(b.build()), &registry).with_config(ResolverConfig {
        max_passes: 1,
        ..Default::default()
    });
    match reader.read() {
        Err(ResolveError::Unresolved { phase, items }) => {
            assert_eq!(phase, Phase::Construct);
            let ready = items.iter().find(|item| item.path == "/a/b").unwrap();
            assert!(ready.missing.is_empty());
            assert!(ready.errors.iter().any(|e| e == "pass budget of 1 exhausted"));
        }
        other => panic!("expected budget exhaustion, got {other:?}"),
    }
}

/// Flags `/count` during construction without failing the pass.
struct FlagCount;

impl Rule for FlagCount {
    fn name(&self) -> &'static str {
        "flag_count"
    }

    fn phase(&self) -> Phase {
        Phase::Construct
    }

    fn priority(&self) -> u32 {
        0
    }

    fn check(&self, item: &QueueItem, _ctx: &RuleContext<'_>) -> bool {
        item.path() == "/count"
    }

    fn apply(&self, item: &QueueItem, _ctx: &RuleContext<'_>) -> nwb_hdf5::Result<ReadResult> {
        let mut result = item
            .result()
            .cloned()
            .unwrap_or_else(|| ReadResult::new(item.source(), self.name()));
        result.applied.push(self.name());
        result.errors.push("count is out of range".to_string());
        result.completed = true;
        Ok(result)
    }
}

#[test]
fn test_item_errors_fail_resolution() {
    nwb_logging::init_test_logging();
    let file = table_file(true, vec![4, 5, 6]);
    let registry = registry();
    let reader = Hdf5Reader::new(file, &registry).with_rules(RuleSet::standard().with(Box::new(FlagCount)));
    match reader.read() {
        Err(ResolveError::Incomplete { items }) => {
            assert_eq!(items.len(), 1);
            assert_eq!(items[0].path, "/count");
            assert_eq!(items[0].rules, vec!["scalar", "flag_count"]);
            assert_eq!(items[0].errors, vec!["count is out of range"]);
        }
        other => panic!("expected item errors, got {other:?}"),
    }
}

#[test]
fn test_length_mismatch_is_reported() {
    let file = table_file(true, vec![4, 5]);
    let resolved = resolve(file, &registry()).unwrap();
    let table = resolved.table("/table").unwrap();
    match table.validate_lengths() {
        Err(TableError::LengthMismatch {
            expected, mismatches, ..
        }) => {
            assert_eq!(expected, 3);
            assert_eq!(mismatches, vec![("b".to_string(), 2)]);
        }
        other => panic!("expected length mismatch, got {other:?}"),
    }
}

// =============================================================================
// SCHEMA-BUILT REGISTRY
// =============================================================================

fn units_file() -> Arc<MemoryFile> {
    let mut b = MemoryFile::builder("mem://units.nwb");
    typed(&mut b, "/", "core", "Root");
    b.attr("/", "file_version", "2.0.0").unwrap();
    b.dataset("/count", ArrayData::scalar(Scalar::Int(2))).unwrap();

    b.group("/table").unwrap();
    typed(&mut b, "/table", "hdmf-common", "DynamicTable");
    b.attr("/table", "colnames", ArrayData::texts(["x"])).unwrap();
    b.dataset("/table/x", ArrayData::floats([1.0, 2.0])).unwrap();
    b.dataset("/table/id", ArrayData::ints([0, 1])).unwrap();

    b.group("/units").unwrap();
    typed(&mut b, "/units", "core", "Units");
    b.attr("/units", "colnames", ArrayData::texts(["spike_times"])).unwrap();
    b.attr("/units", "description", "sorted units").unwrap();
    let times = b
        .dataset("/units/spike_times", ArrayData::floats([0.1, 0.2, 0.3, 0.4, 0.5, 0.6]))
        .unwrap();
    typed(&mut b, "/units/spike_times", "hdmf-common", "VectorData");
    b.dataset("/units/spike_times_index", ArrayData::ints([2, 5, 6])).unwrap();
    typed(&mut b, "/units/spike_times_index", "hdmf-common", "VectorIndex");
    b.attr("/units/spike_times_index", "target", times).unwrap();
    b.dataset("/units/id", ArrayData::ints([0, 1, 2])).unwrap();
    typed(&mut b, "/units/id", "hdmf-common", "ElementIdentifiers");
    Arc::new(b.build())
}

#[test]
fn test_schema_registry_resolves_file() {
    nwb_logging::init_test_logging();
    let registry = schema_registry();
    assert_eq!(registry.active_version("core"), Some("2.0.0"));
    assert_eq!(registry.active_version("hdmf-common"), Some("1.8.0"));

    let resolved = resolve(units_file(), &registry).unwrap();
    let root = resolved.root_instance().unwrap();
    assert_eq!(root.class, ClassKey::new("core", "2.0.0", "Root"));
    assert_eq!(root.get("count").and_then(Value::as_int), Some(2));
    assert_eq!(root.get("file_version"), Some(&Value::Text("2.0.0".into())));

    let units = resolved.follow(root.get("units").unwrap()).unwrap();
    assert_eq!(units.path(), "/units");
}

#[test]
fn test_ragged_columns_are_linked() {
    let resolved = resolve(units_file(), &schema_registry()).unwrap();
    let units = resolved.table("/units").unwrap();
    assert_eq!(units.class.name, "Units");
    assert!(units.derived.is_a("DynamicTable"));
    assert_eq!(units.len().unwrap(), 3);

    let data = units.column("spike_times").unwrap();
    let index = units.column("spike_times_index").unwrap();
    assert_eq!(units.column_by_id(data.index.unwrap()).unwrap().name, "spike_times_index");
    assert_eq!(units.column_by_id(index.target.unwrap()).unwrap().name, "spike_times");
    assert_eq!(data.neurodata_type.as_deref(), Some("VectorData"));

    assert_eq!(
        units.cell("spike_times", 1).unwrap(),
        Cell::Array(ArrayData::floats([0.3, 0.4, 0.5]))
    );
    assert_eq!(units.cell("spike_times", 2).unwrap(), Cell::Array(ArrayData::floats([0.6])));
    let row = units.row(0).unwrap();
    assert!(!row.contains_key("spike_times_index"));
    assert_eq!(row["spike_times"], Cell::Array(ArrayData::floats([0.1, 0.2])));
    assert!(units.validate_lengths().is_ok());
    let Some(Resolution::Object(units_id)) = resolved.get("/units") else {
        panic!("units table was not materialized");
    };
    assert_eq!(
        index.attrs["target"],
        Value::Column(ColumnRef {
            table: *units_id,
            column: "spike_times".into()
        })
    );
    assert!(matches!(
        units.cell("spike_times", 3),
        Err(TableError::RowOutOfRange { row: 3, len: 3, .. })
    ));
}

#[test]
fn test_source_is_shared_not_copied() {
    let file = units_file();
    let source: Arc<dyn H5Source> = file.clone();
    let resolved = resolve(source, &schema_registry()).unwrap();
    let units = resolved.table("/units").unwrap();
    assert_eq!(units.get("spike_times").unwrap().locator(), "mem://units.nwb");
    assert_eq!(file.live_handles(), 0);
}
