use super::{Phase, Rule, RuleContext};
use crate::error::{ResolveError, Result};
use crate::result::{Payload, QueueItem, ReadResult};
use crate::table::DynamicTable;
use crate::value::{ColumnRef, Value};
use indexmap::IndexMap;

fn carried(item: &QueueItem, rule: &'static str) -> ReadResult {
    let mut result = match item {
        QueueItem::Result(result) => (**result).clone(),
        QueueItem::Source(source) => ReadResult::new(source, rule),
    };
    if result.applied.last() != Some(&rule) {
        result.applied.push(rule);
    }
    result
}

fn deps_satisfied(item: &QueueItem, ctx: &RuleContext<'_>) -> bool {
    item.depends().all(|path| ctx.is_satisfied(path))
}

/// Swap every placeholder in the payload for the settled value it names.
fn substitute(payload: Option<Payload>, ctx: &RuleContext<'_>) -> Option<Payload> {
    let mut lookup = |path: &str| ctx.lookup(path);
    payload.map(|payload| match payload {
        Payload::Mapping(map) => match Value::Map(map).substitute(&mut lookup) {
            Value::Map(map) => Payload::Mapping(map),
            other => Payload::Value(other),
        },
        Payload::Value(value) => Payload::Value(value.substitute(&mut lookup)),
        other => other,
    })
}

/// Results that are already final.
pub struct Passthrough;

impl Rule for Passthrough {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn phase(&self) -> Phase {
        Phase::Construct
    }

    fn priority(&self) -> u32 {
        1
    }

    fn check(&self, item: &QueueItem, ctx: &RuleContext<'_>) -> bool {
        item.result().is_some_and(|result| match &result.payload {
            Some(Payload::Object(id)) => {
                result.depends.is_empty() && !ctx.arena.table(*id).is_some_and(DynamicTable::has_pending)
            }
            Some(Payload::Model(_) | Payload::Table(_) | Payload::TableUpdate(..)) => true,
            _ => result.model.is_none() && result.depends.is_empty(),
        })
    }

    fn apply(&self, item: &QueueItem, _ctx: &RuleContext<'_>) -> Result<ReadResult> {
        let mut result = carried(item, self.name());
        result.completed = true;
        Ok(result)
    }
}

/// Tables whose fields or column attributes hold references. References
/// to the table's own columns become column values; the rest wait for
/// their targets to settle.
pub struct CompleteTable;

impl Rule for CompleteTable {
    fn name(&self) -> &'static str {
        "complete_table"
    }

    fn phase(&self) -> Phase {
        Phase::Construct
    }

    fn priority(&self) -> u32 {
        2
    }

    fn check(&self, item: &QueueItem, ctx: &RuleContext<'_>) -> bool {
        item.result().is_some_and(|result| match &result.payload {
            Some(Payload::Object(id)) => ctx.arena.table(*id).is_some(),
            _ => false,
        }) && deps_satisfied(item, ctx)
    }

    fn apply(&self, item: &QueueItem, ctx: &RuleContext<'_>) -> Result<ReadResult> {
        let mut result = carried(item, self.name());
        let Some(Payload::Object(id)) = &result.payload else {
            return Ok(result);
        };
        let id = *id;
        let Some(table) = ctx.arena.table(id) else {
            return Ok(result);
        };

        let mut table = table.clone();
        let own: IndexMap<String, String> = table
            .columns()
            .iter()
            .map(|column| (column.path.clone(), column.name.clone()))
            .collect();
        let table_path = result.path.clone();
        let mut lookup = |path: &str| {
            if path == table_path {
                return Some(Value::Object(id));
            }
            match own.get(path) {
                Some(column) => Some(Value::Column(ColumnRef {
                    table: id,
                    column: column.clone(),
                })),
                None => ctx.lookup(path),
            }
        };
        table.substitute(&mut lookup);

        for path in table.pending_paths() {
            result.errors.push(format!("reference to '{path}' did not resolve"));
        }
        result.payload = Some(Payload::TableUpdate(id, Box::new(table)));
        result.depends.clear();
        result.completed = true;
        Ok(result)
    }
}

/// Untyped results whose dependencies have all settled.
pub struct CompleteContainerGroup;

impl Rule for CompleteContainerGroup {
    fn name(&self) -> &'static str {
        "complete_container"
    }

    fn phase(&self) -> Phase {
        Phase::Construct
    }

    fn priority(&self) -> u32 {
        3
    }

    fn check(&self, item: &QueueItem, ctx: &RuleContext<'_>) -> bool {
        item.result().is_some_and(|result| result.model.is_none()) && deps_satisfied(item, ctx)
    }

    fn apply(&self, item: &QueueItem, ctx: &RuleContext<'_>) -> Result<ReadResult> {
        let mut result = carried(item, self.name());
        result.payload = substitute(result.payload.take(), ctx);
        result.depends.clear();
        result.completed = true;
        Ok(result)
    }
}

/// Typed results whose dependencies have all settled: substitute, then
/// construct. A constructor rejection fails the whole resolution.
pub struct CompleteModelGroup;

impl Rule for CompleteModelGroup {
    fn name(&self) -> &'static str {
        "complete_model"
    }

    fn phase(&self) -> Phase {
        Phase::Construct
    }

    fn priority(&self) -> u32 {
        4
    }

    fn check(&self, item: &QueueItem, ctx: &RuleContext<'_>) -> bool {
        item.result().is_some_and(|result| result.model.is_some()) && deps_satisfied(item, ctx)
    }

    fn apply(&self, item: &QueueItem, ctx: &RuleContext<'_>) -> Result<ReadResult> {
        let mut result = carried(item, self.name());
        let Some(model) = result.model.clone() else {
            return Ok(result);
        };
        let fields = match substitute(result.payload.take(), ctx) {
            Some(Payload::Mapping(fields)) => fields,
            Some(other) => {
                result.payload = Some(other);
                result.completed = true;
                return Ok(result);
            }
            None => Default::default(),
        };
        let instance = model
            .construct(&result.path, fields)
            .map_err(|source| ResolveError::Construct {
                path: result.path.clone(),
                class: model.key().to_string(),
                source,
            })?;
        result.payload = Some(Payload::Model(instance));
        result.depends.clear();
        result.completed = true;
        Ok(result)
    }
}
