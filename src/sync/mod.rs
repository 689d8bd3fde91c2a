//! Table synchronization planning.
//!
//! A plan pairs source and target records by the value of a key field and
//! sorts every keyed source record into exactly one of `to_create`,
//! `to_update` or `unchanged`. Plans are only ever reported; nothing here
//! writes to the store.

use crate::error::ToolError;
use crate::gateway::Deadline;
use crate::tools::ToolContext;
use crate::types::{is_empty_value, Fields, Record, RecordQuery};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::info;

/// Records read from each side.
pub const MAX_SYNC_RECORDS: usize = 1000;

/// One differing field of a matched pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDiff {
    pub field: String,
    /// Target value.
    pub before: Value,
    /// Source value.
    pub after: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedUpdate {
    pub key: Value,
    pub target_record_id: String,
    pub changes: Vec<FieldDiff>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncPlan {
    /// Source field maps for keys absent from the target.
    pub to_create: Vec<Fields>,
    pub to_update: Vec<PlannedUpdate>,
    /// `{key_field: value}` per matched key with no differences.
    pub unchanged: Vec<Fields>,
    /// Target records whose key never occurs in the source.
    pub target_only: Vec<Value>,
    /// Source record ids with an empty key value.
    pub skipped_without_key: Vec<String>,
    /// Source record ids whose key repeated an earlier source record.
    pub duplicate_source_keys: Vec<String>,
}

/// Key values match only when equal as JSON, so `1` and `"1"` are distinct.
fn key_of(record: &Record, key_field: &str) -> Option<String> {
    let value = record.field(key_field);
    if is_empty_value(value) {
        return None;
    }
    value.map(Value::to_string)
}

fn same_value(a: Option<&Value>, b: Option<&Value>) -> bool {
    (is_empty_value(a) && is_empty_value(b)) || a == b
}

/// Fields whose source and target values differ, over the union of both
/// field sets minus the key.
fn diff_fields(key_field: &str, source: &Record, target: &Record) -> Vec<FieldDiff> {
    let names: BTreeSet<&str> = source
        .fields
        .keys()
        .chain(target.fields.keys())
        .map(String::as_str)
        .filter(|name| *name != key_field)
        .collect();

    names
        .into_iter()
        .filter(|name| !same_value(source.field(name), target.field(name)))
        .map(|name| FieldDiff {
            field: name.to_string(),
            before: target.field(name).cloned().unwrap_or(Value::Null),
            after: source.field(name).cloned().unwrap_or(Value::Null),
        })
        .collect()
}

/// Build the plan that would align `target` with `source`.
///
/// Records pair up when their key values are equal JSON values; a numeric
/// key never matches its text rendering. Duplicate target keys resolve to
/// the last record fetched; duplicate source keys keep the first and report
/// the rest.
pub fn build_sync_plan(key_field: &str, source: &[Record], target: &[Record]) -> SyncPlan {
    let mut target_index: HashMap<String, &Record> = HashMap::new();
    for record in target {
        if let Some(key) = key_of(record, key_field) {
            target_index.insert(key, record);
        }
    }

    let mut plan = SyncPlan::default();
    let mut seen: HashSet<String> = HashSet::new();

    for record in source {
        let Some(key) = key_of(record, key_field) else {
            plan.skipped_without_key.push(record.id.clone());
            continue;
        };
        if !seen.insert(key.clone()) {
            plan.duplicate_source_keys.push(record.id.clone());
            continue;
        }
        let key_value = record.field(key_field).cloned().unwrap_or(Value::Null);

        match target_index.get(&key) {
            None => plan.to_create.push(record.fields.clone()),
            Some(existing) => {
                let changes = diff_fields(key_field, record, existing);
                if changes.is_empty() {
                    let mut entry = Fields::new();
                    entry.insert(key_field.to_string(), key_value);
                    plan.unchanged.push(entry);
                } else {
                    plan.to_update.push(PlannedUpdate {
                        key: key_value,
                        target_record_id: existing.id.clone(),
                        changes,
                    });
                }
            }
        }
    }

    // Walk the target in fetch order so the listing is deterministic.
    let mut reported: HashSet<&str> = HashSet::new();
    for record in target {
        if let Some(key) = key_of(record, key_field) {
            if seen.contains(&key) || !reported.insert(target_index[&key].id.as_str()) {
                continue;
            }
            let winner = target_index[&key];
            plan.target_only.push(json!({
                "key": winner.field(key_field),
                "id": winner.id,
            }));
        }
    }

    plan
}

#[derive(Debug, Deserialize)]
pub struct SyncArgs {
    pub source_base_id: String,
    pub source_table_id: String,
    pub target_base_id: String,
    pub target_table_id: String,
    pub key_field: String,
    pub dry_run: bool,
}

pub async fn sync_tables(
    ctx: &ToolContext,
    args: SyncArgs,
    deadline: Deadline,
) -> Result<Value, ToolError> {
    let (source, target) = tokio::try_join!(
        ctx.pool.fetch_records(
            &args.source_base_id,
            &args.source_table_id,
            RecordQuery::default(),
            MAX_SYNC_RECORDS,
            deadline,
        ),
        ctx.pool.fetch_records(
            &args.target_base_id,
            &args.target_table_id,
            RecordQuery::default(),
            MAX_SYNC_RECORDS,
            deadline,
        ),
    )?;

    let plan = build_sync_plan(&args.key_field, &source, &target);
    info!(
        "Sync plan on '{}': {} create, {} update, {} unchanged",
        args.key_field,
        plan.to_create.len(),
        plan.to_update.len(),
        plan.unchanged.len()
    );

    let message = if args.dry_run {
        "Dry run completed - no changes made."
    } else {
        "Plan computed - changes are never applied automatically; review and apply them with the record tools."
    };

    Ok(json!({
        "message": message,
        "key_field": args.key_field,
        "dry_run": args.dry_run,
        "sync_summary": {
            "source_records": source.len(),
            "target_records": target.len(),
            "records_to_create": plan.to_create.len(),
            "records_to_update": plan.to_update.len(),
            "records_unchanged": plan.unchanged.len(),
            "target_only": plan.target_only.len(),
        },
        "plan": plan,
    }))
}
