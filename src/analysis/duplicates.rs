//! Duplicate detection over a field subset.

use crate::error::ToolError;
use crate::gateway::Deadline;
use crate::tools::ToolContext;
use crate::types::{is_empty_value, Record, RecordQuery};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use tracing::info;

/// Records scanned per call.
pub const MAX_SCANNED_RECORDS: usize = 1000;

/// Records sharing one signature.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateGroup {
    /// Normalized values of the compared fields, keyed by field name.
    pub signature: Map<String, Value>,
    pub record_ids: Vec<String>,
}

/// Comparison form of a value. Only strings are case- and
/// whitespace-folded (also inside arrays); `1` and `"1"` stay distinct.
/// Every empty value becomes `null`.
fn normalize(value: Option<&Value>) -> Value {
    if is_empty_value(value) {
        return Value::Null;
    }
    match value {
        Some(v) => normalize_value(v),
        None => Value::Null,
    }
}

fn normalize_value(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()),
        Value::Array(items) => Value::Array(items.iter().map(normalize_value).collect()),
        other => other.clone(),
    }
}

/// Group records whose normalized values on `fields` are equal.
///
/// With `ignore_empty`, a record with any empty compared field is left out.
/// Groups of two or more are returned, largest first, ties in first-seen order.
pub fn group_duplicates(records: &[Record], fields: &[String], ignore_empty: bool) -> Vec<DuplicateGroup> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(Vec<Value>, Vec<String>)> = Vec::new();

    for record in records {
        if ignore_empty && fields.iter().any(|f| is_empty_value(record.field(f))) {
            continue;
        }
        let signature: Vec<Value> = fields.iter().map(|f| normalize(record.field(f))).collect();
        // Serialized JSON keeps the type tags of the signature.
        let key = Value::Array(signature.clone()).to_string();
        match index.get(&key) {
            Some(&i) => groups[i].1.push(record.id.clone()),
            None => {
                index.insert(key, groups.len());
                groups.push((signature, vec![record.id.clone()]));
            }
        }
    }

    let mut dupes: Vec<DuplicateGroup> = groups
        .into_iter()
        .filter(|(_, ids)| ids.len() >= 2)
        .map(|(signature, record_ids)| DuplicateGroup {
            signature: fields
                .iter()
                .cloned()
                .zip(signature)
                .collect(),
            record_ids,
        })
        .collect();
    dupes.sort_by(|a, b| b.record_ids.len().cmp(&a.record_ids.len()));
    dupes
}

#[derive(Debug, Deserialize)]
pub struct FindDuplicatesArgs {
    pub base_id: String,
    pub table_id: String,
    pub fields: Vec<String>,
    pub ignore_empty: bool,
}

pub async fn find_duplicates(
    ctx: &ToolContext,
    args: FindDuplicatesArgs,
    deadline: Deadline,
) -> Result<Value, ToolError> {
    let records = ctx
        .pool
        .fetch_records(
            &args.base_id,
            &args.table_id,
            RecordQuery::default(),
            MAX_SCANNED_RECORDS,
            deadline,
        )
        .await?;

    let groups = group_duplicates(&records, &args.fields, args.ignore_empty);
    let by_id: HashMap<&str, &Record> = records.iter().map(|r| (r.id.as_str(), r)).collect();

    let rendered: Vec<Value> = groups
        .iter()
        .map(|g| {
            let members: Vec<Value> = g
                .record_ids
                .iter()
                .filter_map(|id| by_id.get(id.as_str()))
                .map(|r| {
                    let fields: Map<String, Value> = args
                        .fields
                        .iter()
                        .map(|f| (f.clone(), r.field(f).cloned().unwrap_or(Value::Null)))
                        .collect();
                    json!({ "id": r.id, "fields": fields, "created_time": r.created_time })
                })
                .collect();
            json!({
                "signature": g.signature,
                "record_count": g.record_ids.len(),
                "record_ids": g.record_ids,
                "records": members,
            })
        })
        .collect();

    let duplicate_records: usize = groups.iter().map(|g| g.record_ids.len()).sum();
    info!(
        "Duplicate scan of {}/{}: {} groups over {} records",
        args.base_id,
        args.table_id,
        groups.len(),
        records.len()
    );

    Ok(json!({
        "table_id": args.table_id,
        "duplicate_check_fields": args.fields,
        "ignore_empty": args.ignore_empty,
        "total_records_checked": records.len(),
        "duplicate_groups_found": groups.len(),
        "total_duplicate_records": duplicate_records,
        "duplicates": rendered,
    }))
}
