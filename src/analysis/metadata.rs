//! Base metadata table: one descriptive row per table of a base.

use crate::batch::{BatchExecutor, BatchItem, BatchOutcome, MAX_BATCH_SIZE};
use crate::error::ToolError;
use crate::gateway::Deadline;
use crate::tools::ToolContext;
use crate::types::{Fields, FieldSchema, NewTable, TableSchema};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{info, warn};

pub const DEFAULT_TABLE_NAME: &str = "Table Metadata";

const PURPOSES: &[&str] = &[
    "Project/Task Management",
    "Contact/People Management",
    "Product/Inventory Tracking",
    "Event/Schedule Management",
    "Contact Information",
    "Financial/Budget Tracking",
    "General Data Storage",
];

/// Guess what a table is for from its name, then its field names.
pub fn infer_purpose(table_name: &str, fields: &[FieldSchema]) -> &'static str {
    let name = table_name.to_lowercase();
    let name_has = |words: &[&str]| words.iter().any(|w| name.contains(w));
    let field_names: Vec<String> = fields.iter().map(|f| f.name.to_lowercase()).collect();
    let field_is = |words: &[&str]| field_names.iter().any(|f| words.contains(&f.as_str()));

    if name_has(&["project", "task", "todo"]) {
        PURPOSES[0]
    } else if name_has(&["contact", "people", "user", "client"]) {
        PURPOSES[1]
    } else if name_has(&["product", "inventory", "item"]) {
        PURPOSES[2]
    } else if name_has(&["event", "calendar", "schedule"]) {
        PURPOSES[3]
    } else if field_is(&["email", "phone", "address"]) {
        PURPOSES[4]
    } else if field_is(&["price", "cost", "amount", "budget"]) {
        PURPOSES[5]
    } else {
        PURPOSES[6]
    }
}

/// Metadata row describing `table`.
pub fn metadata_row(table: &TableSchema, analyzed_at: &str) -> Fields {
    let mut types: BTreeMap<&str, usize> = BTreeMap::new();
    for field in &table.fields {
        *types.entry(field.field_type.as_str()).or_default() += 1;
    }
    let field_types = types
        .iter()
        .map(|(ty, n)| format!("{ty}: {n}"))
        .collect::<Vec<_>>()
        .join(", ");
    let primary_fields = table
        .fields
        .iter()
        .take(3)
        .map(|f| f.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let description = table
        .description
        .as_deref()
        .filter(|d| !d.trim().is_empty())
        .unwrap_or("No description");

    let row = json!({
        "Table Name": table.name,
        "Table ID": table.id,
        "Description": description,
        "Field Count": table.fields.len(),
        "View Count": table.views.len(),
        "Field Types": field_types,
        "Primary Fields": primary_fields,
        "Purpose": infer_purpose(&table.name, &table.fields),
        "Analysis Date": analyzed_at,
    });
    match row {
        Value::Object(map) => map,
        _ => Fields::new(),
    }
}

fn metadata_table_definition(table_name: &str) -> NewTable {
    let choices: Vec<Value> = PURPOSES.iter().map(|p| json!({ "name": p })).collect();
    NewTable {
        name: table_name.to_string(),
        description: "Automatically generated metadata analysis of all tables in this base".into(),
        fields: vec![
            json!({"name": "Table Name", "type": "singleLineText"}),
            json!({"name": "Table ID", "type": "singleLineText"}),
            json!({"name": "Description", "type": "multilineText"}),
            json!({"name": "Field Count", "type": "number", "options": {"precision": 0}}),
            json!({"name": "View Count", "type": "number", "options": {"precision": 0}}),
            json!({"name": "Field Types", "type": "multilineText"}),
            json!({"name": "Primary Fields", "type": "multilineText"}),
            json!({"name": "Purpose", "type": "singleSelect", "options": {"choices": choices}}),
            json!({"name": "Analysis Date", "type": "singleLineText"}),
        ],
    }
}

fn is_metadata_table(table: &TableSchema, table_name: &str) -> bool {
    let name = table.name.to_lowercase();
    name == table_name.to_lowercase() || name.contains("metadata")
}

#[derive(Debug, Deserialize)]
pub struct MetadataArgs {
    pub base_id: String,
    pub table_name: String,
}

pub async fn create_metadata_table(
    ctx: &ToolContext,
    args: MetadataArgs,
    deadline: Deadline,
) -> Result<Value, ToolError> {
    let tables = ctx.pool.list_tables(&args.base_id, deadline).await?;
    let analyzed_at = Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();

    let existing = tables.iter().find(|t| is_metadata_table(t, &args.table_name));
    let described: Vec<&TableSchema> = tables
        .iter()
        .filter(|t| !is_metadata_table(t, &args.table_name))
        .collect();
    let rows: Vec<Fields> = described.iter().map(|t| metadata_row(t, &analyzed_at)).collect();

    let mut categories: BTreeMap<&str, usize> = BTreeMap::new();
    for table in &described {
        *categories.entry(infer_purpose(&table.name, &table.fields)).or_default() += 1;
    }

    let (target, created) = match existing {
        Some(table) => {
            info!("Reusing metadata table {} ({})", table.name, table.id);
            (table.clone(), false)
        }
        None => {
            info!("Creating metadata table '{}' in {}", args.table_name, args.base_id);
            let table = ctx
                .pool
                .create_table(&args.base_id, &metadata_table_definition(&args.table_name), deadline)
                .await
                .inspect_err(|e| warn!("Metadata table creation failed: {}", e))?;
            (table, true)
        }
    };

    let executor = BatchExecutor::new(ctx.pool.clone());
    let mut outcome = BatchOutcome::default();
    for (chunk_no, chunk) in rows.chunks(MAX_BATCH_SIZE).enumerate() {
        let items = chunk
            .iter()
            .map(|fields| BatchItem::Create {
                fields: fields.clone(),
            })
            .collect();
        let part = executor
            .execute(&args.base_id, &target.id, items, deadline)
            .await?;
        let offset = chunk_no * MAX_BATCH_SIZE;
        outcome
            .successes
            .extend(part.successes.into_iter().map(|(i, r)| (i + offset, r)));
        outcome
            .failures
            .extend(part.failures.into_iter().map(|(i, id, e)| (i + offset, id, e)));
    }

    let payload = json!({
        "message": format!(
            "Wrote {} metadata records to '{}'",
            outcome.successes.len(),
            target.name
        ),
        "table_id": target.id,
        "table_name": target.name,
        "table_created": created,
        "records_created": outcome.successes.len(),
        "metadata_summary": {
            "total_tables_analyzed": described.len(),
            "total_fields": described.iter().map(|t| t.fields.len()).sum::<usize>(),
            "table_types": categories,
        },
    });
    outcome.into_result(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, ty: &str) -> FieldSchema {
        FieldSchema {
            id: format!("fld{name}"),
            name: name.into(),
            field_type: ty.into(),
            description: None,
            options: None,
        }
    }

    #[test]
    fn purpose_from_name_then_fields() {
        assert_eq!(infer_purpose("Sprint Tasks", &[]), "Project/Task Management");
        assert_eq!(infer_purpose("Clients", &[]), "Contact/People Management");
        assert_eq!(
            infer_purpose("Leads", &[field("Email", "email")]),
            "Contact Information"
        );
        assert_eq!(
            infer_purpose("Q3", &[field("Budget", "currency")]),
            "Financial/Budget Tracking"
        );
        assert_eq!(infer_purpose("Misc", &[field("Notes", "multilineText")]), "General Data Storage");
    }

    #[test]
    fn row_summarizes_table() {
        let table = TableSchema {
            id: "tbl1".into(),
            name: "Inventory".into(),
            fields: vec![
                field("Name", "singleLineText"),
                field("Qty", "number"),
                field("Price", "number"),
                field("Notes", "multilineText"),
            ],
            ..TableSchema::default()
        };
        let row = metadata_row(&table, "2024-05-01 10:00:00");
        assert_eq!(row["Field Count"], json!(4));
        assert_eq!(row["Field Types"], json!("multilineText: 1, number: 2, singleLineText: 1"));
        assert_eq!(row["Primary Fields"], json!("Name, Qty, Price"));
        assert_eq!(row["Purpose"], json!("Product/Inventory Tracking"));
        assert_eq!(row["Description"], json!("No description"));
    }

    #[test]
    fn recognizes_metadata_tables() {
        let table = |name: &str| TableSchema {
            name: name.into(),
            ..TableSchema::default()
        };
        assert!(is_metadata_table(&table("table metadata"), "Table Metadata"));
        assert!(is_metadata_table(&table("Base Metadata"), "Catalog"));
        assert!(!is_metadata_table(&table("Projects"), "Table Metadata"));
    }
}
