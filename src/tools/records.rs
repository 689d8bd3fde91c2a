//! Record CRUD, table listing and search handlers.

use super::ToolContext;
use crate::error::ToolError;
use crate::gateway::Deadline;
use crate::security::{self, SanitizeError};
use crate::types::{Fields, RecordQuery, TableSchema};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use tracing::{info, warn};

/// Field types searched when the caller names no fields.
const SEARCHABLE_TYPES: &[&str] = &[
    "singleLineText",
    "multilineText",
    "richText",
    "email",
    "url",
    "phoneNumber",
    "singleSelect",
];

#[derive(Debug, Deserialize)]
pub struct ListTablesArgs {
    pub base_id: String,
}

#[derive(Debug, Deserialize)]
pub struct GetRecordsArgs {
    pub base_id: String,
    pub table_id: String,
    pub max_records: usize,
    pub view: Option<String>,
    pub filter_by_formula: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRecordArgs {
    pub base_id: String,
    pub table_id: String,
    pub fields: Fields,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRecordArgs {
    pub base_id: String,
    pub table_id: String,
    pub record_id: String,
    pub fields: Fields,
}

#[derive(Debug, Deserialize)]
pub struct DeleteRecordArgs {
    pub base_id: String,
    pub table_id: String,
    pub record_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchRecordsArgs {
    pub base_id: String,
    pub table_id: String,
    pub query: String,
    #[serde(default)]
    pub fields: Vec<String>,
    pub max_records: usize,
}

fn known_fields(schema: &TableSchema) -> HashSet<&str> {
    schema.field_names().collect()
}

pub async fn list_tables(
    ctx: &ToolContext,
    args: ListTablesArgs,
    deadline: Deadline,
) -> Result<Value, ToolError> {
    let tables = ctx.pool.list_tables(&args.base_id, deadline).await?;
    let summaries: Vec<Value> = tables
        .iter()
        .map(|t| {
            json!({
                "id": t.id,
                "name": t.name,
                "description": t.description.clone().unwrap_or_default(),
                "field_count": t.fields.len(),
                "view_count": t.views.len(),
            })
        })
        .collect();

    Ok(json!({
        "base_id": args.base_id,
        "table_count": tables.len(),
        "tables": summaries,
    }))
}

pub async fn get_records(
    ctx: &ToolContext,
    args: GetRecordsArgs,
    deadline: Deadline,
) -> Result<Value, ToolError> {
    let filter_by_formula = match args.filter_by_formula.as_deref().filter(|f| !f.trim().is_empty()) {
        Some(raw) => {
            // Structural checks first: a bad formula never costs a call.
            let parsed = security::prevalidate(raw).inspect_err(|e| {
                warn!("Formula rejected for {}/{}: {}", args.base_id, args.table_id, e);
            })?;
            let formula = if parsed.referenced_fields().is_empty() {
                parsed.bind(&HashSet::new())?
            } else {
                let schema = ctx
                    .pool
                    .find_table(&args.base_id, &args.table_id, deadline)
                    .await?;
                parsed.bind(&known_fields(&schema)).inspect_err(|e| {
                    warn!("Formula rejected for {}/{}: {}", args.base_id, args.table_id, e);
                })?
            };
            Some(formula)
        }
        None => None,
    };

    let query = RecordQuery {
        max_records: Some(args.max_records),
        view: args.view,
        filter_by_formula,
        offset: None,
    };
    let page = ctx
        .pool
        .get_records(&args.base_id, &args.table_id, &query, deadline)
        .await?;

    Ok(json!({
        "records": page.records,
        "offset": page.offset,
    }))
}

pub async fn create_record(
    ctx: &ToolContext,
    args: CreateRecordArgs,
    deadline: Deadline,
) -> Result<Value, ToolError> {
    let record = ctx
        .pool
        .create_record(&args.base_id, &args.table_id, &args.fields, deadline)
        .await?;
    info!("Created record {} in {}/{}", record.id, args.base_id, args.table_id);
    Ok(json!(record))
}

pub async fn update_record(
    ctx: &ToolContext,
    args: UpdateRecordArgs,
    deadline: Deadline,
) -> Result<Value, ToolError> {
    let record = ctx
        .pool
        .update_record(
            &args.base_id,
            &args.table_id,
            &args.record_id,
            &args.fields,
            deadline,
        )
        .await?;
    Ok(json!(record))
}

pub async fn delete_record(
    ctx: &ToolContext,
    args: DeleteRecordArgs,
    deadline: Deadline,
) -> Result<Value, ToolError> {
    let ack = ctx
        .pool
        .delete_record(&args.base_id, &args.table_id, &args.record_id, deadline)
        .await?;
    info!("Deleted record {} from {}/{}", ack.id, args.base_id, args.table_id);
    Ok(json!(ack))
}

pub async fn search_records(
    ctx: &ToolContext,
    args: SearchRecordsArgs,
    deadline: Deadline,
) -> Result<Value, ToolError> {
    let query = security::screen_search_query(&args.query).inspect_err(|e| {
        warn!("Search query rejected for {}/{}: {}", args.base_id, args.table_id, e);
    })?;
    for name in &args.fields {
        security::formula::field_ref(name)?;
    }

    let schema = ctx
        .pool
        .find_table(&args.base_id, &args.table_id, deadline)
        .await?;

    let fields: Vec<&str> = if args.fields.is_empty() {
        let text_fields: Vec<&str> = schema
            .fields
            .iter()
            .filter(|f| SEARCHABLE_TYPES.contains(&f.field_type.as_str()))
            .map(|f| f.name.as_str())
            .collect();
        if text_fields.is_empty() {
            schema.field_names().collect()
        } else {
            text_fields
        }
    } else {
        let known = known_fields(&schema);
        if let Some(unknown) = args.fields.iter().find(|f| !known.contains(f.as_str())) {
            return Err(SanitizeError::UnknownField(unknown.clone()).into());
        }
        args.fields.iter().map(String::as_str).collect()
    };

    let formula = security::build_search_formula(&query, &fields)?;
    let page = ctx
        .pool
        .get_records(
            &args.base_id,
            &args.table_id,
            &RecordQuery {
                max_records: Some(args.max_records),
                filter_by_formula: Some(formula.clone()),
                ..RecordQuery::default()
            },
            deadline,
        )
        .await?;

    Ok(json!({
        "query": query,
        "fields_searched": fields,
        "filter_by_formula": formula,
        "record_count": page.records.len(),
        "records": page.records,
    }))
}
