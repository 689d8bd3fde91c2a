//! CSV export of a table.

use crate::error::ToolError;
use crate::gateway::Deadline;
use crate::tools::ToolContext;
use crate::types::{Record, RecordQuery};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use tracing::info;

/// Data rows included in the preview, after the header.
pub const PREVIEW_ROWS: usize = 5;

const ID_COLUMN: &str = "Record ID";
const CREATED_COLUMN: &str = "Created Time";

/// Rendered export.
#[derive(Debug, Clone)]
pub struct CsvExport {
    pub fields: Vec<String>,
    pub row_count: usize,
    pub preview: String,
    pub data: String,
}

/// Union of field names across `records`, in first-seen order.
pub fn discover_fields(records: &[Record]) -> Vec<String> {
    let mut seen = HashSet::new();
    records
        .iter()
        .flat_map(|r| r.fields.keys())
        .filter(|name| seen.insert(name.as_str()))
        .cloned()
        .collect()
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(", "),
        Some(other) => other.to_string(),
    }
}

fn write_row(writer: &mut csv::Writer<Vec<u8>>, row: &[String]) -> Result<(), ToolError> {
    writer
        .write_record(row)
        .map_err(|e| ToolError::invalid("fields", format!("cannot encode CSV row: {e}")))
}

/// Serialize `records` with `Record ID` and `Created Time` bookend columns.
pub fn render_csv(records: &[Record], fields: &[String]) -> Result<CsvExport, ToolError> {
    let mut header = Vec::with_capacity(fields.len() + 2);
    header.push(ID_COLUMN.to_string());
    header.extend(fields.iter().cloned());
    header.push(CREATED_COLUMN.to_string());

    let mut full = csv::Writer::from_writer(Vec::new());
    let mut preview = csv::Writer::from_writer(Vec::new());
    write_row(&mut full, &header)?;
    write_row(&mut preview, &header)?;

    for (i, record) in records.iter().enumerate() {
        let mut row = Vec::with_capacity(header.len());
        row.push(record.id.clone());
        row.extend(fields.iter().map(|f| cell(record.field(f))));
        row.push(record.created_time.clone().unwrap_or_default());
        write_row(&mut full, &row)?;
        if i < PREVIEW_ROWS {
            write_row(&mut preview, &row)?;
        }
    }

    let finish = |writer: csv::Writer<Vec<u8>>| -> Result<String, ToolError> {
        let bytes = writer.into_inner().map_err(|e| ToolError::Upstream {
            retryable: false,
            status: None,
            message: format!("CSV buffer flush failed: {e}"),
        })?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    };

    Ok(CsvExport {
        fields: fields.to_vec(),
        row_count: records.len(),
        preview: finish(preview)?,
        data: finish(full)?,
    })
}

#[derive(Debug, Deserialize)]
pub struct ExportArgs {
    pub base_id: String,
    pub table_id: String,
    #[serde(default)]
    pub fields: Vec<String>,
    pub view: Option<String>,
    pub max_records: usize,
}

pub async fn export_table_csv(
    ctx: &ToolContext,
    args: ExportArgs,
    deadline: Deadline,
) -> Result<Value, ToolError> {
    let query = RecordQuery {
        view: args.view.clone(),
        ..RecordQuery::default()
    };
    let records = ctx
        .pool
        .fetch_records(&args.base_id, &args.table_id, query, args.max_records, deadline)
        .await?;

    let fields = if args.fields.is_empty() {
        discover_fields(&records)
    } else {
        args.fields
    };
    let export = render_csv(&records, &fields)?;
    info!(
        "Exported {} records ({} columns) from {}/{}",
        export.row_count,
        export.fields.len() + 2,
        args.base_id,
        args.table_id
    );

    Ok(json!({
        "message": format!("Exported {} records to CSV", export.row_count),
        "table_id": args.table_id,
        "fields_exported": export.fields,
        "record_count": export.row_count,
        "csv_preview": export.preview,
        "full_csv_data": export.data,
    }))
}
