//! Data quality analysis: field introspection, sampled statistics,
//! duplicate grouping and the base metadata table.

pub mod duplicates;
pub mod metadata;

use crate::error::ToolError;
use crate::gateway::Deadline;
use crate::tools::ToolContext;
use crate::types::{is_empty_value, value_to_text, FieldInfo, FieldSchema, Record, RecordQuery, TableSchema};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use tracing::info;

/// Distinct values kept per field before the rest collapse into "other".
pub const MAX_DISTINCT_VALUES: usize = 20;

/// Display length of a distribution bucket label.
const MAX_LABEL_CHARS: usize = 80;

const TEXT_TYPES: &[&str] = &["singleLineText", "multilineText", "richText", "email", "url"];
const NUMBER_TYPES: &[&str] = &["number", "currency", "percent", "rating", "duration"];

// ---------------------------------------------------------------------------
// Field info
// ---------------------------------------------------------------------------

/// Describe one field. Formula text and linked-table ids are copied verbatim.
pub fn describe_field(field: &FieldSchema, primary_field_id: Option<&str>) -> FieldInfo {
    let options = field.options.clone().unwrap_or_else(|| json!({}));

    let choices = match field.field_type.as_str() {
        "singleSelect" | "multipleSelect" => Some(
            options
                .get("choices")
                .and_then(Value::as_array)
                .map(|choices| {
                    choices
                        .iter()
                        .filter_map(|c| c.get("name").and_then(Value::as_str))
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        ),
        _ => None,
    };

    let formula = match field.field_type.as_str() {
        "formula" => Some(field.option_str("formula").unwrap_or_default().to_string()),
        _ => None,
    };

    let (linked_table, lookup_field) = match field.field_type.as_str() {
        "multipleRecordLinks" => (field.option_str("linkedTableId").map(str::to_string), None),
        "lookup" | "rollup" => (
            field.option_str("relationshipTableId").map(str::to_string),
            field.option_str("fieldIdInLinkedTable").map(str::to_string),
        ),
        _ => (None, None),
    };

    FieldInfo {
        name: field.name.clone(),
        id: field.id.clone(),
        field_type: field.field_type.clone(),
        description: field.description.clone().unwrap_or_default(),
        is_primary: primary_field_id.is_some_and(|p| p == field.id),
        options,
        choices,
        formula,
        linked_table,
        lookup_field,
    }
}

#[derive(Debug, Deserialize)]
pub struct FieldInfoArgs {
    pub base_id: String,
    pub table_id: String,
}

pub async fn get_field_info(
    ctx: &ToolContext,
    args: FieldInfoArgs,
    deadline: Deadline,
) -> Result<Value, ToolError> {
    let table = ctx
        .pool
        .find_table(&args.base_id, &args.table_id, deadline)
        .await?;

    let primary = table.primary_field_id.as_deref();
    let fields: Vec<FieldInfo> = table.fields.iter().map(|f| describe_field(f, primary)).collect();

    let mut field_types: BTreeMap<&str, usize> = BTreeMap::new();
    for field in &fields {
        *field_types.entry(field.field_type.as_str()).or_default() += 1;
    }

    Ok(json!({
        "table_name": table.name,
        "table_id": table.id,
        "total_fields": fields.len(),
        "field_types": field_types,
        "fields": fields,
    }))
}

// ---------------------------------------------------------------------------
// Table analysis
// ---------------------------------------------------------------------------

/// One bucket of a value distribution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueCount {
    pub value: String,
    pub count: usize,
}

/// Statistics of one field over the sampled records.
#[derive(Debug, Clone, Serialize)]
pub struct FieldStats {
    pub field_name: String,
    pub field_type: String,
    pub sampled: usize,
    pub filled_count: usize,
    pub empty_count: usize,
    /// `filled_count / sampled`, in `[0, 1]`.
    pub fill_rate: f64,
    pub distinct_values: usize,
    pub distribution: Vec<ValueCount>,
    /// Occurrences of values beyond the first `MAX_DISTINCT_VALUES`.
    pub other_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_length: Option<Summary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeric: Option<Summary>,
}

/// min / max / mean of a numeric series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Summary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl Summary {
    fn of(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        Some(Self { min, max, mean })
    }
}

fn label(text: String) -> String {
    if text.chars().count() > MAX_LABEL_CHARS {
        let mut cut: String = text.chars().take(MAX_LABEL_CHARS).collect();
        cut.push('…');
        cut
    } else {
        text
    }
}

/// Count occurrences, most frequent first, ties in first-seen order.
fn value_distribution<'a>(values: impl Iterator<Item = &'a Value>) -> (usize, Vec<ValueCount>, usize) {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut buckets: Vec<ValueCount> = Vec::new();
    for value in values {
        let items: Vec<&Value> = match value {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        for item in items {
            let key = value_to_text(item);
            match index.get(&key) {
                Some(&i) => buckets[i].count += 1,
                None => {
                    index.insert(key.clone(), buckets.len());
                    buckets.push(ValueCount { value: key, count: 1 });
                }
            }
        }
    }

    let distinct = buckets.len();
    // Stable sort keeps first-seen order among equal counts.
    buckets.sort_by(|a, b| b.count.cmp(&a.count));
    let other = buckets
        .iter()
        .skip(MAX_DISTINCT_VALUES)
        .map(|b| b.count)
        .sum();
    buckets.truncate(MAX_DISTINCT_VALUES);
    for bucket in &mut buckets {
        bucket.value = label(std::mem::take(&mut bucket.value));
    }
    (distinct, buckets, other)
}

pub fn field_stats(field: &FieldSchema, records: &[Record]) -> FieldStats {
    let sampled = records.len();
    let filled: Vec<&Value> = records
        .iter()
        .filter_map(|r| r.field(&field.name))
        .filter(|v| !is_empty_value(Some(v)))
        .collect();
    let filled_count = filled.len();
    let fill_rate = if sampled == 0 {
        0.0
    } else {
        filled_count as f64 / sampled as f64
    };

    let (distinct_values, distribution, other_count) = value_distribution(filled.iter().copied());

    let text_length = if TEXT_TYPES.contains(&field.field_type.as_str()) {
        let lengths: Vec<f64> = filled
            .iter()
            .map(|v| value_to_text(v).chars().count() as f64)
            .collect();
        Summary::of(&lengths)
    } else {
        None
    };

    let numeric = if NUMBER_TYPES.contains(&field.field_type.as_str()) {
        let numbers: Vec<f64> = filled
            .iter()
            .filter_map(|v| match v {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            })
            .collect();
        Summary::of(&numbers)
    } else {
        None
    };

    FieldStats {
        field_name: field.name.clone(),
        field_type: field.field_type.clone(),
        sampled,
        filled_count,
        empty_count: sampled - filled_count,
        fill_rate,
        distinct_values,
        distribution,
        other_count,
        text_length,
        numeric,
    }
}

fn names_where(stats: &[FieldStats], pred: impl Fn(&FieldStats) -> bool) -> Vec<&str> {
    stats
        .iter()
        .filter(|s| pred(s))
        .map(|s| s.field_name.as_str())
        .collect()
}

/// Human-readable observations over the per-field fill rates.
pub fn quality_insights(stats: &[FieldStats]) -> Vec<String> {
    let mut insights = Vec::new();
    let low = names_where(stats, |s| s.fill_rate < 0.5);
    if !low.is_empty() {
        insights.push(format!("Low data completion: {} have <50% fill rate", low.join(", ")));
    }
    let unused = names_where(stats, |s| s.filled_count == 0);
    if !unused.is_empty() {
        insights.push(format!("Unused fields: {} are completely empty", unused.join(", ")));
    }
    let complete = names_where(stats, |s| s.sampled > 0 && s.filled_count == s.sampled);
    if !complete.is_empty() {
        insights.push(format!("Complete data: {} have 100% fill rate", complete.join(", ")));
    }
    if insights.is_empty() {
        insights.push("Data quality looks good - no major issues detected".to_string());
    }
    insights
}

pub fn analyze_records(table: &TableSchema, records: &[Record]) -> Value {
    let stats: Vec<FieldStats> = table.fields.iter().map(|f| field_stats(f, records)).collect();
    let avg_fill_rate = if stats.is_empty() {
        0.0
    } else {
        stats.iter().map(|s| s.fill_rate).sum::<f64>() / stats.len() as f64
    };

    json!({
        "table_name": table.name,
        "table_id": table.id,
        "analysis_summary": {
            "records_analyzed": records.len(),
            "total_fields": table.fields.len(),
            "avg_fill_rate": avg_fill_rate,
        },
        "field_analysis": stats,
        "data_quality_insights": quality_insights(&stats),
    })
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeArgs {
    pub base_id: String,
    pub table_id: String,
    pub sample_size: usize,
}

pub async fn analyze_table_data(
    ctx: &ToolContext,
    args: AnalyzeArgs,
    deadline: Deadline,
) -> Result<Value, ToolError> {
    let table = ctx
        .pool
        .find_table(&args.base_id, &args.table_id, deadline)
        .await?;
    let records = ctx
        .pool
        .fetch_records(
            &args.base_id,
            &table.id,
            RecordQuery::default(),
            args.sample_size,
            deadline,
        )
        .await?;

    info!(
        "Analyzing {} sampled records of {} ({} fields)",
        records.len(),
        table.name,
        table.fields.len()
    );
    Ok(analyze_records(&table, &records))
}
