//! Shared types used across the tool engine.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Field name → value mapping of a record.
pub type Fields = Map<String, Value>;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One row of a table, as returned by the record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Store-assigned identifier, immutable once created.
    pub id: String,
    #[serde(default)]
    pub fields: Fields,
    #[serde(rename = "createdTime", default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<String>,
}

impl Record {
    /// Value of a field, or `None` when the store omitted it.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

/// A page of records plus the cursor for the next page, if any.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordPage {
    #[serde(default)]
    pub records: Vec<Record>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<String>,
}

/// Parameters of a record listing call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordQuery {
    pub max_records: Option<usize>,
    pub view: Option<String>,
    pub filter_by_formula: Option<String>,
    pub offset: Option<String>,
}

/// Acknowledgement of a deleted record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletedRecord {
    pub id: String,
    #[serde(default = "default_true")]
    pub deleted: bool,
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// Schema of one table in a base.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableSchema {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "primaryFieldId", default)]
    pub primary_field_id: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
    #[serde(default)]
    pub views: Vec<Value>,
}

impl TableSchema {
    /// Whether `id_or_name` designates this table.
    pub fn matches(&self, id_or_name: &str) -> bool {
        self.id == id_or_name || self.name == id_or_name
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

/// Declared schema of one field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldSchema {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub options: Option<Value>,
}

impl FieldSchema {
    /// A string-valued entry of the field's `options` object.
    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.as_ref()?.get(key)?.as_str()
    }
}

/// Table definition submitted when creating a table.
#[derive(Debug, Clone, Serialize)]
pub struct NewTable {
    pub name: String,
    pub description: String,
    pub fields: Vec<Value>,
}

// ---------------------------------------------------------------------------
// Field introspection
// ---------------------------------------------------------------------------

/// Introspected description of one field, as reported by `get_field_info`.
#[derive(Debug, Clone, Serialize)]
pub struct FieldInfo {
    pub name: String,
    pub id: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub description: String,
    pub is_primary: bool,
    pub options: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
    /// Formula text, verbatim, for computed fields.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    /// Linked table id, verbatim, for relational fields.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lookup_field: Option<String>,
}

// ---------------------------------------------------------------------------
// Transport mode
// ---------------------------------------------------------------------------

/// Framing/concurrency choice for the protocol transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    /// One request in flight at a time.
    #[default]
    Sequential,
    /// Overlapping requests, correlated by id.
    Concurrent,
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequential => write!(f, "sequential"),
            Self::Concurrent => write!(f, "concurrent"),
        }
    }
}

impl TransportMode {
    /// Parse the names accepted from the environment.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sequential" | "stdio" => Some(Self::Sequential),
            "concurrent" | "http" | "multiplexed" => Some(Self::Concurrent),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Value helpers
// ---------------------------------------------------------------------------

/// Whether a field value counts as empty (missing, null, blank text, empty list).
pub fn is_empty_value(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::Object(map)) => map.is_empty(),
        Some(_) => false,
    }
}

/// Plain-text rendering of a value: strings unquoted, everything else as JSON.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
