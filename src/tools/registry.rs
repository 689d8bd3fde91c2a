//! Tool catalog and name lookup.

use super::schema::{ArgSchema, ArgSpec, ArgType};
use crate::analysis::metadata::DEFAULT_TABLE_NAME;
use crate::batch::MAX_BATCH_SIZE;
use crate::security::formula::{MAX_FORMULA_LENGTH, MAX_QUERY_LENGTH};
use anyhow::{bail, Result};
use serde_json::{json, Value};
use std::collections::HashMap;

/// A registered tool: its name, description and argument schema.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub schema: ArgSchema,
}

impl ToolDefinition {
    /// Summary entry returned by `tools/list`.
    pub fn summary(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.schema.to_json_schema(),
        })
    }
}

/// Name-unique set of tool definitions, in registration order.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDefinition>,
    by_name: HashMap<&'static str, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the full tool catalog.
    pub fn with_catalog() -> Result<Self> {
        let mut registry = Self::new();
        for def in tool_definitions() {
            registry.register(def)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, def: ToolDefinition) -> Result<()> {
        if self.by_name.contains_key(def.name) {
            bail!("tool '{}' is already registered", def.name);
        }
        self.by_name.insert(def.name, self.tools.len());
        self.tools.push(def);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.by_name.get(name).map(|&i| &self.tools[i])
    }

    pub fn list(&self) -> &[ToolDefinition] {
        &self.tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

fn base_id() -> ArgSpec {
    ArgSpec::string("base_id", "Base identifier").length(1, 100).required()
}

fn table_id() -> ArgSpec {
    ArgSpec::string("table_id", "Table identifier or name")
        .length(1, 100)
        .required()
}

fn record_id() -> ArgSpec {
    ArgSpec::string("record_id", "Record identifier")
        .length(1, 100)
        .required()
}

/// Every tool the server exposes.
pub fn tool_definitions() -> Vec<ToolDefinition> {
    let max_batch = MAX_BATCH_SIZE;
    vec![
        ToolDefinition {
            name: "list_tables",
            description: "List all tables in a base with field and view counts.",
            schema: ArgSchema::new(vec![base_id()]),
        },
        ToolDefinition {
            name: "get_records",
            description: "Get records from a table, optionally filtered by a validated formula.",
            schema: ArgSchema::new(vec![
                base_id(),
                table_id(),
                ArgSpec::integer("max_records", "Maximum number of records to return")
                    .range(1, 1000)
                    .default(json!(100)),
                ArgSpec::string("view", "View name or identifier"),
                ArgSpec::string("filter_by_formula", "Filter formula")
                    .length(0, MAX_FORMULA_LENGTH),
            ]),
        },
        ToolDefinition {
            name: "get_field_info",
            description: "Describe every field of a table, including formulas and linked tables.",
            schema: ArgSchema::new(vec![base_id(), table_id()]),
        },
        ToolDefinition {
            name: "create_record",
            description: "Create a single record.",
            schema: ArgSchema::new(vec![
                base_id(),
                table_id(),
                ArgSpec::object("fields", "Field values for the new record").required(),
            ]),
        },
        ToolDefinition {
            name: "update_record",
            description: "Update fields of an existing record.",
            schema: ArgSchema::new(vec![
                base_id(),
                table_id(),
                record_id(),
                ArgSpec::object("fields", "Field values to update").required(),
            ]),
        },
        ToolDefinition {
            name: "delete_record",
            description: "Delete a record.",
            schema: ArgSchema::new(vec![base_id(), table_id(), record_id()]),
        },
        ToolDefinition {
            name: "batch_create_records",
            description: "Create up to 10 records; each item succeeds or fails on its own.",
            schema: ArgSchema::new(vec![
                base_id(),
                table_id(),
                ArgSpec::object_array("records", "Field objects, one per record")
                    .items(1, max_batch)
                    .required(),
            ]),
        },
        ToolDefinition {
            name: "batch_update_records",
            description: "Update up to 10 records; each item succeeds or fails on its own.",
            schema: ArgSchema::new(vec![
                base_id(),
                table_id(),
                ArgSpec::object_array("records", "Items of {id, fields}")
                    .items(1, max_batch)
                    .item_keys(&[("id", ArgType::String), ("fields", ArgType::Object)])
                    .required(),
            ]),
        },
        ToolDefinition {
            name: "search_records",
            description: "Search text across fields; the query is matched literally.",
            schema: ArgSchema::new(vec![
                base_id(),
                table_id(),
                ArgSpec::string("query", "Text to search for")
                    .length(1, MAX_QUERY_LENGTH)
                    .required(),
                ArgSpec::string_array("fields", "Fields to search (defaults to text fields)")
                    .items(0, 20),
                ArgSpec::integer("max_records", "Maximum number of records to return")
                    .range(1, 1000)
                    .default(json!(50)),
            ]),
        },
        ToolDefinition {
            name: "analyze_table_data",
            description: "Sample records and report fill rates, value distributions and data quality insights.",
            schema: ArgSchema::new(vec![
                base_id(),
                table_id(),
                ArgSpec::integer("sample_size", "Number of records to sample")
                    .range(1, 1000)
                    .default(json!(100)),
            ]),
        },
        ToolDefinition {
            name: "find_duplicates",
            description: "Group records whose normalized values match on the given fields.",
            schema: ArgSchema::new(vec![
                base_id(),
                table_id(),
                ArgSpec::string_array("fields", "Fields compared for duplicates")
                    .items(1, 20)
                    .required(),
                ArgSpec::boolean("ignore_empty", "Skip records with an empty compared field")
                    .default(json!(true)),
            ]),
        },
        ToolDefinition {
            name: "export_table_csv",
            description: "Export table records as CSV with a short preview.",
            schema: ArgSchema::new(vec![
                base_id(),
                table_id(),
                ArgSpec::string_array("fields", "Columns to export (defaults to all)").items(0, 100),
                ArgSpec::string("view", "View name or identifier"),
                ArgSpec::integer("max_records", "Maximum number of records to export")
                    .range(1, 10_000)
                    .default(json!(1000)),
            ]),
        },
        ToolDefinition {
            name: "sync_tables",
            description: "Compare two tables by a key field and report the changes needed; never writes.",
            schema: ArgSchema::new(vec![
                ArgSpec::string("source_base_id", "Source base").length(1, 100).required(),
                ArgSpec::string("source_table_id", "Source table").length(1, 100).required(),
                ArgSpec::string("target_base_id", "Target base").length(1, 100).required(),
                ArgSpec::string("target_table_id", "Target table").length(1, 100).required(),
                ArgSpec::string("key_field", "Field matching records across tables")
                    .length(1, 100)
                    .required(),
                ArgSpec::boolean("dry_run", "Only report the plan").default(json!(true)),
            ]),
        },
        ToolDefinition {
            name: "create_metadata_table",
            description: "Write one descriptive row per table into a metadata table, creating it if needed.",
            schema: ArgSchema::new(vec![
                base_id(),
                ArgSpec::string("table_name", "Metadata table name")
                    .length(1, 100)
                    .default(json!(DEFAULT_TABLE_NAME)),
            ]),
        },
    ]
}
