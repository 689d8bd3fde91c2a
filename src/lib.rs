//! airtable-mcp: tool-invocation engine for an Airtable record gateway.
//!
//! Exposes record CRUD, batch mutation, schema introspection, data-quality
//! analysis and table synchronization as MCP tools. Arguments are validated
//! against each tool's schema, user-supplied formulas pass an allow-list
//! sanitizer, and every gateway call runs through a bounded pool.

pub mod analysis;
pub mod batch;
pub mod config;
pub mod error;
pub mod export;
pub mod gateway;
pub mod metrics;
pub mod security;
pub mod sync;
pub mod tools;
pub mod transport;
pub mod types;
