pub mod records;
pub mod registry;
pub mod result;
pub mod schema;

pub use registry::{tool_definitions, ToolDefinition, ToolRegistry};
pub use result::ToolResult;

use crate::error::ToolError;
use crate::gateway::{Deadline, StorePool};
use crate::metrics::Metrics;
use crate::{analysis, batch, export, sync};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, info_span, warn, Instrument};
use ulid::Ulid;

/// Slack past the deadline before the dispatcher gives up on a handler.
/// Store calls observe the deadline themselves, so per-item timeouts
/// surface as item failures first.
const DEADLINE_GRACE: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Tool execution engine
// ---------------------------------------------------------------------------

/// Handles shared by every handler. Nothing in here is mutated per call.
#[derive(Clone)]
pub struct ToolContext {
    pub pool: Arc<StorePool>,
}

/// Validates, executes and accounts for tool calls.
#[derive(Clone)]
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    ctx: ToolContext,
    metrics: Arc<Metrics>,
    request_timeout: Duration,
}

impl ToolDispatcher {
    pub fn new(
        registry: Arc<ToolRegistry>,
        pool: Arc<StorePool>,
        metrics: Arc<Metrics>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            ctx: ToolContext { pool },
            metrics,
            request_timeout,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run one tool call to completion. Never panics on bad input; every
    /// failure comes back as an error result.
    pub async fn invoke(&self, name: &str, arguments: Value) -> ToolResult {
        let trace_id = Ulid::new().to_string();
        let span = info_span!("tool", %trace_id, tool = name);

        let result = self.invoke_inner(name, arguments).instrument(span.clone()).await;

        span.in_scope(|| match &result {
            Ok(_) => info!("Tool call succeeded"),
            Err(e) => warn!(kind = %e.kind(), "Tool call failed: {}", e),
        });
        self.metrics.record_call(result.as_ref().err().map(ToolError::kind));
        ToolResult::from(result)
    }

    async fn invoke_inner(&self, name: &str, arguments: Value) -> Result<Value, ToolError> {
        let def = self
            .registry
            .get(name)
            .ok_or_else(|| ToolError::NotFound(format!("unknown tool: {name}")))?;
        let args = Value::Object(def.schema.validate(&arguments)?);

        let deadline = Deadline::after(self.request_timeout);
        let guard = deadline.instant() + DEADLINE_GRACE;
        match tokio::time::timeout_at(guard, self.execute(def.name, args, deadline)).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout(format!("tool '{name}'"))),
        }
    }

    async fn execute(&self, name: &str, args: Value, deadline: Deadline) -> Result<Value, ToolError> {
        let ctx = &self.ctx;
        match name {
            "list_tables" => records::list_tables(ctx, parse_args(args)?, deadline).await,
            "get_records" => records::get_records(ctx, parse_args(args)?, deadline).await,
            "get_field_info" => analysis::get_field_info(ctx, parse_args(args)?, deadline).await,
            "create_record" => records::create_record(ctx, parse_args(args)?, deadline).await,
            "update_record" => records::update_record(ctx, parse_args(args)?, deadline).await,
            "delete_record" => records::delete_record(ctx, parse_args(args)?, deadline).await,
            "batch_create_records" => batch::batch_create(ctx, parse_args(args)?, deadline).await,
            "batch_update_records" => batch::batch_update(ctx, parse_args(args)?, deadline).await,
            "search_records" => records::search_records(ctx, parse_args(args)?, deadline).await,
            "analyze_table_data" => {
                analysis::analyze_table_data(ctx, parse_args(args)?, deadline).await
            }
            "find_duplicates" => {
                analysis::duplicates::find_duplicates(ctx, parse_args(args)?, deadline).await
            }
            "export_table_csv" => export::export_table_csv(ctx, parse_args(args)?, deadline).await,
            "sync_tables" => sync::sync_tables(ctx, parse_args(args)?, deadline).await,
            "create_metadata_table" => {
                analysis::metadata::create_metadata_table(ctx, parse_args(args)?, deadline).await
            }
            _ => Err(ToolError::NotFound(format!("no handler for tool: {name}"))),
        }
    }
}

/// Deserialize validated arguments into a handler's argument struct.
fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| ToolError::invalid("arguments", e.to_string()))
}
