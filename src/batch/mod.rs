//! Multi-item create/update with per-item isolation.
//!
//! Items are submitted concurrently, one task each. A failing item is
//! recorded at its own index and never affects its siblings; there is no
//! rollback. Results are assembled by the calling task alone, so every
//! index lands in exactly one of `successes` or `failures`.

use crate::error::{ErrorKind, ToolError};
use crate::gateway::{Deadline, StorePool};
use crate::tools::ToolContext;
use crate::types::{Fields, Record};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info};

/// Upper bound on items per batch call.
pub const MAX_BATCH_SIZE: usize = 10;

/// One item of a batch.
#[derive(Debug, Clone)]
pub enum BatchItem {
    Create { fields: Fields },
    Update { record_id: String, fields: Fields },
}

impl BatchItem {
    fn record_id(&self) -> Option<&str> {
        match self {
            Self::Create { .. } => None,
            Self::Update { record_id, .. } => Some(record_id),
        }
    }
}

/// Per-index results of a batch.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub successes: Vec<(usize, Record)>,
    pub failures: Vec<(usize, Option<String>, ToolError)>,
}

impl BatchOutcome {
    pub fn total(&self) -> usize {
        self.successes.len() + self.failures.len()
    }

    pub fn to_json(&self) -> Value {
        let successes: Vec<Value> = self
            .successes
            .iter()
            .map(|(index, record)| json!({ "index": index, "record": record }))
            .collect();
        let failures: Vec<Value> = self
            .failures
            .iter()
            .map(|(index, record_id, err)| {
                let mut entry = json!({ "index": index, "error": err.to_item_json() });
                if let Some(id) = record_id {
                    entry["record_id"] = json!(id);
                }
                entry
            })
            .collect();
        json!({
            "total": self.total(),
            "succeeded": self.successes.len(),
            "failed": self.failures.len(),
            "successes": successes,
            "failures": failures,
        })
    }

    /// Map the outcome to a tool result: success, partial failure, or a
    /// failure carrying the kind of the first failing item.
    pub fn into_result(self, mut payload: Value) -> Result<Value, ToolError> {
        let body = self.to_json();
        if let (Some(dst), Some(src)) = (payload.as_object_mut(), body.as_object()) {
            dst.extend(src.clone());
        }

        match (self.successes.is_empty(), self.failures.first()) {
            (_, None) => Ok(payload),
            (false, Some(_)) => Err(ToolError::PartialFailure {
                message: format!(
                    "{} of {} items failed",
                    self.failures.len(),
                    self.total()
                ),
                detail: payload,
            }),
            (true, Some((_, _, first))) => Err(ToolError::ItemsFailed {
                kind: first.kind(),
                message: format!("all {} items failed: {}", self.total(), first),
                detail: payload,
            }),
        }
    }
}

/// Drives batch items against the store pool.
#[derive(Clone)]
pub struct BatchExecutor {
    pool: Arc<StorePool>,
}

impl BatchExecutor {
    pub fn new(pool: Arc<StorePool>) -> Self {
        Self { pool }
    }

    pub async fn execute(
        &self,
        base_id: &str,
        table_id: &str,
        items: Vec<BatchItem>,
        deadline: Deadline,
    ) -> Result<BatchOutcome, ToolError> {
        if items.is_empty() {
            return Err(ToolError::invalid("records", "must contain at least 1 item"));
        }
        if items.len() > MAX_BATCH_SIZE {
            return Err(ToolError::invalid(
                "records",
                format!("must contain at most {MAX_BATCH_SIZE} items, got {}", items.len()),
            ));
        }

        let count = items.len();
        let record_ids: Vec<Option<String>> =
            items.iter().map(|i| i.record_id().map(str::to_string)).collect();

        let mut tasks = JoinSet::new();
        for (index, item) in items.into_iter().enumerate() {
            let pool = self.pool.clone();
            let base_id = base_id.to_string();
            let table_id = table_id.to_string();
            tasks.spawn(async move {
                let result = match &item {
                    BatchItem::Create { fields } => {
                        pool.create_record(&base_id, &table_id, fields, deadline).await
                    }
                    BatchItem::Update { record_id, fields } => {
                        pool.update_record(&base_id, &table_id, record_id, fields, deadline)
                            .await
                    }
                };
                (index, result)
            });
        }

        let mut slots: Vec<Option<Result<Record, ToolError>>> = (0..count).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => error!("Batch item task failed: {}", e),
            }
        }

        let mut outcome = BatchOutcome::default();
        for (index, (slot, record_id)) in slots.into_iter().zip(record_ids).enumerate() {
            match slot {
                Some(Ok(record)) => outcome.successes.push((index, record)),
                Some(Err(err)) => outcome.failures.push((index, record_id, err)),
                None => outcome.failures.push((
                    index,
                    record_id,
                    ToolError::Upstream {
                        retryable: false,
                        status: None,
                        message: "item task did not complete".into(),
                    },
                )),
            }
        }

        info!(
            "Batch on {}/{}: {} succeeded, {} failed",
            base_id,
            table_id,
            outcome.successes.len(),
            outcome.failures.len()
        );
        Ok(outcome)
    }
}

// ---------------------------------------------------------------------------
// Tool handlers
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct BatchCreateArgs {
    pub base_id: String,
    pub table_id: String,
    pub records: Vec<Fields>,
}

#[derive(Debug, Deserialize)]
pub struct BatchUpdateItem {
    pub id: String,
    pub fields: Fields,
}

#[derive(Debug, Deserialize)]
pub struct BatchUpdateArgs {
    pub base_id: String,
    pub table_id: String,
    pub records: Vec<BatchUpdateItem>,
}

/// Items arrive flat (`{"Name": ..}`) or wrapped (`{"fields": {"Name": ..}}`).
/// The wrapped reading applies only when every item has that shape; in any
/// other batch an item whose single field is named `fields` is sent as is.
fn unwrap_fields(items: Vec<Fields>) -> Vec<Fields> {
    let wrapped = |item: &Fields| item.len() == 1 && matches!(item.get("fields"), Some(Value::Object(_)));
    if !items.iter().all(wrapped) {
        return items;
    }
    items
        .into_iter()
        .map(|mut item| match item.remove("fields") {
            Some(Value::Object(inner)) => inner,
            _ => item,
        })
        .collect()
}

pub async fn batch_create(
    ctx: &ToolContext,
    args: BatchCreateArgs,
    deadline: Deadline,
) -> Result<Value, ToolError> {
    let items = unwrap_fields(args.records)
        .into_iter()
        .map(|fields| BatchItem::Create { fields })
        .collect();
    let outcome = BatchExecutor::new(ctx.pool.clone())
        .execute(&args.base_id, &args.table_id, items, deadline)
        .await?;

    let message = format!(
        "Batch create completed: {} created, {} failed",
        outcome.successes.len(),
        outcome.failures.len()
    );
    outcome.into_result(json!({
        "message": message,
        "base_id": args.base_id,
        "table_id": args.table_id,
    }))
}

pub async fn batch_update(
    ctx: &ToolContext,
    args: BatchUpdateArgs,
    deadline: Deadline,
) -> Result<Value, ToolError> {
    if let Some(idx) = args.records.iter().position(|r| r.id.trim().is_empty()) {
        return Err(ToolError::invalid(format!("records[{idx}].id"), "must not be blank"));
    }
    let items = args
        .records
        .into_iter()
        .map(|r| BatchItem::Update {
            record_id: r.id,
            fields: r.fields,
        })
        .collect();
    let outcome = BatchExecutor::new(ctx.pool.clone())
        .execute(&args.base_id, &args.table_id, items, deadline)
        .await?;

    let message = format!(
        "Batch update completed: {} updated, {} failed",
        outcome.successes.len(),
        outcome.failures.len()
    );
    outcome.into_result(json!({
        "message": message,
        "base_id": args.base_id,
        "table_id": args.table_id,
    }))
}
