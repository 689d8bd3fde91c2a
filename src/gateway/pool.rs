//! Bounded access to the record store.
//!
//! Every outbound call acquires a permit from a fixed-size semaphore, runs
//! under the invocation's deadline and releases the permit when the call
//! future is dropped, whichever way it ends. Reads are retried on transient
//! failures with exponential backoff; writes are attempted exactly once.

use super::{RecordStore, StoreError};
use crate::error::ToolError;
use crate::metrics::Metrics;
use crate::types::{DeletedRecord, Fields, NewTable, Record, RecordPage, RecordQuery, TableSchema};
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

/// Absolute point in time by which an invocation must finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline(Instant);

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        Self(Instant::now() + timeout)
    }

    pub fn instant(self) -> Instant {
        self.0
    }

    pub fn remaining(self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }
}

/// Backoff schedule for read retries.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based), with up to 25% jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay);
        let jitter_ms = (exp.as_millis() / 4) as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        exp + Duration::from_millis(jitter)
    }
}

/// Shared, bounded handle to the record store.
pub struct StorePool {
    store: Arc<dyn RecordStore>,
    permits: Semaphore,
    max_connections: usize,
    retry: RetryPolicy,
    metrics: Arc<Metrics>,
}

impl StorePool {
    pub fn new(
        store: Arc<dyn RecordStore>,
        max_connections: usize,
        retry: RetryPolicy,
        metrics: Arc<Metrics>,
    ) -> Self {
        let max_connections = max_connections.max(1);
        Self {
            store,
            permits: Semaphore::new(max_connections),
            max_connections,
            retry,
            metrics,
        }
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Permits not currently held by an in-flight call.
    pub fn available_connections(&self) -> usize {
        self.permits.available_permits()
    }

    /// One bounded call: acquire a permit, run the call, release.
    async fn attempt<T, Fut>(&self, op: &str, deadline: Deadline, call: Fut) -> Result<T, ToolError>
    where
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let _permit = match timeout_at(deadline.instant(), self.permits.acquire()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                return Err(ToolError::Upstream {
                    retryable: false,
                    status: None,
                    message: "connection pool is closed".into(),
                })
            }
            Err(_) => return Err(ToolError::Timeout(format!("a store connection for {op}"))),
        };

        self.metrics.record_upstream_call();
        match timeout_at(deadline.instant(), call).await {
            Ok(result) => result.map_err(ToolError::from),
            Err(_) => Err(ToolError::Timeout(op.to_string())),
        }
    }

    /// Read with bounded retries on transient failures.
    async fn read<T, F, Fut>(&self, op: &str, deadline: Deadline, call: F) -> Result<T, ToolError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 0;
        loop {
            match self.attempt(op, deadline, call()).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.retry.max_retries => {
                    let delay = self.retry.delay(attempt);
                    if delay >= deadline.remaining() {
                        return Err(err);
                    }
                    warn!("{} failed (attempt {}), retrying in {:?}: {}", op, attempt + 1, delay, err);
                    self.metrics.record_retry();
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Single-shot write; never retried.
    async fn write<T, Fut>(&self, op: &str, deadline: Deadline, call: Fut) -> Result<T, ToolError>
    where
        Fut: Future<Output = Result<T, StoreError>>,
    {
        self.attempt(op, deadline, call).await
    }

    // -- Reads ---------------------------------------------------------------

    pub async fn list_tables(
        &self,
        base_id: &str,
        deadline: Deadline,
    ) -> Result<Vec<TableSchema>, ToolError> {
        self.read("list_tables", deadline, || self.store.list_tables(base_id))
            .await
    }

    /// Schema of one table, matched by id or name.
    pub async fn find_table(
        &self,
        base_id: &str,
        table: &str,
        deadline: Deadline,
    ) -> Result<TableSchema, ToolError> {
        self.list_tables(base_id, deadline)
            .await?
            .into_iter()
            .find(|t| t.matches(table))
            .ok_or_else(|| ToolError::NotFound(format!("table '{table}' not found in base '{base_id}'")))
    }

    pub async fn get_records(
        &self,
        base_id: &str,
        table_id: &str,
        query: &RecordQuery,
        deadline: Deadline,
    ) -> Result<RecordPage, ToolError> {
        self.read("get_records", deadline, || {
            self.store.get_records(base_id, table_id, query)
        })
        .await
    }

    /// Follow page cursors until `limit` records are collected or the table ends.
    pub async fn fetch_records(
        &self,
        base_id: &str,
        table_id: &str,
        mut query: RecordQuery,
        limit: usize,
        deadline: Deadline,
    ) -> Result<Vec<Record>, ToolError> {
        let mut records: Vec<Record> = Vec::new();
        query.offset = None;
        loop {
            query.max_records = Some(limit);
            let page = self.get_records(base_id, table_id, &query, deadline).await?;
            let page_len = page.records.len();
            records.extend(page.records);
            debug!("Fetched page of {} records from {}/{}", page_len, base_id, table_id);

            if records.len() >= limit {
                records.truncate(limit);
                break;
            }
            match page.offset {
                Some(next) if page_len > 0 => query.offset = Some(next),
                _ => break,
            }
        }
        Ok(records)
    }

    // -- Writes --------------------------------------------------------------

    pub async fn create_record(
        &self,
        base_id: &str,
        table_id: &str,
        fields: &Fields,
        deadline: Deadline,
    ) -> Result<Record, ToolError> {
        self.write(
            "create_record",
            deadline,
            self.store.create_record(base_id, table_id, fields),
        )
        .await
    }

    pub async fn update_record(
        &self,
        base_id: &str,
        table_id: &str,
        record_id: &str,
        fields: &Fields,
        deadline: Deadline,
    ) -> Result<Record, ToolError> {
        self.write(
            "update_record",
            deadline,
            self.store.update_record(base_id, table_id, record_id, fields),
        )
        .await
    }

    pub async fn delete_record(
        &self,
        base_id: &str,
        table_id: &str,
        record_id: &str,
        deadline: Deadline,
    ) -> Result<DeletedRecord, ToolError> {
        self.write(
            "delete_record",
            deadline,
            self.store.delete_record(base_id, table_id, record_id),
        )
        .await
    }

    pub async fn create_table(
        &self,
        base_id: &str,
        table: &NewTable,
        deadline: Deadline,
    ) -> Result<TableSchema, ToolError> {
        self.write("create_table", deadline, self.store.create_table(base_id, table))
            .await
    }
}
