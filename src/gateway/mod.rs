//! Record store access: the gateway HTTP client, the `RecordStore` seam it
//! implements, and the bounded pool every tool call goes through.

pub mod client;
pub mod pool;

pub use client::GatewayClient;
pub use pool::{Deadline, RetryPolicy, StorePool};

use crate::error::ToolError;
use crate::types::{DeletedRecord, Fields, NewTable, Record, RecordPage, RecordQuery, TableSchema};
use async_trait::async_trait;
use thiserror::Error;

/// Failure reported by a record store call.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Connection-level failure (DNS, refused, reset).
    #[error("gateway request failed: {0}")]
    Transport(String),

    /// The store did not answer within its own client timeout.
    #[error("gateway request timed out: {0}")]
    Timeout(String),

    /// Non-2xx response.
    #[error("gateway returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode gateway response: {0}")]
    Decode(String),
}

impl StoreError {
    /// Transient conditions (network, 5xx, 429) are retryable; 4xx are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            Self::Status {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<StoreError> for ToolError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Timeout(msg) => ToolError::Timeout(format!("record store ({msg})")),
            StoreError::Status { status: 404, body } => ToolError::NotFound(body),
            other =>ToolError::Upstream {
                retryable: other.is_retryable(),
                status: match &other {
                    StoreError::Status { status, .. } => Some(*status),
                    _ => None,
                },
                message: other.to_string(),
            },
        }
    }
}

/// Operations of the remote record store consumed by the tool engine.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Schema of every table in a base.
    async fn list_tables(&self, base_id: &str) -> Result<Vec<TableSchema>, StoreError>;

    /// One page of records.
    async fn get_records(
        &self,
        base_id: &str,
        table_id: &str,
        query: &RecordQuery,
    ) -> Result<RecordPage, StoreError>;

    async fn create_record(
        &self,
        base_id: &str,
        table_id: &str,
        fields: &Fields,
    ) -> Result<Record, StoreError>;

    async fn update_record(
        &self,
        base_id: &str,
        table_id: &str,
        record_id: &str,
        fields: &Fields,
    ) -> Result<Record, StoreError>;

    async fn delete_record(
        &self,
        base_id: &str,
        table_id: &str,
        record_id: &str,
    ) -> Result<DeletedRecord, StoreError>;

    /// Create a table (used to materialize the metadata table).
    async fn create_table(&self, base_id: &str, table: &NewTable)
        -> Result<TableSchema, StoreError>;
}
