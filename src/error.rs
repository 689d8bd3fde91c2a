//! Error taxonomy shared by every tool handler.

use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;

/// Machine-readable error kind reported to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    InvalidArgs,
    SecurityError,
    UpstreamError,
    Timeout,
    PartialFailure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "NotFound",
            Self::InvalidArgs => "InvalidArgs",
            Self::SecurityError => "SecurityError",
            Self::UpstreamError => "UpstreamError",
            Self::Timeout => "Timeout",
            Self::PartialFailure => "PartialFailure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a tool invocation.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    /// Unknown tool, or a table that does not exist in the base.
    #[error("{0}")]
    NotFound(String),

    #[error("invalid argument '{field}': {message}")]
    InvalidArgs { field: String, message: String },

    /// Rejected by the formula sanitizer; never forwarded upstream.
    #[error("security check failed: {0}")]
    Security(String),

    #[error("record store error: {message}")]
    Upstream {
        retryable: bool,
        status: Option<u16>,
        message: String,
    },

    #[error("timed out waiting for {0}")]
    Timeout(String),

    /// Batch call where some items succeeded and some failed.
    #[error("{message}")]
    PartialFailure { message: String, detail: Value },

    /// Batch call where every item failed; `kind` is that of the first failure.
    #[error("{message}")]
    ItemsFailed {
        kind: ErrorKind,
        message: String,
        detail: Value,
    },
}

impl ToolError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgs {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidArgs { .. } => ErrorKind::InvalidArgs,
            Self::Security(_) => ErrorKind::SecurityError,
            Self::Upstream { .. } => ErrorKind::UpstreamError,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::PartialFailure { .. } => ErrorKind::PartialFailure,
            Self::ItemsFailed { kind, .. } => *kind,
        }
    }

    /// Whether a read-only call failing with this error may be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Upstream { retryable, .. } => *retryable,
            Self::Timeout(_) => true,
            _ => false,
        }
    }

    /// Structured detail attached to the error result, if any.
    pub fn detail(&self) -> Option<Value> {
        match self {
            Self::InvalidArgs { field, .. } => Some(json!({ "field": field })),
            Self::Upstream {
                retryable, status, ..
            } => Some(json!({ "retryable": retryable, "status": status })),
            Self::PartialFailure { detail, .. } | Self::ItemsFailed { detail, .. } => {
                Some(detail.clone())
            }
            _ => None,
        }
    }

    /// Compact `{kind, message}` form used for per-item failures.
    pub fn to_item_json(&self) -> Value {
        let mut value = json!({
            "kind": self.kind().as_str(),
            "message": self.to_string(),
        });
        if let Self::Upstream { retryable, status, .. } = self {
            value["retryable"] = json!(retryable);
            value["status"] = json!(status);
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_and_detail() {
        let err = ToolError::invalid("records", "at most 10 items");
        assert_eq!(err.kind(), ErrorKind::InvalidArgs);
        assert_eq!(err.detail(), Some(json!({"field": "records"})));
        assert_eq!(
            err.to_string(),
            "invalid argument 'records': at most 10 items"
        );
    }

    #[test]
    fn only_transient_failures_retry() {
        let transient = ToolError::Upstream {
            retryable: true,
            status: Some(503),
            message: "unavailable".into(),
        };
        let permanent = ToolError::Upstream {
            retryable: false,
            status: Some(422),
            message: "bad field".into(),
        };
        assert!(transient.is_retryable());
        assert!(!permanent.is_retryable());
        assert!(!ToolError::Security("x".into()).is_retryable());
    }
}
