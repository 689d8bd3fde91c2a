use crate::error::{ErrorKind, ToolError};
use serde_json::{json, Value};

/// Outcome of one tool invocation, independent of transport.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolResult {
    Success(Value),
    Error {
        kind: ErrorKind,
        message: String,
        detail: Option<Value>,
    },
}

impl ToolResult {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Success(_) => None,
            Self::Error { kind, .. } => Some(*kind),
        }
    }

    /// JSON body carried as the result text.
    pub fn body(&self) -> Value {
        match self {
            Self::Success(value) => value.clone(),
            Self::Error {
                kind,
                message,
                detail,
            } => {
                let mut error = json!({ "kind": kind.as_str(), "message": message });
                if let Some(detail) = detail {
                    error["detail"] = detail.clone();
                }
                json!({ "error": error })
            }
        }
    }

    /// `tools/call` result payload: one text content block plus `isError`.
    pub fn to_payload(&self) -> Value {
        let body = self.body();
        let text = serde_json::to_string_pretty(&body).unwrap_or_else(|_| body.to_string());
        json!({
            "content": [{ "type": "text", "text": text }],
            "isError": self.is_error(),
        })
    }
}

impl From<Result<Value, ToolError>> for ToolResult {
    fn from(result: Result<Value, ToolError>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(err) => Self::Error {
                kind: err.kind(),
                message: err.to_string(),
                detail: err.detail(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_payload_carries_kind_and_detail() {
        let result = ToolResult::from(Err(ToolError::invalid("records", "too many")));
        let payload = result.to_payload();
        assert_eq!(payload["isError"], json!(true));

        let text = payload["content"][0]["text"].as_str().unwrap();
        let body: Value = serde_json::from_str(text).unwrap();
        assert_eq!(body["error"]["kind"], json!("InvalidArgs"));
        assert_eq!(body["error"]["detail"]["field"], json!("records"));
    }

    #[test]
    fn success_payload_is_pretty_json() {
        let payload = ToolResult::Success(json!({"a": 1})).to_payload();
        assert_eq!(payload["isError"], json!(false));
        assert_eq!(payload["content"][0]["type"], json!("text"));
        assert_eq!(payload["content"][0]["text"], json!("{\n  \"a\": 1\n}"));
    }
}
