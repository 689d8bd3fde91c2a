//! JSON-RPC envelope handling shared by both transports.
//!
//! Messages are newline-delimited JSON objects. Parsing, method routing and
//! response encoding live here so the sequential and concurrent loops emit
//! byte-identical responses for the same request.

pub mod concurrent;
pub mod sequential;

pub use concurrent::serve_concurrent;
pub use sequential::serve_sequential;

use crate::tools::ToolDispatcher;
use serde_json::{json, Value};
use tracing::{debug, warn};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Protocol-level failure, reported as a JSON-RPC error object.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self {
            code: -32700,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            code: -32600,
            message: message.into(),
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: format!("Method not found: {method}"),
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: -32602,
            message: message.into(),
        }
    }
}

pub fn success_response(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result,
    })
}

pub fn error_response(id: Value, error: RpcError) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": error.code,
            "message": error.message,
        },
    })
}

/// One framed line, ready to write.
pub fn encode(message: &Value) -> String {
    let mut line = message.to_string();
    line.push('\n');
    line
}

/// A decoded inbound line.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Request {
        id: Value,
        method: String,
        params: Value,
    },
    Notification {
        method: String,
        params: Value,
    },
    /// Malformed envelope; the error response to send back.
    Invalid(Value),
    /// A client response or blank line; nothing to do.
    Ignored,
}

/// Decode one line of input. Never fails: malformed input becomes an
/// error response for that line only.
pub fn parse_line(line: &str) -> Incoming {
    let line = line.trim();
    if line.is_empty() {
        return Incoming::Ignored;
    }

    let message: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            return Incoming::Invalid(error_response(
                Value::Null,
                RpcError::parse_error(format!("Parse error: {e}")),
            ))
        }
    };

    let Some(obj) = message.as_object() else {
        return Incoming::Invalid(error_response(
            Value::Null,
            RpcError::invalid_request("Request must be a JSON object"),
        ));
    };
    let id = obj.get("id").cloned();

    if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
        return Incoming::Invalid(error_response(
            id.unwrap_or(Value::Null),
            RpcError::invalid_request("jsonrpc must be '2.0'"),
        ));
    }
    if let Some(id) = &id {
        if !(id.is_string() || id.is_number() || id.is_null()) {
            return Incoming::Invalid(error_response(
                Value::Null,
                RpcError::invalid_request("id must be a string or number"),
            ));
        }
    }

    let Some(method) = obj.get("method").and_then(Value::as_str) else {
        // Responses to requests we never send.
        return Incoming::Ignored;
    };
    let params = obj.get("params").cloned().unwrap_or(Value::Null);

    match id {
        Some(id) => Incoming::Request {
            id,
            method: method.to_string(),
            params,
        },
        None => Incoming::Notification {
            method: method.to_string(),
            params,
        },
    }
}

/// Key identifying an in-flight request by its id.
pub fn request_key(id: &Value) -> String {
    id.to_string()
}

/// Protocol front end over the tool dispatcher.
#[derive(Clone)]
pub struct McpServer {
    dispatcher: ToolDispatcher,
    name: String,
    version: String,
}

impl McpServer {
    pub fn new(dispatcher: ToolDispatcher, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            dispatcher,
            name: name.into(),
            version: version.into(),
        }
    }

    /// Full response envelope for one request.
    pub async fn respond(&self, id: Value, method: &str, params: Value) -> Value {
        match self.handle_request(method, params).await {
            Ok(result) => success_response(id, result),
            Err(err) => {
                warn!("Request {} ({}) failed: {}", id, method, err.message);
                error_response(id, err)
            }
        }
    }

    pub async fn handle_request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(self.initialize_payload()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(self.tools_list_payload()),
            "tools/call" => self.handle_tools_call(params).await,
            _ => Err(RpcError::method_not_found(method)),
        }
    }

    pub fn handle_notification(&self, method: &str) {
        debug!("Notification: {}", method);
    }

    fn initialize_payload(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": { "listChanged": false },
            },
            "serverInfo": {
                "name": self.name,
                "version": self.version,
            },
        })
    }

    fn tools_list_payload(&self) -> Value {
        let tools: Vec<Value> = self
            .dispatcher
            .registry()
            .list()
            .iter()
            .map(|def| def.summary())
            .collect();
        json!({ "tools": tools })
    }

    async fn handle_tools_call(&self, params: Value) -> Result<Value, RpcError> {
        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return Err(RpcError::invalid_params("tools/call requires a string 'name'"));
        };
        let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);
        let result = self.dispatcher.invoke(name, arguments).await;
        Ok(result.to_payload())
    }
}
