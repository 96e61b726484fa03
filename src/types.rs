use std::sync::Arc;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::{json, Value};

/// JSON-RPC 2.0 error codes.
pub const ERR_CODE_PARSE: i32 = -32700;
pub const ERR_CODE_INVALID_REQ: i32 = -32600;
pub const ERR_CODE_NO_METHOD: i32 = -32601;
pub const ERR_CODE_BAD_PARAMS: i32 = -32602;
pub const ERR_CODE_INTERNAL: i32 = -32603;

/// Server-defined error codes (reserved -32000..-32099 range).
pub const ERR_CODE_TIMEOUT: i32 = -32001;
pub const ERR_CODE_NOT_INITIALIZED: i32 = -32002;

/// MCP Protocol version this server implements.
pub const PROTOCOL_VERSION: &str = "2025-03-26";

// ── Request ──

/// Inbound JSON-RPC request envelope.
///
/// `jsonrpc` is tolerated when absent. A missing (or `null`) `id` marks a
/// notification.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JsonRpcRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonrpc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// True when no response may be sent for this request.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

// ── Response ──

/// Response produced by [`Server::handle()`](crate::Server::handle).
///
/// Results for `initialize` and `tools/list` are pre-serialized once and
/// shared via `Arc`, so answering them never re-serializes the registry.
///
/// Serializes to exactly one of `result` / `error`. For structured
/// inspection call [`into_json_rpc()`](McpResponse::into_json_rpc).
#[derive(Debug)]
pub struct McpResponse {
    id: Option<Value>,
    kind: ResponseKind,
}

#[derive(Debug)]
enum ResponseKind {
    Cached(Arc<RawValue>),
    Result(Value),
    Error(RpcError),
    /// No response body; the request was a notification.
    Notification,
}

impl McpResponse {
    /// True when the request was a notification (nothing goes on the wire).
    pub fn is_notification(&self) -> bool {
        matches!(self.kind, ResponseKind::Notification)
    }

    /// True when this response carries an error object.
    pub fn is_error(&self) -> bool {
        matches!(self.kind, ResponseKind::Error(_))
    }

    /// The correlation id echoed from the request.
    pub fn id(&self) -> Option<&Value> {
        self.id.as_ref()
    }

    /// Convert to a [`JsonRpcResponse`] for structured inspection.
    pub fn into_json_rpc(self) -> JsonRpcResponse {
        let (result, error) = match self.kind {
            ResponseKind::Cached(raw) => (serde_json::from_str(raw.get()).ok(), None),
            ResponseKind::Result(value) => (Some(value), None),
            ResponseKind::Error(err) => (None, Some(err)),
            ResponseKind::Notification => (None, None),
        };
        JsonRpcResponse {
            jsonrpc: "2.0".into(),
            id: self.id,
            result,
            error,
        }
    }

    pub(crate) fn cached(id: Option<Value>, raw: &Arc<RawValue>) -> Self {
        McpResponse {
            id,
            kind: ResponseKind::Cached(Arc::clone(raw)),
        }
    }

    pub(crate) fn ok(id: Option<Value>, result: Value) -> Self {
        McpResponse {
            id,
            kind: ResponseKind::Result(result),
        }
    }

    pub(crate) fn error(id: Option<Value>, err: RpcError) -> Self {
        McpResponse {
            id,
            kind: ResponseKind::Error(err),
        }
    }

    pub(crate) fn notification() -> Self {
        McpResponse {
            id: None,
            kind: ResponseKind::Notification,
        }
    }
}

impl Serialize for McpResponse {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let has_payload = !matches!(self.kind, ResponseKind::Notification);
        let len = 2 + has_payload as usize;

        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry("jsonrpc", "2.0")?;
        // A salvaged parse failure may have no usable id; JSON-RPC wants `null` then.
        map.serialize_entry("id", &self.id)?;

        match &self.kind {
            ResponseKind::Cached(raw) => map.serialize_entry("result", raw.as_ref())?,
            ResponseKind::Result(value) => map.serialize_entry("result", value)?,
            ResponseKind::Error(err) => map.serialize_entry("error", err)?,
            ResponseKind::Notification => {}
        }

        map.end()
    }
}

/// Structured JSON-RPC 2.0 response, used for inspection and parsing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

// ── MCP domain types ──

/// Tool definition: the advertised half of a registry entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub input_schema: Value,
    /// Parsed schema metadata for validation (not serialized to clients).
    #[serde(skip)]
    pub schema_meta: SchemaMeta,
}

/// Tool call result returned by handlers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub content: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

/// Single content block in a tool result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Parsed schema metadata used for argument validation.
#[derive(Debug, Clone, Default)]
pub struct SchemaMeta {
    pub required: Vec<String>,
    /// Declared `type` per property, where one is given.
    pub property_types: std::collections::HashMap<String, String>,
    /// Set when the schema says `"additionalProperties": false`.
    pub deny_additional: bool,
    pub one_of: Vec<SchemaRequirementSet>,
    pub dependencies: std::collections::HashMap<String, Vec<String>>,
}

/// A set of required fields for oneOf validation.
#[derive(Debug, Clone)]
pub struct SchemaRequirementSet {
    pub required: Vec<String>,
}

// ── Convenience constructors ──

/// Create a simple text tool result.
pub fn text_result(text: impl Into<String>) -> ToolResult {
    ToolResult {
        content: vec![ContentBlock {
            block_type: "text".into(),
            text: Some(text.into()),
        }],
        is_error: false,
    }
}

// ── Errors ──

/// Crate error type: handler failures, registration and I/O problems.
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("tool error: {0}")]
    ToolError(String),
    #[error("tool already registered: {0}")]
    DuplicateTool(String),
    #[error("transport write failed: {0}")]
    TransportWrite(#[source] std::io::Error),
    #[error("framing error: {0}")]
    Framing(String),
    #[error("event log error: {0}")]
    Logging(#[source] std::io::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Protocol-level failure of a single request. Always converted into an
/// error envelope (or, for notifications, only logged).
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum DispatchError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("method not found: {0}")]
    MethodNotFound(String),
    #[error("invalid params: {}", .0.join("; "))]
    InvalidParams(Vec<String>),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("server not initialized")]
    NotInitialized,
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl DispatchError {
    pub fn code(&self) -> i32 {
        match self {
            DispatchError::Parse(_) => ERR_CODE_PARSE,
            DispatchError::InvalidRequest(_) => ERR_CODE_INVALID_REQ,
            DispatchError::MethodNotFound(_) => ERR_CODE_NO_METHOD,
            DispatchError::InvalidParams(_) => ERR_CODE_BAD_PARAMS,
            DispatchError::Internal(_) => ERR_CODE_INTERNAL,
            DispatchError::NotInitialized => ERR_CODE_NOT_INITIALIZED,
            DispatchError::Timeout(_) => ERR_CODE_TIMEOUT,
        }
    }

    /// Wire form of this failure.
    pub fn to_rpc_error(&self) -> RpcError {
        let data = match self {
            DispatchError::MethodNotFound(method) => Some(json!({ "method": method })),
            DispatchError::InvalidParams(failures) => Some(json!({ "errors": failures })),
            _ => None,
        };
        RpcError {
            code: self.code(),
            message: self.to_string(),
            data,
        }
    }
}

// Internal params structs for deserialization.

#[derive(Debug, Deserialize)]
pub(crate) struct ToolCallParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InitializeParams {
    #[serde(default)]
    pub protocol_version: Option<String>,
    #[serde(default)]
    pub client_info: Option<ClientInfo>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ClientInfo {
    pub name: String,
    #[serde(default)]
    pub version: String,
}
