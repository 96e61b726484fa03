use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::value::RawValue;
use serde_json::{json, Value};

use crate::logger::EventLog;
use crate::registry::ToolRegistry;
use crate::types::*;

/// Handler trait for MCP tools. Implement this or use closures.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: Value) -> Result<ToolResult, McpError>;
}

/// Wraps an async closure into a ToolHandler.
pub struct FnToolHandler<F> {
    f: F,
}

impl<F, Fut> FnToolHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<ToolResult, McpError>> + Send + 'static,
{
    pub fn new(f: F) -> Arc<dyn ToolHandler> {
        Arc::new(Self { f })
    }
}

#[async_trait]
impl<F, Fut> ToolHandler for FnToolHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<ToolResult, McpError>> + Send + 'static,
{
    async fn call(&self, args: Value) -> Result<ToolResult, McpError> {
        (self.f)(args).await
    }
}

/// Successful outcome of a dispatched request.
enum Reply {
    Cached(Arc<RawValue>),
    Value(Value),
}

/// The request dispatcher. Create with [`ServerBuilder`]; the tool registry
/// is frozen once the server is built.
///
/// The only mutable state is the handshake flag: every method except
/// `initialize` (and the notifications that follow it) is refused with
/// `NotInitialized` until the first `initialize` request has been answered.
pub struct Server {
    server_name: String,
    registry: ToolRegistry,
    initialized: AtomicBool,
    initialize_result: Arc<RawValue>,
    tools_list: Arc<RawValue>,
    log: Arc<EventLog>,
    request_timeout: Option<Duration>,
}

impl Server {
    /// Create a new server builder.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::default()
    }

    pub fn name(&self) -> &str {
        &self.server_name
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Handle one raw frame from the transport.
    ///
    /// Returns `None` when nothing should be written back: notifications,
    /// and malformed messages (including invalid UTF-8) whose id cannot be
    /// recovered.
    pub async fn handle_message(&self, raw: &[u8]) -> Option<McpResponse> {
        let value: Value = match serde_json::from_slice(raw) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed message");
                self.log
                    .record(format!("Dropped malformed message: {}", e))
                    .await;
                return None;
            }
        };

        let salvaged_id = value.get("id").filter(|id| !id.is_null()).cloned();
        match serde_json::from_value::<JsonRpcRequest>(value) {
            Ok(req) => {
                let resp = self.handle(req).await;
                (!resp.is_notification()).then_some(resp)
            }
            Err(e) => {
                let err = DispatchError::Parse(format!("invalid request envelope: {}", e));
                self.log.record(format!("Rejected message: {}", err)).await;
                salvaged_id.map(|id| McpResponse::error(Some(id), err.to_rpc_error()))
            }
        }
    }

    /// Route a parsed JSON-RPC request to the appropriate handler.
    pub async fn handle(&self, req: JsonRpcRequest) -> McpResponse {
        let JsonRpcRequest {
            jsonrpc,
            id,
            method,
            params,
        } = req;

        tracing::debug!(method = %method, id = ?id, "request");
        let outcome = self.dispatch(jsonrpc.as_deref(), &method, params).await;

        match (id, outcome) {
            (None, Ok(_)) => McpResponse::notification(),
            (None, Err(e)) => {
                tracing::warn!(method = %method, error = %e, "notification failed");
                self.log
                    .record(format!("Notification {} failed: {}", method, e))
                    .await;
                McpResponse::notification()
            }
            (Some(id), Ok(Reply::Cached(raw))) => McpResponse::cached(Some(id), &raw),
            (Some(id), Ok(Reply::Value(value))) => McpResponse::ok(Some(id), value),
            (Some(id), Err(e)) => {
                tracing::debug!(method = %method, error = %e, "request failed");
                self.log
                    .record(format!("Request {} ({}) failed: {}", id, method, e))
                    .await;
                McpResponse::error(Some(id), e.to_rpc_error())
            }
        }
    }

    async fn dispatch(
        &self,
        jsonrpc: Option<&str>,
        method: &str,
        params: Option<Value>,
    ) -> Result<Reply, DispatchError> {
        if let Some(version) = jsonrpc.filter(|v| *v != "2.0") {
            return Err(DispatchError::InvalidRequest(format!(
                "jsonrpc must be '2.0', got '{}'",
                version
            )));
        }

        match method {
            "initialize" => Ok(self.handle_initialize(params.as_ref()).await),
            "notifications/initialized" | "notifications/cancelled" => Ok(Reply::Value(json!({}))),
            _ if !self.is_initialized() => Err(DispatchError::NotInitialized),
            "tools/list" => Ok(Reply::Cached(Arc::clone(&self.tools_list))),
            "tools/call" => {
                let params: ToolCallParams = match params {
                    Some(p) => serde_json::from_value(p)
                        .map_err(|e| DispatchError::InvalidParams(vec![e.to_string()]))?,
                    None => {
                        return Err(DispatchError::InvalidParams(vec!["params required".into()]));
                    }
                };
                self.call_tool(&params.name, params.arguments).await
            }
            name => self.call_tool(name, params.unwrap_or(Value::Null)).await,
        }
    }

    async fn handle_initialize(&self, params: Option<&Value>) -> Reply {
        if let Some(p) =
            params.and_then(|p| serde_json::from_value::<InitializeParams>(p.clone()).ok())
        {
            let client_name = p.client_info.as_ref().map_or("", |c| c.name.as_str());
            let client_version = p.client_info.as_ref().map_or("", |c| c.version.as_str());
            tracing::info!(
                client_name,
                client_version,
                protocol_version = ?p.protocol_version,
                "initialize"
            );
        }

        if !self.initialized.swap(true, Ordering::AcqRel) {
            self.log.record("Session initialized").await;
        }
        Reply::Cached(Arc::clone(&self.initialize_result))
    }

    async fn call_tool(&self, name: &str, args: Value) -> Result<Reply, DispatchError> {
        let descriptor = self
            .registry
            .resolve(name)
            .ok_or_else(|| DispatchError::MethodNotFound(name.to_string()))?;

        descriptor
            .tool
            .validate_arguments(&args)
            .map_err(DispatchError::InvalidParams)?;

        let args = if args.is_null() { json!({}) } else { args };
        self.log.record(format!("Tool {} called with {}", name, args)).await;

        let call = AssertUnwindSafe(descriptor.handler.call(args)).catch_unwind();
        let outcome = match self.request_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| DispatchError::Timeout(limit))?,
            None => call.await,
        };

        match outcome {
            Ok(Ok(result)) => serde_json::to_value(&result)
                .map(Reply::Value)
                .map_err(|e| DispatchError::Internal(format!("serialize tool result: {}", e))),
            Ok(Err(e)) => Err(DispatchError::Internal(e.to_string())),
            Err(panic) => {
                let detail = panic_message(&*panic);
                tracing::error!(tool = name, panic = %detail, "tool handler panicked");
                self.log
                    .record(format!("Tool {} panicked: {}", name, detail))
                    .await;
                Err(DispatchError::Internal(format!(
                    "tool \"{}\" failed unexpectedly",
                    name
                )))
            }
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".into()
    }
}

/// Builder for constructing a [`Server`].
#[derive(Default)]
pub struct ServerBuilder {
    registry: ToolRegistry,
    server_name: Option<String>,
    server_version: Option<String>,
    log: Option<Arc<EventLog>>,
    request_timeout: Option<Duration>,
}

impl ServerBuilder {
    /// Use a fully populated tool registry.
    pub fn registry(mut self, registry: ToolRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Set server name and version.
    pub fn server_info(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self.server_version = Some(version.into());
        self
    }

    /// Event log for lifecycle and per-call records. Defaults to a disabled log.
    pub fn event_log(mut self, log: Arc<EventLog>) -> Self {
        self.log = Some(log);
        self
    }

    /// Give up on handlers that run longer than `limit`.
    pub fn request_timeout(mut self, limit: Option<Duration>) -> Self {
        self.request_timeout = limit;
        self
    }

    /// Build the server, pre-serializing the handshake and tool list results.
    pub fn build(self) -> Result<Server, McpError> {
        let server_name = self
            .server_name
            .unwrap_or_else(|| env!("CARGO_PKG_NAME").into());
        let server_version = self
            .server_version
            .unwrap_or_else(|| env!("CARGO_PKG_VERSION").into());

        let tools = self.registry.list_descriptors();
        let initialize_result = serde_json::value::to_raw_value(&json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": {"listChanged": false},
            },
            "serverInfo": {
                "name": server_name,
                "version": server_version,
            },
            "tools": tools,
        }))?;
        let tools_list = serde_json::value::to_raw_value(&json!({ "tools": tools }))?;

        Ok(Server {
            server_name,
            registry: self.registry,
            initialized: AtomicBool::new(false),
            initialize_result: initialize_result.into(),
            tools_list: tools_list.into(),
            log: self.log.unwrap_or_else(|| Arc::new(EventLog::disabled())),
            request_timeout: self.request_timeout,
        })
    }
}
