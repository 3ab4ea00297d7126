//! The server facade (spec.md §4.G): one `McpServer` per configured
//! connection, exposing the uniform operation set on top of whichever
//! concrete [`crate::transport::Transport`] the connection uses.
//!
//! Grounded on the teacher's `client/mod.rs` constructor-with-config idiom
//! and its typed-method-per-RPC-call shape, retargeted from a single
//! Semantic Scholar REST surface onto the generic JSON-RPC operation table
//! every MCP server exposes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::{McpError, McpResult};
use crate::models::{ClientInfo, Prompt, Resource, ResourceContent, ResourceTemplate, ServerId, ServerMetadata, Task, Tool};
use crate::rpc::{JsonRpcError, JsonRpcReply};
use crate::transport::{InboundEvent, Transport};

/// The MCP protocol version this facade prefers (spec.md §6).
pub const PROTOCOL_VERSION_PREFERRED: &str = "2025-06-18";

/// Compatibility version advertised by the HTTP family (spec.md §6).
pub const PROTOCOL_VERSION_HTTP_COMPAT: &str = "2025-03-26";

/// `{ resources: […], nextCursor? }` (spec.md §4.G).
#[derive(Debug, Clone)]
pub struct ResourceList {
    pub resources: Vec<Resource>,
    pub next_cursor: Option<String>,
}

/// `{ values: […], total?, hasMore? }` (spec.md §4.G).
#[derive(Debug, Clone, Default)]
pub struct CompletionResult {
    pub values: Vec<String>,
    pub total: Option<u64>,
    pub has_more: Option<bool>,
}

/// Result of a `tools/call` (spec.md §4.G): the raw `content` array plus
/// optional structured content, distinct from [`McpError::ToolCallFailed`]
/// which is raised when the server marks `isError: true`.
#[derive(Debug, Clone)]
pub struct ToolCallResult {
    pub content: Vec<Value>,
    pub structured_content: Option<Value>,
}

/// `debug|info|notice|warning|error|critical` (spec.md §4.G).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Notice => "notice",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

/// Result produced by an inbound-hook handler, already shaped for the
/// transport to wrap into a reply.
pub enum HookOutcome {
    Result(Value),
    Error { code: i32, message: String },
}

type ElicitationHandler = dyn Fn(Value) -> HookOutcome + Send + Sync;
type RootsHandler = dyn Fn() -> Value + Send + Sync;
type SamplingHandler = dyn Fn(Value) -> HookOutcome + Send + Sync;

/// One connection to one MCP server: owns the transport, the captured
/// handshake metadata, and the registered inbound-request hooks.
pub struct McpServer {
    name: String,
    id: ServerId,
    transport: Arc<dyn Transport>,
    client_info: ClientInfo,
    protocol_version: &'static str,
    metadata: RwLock<Option<ServerMetadata>>,
    elicitation_handler: RwLock<Option<Box<ElicitationHandler>>>,
    roots_handler: RwLock<Option<Box<RootsHandler>>>,
    sampling_handler: RwLock<Option<Box<SamplingHandler>>>,
    router_started: AtomicBool,
}

impl McpServer {
    /// Build a server bound to an already-constructed transport (the
    /// aggregator's factory picks the concrete transport from `config`).
    #[must_use]
    pub fn new(name: impl Into<String>, id: ServerId, transport: Arc<dyn Transport>) -> Self {
        Self {
            name: name.into(),
            id,
            transport,
            client_info: ClientInfo::default(),
            protocol_version: PROTOCOL_VERSION_PREFERRED,
            metadata: RwLock::new(None),
            elicitation_handler: RwLock::new(None),
            roots_handler: RwLock::new(None),
            sampling_handler: RwLock::new(None),
            router_started: AtomicBool::new(false),
        }
    }

    /// Use the HTTP-family compatibility protocol version instead of the
    /// preferred one (spec.md §4.G: "HTTP family advertises one version;
    /// others may advertise a different one").
    #[must_use]
    pub const fn with_http_compat_version(mut self) -> Self {
        self.protocol_version = PROTOCOL_VERSION_HTTP_COMPAT;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn id(&self) -> ServerId {
        self.id
    }

    pub async fn metadata(&self) -> Option<ServerMetadata> {
        self.metadata.read().await.clone()
    }

    /// Register the `elicitation/create` handler. Setup-time only: must be
    /// called before [`Self::run_inbound_router`] starts draining events.
    pub async fn on_elicitation_request<F>(&self, handler: F)
    where
        F: Fn(Value) -> HookOutcome + Send + Sync + 'static,
    {
        *self.elicitation_handler.write().await = Some(Box::new(handler));
    }

    /// Register the `roots/list` handler. Setup-time only.
    pub async fn on_roots_list_request<F>(&self, handler: F)
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        *self.roots_handler.write().await = Some(Box::new(handler));
    }

    /// Register the `sampling/createMessage` handler. Setup-time only.
    pub async fn on_sampling_request<F>(&self, handler: F)
    where
        F: Fn(Value) -> HookOutcome + Send + Sync + 'static,
    {
        *self.sampling_handler.write().await = Some(Box::new(handler));
    }

    /// Run the `initialize`/`notifications/initialized` handshake (spec.md
    /// §4.G). Idempotent: a connection already ready returns its cached
    /// result.
    ///
    /// # Errors
    ///
    /// Propagates the transport's connection/transport errors.
    pub async fn initialize(&self) -> McpResult<ServerMetadata> {
        let params = serde_json::json!({
            "protocolVersion": self.protocol_version,
            "clientInfo": self.client_info,
            "capabilities": {},
        });
        let result = self.transport.ensure_connected(params).await?;
        let metadata: ServerMetadata = serde_json::from_value(result.get("serverInfo").cloned().unwrap_or(Value::Null))
            .unwrap_or(ServerMetadata { name: self.name.clone(), version: "unknown".to_string() });
        *self.metadata.write().await = Some(metadata.clone());
        Ok(metadata)
    }

    /// # Errors
    ///
    /// Propagates the transport's RPC errors.
    pub async fn list_tools(&self) -> McpResult<Vec<Tool>> {
        let result = self.transport.rpc_request("tools/list", Value::Null, None).await?;
        let mut tools: Vec<Tool> = serde_json::from_value(result.get("tools").cloned().unwrap_or(serde_json::json!([])))
            .map_err(|e| McpError::Transport(crate::error::TransportError::Serialization(e)))?;
        for tool in &mut tools {
            tool.server = Some(self.id);
        }
        Ok(tools)
    }

    /// # Errors
    ///
    /// Returns [`McpError::ToolCallFailed`] if the server marked the result
    /// `isError: true`, otherwise propagates transport/RPC errors.
    pub async fn call_tool(&self, name: &str, arguments: Value, meta: Option<Value>) -> McpResult<ToolCallResult> {
        let mut params = serde_json::json!({ "name": name, "arguments": arguments });
        if let Some(meta) = meta {
            params["_meta"] = meta;
        }
        let result = self.transport.rpc_request("tools/call", params, None).await?;
        if result.get("isError").and_then(Value::as_bool) == Some(true) {
            let message = result
                .get("content")
                .and_then(Value::as_array)
                .and_then(|c| c.first())
                .and_then(|c| c.get("text"))
                .and_then(Value::as_str)
                .unwrap_or("tool reported an error")
                .to_string();
            return Err(McpError::ToolCallFailed { tool: name.to_string(), message });
        }
        let content = result.get("content").and_then(Value::as_array).cloned().unwrap_or_default();
        let structured_content = result.get("structuredContent").cloned();
        Ok(ToolCallResult { content, structured_content })
    }

    /// Restartable, finite lazy sequence of chunks (spec.md §4.G). Every
    /// transport here is request/response at the facade boundary (even
    /// Streamable-HTTP resolves to one final value per call), so this
    /// yields exactly once — matching spec.md §4.E's "provided only for API
    /// parity" note for the plain HTTP transport, generalized to all four.
    pub fn call_tool_streaming(
        &self,
        name: &str,
        arguments: Value,
        meta: Option<Value>,
    ) -> impl futures::Stream<Item = McpResult<ToolCallResult>> + '_ {
        let name = name.to_string();
        futures::stream::once(async move { self.call_tool(&name, arguments, meta).await })
    }

    /// # Errors
    ///
    /// Propagates the transport's RPC errors.
    pub async fn list_prompts(&self) -> McpResult<Vec<Prompt>> {
        let result = self.transport.rpc_request("prompts/list", Value::Null, None).await?;
        let mut prompts: Vec<Prompt> =
            serde_json::from_value(result.get("prompts").cloned().unwrap_or(serde_json::json!([])))
                .map_err(|e| McpError::Transport(crate::error::TransportError::Serialization(e)))?;
        for prompt in &mut prompts {
            prompt.server = Some(self.id);
        }
        Ok(prompts)
    }

    /// # Errors
    ///
    /// Propagates the transport's RPC errors.
    pub async fn get_prompt(&self, name: &str, arguments: Value) -> McpResult<Value> {
        let params = serde_json::json!({ "name": name, "arguments": arguments });
        self.transport.rpc_request("prompts/get", params, None).await
    }

    /// # Errors
    ///
    /// Propagates the transport's RPC errors.
    pub async fn list_resources(&self, cursor: Option<&str>) -> McpResult<ResourceList> {
        let params = cursor.map_or(Value::Null, |c| serde_json::json!({ "cursor": c }));
        let result = self.transport.rpc_request("resources/list", params, None).await?;
        let mut resources: Vec<Resource> =
            serde_json::from_value(result.get("resources").cloned().unwrap_or(serde_json::json!([])))
                .map_err(|e| McpError::Transport(crate::error::TransportError::Serialization(e)))?;
        for resource in &mut resources {
            resource.server = Some(self.id);
        }
        let next_cursor = result.get("nextCursor").and_then(Value::as_str).map(str::to_string);
        Ok(ResourceList { resources, next_cursor })
    }

    /// # Errors
    ///
    /// Propagates the transport's RPC errors.
    pub async fn read_resource(&self, uri: &str) -> McpResult<Vec<ResourceContent>> {
        let params = serde_json::json!({ "uri": uri });
        let result = self.transport.rpc_request("resources/read", params, None).await?;
        serde_json::from_value(result.get("contents").cloned().unwrap_or(serde_json::json!([])))
            .map_err(|e| McpError::Transport(crate::error::TransportError::Serialization(e)))
    }

    /// # Errors
    ///
    /// Propagates the transport's RPC errors.
    pub async fn list_resource_templates(&self, cursor: Option<&str>) -> McpResult<Vec<ResourceTemplate>> {
        let params = cursor.map_or(Value::Null, |c| serde_json::json!({ "cursor": c }));
        let result = self.transport.rpc_request("resources/templates/list", params, None).await?;
        serde_json::from_value(result.get("resourceTemplates").cloned().unwrap_or(serde_json::json!([])))
            .map_err(|e| McpError::Transport(crate::error::TransportError::Serialization(e)))
    }

    /// # Errors
    ///
    /// Propagates the transport's RPC errors.
    pub async fn subscribe_resource(&self, uri: &str) -> McpResult<bool> {
        self.transport.rpc_request("resources/subscribe", serde_json::json!({ "uri": uri }), None).await?;
        Ok(true)
    }

    /// # Errors
    ///
    /// Propagates the transport's RPC errors.
    pub async fn unsubscribe_resource(&self, uri: &str) -> McpResult<bool> {
        self.transport.rpc_request("resources/unsubscribe", serde_json::json!({ "uri": uri }), None).await?;
        Ok(true)
    }

    /// # Errors
    ///
    /// Propagates the transport's RPC errors.
    pub async fn ping(&self) -> McpResult<Value> {
        self.transport.rpc_request("ping", Value::Null, None).await
    }

    /// # Errors
    ///
    /// Propagates the transport's RPC errors.
    pub async fn set_log_level(&self, level: LogLevel) -> McpResult<()> {
        self.transport.rpc_request("logging/setLevel", serde_json::json!({ "level": level.as_str() }), None).await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Propagates the transport's RPC errors.
    pub async fn complete(&self, reference: Value, argument: Value) -> McpResult<CompletionResult> {
        let params = serde_json::json!({ "ref": reference, "argument": argument });
        let result = self.transport.rpc_request("completion/complete", params, None).await?;
        let Some(completion) = result.get("completion") else {
            return Ok(CompletionResult::default());
        };
        let values = completion
            .get("values")
            .and_then(Value::as_array)
            .map(|v| v.iter().filter_map(|x| x.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        let total = completion.get("total").and_then(Value::as_u64);
        let has_more = completion.get("hasMore").and_then(Value::as_bool);
        Ok(CompletionResult { values, total, has_more })
    }

    /// # Errors
    ///
    /// Propagates the transport's RPC errors.
    pub async fn create_task(&self, operation: Value) -> McpResult<Task> {
        let result = self.transport.rpc_request("tasks/create", operation, None).await?;
        serde_json::from_value(result).map_err(|e| McpError::Transport(crate::error::TransportError::Serialization(e)))
    }

    /// # Errors
    ///
    /// Returns [`McpError::TaskNotFound`] when the server reports the task
    /// id is unknown (spec.md §7), else propagates the transport's RPC
    /// errors.
    pub async fn get_task(&self, id: &str) -> McpResult<Task> {
        let result = self.transport.rpc_request("tasks/get", serde_json::json!({ "id": id }), None).await;
        Self::map_task_result(id, result)
    }

    /// # Errors
    ///
    /// Returns [`McpError::TaskNotFound`] when the server reports the task
    /// id is unknown (spec.md §7), else propagates the transport's RPC
    /// errors.
    pub async fn cancel_task(&self, id: &str) -> McpResult<Task> {
        let result = self.transport.rpc_request("tasks/cancel", serde_json::json!({ "id": id }), None).await;
        Self::map_task_result(id, result)
    }

    fn map_task_result(id: &str, result: McpResult<Value>) -> McpResult<Task> {
        match result {
            Ok(value) => {
                serde_json::from_value(value).map_err(|e| McpError::Transport(crate::error::TransportError::Serialization(e)))
            }
            Err(McpError::Server(err)) => Err(McpError::from_task_server_error(id, err)),
            Err(other) => Err(other),
        }
    }

    /// Send the current roots list as a `notifications/roots/list_changed`
    /// notification (spec.md §4.H). Storage lives on the aggregator; this
    /// only notifies.
    ///
    /// # Errors
    ///
    /// Propagates the transport's notification-send errors.
    pub async fn notify_roots_changed(&self) -> McpResult<()> {
        self.transport.rpc_notify("notifications/roots/list_changed", Value::Null).await
    }

    /// Drain inbound notifications/server-requests from a server-capable
    /// transport, dispatching each server request through the router
    /// (spec.md §4.G) and forwarding notifications to `on_notification`.
    /// stdio/SSE/Streamable-HTTP transports expose an inbound channel (bounded
    /// or unbounded depending on the transport, unified here as a `Stream`);
    /// HTTP does not (it has none to drain, so this is never called for it).
    pub async fn run_inbound_router<S, F>(&self, mut inbound: S, on_notification: F)
    where
        S: futures::Stream<Item = InboundEvent> + Unpin,
        F: Fn(&str, Value) + Send + Sync,
    {
        use futures::StreamExt;
        self.router_started.store(true, Ordering::Release);
        while let Some(event) = inbound.next().await {
            match event {
                InboundEvent::Notification { method, params } => on_notification(&method, params),
                InboundEvent::ServerRequest { id, method, params } => {
                    let reply = self.handle_server_request(&method, params).await;
                    if let Err(e) = self.send_reply(id, reply).await {
                        tracing::warn!(error = %e, method = %method, "failed to send reply to server-initiated request");
                    }
                }
            }
        }
    }

    async fn handle_server_request(&self, method: &str, params: Value) -> Result<Value, JsonRpcError> {
        match method {
            "elicitation/create" => match self.elicitation_handler.read().await.as_ref() {
                Some(handler) => match handler(params) {
                    HookOutcome::Result(value) => Ok(value),
                    HookOutcome::Error { code, message } => Err(JsonRpcError::new(code, message)),
                },
                None => Ok(serde_json::json!({ "action": "decline" })),
            },
            "ping" => Ok(serde_json::json!({})),
            "roots/list" => match self.roots_handler.read().await.as_ref() {
                Some(handler) => Ok(handler()),
                None => Ok(serde_json::json!({ "roots": [] })),
            },
            "sampling/createMessage" => match self.sampling_handler.read().await.as_ref() {
                Some(handler) => match handler(params) {
                    HookOutcome::Result(value) => Ok(value),
                    HookOutcome::Error { code, message } => Err(JsonRpcError::new(code, message)),
                },
                None => Err(JsonRpcError::new(JsonRpcError::METHOD_NOT_FOUND, "sampling is not supported")),
            },
            other => Err(JsonRpcError::method_not_found(other)),
        }
    }

    async fn send_reply(&self, id: Value, outcome: Result<Value, JsonRpcError>) -> McpResult<()> {
        let reply = match outcome {
            Ok(result) => JsonRpcReply::success(id, result),
            Err(error) => JsonRpcReply::failure(id, error),
        };
        self.transport.reply_to_server_request(reply).await
    }

    /// # Errors
    ///
    /// Propagates the transport's `cleanup` errors.
    pub async fn cleanup(&self) -> McpResult<()> {
        self.transport.cleanup().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_version_constants_match_spec() {
        assert_eq!(PROTOCOL_VERSION_PREFERRED, "2025-06-18");
        assert_eq!(PROTOCOL_VERSION_HTTP_COMPAT, "2025-03-26");
    }

    #[test]
    fn log_level_wire_strings() {
        assert_eq!(LogLevel::Debug.as_str(), "debug");
        assert_eq!(LogLevel::Critical.as_str(), "critical");
    }
}
