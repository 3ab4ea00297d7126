//! Error types for the MCP client library.
//!
//! Uses `thiserror` for structured error handling with automatic `From`
//! implementations, mirroring the split the teacher crate used between a
//! transport-level error and a facade/aggregator-level context wrapper.

use std::time::Duration;

/// Errors from the transport layer: framing, timeouts, broken pipes, and
/// connection-establishment failures.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum TransportError {
    /// Framing failure: malformed JSON-RPC, malformed SSE, or a suspected
    /// response frame missing its `id`.
    #[error("framing error: {0}")]
    Framing(String),

    /// The underlying I/O (pipe, socket) failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport error (connection, DNS, TLS, etc.).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Retry middleware error.
    #[error("middleware error: {0}")]
    Middleware(#[from] reqwest_middleware::Error),

    /// JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A request timed out waiting for a correlated response.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// An HTTP status in the 5xx range with a body that was not a
    /// JSON-RPC error object.
    #[error("server error ({status}): {message}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Response body or message.
        message: String,
    },

    /// A redirect chain exceeded the 3-hop cap (§4.B).
    #[error("too many redirects (cap is 3)")]
    TooManyRedirects,

    /// URL scheme was not `http` or `https`.
    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),
}

impl TransportError {
    /// Whether this failure is transient and eligible for the transport's
    /// retry policy. JSON-RPC error responses are never retried — those
    /// surface as [`ServerError`], not as a `TransportError` at all.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Http(_) | Self::Middleware(_) | Self::Timeout(_) | Self::HttpStatus { .. }
        )
    }
}

/// Could not establish or preserve a session: connect-time HTTP 401/403,
/// a dropped stdio child, or a session the server invalidated.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum ConnectionError {
    /// The underlying transport failed while connecting.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server rejected the connection attempt (401/403 at connect time).
    #[error("authentication required (HTTP {status})")]
    Unauthorized {
        /// HTTP status code observed.
        status: u16,
    },

    /// A session identifier did not match `^[A-Za-z0-9_-]{{8,128}}$`.
    #[error("invalid session id: {0:?}")]
    InvalidSessionId(String),

    /// The child process or connection exited before a pending request
    /// could be answered.
    #[error("connection closed: {0}")]
    Closed(String),

    /// `ensure_connected` was called again after a prior handshake failed
    /// in a way that left the transport unusable.
    #[error("connection already failed and cannot be retried")]
    Poisoned,
}

/// The peer returned a JSON-RPC `error` object.
#[derive(thiserror::Error, Debug)]
#[error("server error {code}: {message}")]
pub struct ServerError {
    /// JSON-RPC error code.
    pub code: i32,
    /// JSON-RPC error message.
    pub message: String,
    /// Optional JSON-RPC error `data` payload.
    pub data: Option<serde_json::Value>,
}

impl ServerError {
    #[must_use]
    pub fn new(code: i32, message: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self { code, message: message.into(), data }
    }

    /// Tasks errors map `ServerError` to `TaskNotFound` when the message
    /// mentions "not found" or "unknown" (spec.md §7).
    #[must_use]
    pub fn looks_like_not_found(&self) -> bool {
        let lower = self.message.to_lowercase();
        lower.contains("not found") || lower.contains("unknown")
    }
}

/// Errors from the facade / aggregator layer: context wrappers and local
/// lookup/validation failures, one variant per named kind in spec.md §7.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum McpError {
    /// Transport-level failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Connection establishment/preservation failure.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// The peer returned a JSON-RPC error.
    #[error(transparent)]
    Server(#[from] ServerError),

    /// `call_tool` failed; message identifies the tool and owning server.
    #[error("tool call '{tool}' on server '{server}' failed: {source}")]
    ToolCall { tool: String, server: String, #[source] source: Box<McpError> },

    /// `get_prompt` failed; message identifies the prompt and owning server.
    #[error("prompt '{prompt}' on server '{server}' failed: {source}")]
    PromptGet { prompt: String, server: String, #[source] source: Box<McpError> },

    /// `read_resource` failed; message identifies the uri and owning server.
    #[error("resource '{uri}' on server '{server}' failed: {source}")]
    ResourceRead { uri: String, server: String, #[source] source: Box<McpError> },

    /// The server reported `isError: true` on a `tools/call` result.
    #[error("tool '{tool}' reported an error: {message}")]
    ToolCallFailed { tool: String, message: String },

    /// No cached/listed tool with this name on any server.
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// No cached/listed prompt with this name on any server.
    #[error("prompt not found: {0}")]
    PromptNotFound(String),

    /// No cached/listed resource with this uri on any server.
    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    /// Same-named tool on more than one server and no `server:` override.
    #[error("ambiguous tool name '{name}', present on servers: {}", .servers.join(", "))]
    AmbiguousToolName { name: String, servers: Vec<String> },

    /// Same-named prompt on more than one server and no `server:` override.
    #[error("ambiguous prompt name '{name}', present on servers: {}", .servers.join(", "))]
    AmbiguousPromptName { name: String, servers: Vec<String> },

    /// Same-uri resource on more than one server and no `server:` override.
    #[error("ambiguous resource uri '{uri}', present on servers: {}", .servers.join(", "))]
    AmbiguousResourceUri { uri: String, servers: Vec<String> },

    /// No server matches the requested index/name/type.
    #[error("server not found: {0}")]
    ServerNotFound(String),

    /// Local pre-flight argument validation failed before contacting the
    /// server.
    #[error("validation error: {0}")]
    Validation(String),

    /// A task operation (`tasks/create|get|cancel`) failed.
    #[error("task error: {0}")]
    Task(String),

    /// `tasks/get`/`tasks/cancel` reported the task id does not exist.
    #[error("task not found: {0}")]
    TaskNotFound(String),

    /// Quick-connect could not infer a transport type for the given URL or
    /// command.
    #[error("could not detect a transport for {0:?}")]
    TransportDetection(String),
}

impl McpError {
    #[must_use]
    pub fn tool_call(tool: impl Into<String>, server: impl Into<String>, source: Self) -> Self {
        Self::ToolCall { tool: tool.into(), server: server.into(), source: Box::new(source) }
    }

    #[must_use]
    pub fn prompt_get(prompt: impl Into<String>, server: impl Into<String>, source: Self) -> Self {
        Self::PromptGet { prompt: prompt.into(), server: server.into(), source: Box::new(source) }
    }

    #[must_use]
    pub fn resource_read(uri: impl Into<String>, server: impl Into<String>, source: Self) -> Self {
        Self::ResourceRead { uri: uri.into(), server: server.into(), source: Box::new(source) }
    }

    /// Map a `ServerError` surfaced by `tasks/get`/`tasks/cancel` to
    /// `TaskNotFound` when its message mentions "not found" or "unknown",
    /// else to the generic `Task` variant (spec.md §7).
    #[must_use]
    pub fn from_task_server_error(id: &str, err: ServerError) -> Self {
        if err.looks_like_not_found() {
            Self::TaskNotFound(id.to_string())
        } else {
            Self::Task(err.message)
        }
    }

    /// Whether the underlying failure is transient and was already retried
    /// at the transport layer, for callers deciding whether to retry once
    /// more at a higher level (reconnection policy, spec.md §5).
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(t) if t.is_retryable())
    }
}

/// Result type alias for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type alias for facade/aggregator operations.
pub type McpResult<T> = Result<T, McpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_retryable() {
        assert!(TransportError::Timeout(Duration::from_secs(5)).is_retryable());
        assert!(TransportError::HttpStatus { status: 503, message: String::new() }.is_retryable());
        assert!(!TransportError::TooManyRedirects.is_retryable());
        assert!(!TransportError::UnsupportedScheme("ftp".into()).is_retryable());
    }

    #[test]
    fn server_error_not_found_detection() {
        let err = ServerError::new(-32000, "Task abc not found", None);
        assert!(err.looks_like_not_found());

        let err = ServerError::new(-32000, "unknown task id", None);
        assert!(err.looks_like_not_found());

        let err = ServerError::new(-32000, "internal failure", None);
        assert!(!err.looks_like_not_found());
    }

    #[test]
    fn task_error_mapping() {
        let not_found = ServerError::new(-32000, "Task not found", None);
        match McpError::from_task_server_error("t1", not_found) {
            McpError::TaskNotFound(id) => assert_eq!(id, "t1"),
            other => panic!("expected TaskNotFound, got {other:?}"),
        }

        let generic = ServerError::new(-32000, "boom", None);
        match McpError::from_task_server_error("t1", generic) {
            McpError::Task(msg) => assert_eq!(msg, "boom"),
            other => panic!("expected Task, got {other:?}"),
        }
    }

    #[test]
    fn ambiguous_error_message_lists_servers() {
        let err = McpError::AmbiguousToolName {
            name: "foo".into(),
            servers: vec!["a".into(), "b".into()],
        };
        assert!(err.to_string().contains("a, b"));
    }
}
