//! Transport abstraction (spec.md §2 component B, §4.C-F).
//!
//! Every concrete transport satisfies the same [`Transport`] contract; the
//! server facade built on top of it doesn't care whether frames cross a
//! pipe, an SSE stream, or a POST whose body happens to be SSE-framed.

pub mod base;
pub mod http;
pub mod sse;
pub mod stdio;
pub mod streamable_http;

pub use http::HttpTransport;
pub use sse::SseTransport;
pub use stdio::StdioTransport;
pub use streamable_http::StreamableHttpTransport;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::McpResult;
use crate::rpc::JsonRpcReply;

/// A frame the transport received that wasn't a reply to one of our own
/// requests: a notification, or a request the peer expects us to answer
/// (spec.md §4.A).
#[derive(Debug, Clone)]
pub enum InboundEvent {
    Notification { method: String, params: Value },
    ServerRequest { id: Value, method: String, params: Value },
}

/// The shared contract every concrete transport satisfies (spec.md §4.B).
///
/// `ensure_connected` folds the physical connection AND the MCP
/// `initialize`/`notifications/initialized` handshake into one call: only
/// the server facade (component G) knows the `initialize` params shape
/// (`protocolVersion`, `capabilities`, `clientInfo`), so it is passed in
/// rather than assembled here. This keeps the two-flag lifecycle
/// (`connection_established`, `initialized`) and the handshake-ordering
/// guarantee (spec.md §5: "`notifications/initialized` is totally ordered
/// after `initialize` and before the first non-initialize RPC") inside a
/// single critical section instead of split across two layers.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Bring the connection to `connection_established && initialized`,
    /// sending `initialize_params` as the `initialize` request and then
    /// `notifications/initialized`. Runs the handshake at most once;
    /// subsequent calls return the cached `initialize` result (spec.md
    /// §4.B: "duplicate connects are no-ops").
    async fn ensure_connected(&self, initialize_params: Value) -> McpResult<Value>;

    /// Send a request and wait for its correlated response, subject to
    /// bounded retries for transient transport failures (spec.md §4.B).
    /// Requires a prior successful `ensure_connected` except when `method`
    /// is `"initialize"` itself.
    async fn rpc_request(&self, method: &str, params: Value, timeout: Option<Duration>) -> McpResult<Value>;

    /// Fire-and-forget a notification; retried on transient failure only.
    async fn rpc_notify(&self, method: &str, params: Value) -> McpResult<()>;

    /// Send a batch of requests encoded as a JSON array. Optional: the
    /// default implementation rejects it as unsupported.
    async fn send_rpc_batch(&self, _calls: &[(String, Value)]) -> McpResult<Vec<Value>> {
        Err(crate::error::TransportError::Framing(
            "this transport does not support batched requests".to_string(),
        )
        .into())
    }

    /// Idempotent shutdown: cancel watchdogs, close sockets/pipes, reap
    /// children, issue session-termination DELETE if applicable, fail all
    /// pending slots (spec.md §5).
    async fn cleanup(&self) -> McpResult<()>;

    /// Send a reply to a server-initiated request surfaced earlier as an
    /// [`InboundEvent::ServerRequest`]. Only transports that keep a
    /// persistent inbound channel (stdio, SSE) can receive server-initiated
    /// requests in the first place; the default rejects it as unsupported,
    /// matching the [`Self::send_rpc_batch`] pattern above.
    async fn reply_to_server_request(&self, _reply: JsonRpcReply) -> McpResult<()> {
        Err(crate::error::TransportError::Framing(
            "this transport does not support replying to server-initiated requests".to_string(),
        )
        .into())
    }
}
