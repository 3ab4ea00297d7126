//! JSON-RPC 2.0 codec (spec.md §4.A).
//!
//! Encodes/decodes the wire frames every transport shares, and classifies
//! inbound frames as a response, a notification, or a server-initiated
//! request, by the single rule set in spec.md §4.A applied identically on
//! every transport.

use std::borrow::Cow;
use std::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::{ServerError, TransportError};

const JSONRPC_VERSION: &str = "2.0";

/// An outbound JSON-RPC request.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: Cow<'static, str>,
    pub id: serde_json::Value,
    pub method: String,
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub params: serde_json::Value,
}

impl JsonRpcRequest {
    #[must_use]
    pub fn new(id: i64, method: impl Into<String>, params: serde_json::Value) -> Self {
        Self { jsonrpc: Cow::Borrowed(JSONRPC_VERSION), id: serde_json::Value::from(id), method: method.into(), params }
    }
}

/// An outbound JSON-RPC notification: same as a request, minus `id`.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: Cow<'static, str>,
    pub method: String,
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub params: serde_json::Value,
}

impl JsonRpcNotification {
    #[must_use]
    pub fn new(method: impl Into<String>, params: serde_json::Value) -> Self {
        Self { jsonrpc: Cow::Borrowed(JSONRPC_VERSION), method: method.into(), params }
    }
}

/// A JSON-RPC error object, as it appears inside a response or is sent back
/// in reply to a server-initiated request this client declines/can't serve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcError {
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INTERNAL_ERROR: i32 = -32603;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const PARSE_ERROR: i32 = -32700;

    #[must_use]
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), data: None }
    }

    #[must_use]
    pub fn method_not_found(method: &str) -> Self {
        Self::new(Self::METHOD_NOT_FOUND, format!("Method not found: {method}"))
    }

    #[must_use]
    pub fn internal(message: impl std::fmt::Display) -> Self {
        Self::new(Self::INTERNAL_ERROR, format!("Internal error: {message}"))
    }
}

/// A reply this client sends in answer to a server-initiated request —
/// produced by the server facade's request router (spec.md §4.G).
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcReply {
    pub jsonrpc: Cow<'static, str>,
    pub id: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcReply {
    #[must_use]
    pub fn success(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self { jsonrpc: Cow::Borrowed(JSONRPC_VERSION), id, result: Some(result), error: None }
    }

    #[must_use]
    pub fn failure(id: serde_json::Value, error: JsonRpcError) -> Self {
        Self { jsonrpc: Cow::Borrowed(JSONRPC_VERSION), id, result: None, error: Some(error) }
    }
}

/// The outcome of classifying one inbound JSON object (spec.md §4.A):
///
/// - has `method` and `id` → `ServerRequest` (must be answered).
/// - has `method` and no `id` → `Notification` (fire-and-forget).
/// - has `id` and (`result` or `error`) and no `method` → `Response`.
#[derive(Debug, Clone)]
pub enum Frame {
    Response { id: serde_json::Value, outcome: Result<serde_json::Value, ServerError> },
    Notification { method: String, params: serde_json::Value },
    ServerRequest { id: serde_json::Value, method: String, params: serde_json::Value },
}

/// Apply spec.md §4.A's classification rule to one inbound JSON object.
///
/// # Errors
///
/// Returns [`TransportError::Framing`] when the object matches none of the
/// three shapes (e.g. a suspected response missing its `id`).
pub fn classify(value: &serde_json::Value) -> Result<Frame, TransportError> {
    let obj = value
        .as_object()
        .ok_or_else(|| TransportError::Framing("frame is not a JSON object".to_string()))?;

    let method = obj.get("method").and_then(|m| m.as_str());
    let id = obj.get("id").cloned();
    let has_result_or_error = obj.contains_key("result") || obj.contains_key("error");

    match (method, id) {
        (Some(method), Some(id)) => {
            let params = obj.get("params").cloned().unwrap_or(serde_json::Value::Null);
            Ok(Frame::ServerRequest { id, method: method.to_string(), params })
        }
        (Some(method), None) => {
            let params = obj.get("params").cloned().unwrap_or(serde_json::Value::Null);
            Ok(Frame::Notification { method: method.to_string(), params })
        }
        (None, Some(id)) if has_result_or_error => {
            let outcome = if let Some(error) = obj.get("error") {
                let code = error.get("code").and_then(serde_json::Value::as_i64).unwrap_or(0) as i32;
                let message = error
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("unknown server error")
                    .to_string();
                let data = error.get("data").cloned();
                Err(ServerError::new(code, message, data))
            } else {
                Ok(obj.get("result").cloned().unwrap_or(serde_json::Value::Null))
            };
            Ok(Frame::Response { id, outcome })
        }
        (None, None) if has_result_or_error => {
            Err(TransportError::Framing("response frame missing id".to_string()))
        }
        _ => Err(TransportError::Framing(format!(
            "frame matches no known shape: {value}"
        ))),
    }
}

/// Monotonically increasing non-negative request ids, allocated per
/// connection under a lock (an atomic counter satisfies the same
/// serialization guarantee spec.md §5 asks for).
#[derive(Debug, Default)]
pub struct IdAllocator {
    next: AtomicI64,
}

impl IdAllocator {
    #[must_use]
    pub const fn new() -> Self {
        Self { next: AtomicI64::new(0) }
    }

    #[must_use]
    pub fn next(&self) -> i64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_allocator_is_monotonic() {
        let alloc = IdAllocator::new();
        let a = alloc.next();
        let b = alloc.next();
        let c = alloc.next();
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn classifies_server_request() {
        let value = serde_json::json!({"jsonrpc": "2.0", "id": 7, "method": "elicitation/create", "params": {}});
        match classify(&value).unwrap() {
            Frame::ServerRequest { method, .. } => assert_eq!(method, "elicitation/create"),
            other => panic!("expected ServerRequest, got {other:?}"),
        }
    }

    #[test]
    fn classifies_notification() {
        let value = serde_json::json!({"jsonrpc": "2.0", "method": "notifications/progress", "params": {"progress": 1}});
        match classify(&value).unwrap() {
            Frame::Notification { method, .. } => assert_eq!(method, "notifications/progress"),
            other => panic!("expected Notification, got {other:?}"),
        }
    }

    #[test]
    fn classifies_success_response() {
        let value = serde_json::json!({"jsonrpc": "2.0", "id": 1, "result": {"ok": true}});
        match classify(&value).unwrap() {
            Frame::Response { outcome, .. } => assert!(outcome.is_ok()),
            other => panic!("expected Response, got {other:?}"),
        }
    }

    #[test]
    fn classifies_error_response_as_server_error() {
        let value = serde_json::json!({"jsonrpc": "2.0", "id": 1, "error": {"code": -32000, "message": "boom"}});
        match classify(&value).unwrap() {
            Frame::Response { outcome: Err(err), .. } => {
                assert_eq!(err.code, -32000);
                assert_eq!(err.message, "boom");
            }
            other => panic!("expected Response with error, got {other:?}"),
        }
    }

    #[test]
    fn suspected_response_missing_id_is_a_transport_error() {
        let value = serde_json::json!({"jsonrpc": "2.0", "result": {}});
        assert!(classify(&value).is_err());
    }

    #[test]
    fn request_serializes_without_null_params() {
        let req = JsonRpcRequest::new(1, "ping", serde_json::Value::Null);
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("params").is_none());
    }
}
