//! Streamable-HTTP transport (spec.md §4.F): every RPC is a `POST`, but the
//! response body may itself be SSE-framed, carrying zero or more
//! intermediate server-initiated frames before the final correlated
//! response.
//!
//! Grounded on [`super::http::HttpTransport`]'s client-construction and
//! session-id handling, generalized to parse an SSE-or-JSON response body
//! and to track `Last-Event-ID` across requests (spec.md §4.F).

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use serde_json::Value;

use super::base::{build_http_client, build_retrying_client, ConnectionFlags, PendingTable, SessionId};
use super::sse::SseParser;
use super::{InboundEvent, Transport};
use crate::config::HttpConfig;
use crate::error::{ConnectionError, McpError, McpResult, TransportError};
use crate::rpc::{classify, Frame, IdAllocator, JsonRpcNotification, JsonRpcRequest};

pub struct StreamableHttpTransport {
    config: HttpConfig,
    client: ClientWithMiddleware,
    url: url::Url,
    session_id: SessionId,
    flags: ConnectionFlags,
    ids: IdAllocator,
    pending: PendingTable,
    last_event_id: AtomicI64,
    inbound_tx: tokio::sync::mpsc::UnboundedSender<InboundEvent>,
    inbound_rx: tokio::sync::Mutex<Option<tokio::sync::mpsc::UnboundedReceiver<InboundEvent>>>,
    connect_guard: tokio::sync::Mutex<()>,
}

impl StreamableHttpTransport {
    /// # Errors
    ///
    /// Returns [`TransportError`] if `config.base_url`/`config.endpoint`
    /// don't form a valid `http(s)` URL, or if the underlying client fails
    /// to build.
    pub fn new(config: HttpConfig) -> McpResult<Self> {
        let url = url::Url::parse(&config.base_url)
            .and_then(|base| base.join(&config.endpoint))
            .map_err(|e| TransportError::Framing(format!("invalid server URL: {e}")))?;
        super::base::validate_url(&url)?;

        let client = build_http_client(config.read_timeout)?;
        let client = build_retrying_client(client, config.retries, config.retry_backoff);
        let (inbound_tx, inbound_rx) = tokio::sync::mpsc::unbounded_channel();

        Ok(Self {
            config,
            client,
            url,
            session_id: SessionId::default(),
            flags: ConnectionFlags::default(),
            ids: IdAllocator::new(),
            pending: PendingTable::default(),
            last_event_id: AtomicI64::new(-1),
            inbound_tx,
            inbound_rx: tokio::sync::Mutex::new(Some(inbound_rx)),
            connect_guard: tokio::sync::Mutex::new(()),
        })
    }

    /// Hand the caller the channel the server facade drains for
    /// notifications/server-initiated requests. Call at most once.
    pub async fn take_inbound(&self) -> Option<tokio::sync::mpsc::UnboundedReceiver<InboundEvent>> {
        self.inbound_rx.lock().await.take()
    }

    fn apply_headers(&self, mut builder: reqwest_middleware::RequestBuilder) -> reqwest_middleware::RequestBuilder {
        builder = builder.header(reqwest::header::ACCEPT, "text/event-stream, application/json");
        builder = builder.header(reqwest::header::CACHE_CONTROL, "no-cache");
        builder = builder.header(reqwest::header::CONTENT_TYPE, "application/json");
        for (k, v) in &self.config.headers {
            builder = builder.header(k, v);
        }
        if let Some(session_id) = self.session_id.get() {
            builder = builder.header("Mcp-Session-Id", session_id);
        }
        let last_event_id = self.last_event_id.load(Ordering::Acquire);
        if last_event_id >= 0 {
            builder = builder.header("Last-Event-ID", last_event_id.to_string());
        }
        builder
    }

    /// POST one JSON-RPC request and dispatch every frame found in the
    /// response body (spec.md §4.F): intermediate notifications/server
    /// requests go to the inbound channel, and the final frame matching
    /// `expected_id` is returned directly to the caller without a detour
    /// through the pending table (there is no concurrent reader task here —
    /// each POST owns its own response body).
    async fn post_and_collect(&self, body: impl serde::Serialize, expected_id: Option<i64>) -> McpResult<Option<Value>> {
        let builder = self.apply_headers(self.client.post(self.url.clone())).json(&body);
        let response = builder.send().await.map_err(TransportError::Middleware)?;

        if let Some(header) = response.headers().get("Mcp-Session-Id") {
            if let Ok(header_str) = header.to_str() {
                self.session_id.set(header_str).map_err(McpError::Connection)?;
            }
        }

        let status = response.status();
        if status == reqwest::StatusCode::ACCEPTED {
            // A bare notification (no response body expected).
            return Ok(None);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(McpError::Transport(TransportError::HttpStatus { status: status.as_u16(), message }));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let text = response.text().await.map_err(TransportError::Http)?;

        let frames = if content_type.contains("text/event-stream") {
            self.parse_sse_frames(&text)
        } else {
            vec![serde_json::from_str(&text).map_err(TransportError::Serialization)?]
        };

        let mut matched = None;
        for value in frames {
            match classify(&value)? {
                Frame::Response { id, outcome } => {
                    if expected_id.is_some() && id.as_i64() == expected_id {
                        matched = Some(outcome.map_err(McpError::Server)?);
                    } else if let Some(n) = id.as_i64() {
                        self.pending.resolve(n, outcome.map_err(McpError::Server));
                    }
                }
                Frame::Notification { method, params } => {
                    let _ = self.inbound_tx.send(InboundEvent::Notification { method, params });
                }
                Frame::ServerRequest { id, method, params } => {
                    let _ = self.inbound_tx.send(InboundEvent::ServerRequest { id, method, params });
                }
            }
        }

        Ok(matched)
    }

    fn parse_sse_frames(&self, body: &str) -> Vec<Value> {
        let mut parser = SseParser::default();
        parser.feed(body);
        parser.feed("\n\n"); // tolerate a body without a trailing blank line
        let mut frames = Vec::new();
        while let Some(event) = parser.pop_event() {
            if let Some(id) = &event.id {
                if let Ok(n) = id.parse::<i64>() {
                    self.last_event_id.store(n, Ordering::Release);
                }
            }
            if event.data.is_empty() {
                continue;
            }
            match serde_json::from_str(&event.data) {
                Ok(value) => frames.push(value),
                Err(e) => tracing::warn!(error = %e, data = %event.data, "malformed SSE frame in streamable-HTTP response"),
            }
        }
        frames
    }

    /// Answer a mid-stream elicitation request with a side-channel POST
    /// (spec.md §4.F: "answered by a separate POST ... method =
    /// `elicitation/response`" — not a JSON-RPC response to the original
    /// request id).
    ///
    /// # Errors
    ///
    /// Returns [`McpError`] if the POST fails.
    pub async fn send_elicitation_response(&self, elicitation_id: &str, action: &str, content: Option<Value>) -> McpResult<()> {
        let mut params = serde_json::json!({ "elicitationId": elicitation_id, "action": action });
        if let Some(content) = content {
            params["content"] = content;
        }
        let id = self.ids.next();
        let request = JsonRpcRequest::new(id, "elicitation/response", params);
        self.post_and_collect(request, None).await?;
        Ok(())
    }
}

#[async_trait]
impl Transport for StreamableHttpTransport {
    async fn ensure_connected(&self, initialize_params: Value) -> McpResult<Value> {
        let _guard = self.connect_guard.lock().await;
        if self.flags.is_ready() {
            return Ok(self.flags.cached_init_result().unwrap_or(Value::Null));
        }
        self.flags.mark_established();

        let result = self.rpc_request("initialize", initialize_params, Some(self.config.read_timeout)).await?;
        self.flags.mark_initialized(result.clone());
        self.rpc_notify("notifications/initialized", Value::Null).await?;
        Ok(result)
    }

    async fn rpc_request(&self, method: &str, params: Value, timeout: Option<Duration>) -> McpResult<Value> {
        if method != "initialize" && !self.flags.is_ready() {
            return Err(McpError::Connection(ConnectionError::Closed("not initialized".to_string())));
        }
        let id = self.ids.next();
        let request = JsonRpcRequest::new(id, method, params);

        let wait = timeout.unwrap_or(self.config.read_timeout);
        let fut = self.post_and_collect(request, Some(id));
        let result = tokio::time::timeout(wait, fut)
            .await
            .map_err(|_| McpError::Transport(TransportError::Timeout(wait)))??;

        result.ok_or_else(|| {
            McpError::Transport(TransportError::Framing(format!(
                "streamable-HTTP response for request {id} never contained the final frame"
            )))
        })
    }

    async fn rpc_notify(&self, method: &str, params: Value) -> McpResult<()> {
        let notification = JsonRpcNotification::new(method, params);
        self.post_and_collect(notification, None).await?;
        Ok(())
    }

    async fn cleanup(&self) -> McpResult<()> {
        self.flags.reset();
        self.pending.fail_all("transport cleanup");
        if let Some(session_id) = self.session_id.get() {
            let mut builder = self.client.delete(self.url.clone()).header("Mcp-Session-Id", &session_id);
            for (k, v) in &self.config.headers {
                builder = builder.header(k, v);
            }
            if let Err(e) = builder.send().await {
                tracing::warn!(error = %e, "session-termination DELETE failed");
            }
            self.session_id.clear();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: String) -> HttpConfig {
        HttpConfig {
            name: "test".to_string(),
            base_url,
            endpoint: "/mcp".to_string(),
            headers: std::collections::HashMap::new(),
            read_timeout: Duration::from_secs(5),
            retries: 0,
            retry_backoff: Duration::from_millis(10),
            oauth_provider: None,
            logger: None,
        }
    }

    #[tokio::test]
    async fn plain_json_response_is_returned_directly() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"jsonrpc": "2.0", "id": 0, "result": {"serverInfo": {"name": "t", "version": "1"}}}),
            ))
            .mount(&server)
            .await;

        let transport = StreamableHttpTransport::new(config(server.uri())).unwrap();
        let result = transport.ensure_connected(serde_json::json!({})).await.unwrap();
        assert_eq!(result["serverInfo"]["name"], "t");
    }

    #[tokio::test]
    async fn sse_framed_response_with_intermediate_notification_is_dispatched_and_final_frame_returned() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .and(body_partial_json(serde_json::json!({"method": "initialize"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"jsonrpc": "2.0", "id": 0, "result": {"serverInfo": {"name": "t", "version": "1"}}}),
            ))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .and(body_partial_json(serde_json::json!({"method": "notifications/initialized"})))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;
        let body = concat!(
            "event: message\ndata: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\",\"params\":{\"progress\":1}}\nid: 1\n\n",
            "event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"ok\":true}}\nid: 2\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .and(body_partial_json(serde_json::json!({"method": "tools/list"})))
            .respond_with(
                ResponseTemplate::new(200).insert_header("Content-Type", "text/event-stream").set_body_string(body),
            )
            .mount(&server)
            .await;

        let transport = StreamableHttpTransport::new(config(server.uri())).unwrap();
        transport.ensure_connected(serde_json::json!({})).await.unwrap();
        let mut inbound = transport.take_inbound().await.unwrap();
        let result = transport.rpc_request("tools/list", Value::Null, None).await.unwrap();
        assert_eq!(result["ok"], true);
        assert_eq!(transport.last_event_id.load(Ordering::Acquire), 2);

        let event = inbound.try_recv().unwrap();
        match event {
            InboundEvent::Notification { method, .. } => assert_eq!(method, "notifications/progress"),
            other => panic!("expected Notification, got {other:?}"),
        }
    }
}
