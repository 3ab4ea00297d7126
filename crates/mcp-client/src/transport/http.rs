//! HTTP transport (spec.md §4.E): one POST per request, simple
//! request/response, no persistent connection.
//!
//! Grounded on the teacher's `reqwest` + `reqwest-middleware` +
//! `reqwest-retry` client-construction pattern (connection pooling,
//! `ExponentialBackoff` retry policy), generalized from a fixed
//! Semantic-Scholar base URL to the configurable `base_url`/`endpoint`/
//! session-ID handling spec.md §4.B/§4.E require.

use std::time::Duration;

use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use serde_json::Value;

use super::base::{build_http_client, build_retrying_client, ConnectionFlags, SessionId};
use super::Transport;
use crate::config::HttpConfig;
use crate::error::{ConnectionError, McpError, McpResult, TransportError};
use crate::rpc::{classify, Frame, IdAllocator, JsonRpcNotification, JsonRpcRequest};

pub struct HttpTransport {
    config: HttpConfig,
    client: ClientWithMiddleware,
    url: url::Url,
    session_id: SessionId,
    flags: ConnectionFlags,
    ids: IdAllocator,
    connect_guard: tokio::sync::Mutex<()>,
}

impl HttpTransport {
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

        Ok(Self {
            config,
            client,
            url,
            session_id: SessionId::default(),
            flags: ConnectionFlags::default(),
            ids: IdAllocator::new(),
            connect_guard: tokio::sync::Mutex::new(()),
        })
    }

    fn apply_headers(&self, mut builder: reqwest_middleware::RequestBuilder) -> reqwest_middleware::RequestBuilder {
        builder = builder.header(reqwest::header::ACCEPT, "application/json");
        builder = builder.header(reqwest::header::CONTENT_TYPE, "application/json");
        for (k, v) in &self.config.headers {
            builder = builder.header(k, v);
        }
        if let Some(session_id) = self.session_id.get() {
            builder = builder.header("Mcp-Session-Id", session_id);
        }
        builder
    }

    async fn raw_request(&self, method: &str, params: Value, timeout: Option<Duration>) -> McpResult<Value> {
        let id = self.ids.next();
        let request = JsonRpcRequest::new(id, method, params);

        let mut builder = self.apply_headers(self.client.post(self.url.clone()));
        builder = builder.json(&request);
        if let Some(d) = timeout {
            builder = builder.timeout(d);
        }

        let response = builder.send().await.map_err(TransportError::Middleware)?;

        if let Some(header) = response.headers().get("Mcp-Session-Id") {
            if let Ok(header_str) = header.to_str() {
                self.session_id.set(header_str).map_err(McpError::Connection)?;
            }
        }

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(McpError::Transport(TransportError::HttpStatus { status: status.as_u16(), message }));
        }

        let body: Value = response.json().await.map_err(TransportError::Http)?;
        match classify(&body)? {
            Frame::Response { outcome, .. } => outcome.map_err(McpError::Server),
            Frame::Notification { .. } | Frame::ServerRequest { .. } => {
                Err(McpError::Transport(TransportError::Framing(
                    "HTTP transport received a non-response frame".to_string(),
                )))
            }
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn ensure_connected(&self, initialize_params: Value) -> McpResult<Value> {
        let _guard = self.connect_guard.lock().await;
        if self.flags.is_ready() {
            return Ok(self.flags.cached_init_result().unwrap_or(Value::Null));
        }
        self.flags.mark_established();

        let result = self.raw_request("initialize", initialize_params, Some(self.config.read_timeout)).await?;
        self.flags.mark_initialized(result.clone());
        self.rpc_notify("notifications/initialized", Value::Null).await?;
        Ok(result)
    }

    async fn rpc_request(&self, method: &str, params: Value, timeout: Option<Duration>) -> McpResult<Value> {
        if method != "initialize" && !self.flags.is_ready() {
            return Err(McpError::Connection(ConnectionError::Closed("not initialized".to_string())));
        }
        self.raw_request(method, params, timeout.or(Some(self.config.read_timeout))).await
    }

    async fn rpc_notify(&self, method: &str, params: Value) -> McpResult<()> {
        let notification = JsonRpcNotification::new(method, params);
        let builder = self.apply_headers(self.client.post(self.url.clone())).json(&notification);
        builder.send().await.map_err(TransportError::Middleware)?;
        Ok(())
    }

    async fn cleanup(&self) -> McpResult<()> {
        self.flags.reset();
        if let Some(session_id) = self.session_id.get() {
            let mut builder = self.client.delete(self.url.clone()).header("Mcp-Session-Id", &session_id);
            for (k, v) in &self.config.headers {
                builder = builder.header(k, v);
            }
            // Cleanup errors are swallowed and logged (spec.md §7).
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
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: String) -> HttpConfig {
        HttpConfig {
            name: "test".to_string(),
            base_url,
            endpoint: "/rpc".to_string(),
            headers: std::collections::HashMap::new(),
            read_timeout: Duration::from_secs(5),
            retries: 0,
            retry_backoff: Duration::from_millis(10),
            oauth_provider: None,
            logger: None,
        }
    }

    #[tokio::test]
    async fn initialize_captures_session_id_and_sends_initialized() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/rpc"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Mcp-Session-Id", "abc12345")
                    .set_body_json(serde_json::json!({"jsonrpc": "2.0", "id": 0, "result": {"serverInfo": {"name": "t", "version": "1"}}})),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;

        Mock::given(method("POST")).and(path("/rpc")).respond_with(ResponseTemplate::new(202)).mount(&server).await;

        let transport = HttpTransport::new(config(server.uri())).unwrap();
        let result = transport.ensure_connected(serde_json::json!({})).await.unwrap();
        assert_eq!(result["serverInfo"]["name"], "t");
        assert_eq!(transport.session_id.get().as_deref(), Some("abc12345"));
    }

    #[tokio::test]
    async fn cleanup_sends_delete_with_session_header() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/rpc"))
            .and(header("Mcp-Session-Id", "abc12345"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(config(server.uri())).unwrap();
        transport.session_id.set("abc12345").unwrap();
        transport.cleanup().await.unwrap();
        assert!(transport.session_id.get().is_none());

        // Second cleanup is a no-op: no session id left to DELETE with.
        transport.cleanup().await.unwrap();
    }

    #[tokio::test]
    async fn server_error_response_surfaces_as_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rpc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"jsonrpc": "2.0", "id": 0, "error": {"code": -32000, "message": "boom"}}),
            ))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(config(server.uri())).unwrap();
        let err = transport.ensure_connected(serde_json::json!({})).await.unwrap_err();
        match err {
            McpError::Server(e) => assert_eq!(e.message, "boom"),
            other => panic!("expected Server error, got {other:?}"),
        }
    }
}
