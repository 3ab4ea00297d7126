//! SSE transport (spec.md §4.D): a long-lived `GET` event stream paired
//! with a `POST` side channel for outbound frames, an `endpoint`-event
//! handshake, an inactivity watchdog, and bounded reconnection.
//!
//! Grounded on the teacher's `server/transport.rs` SSE *producer* side
//! (`build_sse_stream_with_endpoint`, which emits the `endpoint` event
//! first) read in reverse: this module is the consumer of such a stream.
//! The background-reader-task-plus-`PendingTable` shape matches
//! [`super::stdio::StdioTransport`].

use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest_middleware::ClientWithMiddleware;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};

use super::base::{build_http_client, build_retrying_client, ConnectionFlags, PendingTable, SessionId};
use super::{InboundEvent, Transport};
use crate::config::SseConfig;
use crate::error::{ConnectionError, McpError, McpResult, TransportError};
use crate::rpc::{classify, Frame, IdAllocator, JsonRpcNotification, JsonRpcReply, JsonRpcRequest};

/// If `2.5 * ping` elapses with no inbound activity, the connection is
/// considered dead (spec.md §4.D).
const INACTIVITY_MULTIPLE: u32 = 25; // 2.5 expressed in tenths, applied below.

/// Consecutive ping failures before a forced reconnect (spec.md §4.D).
const MAX_PING_FAILURES: u32 = 3;

/// One `event:`/`data:`/`id:`/`retry:` block parsed from an SSE byte stream
/// (spec.md §4.D: "trims surrounding whitespace; requires a `data:` line;
/// concatenates multi-line `data:` with newlines").
#[derive(Debug, Clone, Default)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
    pub retry: Option<String>,
}

/// Incrementally feed raw SSE bytes in and pop completed events out.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
}

impl SseParser {
    pub fn feed(&mut self, chunk: &str) {
        self.buffer.push_str(chunk);
    }

    /// Pop the next complete event (terminated by a blank line), if any.
    pub fn pop_event(&mut self) -> Option<SseEvent> {
        let boundary = self.buffer.find("\n\n")?;
        let raw: String = self.buffer.drain(..=boundary + 1).collect();
        Some(parse_event_block(&raw))
    }
}

fn parse_event_block(block: &str) -> SseEvent {
    let mut event = SseEvent::default();
    let mut data_lines = Vec::new();
    for line in block.lines() {
        let line = line.trim_end_matches('\r');
        if let Some(value) = line.strip_prefix("event:") {
            event.event = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("id:") {
            event.id = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("retry:") {
            event.retry = Some(value.trim().to_string());
        }
    }
    event.data = data_lines.join("\n");
    event
}

pub struct SseTransport {
    config: SseConfig,
    base_url: url::Url,
    client: ClientWithMiddleware,
    session_id: SessionId,
    flags: ConnectionFlags,
    ids: IdAllocator,
    pending: PendingTable,
    rpc_endpoint: StdMutex<Option<url::Url>>,
    inbound_tx: mpsc::UnboundedSender<InboundEvent>,
    inbound_rx: AsyncMutex<Option<mpsc::UnboundedReceiver<InboundEvent>>>,
    last_activity: StdMutex<Instant>,
    ping_failures: AtomicU32,
    reconnect_attempts: AtomicU32,
    connect_guard: tokio::sync::Mutex<()>,
    reader_shutdown: AsyncMutex<Option<oneshot::Sender<()>>>,
    last_event_id: AtomicI64,
}

impl SseTransport {
    /// # Errors
    ///
    /// Returns [`TransportError`] if `config.http.base_url` isn't a valid
    /// `http(s)` URL or the underlying client fails to build.
    pub fn new(config: SseConfig) -> McpResult<Self> {
        let base_url = url::Url::parse(&config.http.base_url)
            .map_err(|e| TransportError::Framing(format!("invalid server URL: {e}")))?;
        super::base::validate_url(&base_url)?;

        let client = build_http_client(config.http.read_timeout)?;
        let client = build_retrying_client(client, config.http.retries, config.http.retry_backoff);
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        Ok(Self {
            config,
            base_url,
            client,
            session_id: SessionId::default(),
            flags: ConnectionFlags::default(),
            ids: IdAllocator::new(),
            pending: PendingTable::default(),
            rpc_endpoint: StdMutex::new(None),
            inbound_tx,
            inbound_rx: AsyncMutex::new(Some(inbound_rx)),
            last_activity: StdMutex::new(Instant::now()),
            ping_failures: AtomicU32::new(0),
            reconnect_attempts: AtomicU32::new(0),
            connect_guard: tokio::sync::Mutex::new(()),
            reader_shutdown: AsyncMutex::new(None),
            last_event_id: AtomicI64::new(-1),
        })
    }

    /// Hand the caller the channel the server facade drains for
    /// notifications/server-initiated requests. Call at most once.
    pub async fn take_inbound(&self) -> Option<mpsc::UnboundedReceiver<InboundEvent>> {
        self.inbound_rx.lock().await.take()
    }

    fn touch_activity(&self) {
        *self.last_activity.lock().expect("last_activity mutex poisoned") = Instant::now();
    }

    fn millis_since_activity(&self) -> u128 {
        self.last_activity.lock().expect("last_activity mutex poisoned").elapsed().as_millis()
    }

    fn rpc_endpoint(&self) -> Option<url::Url> {
        self.rpc_endpoint.lock().expect("rpc_endpoint mutex poisoned").clone()
    }

    fn apply_headers(&self, mut builder: reqwest_middleware::RequestBuilder) -> reqwest_middleware::RequestBuilder {
        for (k, v) in &self.config.http.headers {
            builder = builder.header(k, v);
        }
        if let Some(session_id) = self.session_id.get() {
            builder = builder.header("Mcp-Session-Id", session_id);
        }
        builder
    }

    async fn post_frame(&self, body: impl serde::Serialize) -> McpResult<()> {
        let endpoint = self
            .rpc_endpoint()
            .ok_or_else(|| McpError::Connection(ConnectionError::Closed("SSE endpoint not yet established".to_string())))?;
        let builder = self.apply_headers(self.client.post(endpoint)).header(reqwest::header::CONTENT_TYPE, "application/json").json(&body);
        let response = builder.send().await.map_err(TransportError::Middleware)?;
        if let Some(header) = response.headers().get("Mcp-Session-Id") {
            if let Ok(header_str) = header.to_str() {
                self.session_id.set(header_str).map_err(McpError::Connection)?;
            }
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(McpError::Transport(TransportError::HttpStatus { status, message }));
        }
        Ok(())
    }

    /// Open the GET stream, await the `endpoint` event, and spin up the
    /// background reader task. Blocks until the endpoint is known.
    async fn open_stream(self: &std::sync::Arc<Self>) -> McpResult<()> {
        let mut sse_url = self.base_url.clone();
        {
            let mut segments = sse_url.path_segments_mut().map_err(|()| {
                TransportError::Framing("server URL cannot be a base for SSE path join".to_string())
            })?;
            segments.pop_if_empty().push("sse");
        }

        let mut builder = self.client.get(sse_url).header(reqwest::header::ACCEPT, "text/event-stream");
        for (k, v) in &self.config.http.headers {
            builder = builder.header(k, v);
        }
        let response = builder.send().await.map_err(TransportError::Middleware)?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(McpError::Transport(TransportError::HttpStatus { status, message: "SSE GET failed".to_string() }));
        }

        let mut byte_stream = response.bytes_stream();
        let mut parser = SseParser::default();

        // Block until the `endpoint` event arrives, per spec.md §4.D handshake.
        let endpoint_url = 'handshake: loop {
            let Some(chunk) = byte_stream.next().await else {
                return Err(McpError::Connection(ConnectionError::Closed(
                    "SSE stream closed before the endpoint event arrived".to_string(),
                )));
            };
            let chunk = chunk.map_err(TransportError::Http)?;
            parser.feed(&String::from_utf8_lossy(&chunk));
            while let Some(event) = parser.pop_event() {
                if event.event.as_deref() == Some("endpoint") {
                    let joined = self.base_url.join(event.data.trim()).map_err(|e| {
                        McpError::Transport(TransportError::Framing(format!("invalid endpoint event data: {e}")))
                    })?;
                    break 'handshake joined;
                }
            }
        };

        *self.rpc_endpoint.lock().expect("rpc_endpoint mutex poisoned") = Some(endpoint_url);
        self.touch_activity();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        *self.reader_shutdown.lock().await = Some(shutdown_tx);

        let this = std::sync::Arc::clone(self);
        tokio::spawn(async move {
            this.run_reader(byte_stream, parser, shutdown_rx).await;
        });

        Ok(())
    }

    async fn run_reader(
        &self,
        mut byte_stream: impl futures::Stream<Item = reqwest::Result<bytes::Bytes>> + Unpin,
        mut parser: SseParser,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => return,
                chunk = byte_stream.next() => {
                    match chunk {
                        Some(Ok(bytes)) => {
                            self.touch_activity();
                            parser.feed(&String::from_utf8_lossy(&bytes));
                            while let Some(event) = parser.pop_event() {
                                self.dispatch_event(event);
                            }
                        }
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "SSE stream read error");
                            self.pending.fail_all("SSE stream read error");
                            return;
                        }
                        None => {
                            tracing::debug!("SSE stream closed");
                            self.pending.fail_all("SSE stream closed");
                            return;
                        }
                    }
                }
            }
        }
    }

    fn dispatch_event(&self, event: SseEvent) {
        if let Some(id) = &event.id {
            if let Ok(n) = id.parse::<i64>() {
                self.last_event_id.store(n, Ordering::Release);
            }
        }
        if event.event.as_deref() == Some("endpoint") {
            return;
        }
        let Ok(value) = serde_json::from_str::<Value>(&event.data) else {
            tracing::warn!(data = %event.data, "SSE message event did not contain valid JSON");
            return;
        };
        match classify(&value) {
            Ok(Frame::Response { id, outcome }) => {
                if let Some(n) = id.as_i64() {
                    self.pending.resolve(n, outcome.map_err(McpError::Server));
                }
            }
            Ok(Frame::Notification { method, params }) => {
                let _ = self.inbound_tx.send(InboundEvent::Notification { method, params });
            }
            Ok(Frame::ServerRequest { id, method, params }) => {
                let _ = self.inbound_tx.send(InboundEvent::ServerRequest { id, method, params });
            }
            Err(e) => tracing::warn!(error = %e, "could not classify SSE message event"),
        }
    }

    async fn watchdog(self: std::sync::Arc<Self>) {
        let ping = self.config.ping;
        let mut interval = tokio::time::interval(ping);
        loop {
            interval.tick().await;
            if !self.flags.is_ready() {
                continue;
            }
            let elapsed = self.millis_since_activity() as u64;
            if elapsed >= ping.as_millis() as u64 {
                match self.rpc_request("ping", Value::Null, Some(ping)).await {
                    Ok(_) => self.ping_failures.store(0, Ordering::Release),
                    Err(e) => {
                        tracing::warn!(error = %e, "SSE inactivity ping failed");
                        self.ping_failures.fetch_add(1, Ordering::AcqRel);
                    }
                }
            }
            let dead_after = ping.as_millis() * u128::from(INACTIVITY_MULTIPLE) / 10;
            if self.millis_since_activity() >= dead_after || self.ping_failures.load(Ordering::Acquire) >= MAX_PING_FAILURES {
                tracing::warn!("SSE connection considered dead, reconnecting");
                self.pending.fail_all("SSE connection inactive, reconnecting");
                if let Err(e) = self.reconnect().await {
                    tracing::error!(error = %e, "SSE reconnect failed");
                }
            }
        }
    }

    async fn reconnect(self: &std::sync::Arc<Self>) -> McpResult<()> {
        let attempts = self.reconnect_attempts.load(Ordering::Acquire);
        if attempts >= crate::config::defaults::MAX_RECONNECT_ATTEMPTS {
            return Err(McpError::Connection(ConnectionError::Closed(
                "max SSE reconnect attempts exceeded".to_string(),
            )));
        }
        let backoff = Duration::from_millis(200 * 2u64.pow(attempts.min(6)));
        tokio::time::sleep(backoff).await;
        self.reconnect_attempts.fetch_add(1, Ordering::AcqRel);

        if let Some(sender) = self.reader_shutdown.lock().await.take() {
            let _ = sender.send(());
        }
        self.open_stream().await?;
        self.ping_failures.store(0, Ordering::Release);
        self.reconnect_attempts.store(0, Ordering::Release);
        Ok(())
    }
}

#[async_trait]
impl Transport for SseTransport {
    async fn ensure_connected(&self, initialize_params: Value) -> McpResult<Value> {
        let _guard = self.connect_guard.lock().await;
        if self.flags.is_ready() {
            return Ok(self.flags.cached_init_result().unwrap_or(Value::Null));
        }
        Err(McpError::Connection(ConnectionError::Closed(
            "SseTransport must be connected via SseTransport::connect before ensure_connected".to_string(),
        )))
    }

    async fn rpc_request(&self, method: &str, params: Value, timeout: Option<Duration>) -> McpResult<Value> {
        if method != "initialize" && !self.flags.is_ready() {
            return Err(McpError::Connection(ConnectionError::Closed("not initialized".to_string())));
        }
        let id = self.ids.next();
        let request = JsonRpcRequest::new(id, method, params);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        if let Err(e) = self.post_frame(&request).await {
            self.pending.remove(id);
            return Err(e);
        }

        let wait = timeout.unwrap_or(self.config.http.read_timeout);
        match tokio::time::timeout(wait, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(McpError::Connection(ConnectionError::Closed("response channel closed".to_string()))),
            Err(_) => {
                self.pending.remove(id);
                Err(McpError::Transport(TransportError::Timeout(wait)))
            }
        }
    }

    async fn rpc_notify(&self, method: &str, params: Value) -> McpResult<()> {
        self.post_frame(&JsonRpcNotification::new(method, params)).await
    }

    async fn cleanup(&self) -> McpResult<()> {
        self.flags.reset();
        self.pending.fail_all("transport cleanup");
        if let Some(sender) = self.reader_shutdown.lock().await.take() {
            let _ = sender.send(());
        }
        if let Some(session_id) = self.session_id.get() {
            if let Some(endpoint) = self.rpc_endpoint() {
                let mut builder = self.client.delete(endpoint).header("Mcp-Session-Id", &session_id);
                for (k, v) in &self.config.http.headers {
                    builder = builder.header(k, v);
                }
                if let Err(e) = builder.send().await {
                    tracing::warn!(error = %e, "session-termination DELETE failed");
                }
            }
            self.session_id.clear();
        }
        Ok(())
    }

    /// Answer a server-initiated request by POSTing the reply to the RPC
    /// endpoint (spec.md §4.D: "responses to them are written back by POST
    /// to `rpc_endpoint`").
    async fn reply_to_server_request(&self, reply: JsonRpcReply) -> McpResult<()> {
        self.post_frame(reply).await
    }
}

impl SseTransport {
    /// Open the SSE stream, perform the `initialize`/`notifications/initialized`
    /// handshake, and start the inactivity watchdog. This is the real
    /// connect entry point; [`Transport::ensure_connected`] only covers the
    /// already-connected fast path since the trait is synchronous over
    /// `&self` while opening the stream needs a shared `Arc<Self>` for the
    /// reader/watchdog tasks it spawns.
    ///
    /// # Errors
    ///
    /// Returns [`McpError`] if the stream can't be opened or `initialize`
    /// fails.
    pub async fn connect(self: &std::sync::Arc<Self>, initialize_params: Value) -> McpResult<Value> {
        let _guard = self.connect_guard.lock().await;
        if self.flags.is_ready() {
            return Ok(self.flags.cached_init_result().unwrap_or(Value::Null));
        }
        self.open_stream().await?;
        self.flags.mark_established();

        let result = self.rpc_request("initialize", initialize_params, Some(self.config.http.read_timeout)).await?;
        self.flags.mark_initialized(result.clone());
        self.rpc_notify("notifications/initialized", Value::Null).await?;

        tokio::spawn(std::sync::Arc::clone(self).watchdog());
        Ok(result)
    }
}
