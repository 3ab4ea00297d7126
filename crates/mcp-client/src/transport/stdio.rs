//! Stdio transport (spec.md §4.C): spawns the configured command as a
//! child process and speaks line-delimited JSON-RPC over its stdio.
//!
//! Grounded on the spawn/pending-table/reader-task shape used for MCP
//! stdio clients elsewhere in the ecosystem, adapted to this crate's
//! shared [`ConnectionFlags`]/[`PendingTable`] base and a `tokio::sync::Mutex`
//! guarded handshake instead of a bare `AtomicI64` id counter.

use std::process::Stdio as StdStdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot, Mutex};

use super::base::{ConnectionFlags, PendingTable};
use super::{InboundEvent, Transport};
use crate::config::StdioConfig;
use crate::error::{ConnectionError, McpError, McpResult, TransportError};
use crate::rpc::{classify, Frame, JsonRpcNotification, JsonRpcRequest, JsonRpcReply};

/// Grace period given to the child after closing its stdin before it is
/// killed outright on shutdown (spec.md §4.C: "attempt graceful... then
/// terminate").
const GRACEFUL_SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

pub struct StdioTransport {
    config: StdioConfig,
    inbound_tx: mpsc::Sender<InboundEvent>,
    child: Mutex<Option<Child>>,
    stdin_tx: Mutex<Option<mpsc::Sender<String>>>,
    reader_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    writer_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    pending: Arc<PendingTable>,
    flags: ConnectionFlags,
    ids: crate::rpc::IdAllocator,
    connect_guard: Mutex<()>,
}

impl StdioTransport {
    #[must_use]
    pub fn new(config: StdioConfig, inbound_tx: mpsc::Sender<InboundEvent>) -> Self {
        Self {
            config,
            inbound_tx,
            child: Mutex::new(None),
            stdin_tx: Mutex::new(None),
            reader_task: Mutex::new(None),
            writer_task: Mutex::new(None),
            pending: Arc::new(PendingTable::default()),
            flags: ConnectionFlags::default(),
            ids: crate::rpc::IdAllocator::new(),
            connect_guard: Mutex::new(()),
        }
    }

    async fn spawn(&self) -> McpResult<()> {
        let [program, args @ ..] = self.config.command.as_slice() else {
            return Err(McpError::Validation("stdio command must have at least one element".to_string()));
        };

        let mut child = tokio::process::Command::new(program)
            .args(args)
            .envs(self.config.env.clone())
            .stdin(StdStdio::piped())
            .stdout(StdStdio::piped())
            .stderr(StdStdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(TransportError::Io)?;

        let stdin = child.stdin.take().ok_or_else(|| TransportError::Io(std::io::Error::other("no child stdin")))?;
        let stdout =
            child.stdout.take().ok_or_else(|| TransportError::Io(std::io::Error::other("no child stdout")))?;
        let stderr = child.stderr.take();

        let (stdin_tx, mut stdin_rx) = mpsc::channel::<String>(128);
        let writer_task = tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(line) = stdin_rx.recv().await {
                if stdin.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
                if stdin.write_all(b"\n").await.is_err() {
                    break;
                }
                if stdin.flush().await.is_err() {
                    break;
                }
            }
        });

        let pending = Arc::clone(&self.pending);
        let inbound_tx = self.inbound_tx.clone();
        let reader_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        Self::dispatch_line(&line, &pending, &inbound_tx).await;
                    }
                    Ok(None) | Err(_) => {
                        pending.fail_all("stdio reader reached EOF");
                        break;
                    }
                }
            }
        });

        if let Some(stderr) = stderr {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::warn!(target: "mcp_client::stdio_stderr", "{line}");
                }
            });
        }

        *self.child.lock().await = Some(child);
        *self.stdin_tx.lock().await = Some(stdin_tx);
        *self.reader_task.lock().await = Some(reader_task);
        *self.writer_task.lock().await = Some(writer_task);
        self.flags.mark_established();
        Ok(())
    }

    async fn dispatch_line(line: &str, pending: &PendingTable, inbound_tx: &mpsc::Sender<InboundEvent>) {
        let value: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "malformed JSON from stdio server: {line}");
                return;
            }
        };

        match classify(&value) {
            Ok(Frame::Response { id, outcome }) => {
                if let Some(id) = id.as_i64() {
                    pending.resolve(id, outcome.map_err(McpError::Server));
                }
            }
            Ok(Frame::Notification { method, params }) => {
                let _ = inbound_tx.send(InboundEvent::Notification { method, params }).await;
            }
            Ok(Frame::ServerRequest { id, method, params }) => {
                let _ = inbound_tx.send(InboundEvent::ServerRequest { id, method, params }).await;
            }
            Err(e) => tracing::warn!(error = %e, "unclassifiable stdio frame: {line}"),
        }
    }

    async fn write_raw(&self, payload: String) -> McpResult<()> {
        let guard = self.stdin_tx.lock().await;
        let tx = guard.as_ref().ok_or_else(|| McpError::Connection(ConnectionError::Closed("not connected".into())))?;
        tx.send(payload)
            .await
            .map_err(|_| McpError::Connection(ConnectionError::Closed("stdin writer closed".into())))
    }

    async fn raw_request(&self, method: &str, params: Value, timeout: Option<Duration>) -> McpResult<Value> {
        let id = self.ids.next();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        let request = JsonRpcRequest::new(id, method, params);
        let payload = serde_json::to_string(&request).map_err(TransportError::Serialization)?;
        if let Err(e) = self.write_raw(payload).await {
            self.pending.remove(id);
            return Err(e);
        }

        let recv = async {
            rx.await.map_err(|_| McpError::Connection(ConnectionError::Closed("response channel closed".into())))
        };
        match timeout {
            Some(d) => match tokio::time::timeout(d, recv).await {
                Ok(result) => result?,
                Err(_) => {
                    self.pending.remove(id);
                    Err(McpError::Transport(TransportError::Timeout(d)))
                }
            },
            None => recv.await?,
        }
    }

}

#[async_trait]
impl Transport for StdioTransport {
    async fn ensure_connected(&self, initialize_params: Value) -> McpResult<Value> {
        let _guard = self.connect_guard.lock().await;
        if self.flags.is_ready() {
            return Ok(self.flags.cached_init_result().unwrap_or(Value::Null));
        }

        if !self.flags.is_established() {
            self.spawn().await?;
        }

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
        let payload = serde_json::to_string(&notification).map_err(TransportError::Serialization)?;
        self.write_raw(payload).await
    }

    async fn cleanup(&self) -> McpResult<()> {
        self.pending.fail_all("cleanup");
        self.flags.reset();

        *self.stdin_tx.lock().await = None;
        tokio::time::sleep(GRACEFUL_SHUTDOWN_GRACE).await;

        if let Some(mut child) = self.child.lock().await.take() {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
        if let Some(task) = self.reader_task.lock().await.take() {
            task.abort();
        }
        if let Some(task) = self.writer_task.lock().await.take() {
            task.abort();
        }
        Ok(())
    }

    /// Answer a server-initiated request (spec.md §4.G): used by the server
    /// facade's request router.
    async fn reply_to_server_request(&self, reply: JsonRpcReply) -> McpResult<()> {
        let payload = serde_json::to_string(&reply).map_err(TransportError::Serialization)?;
        self.write_raw(payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(command: Vec<&str>) -> StdioConfig {
        StdioConfig {
            name: "test".to_string(),
            command: command.into_iter().map(str::to_string).collect(),
            env: std::collections::HashMap::new(),
            logger: None,
            read_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn echo_round_trip_over_real_child_process() {
        // A plain `cat` would echo the outbound request line verbatim,
        // which `classify` reads as a `ServerRequest` (it has both `method`
        // and `id`), not a `Response` — the pending table would never
        // resolve. This fixture instead discards the request and replies
        // with a canned, well-formed response, matching the id the fresh
        // transport's `IdAllocator` is guaranteed to hand out first (0).
        let fixture = "read -r _; \
             printf '%s\\n' '{\"jsonrpc\":\"2.0\",\"id\":0,\"result\":{\"protocolVersion\":\"2025-06-18\",\"serverInfo\":{\"name\":\"fixture\",\"version\":\"1.0\"}}}'; \
             cat >/dev/null";
        let (inbound_tx, _inbound_rx) = mpsc::channel(16);
        let transport = StdioTransport::new(config(vec!["sh", "-c", fixture]), inbound_tx);

        let result = transport.ensure_connected(serde_json::json!({"protocolVersion": "2025-06-18"})).await.unwrap();
        assert_eq!(
            result,
            serde_json::json!({"protocolVersion": "2025-06-18", "serverInfo": {"name": "fixture", "version": "1.0"}})
        );
        assert!(transport.flags.is_ready());

        // Second call is a no-op returning the cached result.
        let again = transport.ensure_connected(serde_json::json!({"protocolVersion": "ignored"})).await.unwrap();
        assert_eq!(again, result);

        transport.cleanup().await.unwrap();
    }

    #[tokio::test]
    async fn rejects_rpc_before_initialize() {
        let (inbound_tx, _rx) = mpsc::channel(16);
        let transport = StdioTransport::new(config(vec!["cat"]), inbound_tx);
        let err = transport.rpc_request("tools/list", Value::Null, None).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn empty_command_fails_at_connect_time() {
        let (inbound_tx, _rx) = mpsc::channel(16);
        let transport = StdioTransport::new(config(vec![]), inbound_tx);
        let err = transport.ensure_connected(Value::Null).await;
        assert!(err.is_err());
    }
}
