//! Shared state and helpers every concrete transport is built on
//! (spec.md §4.B): connection lifecycle flags, the pending-response table,
//! session-ID capture/validation, URL checks, and the retry-client builder.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use regex::Regex;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use tokio::sync::oneshot;

use crate::error::{ConnectionError, McpError, McpResult, TransportError};

fn session_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{8,128}$").expect("session id regex is valid"))
}

/// Validate a server-issued session id against spec.md §4.B / §8.
///
/// # Errors
///
/// Returns [`ConnectionError::InvalidSessionId`] if it doesn't match
/// `^[A-Za-z0-9_-]{8,128}$`.
pub fn validate_session_id(id: &str) -> Result<(), ConnectionError> {
    if session_id_pattern().is_match(id) {
        Ok(())
    } else {
        Err(ConnectionError::InvalidSessionId(id.to_string()))
    }
}

/// Reject non-`http(s)` schemes outright; warn (not fail) when the host is
/// `0.0.0.0` (spec.md §4.B).
///
/// # Errors
///
/// Returns [`TransportError::UnsupportedScheme`] for any scheme other than
/// `http`/`https`.
pub fn validate_url(url: &url::Url) -> Result<(), TransportError> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(TransportError::UnsupportedScheme(url.scheme().to_string()));
    }
    if url.host_str() == Some("0.0.0.0") {
        tracing::warn!(%url, "server URL host is 0.0.0.0, this is unlikely to be reachable");
    }
    Ok(())
}

/// The `connection_established` / `initialized` two-flag machine
/// (spec.md §4.B) plus the cached `initialize` result so repeat
/// `ensure_connected` calls are no-ops.
#[derive(Debug, Default)]
pub struct ConnectionFlags {
    established: AtomicBool,
    initialized: AtomicBool,
    cached_init_result: Mutex<Option<serde_json::Value>>,
}

impl ConnectionFlags {
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.established.load(Ordering::Acquire) && self.initialized.load(Ordering::Acquire)
    }

    pub fn mark_established(&self) {
        self.established.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_established(&self) -> bool {
        self.established.load(Ordering::Acquire)
    }

    pub fn mark_initialized(&self, result: serde_json::Value) {
        *self.cached_init_result.lock().expect("connection flags mutex poisoned") = Some(result);
        self.initialized.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn cached_init_result(&self) -> Option<serde_json::Value> {
        self.cached_init_result.lock().expect("connection flags mutex poisoned").clone()
    }

    pub fn reset(&self) {
        self.established.store(false, Ordering::Release);
        self.initialized.store(false, Ordering::Release);
        *self.cached_init_result.lock().expect("connection flags mutex poisoned") = None;
    }
}

/// Holds the session id captured from an `initialize` response, once any
/// (spec.md §4.B).
#[derive(Debug, Default)]
pub struct SessionId(Mutex<Option<String>>);

impl SessionId {
    #[must_use]
    pub fn get(&self) -> Option<String> {
        self.0.lock().expect("session id mutex poisoned").clone()
    }

    /// # Errors
    ///
    /// Returns [`ConnectionError::InvalidSessionId`] when `value` fails
    /// spec.md's session-id format check.
    pub fn set(&self, value: impl Into<String>) -> Result<(), ConnectionError> {
        let value = value.into();
        validate_session_id(&value)?;
        *self.0.lock().expect("session id mutex poisoned") = Some(value);
        Ok(())
    }

    pub fn clear(&self) {
        *self.0.lock().expect("session id mutex poisoned") = None;
    }
}

/// Build a [`reqwest::Client`] with the 3-hop redirect cap (spec.md §4.B)
/// and a read timeout.
///
/// # Errors
///
/// Propagates `reqwest::ClientBuilder::build` failures.
pub fn build_http_client(read_timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder().timeout(read_timeout).redirect(reqwest::redirect::Policy::limited(3)).build()
}

/// Wrap a client with the exponential-backoff retry middleware (spec.md
/// §4.B): only transient transport failures are retried, up to `retries`
/// attempts starting at `retry_backoff`.
#[must_use]
pub fn build_retrying_client(client: reqwest::Client, retries: u32, retry_backoff: Duration) -> ClientWithMiddleware {
    let policy =
        ExponentialBackoff::builder().retry_bounds(retry_backoff, retry_backoff * 10).build_with_max_retries(retries);
    ClientBuilder::new(client).with(RetryTransientMiddleware::new_with_policy(policy)).build()
}

/// A slot in the `id -> sender` pending-response table (spec.md §4.C/D/F),
/// resolved by a transport's background reader and awaited (optionally
/// with a timeout) by `rpc_request`.
pub type PendingSender = oneshot::Sender<McpResult<serde_json::Value>>;

#[derive(Debug, Default)]
pub struct PendingTable(Mutex<HashMap<i64, PendingSender>>);

impl PendingTable {
    pub fn insert(&self, id: i64, tx: PendingSender) {
        self.0.lock().expect("pending table mutex poisoned").insert(id, tx);
    }

    pub fn remove(&self, id: i64) -> Option<PendingSender> {
        self.0.lock().expect("pending table mutex poisoned").remove(&id)
    }

    /// Resolve a pending slot for `id`; silently dropped if no caller is
    /// waiting (a timeout or cancellation may have already removed it).
    pub fn resolve(&self, id: i64, outcome: McpResult<serde_json::Value>) {
        if let Some(tx) = self.remove(id) {
            let _ = tx.send(outcome);
        }
    }

    /// Fail every pending slot, e.g. on reader EOF or `cleanup` (spec.md §5:
    /// "`cleanup`... fails all pending slots with `ConnectionError`").
    pub fn fail_all(&self, message: &str) {
        let mut guard = self.0.lock().expect("pending table mutex poisoned");
        for (_, tx) in guard.drain() {
            let _ = tx.send(Err(McpError::Connection(ConnectionError::Closed(message.to_string()))));
        }
    }
}
