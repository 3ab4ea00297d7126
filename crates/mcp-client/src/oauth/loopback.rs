//! Single-connection loopback HTTP server used to receive the OAuth
//! authorization-code redirect (spec.md §4.I step 5).
//!
//! Built directly on `tokio::net::TcpListener` rather than a web framework:
//! spec.md pins this down at the raw-socket level ("read at most 100 header
//! lines", "5 s socket read timeout"), a level a framework like axum
//! deliberately hides (see DESIGN.md's dependency-drop note for `axum`).

use std::collections::HashMap;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use crate::error::{ConnectionError, McpError, McpResult, TransportError};

/// Per-connection socket read timeout (spec.md §4.I step 5).
const SOCKET_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Cap on header lines read before giving up on a connection (spec.md
/// §4.I step 5).
const MAX_HEADER_LINES: usize = 100;

/// The query parameters the authorization server redirected back with.
#[derive(Debug, Clone, Default)]
pub struct CallbackOutcome {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Bind `port`, accept connections until one GETs `path` with a query
/// string, and return its parameters. Any other method/path gets a 404 and
/// the server keeps waiting (stray requests — e.g. a browser favicon probe
/// — must not abort the flow). Bounded by `timeout` overall.
///
/// # Errors
///
/// Returns [`ConnectionError::Closed`] if no matching callback arrives
/// before `timeout`, or [`TransportError::Io`] if the socket can't be
/// bound.
pub async fn await_callback(port: u16, path: &str, timeout: Duration) -> McpResult<CallbackOutcome> {
    let listener = TcpListener::bind(("127.0.0.1", port)).await.map_err(TransportError::Io)?;
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return Err(McpError::Connection(ConnectionError::Closed(
                "timed out waiting for the OAuth callback".to_string(),
            )));
        }

        let (stream, _) = tokio::time::timeout(remaining, listener.accept())
            .await
            .map_err(|_| McpError::Connection(ConnectionError::Closed("timed out waiting for the OAuth callback".to_string())))?
            .map_err(TransportError::Io)?;

        if let Some(outcome) = handle_connection(stream, path).await? {
            return Ok(outcome);
        }
    }
}

async fn handle_connection(mut stream: TcpStream, expected_path: &str) -> McpResult<Option<CallbackOutcome>> {
    let (reader, mut writer) = stream.split();
    let mut reader = BufReader::new(reader);

    let mut request_line = String::new();
    let n = read_line_with_timeout(&mut reader, &mut request_line).await?;
    if n == 0 {
        return Ok(None);
    }

    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or("").to_string();
    let target = parts.next().unwrap_or("").to_string();

    let mut header_lines = 0usize;
    loop {
        let mut line = String::new();
        let n = read_line_with_timeout(&mut reader, &mut line).await?;
        if n == 0 || line.trim().is_empty() {
            break;
        }
        header_lines += 1;
        if header_lines > MAX_HEADER_LINES {
            write_response(&mut writer, 400, "Bad Request").await?;
            return Ok(None);
        }
    }

    let (req_path, query) = target.split_once('?').unwrap_or((target.as_str(), ""));
    if method != "GET" || req_path != expected_path {
        write_response(&mut writer, 404, "Not Found").await?;
        return Ok(None);
    }

    let params: HashMap<String, String> = url::form_urlencoded::parse(query.as_bytes()).into_owned().collect();
    let body = "<html><body>You may close this window and return to the application.</body></html>";
    write_response(&mut writer, 200, body).await?;

    Ok(Some(CallbackOutcome {
        code: params.get("code").cloned(),
        state: params.get("state").cloned(),
        error: params.get("error").cloned(),
    }))
}

async fn read_line_with_timeout(
    reader: &mut BufReader<tokio::net::tcp::ReadHalf<'_>>,
    buf: &mut String,
) -> McpResult<usize> {
    tokio::time::timeout(SOCKET_READ_TIMEOUT, reader.read_line(buf))
        .await
        .map_err(|_| McpError::Transport(TransportError::Timeout(SOCKET_READ_TIMEOUT)))?
        .map_err(TransportError::Io)
        .map_err(McpError::Transport)
}

async fn write_response(writer: &mut tokio::net::tcp::WriteHalf<'_>, status: u16, body: &str) -> McpResult<()> {
    let reason = match status {
        200 => "OK",
        400 => "Bad Request",
        _ => "Not Found",
    };
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    writer.write_all(response.as_bytes()).await.map_err(TransportError::Io)?;
    writer.flush().await.map_err(TransportError::Io)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn send_raw_request(port: u16, request: &str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn captures_code_and_state_from_matching_callback() {
        let port = pick_free_port().await;
        let server = tokio::spawn(await_callback(port, "/callback", Duration::from_secs(5)));
        tokio::time::sleep(Duration::from_millis(50)).await;

        let response =
            send_raw_request(port, "GET /callback?code=abc123&state=xyz HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
        assert!(response.starts_with("HTTP/1.1 200"));

        let outcome = server.await.unwrap().unwrap();
        assert_eq!(outcome.code.as_deref(), Some("abc123"));
        assert_eq!(outcome.state.as_deref(), Some("xyz"));
    }

    #[tokio::test]
    async fn non_matching_path_gets_404_and_server_keeps_waiting() {
        let port = pick_free_port().await;
        let server = tokio::spawn(await_callback(port, "/callback", Duration::from_secs(5)));
        tokio::time::sleep(Duration::from_millis(50)).await;

        let favicon_response = send_raw_request(port, "GET /favicon.ico HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
        assert!(favicon_response.starts_with("HTTP/1.1 404"));

        send_raw_request(port, "GET /callback?code=ok&state=s HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
        let outcome = server.await.unwrap().unwrap();
        assert_eq!(outcome.code.as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn error_parameter_is_captured() {
        let port = pick_free_port().await;
        let server = tokio::spawn(await_callback(port, "/callback", Duration::from_secs(5)));
        tokio::time::sleep(Duration::from_millis(50)).await;

        send_raw_request(port, "GET /callback?error=access_denied&state=s HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
        let outcome = server.await.unwrap().unwrap();
        assert_eq!(outcome.error.as_deref(), Some("access_denied"));
    }

    async fn pick_free_port() -> u16 {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        listener.local_addr().unwrap().port()
    }
}
