//! Server-definition configuration (spec.md §6): JSON/programmatic parsing,
//! per-transport option defaults, and the quick-connect URL heuristic.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use crate::error::McpError;

/// Defaults for the per-type recognized options in spec.md §6.
pub mod defaults {
    use std::time::Duration;

    pub const ENDPOINT: &str = "/rpc";
    pub const READ_TIMEOUT: Duration = Duration::from_secs(30);
    pub const RETRIES: u32 = 3;
    pub const RETRY_BACKOFF: Duration = Duration::from_secs(1);
    pub const PING: Duration = Duration::from_secs(10);
    pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;
}

/// Name of an OAuth provider configuration registered on an [`crate::oauth::OAuthProvider`]
/// elsewhere; config only stores the reference name, not the credentials.
pub type OAuthProviderName = String;

/// Options for the stdio transport.
#[derive(Debug, Clone)]
pub struct StdioConfig {
    pub name: String,
    /// Always an argv vector: `command[0]` is the executable, the rest are
    /// arguments. Never passed through a shell (spec.md §4.C).
    pub command: Vec<String>,
    pub env: HashMap<String, String>,
    pub logger: Option<String>,
    pub read_timeout: Duration,
}

/// Options shared by the HTTP-family transports (http, sse, streamable_http).
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub name: String,
    pub base_url: String,
    pub endpoint: String,
    pub headers: HashMap<String, String>,
    pub read_timeout: Duration,
    pub retries: u32,
    pub retry_backoff: Duration,
    pub oauth_provider: Option<OAuthProviderName>,
    pub logger: Option<String>,
}

/// Options for the SSE transport: [`HttpConfig`] plus the inactivity-ping
/// interval.
#[derive(Debug, Clone)]
pub struct SseConfig {
    pub http: HttpConfig,
    pub ping: Duration,
}

/// A fully resolved server definition, ready to hand to the transport
/// factory.
#[derive(Debug, Clone)]
pub enum ServerConfig {
    Stdio(StdioConfig),
    Http(HttpConfig),
    Sse(SseConfig),
    StreamableHttp(HttpConfig),
    /// The quick-connect heuristic could not pick a transport outright for
    /// a plain `http(s)://` URL; resolved at connect time by probing
    /// Streamable HTTP, then SSE, then HTTP in order (spec.md §6) and
    /// keeping the first that completes `initialize`.
    Probe(HttpConfig),
}

impl ServerConfig {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Stdio(c) => &c.name,
            Self::Http(c) | Self::StreamableHttp(c) | Self::Probe(c) => &c.name,
            Self::Sse(c) => &c.http.name,
        }
    }
}

/// Raw, serde-friendly shape of one server-definition object, before type
/// inference/defaulting. Unknown/reserved keys (`comment`, `description`)
/// are ignored by virtue of not being modeled here plus `deny_unknown_fields`
/// being deliberately absent.
#[derive(Debug, Deserialize)]
struct RawEntry {
    r#type: Option<String>,
    command: Option<RawCommand>,
    args: Option<Vec<String>>,
    #[serde(default)]
    env: HashMap<String, String>,
    url: Option<String>,
    base_url: Option<String>,
    endpoint: Option<String>,
    #[serde(default)]
    headers: HashMap<String, String>,
    read_timeout: Option<u64>,
    retries: Option<u32>,
    retry_backoff: Option<u64>,
    ping: Option<u64>,
    oauth_provider: Option<String>,
    logger: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawCommand {
    Single(String),
    Argv(Vec<String>),
}

/// Reserved top-level keys ignored during parsing (spec.md §6).
const RESERVED_KEYS: &[&str] = &["comment", "description"];

/// Parse one of the three recognized top-level shapes: a single object, an
/// array of objects, or `{ mcpServers: { name: config, ... } }`.
///
/// # Errors
///
/// Returns [`McpError::Validation`] if the JSON doesn't match any recognized
/// shape, or [`McpError::TransportDetection`] if a per-server type can't be
/// inferred.
pub fn parse_server_configs(json: &serde_json::Value) -> Result<Vec<ServerConfig>, McpError> {
    if let Some(map) = json.get("mcpServers").and_then(|v| v.as_object()) {
        return map
            .iter()
            .map(|(name, entry)| parse_one(Some(name.clone()), entry))
            .collect();
    }

    if let Some(array) = json.as_array() {
        return array.iter().map(|entry| parse_one(None, entry)).collect();
    }

    if json.is_object() {
        return Ok(vec![parse_one(None, json)?]);
    }

    Err(McpError::Validation(format!(
        "server config must be an object, an array, or {{mcpServers: {{...}}}}, got {json}"
    )))
}

fn parse_one(name_override: Option<String>, value: &serde_json::Value) -> Result<ServerConfig, McpError> {
    let mut object = value
        .as_object()
        .cloned()
        .ok_or_else(|| McpError::Validation(format!("server entry must be an object, got {value}")))?;

    for key in RESERVED_KEYS {
        object.remove(*key);
    }

    let raw: RawEntry = serde_json::from_value(serde_json::Value::Object(object))
        .map_err(|e| McpError::Validation(format!("invalid server config: {e}")))?;

    let name = name_override.or_else(|| raw.name.clone()).unwrap_or_else(|| "default".to_string());

    let transport_type = raw.r#type.clone().or_else(|| infer_type(&raw));

    match transport_type.as_deref() {
        Some("stdio") => build_stdio(name, raw),
        Some("http") => Ok(ServerConfig::Http(build_http(name, raw)?)),
        Some("sse") => Ok(ServerConfig::Sse(build_sse(name, raw)?)),
        Some("streamable_http") => Ok(ServerConfig::StreamableHttp(build_http(name, raw)?)),
        Some(other) => Err(McpError::Validation(format!("unrecognized server type: {other}"))),
        None => Err(McpError::TransportDetection(name)),
    }
}

fn infer_type(raw: &RawEntry) -> Option<String> {
    if raw.command.is_some() {
        return Some("stdio".to_string());
    }
    if let Some(url) = raw.url.as_deref().or(raw.base_url.as_deref()) {
        return Some(quick_connect_url_type(url).to_string());
    }
    None
}

fn build_stdio(name: String, raw: RawEntry) -> Result<ServerConfig, McpError> {
    let command = match raw.command {
        Some(RawCommand::Argv(argv)) if !argv.is_empty() => argv,
        Some(RawCommand::Single(cmd)) => {
            let mut argv = shell_unsafe_split(&cmd)?;
            if let Some(extra) = raw.args {
                argv.extend(extra);
            }
            argv
        }
        _ => return Err(McpError::Validation("stdio server requires a command".to_string())),
    };

    Ok(ServerConfig::Stdio(StdioConfig {
        name,
        command,
        env: raw.env,
        logger: raw.logger,
        read_timeout: raw.read_timeout.map_or(defaults::READ_TIMEOUT, Duration::from_secs),
    }))
}

/// `command` as a bare string is only accepted when it contains no
/// shell-unsafe characters (spec.md §6: "argv is mandatory when
/// shell-unsafe characters exist"); otherwise splitting it ourselves would
/// recreate the injection risk the argv-only contract exists to avoid.
fn shell_unsafe_split(command: &str) -> Result<Vec<String>, McpError> {
    const UNSAFE: &[char] = &['|', '&', ';', '$', '>', '<', '`', '\\', '"', '\'', '\n', '*', '?', '(', ')', '{', '}'];
    if command.contains(UNSAFE) {
        return Err(McpError::Validation(format!(
            "command {command:?} contains shell-unsafe characters; pass an argv array instead"
        )));
    }
    Ok(command.split_whitespace().map(str::to_string).collect())
}

fn build_http(name: String, raw: RawEntry) -> Result<HttpConfig, McpError> {
    let raw_url = raw
        .base_url
        .or(raw.url)
        .ok_or_else(|| McpError::Validation("http/streamable_http server requires base_url".to_string()))?;

    let (base_url, path_endpoint) = split_endpoint(&raw_url);
    let endpoint = raw.endpoint.or(path_endpoint).unwrap_or_else(|| defaults::ENDPOINT.to_string());

    Ok(HttpConfig {
        name,
        base_url: strip_standard_port(&base_url),
        endpoint,
        headers: raw.headers,
        read_timeout: raw.read_timeout.map_or(defaults::READ_TIMEOUT, Duration::from_secs),
        retries: raw.retries.unwrap_or(defaults::RETRIES),
        retry_backoff: raw.retry_backoff.map_or(defaults::RETRY_BACKOFF, Duration::from_secs),
        oauth_provider: raw.oauth_provider,
        logger: raw.logger,
    })
}

fn build_sse(name: String, raw: RawEntry) -> Result<SseConfig, McpError> {
    let ping = raw.ping.map_or(defaults::PING, Duration::from_secs);
    let http = build_http(name, raw)?;
    Ok(SseConfig { http, ping })
}

/// Split `base_url` from its path when the caller did not override
/// `endpoint` explicitly (spec.md §6 endpoint extraction): a `base_url` of
/// `https://host/path` becomes `base_url = https://host`, `endpoint = /path`.
fn split_endpoint(raw_url: &str) -> (String, Option<String>) {
    let Ok(parsed) = url::Url::parse(raw_url) else {
        return (raw_url.to_string(), None);
    };

    let path = parsed.path();
    if path.is_empty() || path == "/" {
        return (raw_url.to_string(), None);
    }

    let mut host_only = parsed.clone();
    host_only.set_path("");
    let base = host_only.as_str().trim_end_matches('/').to_string();
    (base, Some(path.to_string()))
}

/// Strip standard ports (80 for http, 443 for https); preserve non-standard
/// ones (spec.md §6).
fn strip_standard_port(base_url: &str) -> String {
    let Ok(mut parsed) = url::Url::parse(base_url) else {
        return base_url.to_string();
    };

    let is_standard = matches!(
        (parsed.scheme(), parsed.port()),
        ("http", Some(80)) | ("https", Some(443))
    );
    if is_standard {
        let _ = parsed.set_port(None);
    }
    parsed.as_str().trim_end_matches('/').to_string()
}

/// Interpreter/runtime executable names that, as the first word of a bare
/// command string, imply a stdio server (spec.md §6).
const STDIO_COMMAND_PREFIXES: &[&str] =
    &["npx", "node", "python", "python3", "ruby", "php", "java", "cargo", "go"];

/// The quick-connect URL/command heuristic for a single, type-less
/// definition (spec.md §6). A URL ending in `/sse` or `/mcp` is decided
/// deterministically; any other `http(s)://` URL resolves to
/// [`ServerConfig::Probe`], left for the aggregator to disambiguate by
/// attempting `initialize` over Streamable HTTP, then SSE, then HTTP.
///
/// # Errors
///
/// Returns [`McpError::TransportDetection`] if `target` is neither a
/// recognizable URL nor command.
pub fn quick_connect(name: impl Into<String>, target: &str) -> Result<ServerConfig, McpError> {
    let name = name.into();

    if let Some(rest) = target.strip_prefix("stdio://") {
        return Ok(ServerConfig::Stdio(StdioConfig {
            name,
            command: shell_unsafe_split(rest)?,
            env: HashMap::new(),
            logger: None,
            read_timeout: defaults::READ_TIMEOUT,
        }));
    }

    let first_word = target.split_whitespace().next().unwrap_or_default();
    if STDIO_COMMAND_PREFIXES.contains(&first_word) {
        return Ok(ServerConfig::Stdio(StdioConfig {
            name,
            command: shell_unsafe_split(target)?,
            env: HashMap::new(),
            logger: None,
            read_timeout: defaults::READ_TIMEOUT,
        }));
    }

    if target.starts_with("http://") || target.starts_with("https://") {
        let (base_url, path_endpoint) = split_endpoint(target);
        let http = HttpConfig {
            name,
            base_url: strip_standard_port(&base_url),
            endpoint: path_endpoint.clone().unwrap_or_else(|| defaults::ENDPOINT.to_string()),
            headers: HashMap::new(),
            read_timeout: defaults::READ_TIMEOUT,
            retries: defaults::RETRIES,
            retry_backoff: defaults::RETRY_BACKOFF,
            oauth_provider: None,
            logger: None,
        };

        return Ok(match quick_connect_url_type(target) {
            "sse" => ServerConfig::Sse(SseConfig { http, ping: defaults::PING }),
            "streamable_http" => ServerConfig::StreamableHttp(http),
            _ => ServerConfig::Probe(http),
        });
    }

    Err(McpError::TransportDetection(target.to_string()))
}

/// Deterministic suffix rule (spec.md §8 "quick-connect determinism"):
/// `/sse` always yields SSE, `/mcp` always yields Streamable HTTP,
/// regardless of any other option.
fn quick_connect_url_type(url: &str) -> &'static str {
    let trimmed = url.trim_end_matches('/');
    if trimmed.ends_with("/sse") {
        "sse"
    } else if trimmed.ends_with("/mcp") {
        "streamable_http"
    } else {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quick_connect_sse_suffix_is_deterministic() {
        let cfg = quick_connect("s", "https://example.com/sse").unwrap();
        assert!(matches!(cfg, ServerConfig::Sse(_)));
    }

    #[test]
    fn quick_connect_mcp_suffix_is_deterministic() {
        let cfg = quick_connect("s", "https://example.com/mcp").unwrap();
        assert!(matches!(cfg, ServerConfig::StreamableHttp(_)));
    }

    #[test]
    fn quick_connect_plain_http_url_probes() {
        let cfg = quick_connect("s", "https://example.com/rpc").unwrap();
        assert!(matches!(cfg, ServerConfig::Probe(_)));
    }

    #[test]
    fn quick_connect_detects_stdio_by_interpreter_prefix() {
        let cfg = quick_connect("s", "npx some-server --flag").unwrap();
        match cfg {
            ServerConfig::Stdio(c) => assert_eq!(c.command, vec!["npx", "some-server", "--flag"]),
            other => panic!("expected Stdio, got {other:?}"),
        }
    }

    #[test]
    fn quick_connect_detects_stdio_uri_scheme() {
        let cfg = quick_connect("s", "stdio://my-tool --arg").unwrap();
        assert!(matches!(cfg, ServerConfig::Stdio(_)));
    }

    #[test]
    fn unrecognized_target_is_a_detection_error() {
        assert!(quick_connect("s", "ftp://example.com").is_err());
    }

    #[test]
    fn standard_ports_are_stripped_nonstandard_preserved() {
        assert_eq!(strip_standard_port("https://example.com:443"), "https://example.com");
        assert_eq!(strip_standard_port("http://example.com:80"), "http://example.com");
        assert_eq!(strip_standard_port("https://example.com:8443"), "https://example.com:8443");
    }

    #[test]
    fn endpoint_extraction_splits_host_from_path() {
        let (base, endpoint) = split_endpoint("https://example.com/custom/rpc");
        assert_eq!(base, "https://example.com");
        assert_eq!(endpoint.as_deref(), Some("/custom/rpc"));
    }

    #[test]
    fn parses_single_object_shape() {
        let json = serde_json::json!({"type": "http", "base_url": "https://example.com"});
        let configs = parse_server_configs(&json).unwrap();
        assert_eq!(configs.len(), 1);
    }

    #[test]
    fn parses_array_shape() {
        let json = serde_json::json!([
            {"type": "stdio", "command": ["echo", "hi"]},
            {"type": "http", "base_url": "https://example.com"}
        ]);
        let configs = parse_server_configs(&json).unwrap();
        assert_eq!(configs.len(), 2);
    }

    #[test]
    fn parses_mcp_servers_map_shape_and_keeps_names() {
        let json = serde_json::json!({
            "mcpServers": {
                "local": {"type": "stdio", "command": ["echo"]}
            }
        });
        let configs = parse_server_configs(&json).unwrap();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].name(), "local");
    }

    #[test]
    fn reserved_keys_are_ignored() {
        let json = serde_json::json!({
            "type": "stdio",
            "command": ["echo"],
            "comment": "this is just a note",
            "description": "also ignored"
        });
        assert!(parse_server_configs(&json).is_ok());
    }

    #[test]
    fn shell_unsafe_command_string_is_rejected() {
        let json = serde_json::json!({"type": "stdio", "command": "echo hi && rm -rf /"});
        assert!(parse_server_configs(&json).is_err());
    }
}
