//! End-to-end tests for the multi-server aggregator (spec.md §4.H) against
//! two mocked HTTP servers: tool aggregation, cross-server disambiguation,
//! and explicit server selection.

use std::collections::HashMap;
use std::time::Duration;

use mcp_client::config::{HttpConfig, ServerConfig};
use mcp_client::{ClientBuilder, McpError, ServerSelector};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn http_config(name: &str, base_url: String) -> HttpConfig {
    HttpConfig {
        name: name.to_string(),
        base_url,
        endpoint: "/rpc".to_string(),
        headers: HashMap::new(),
        read_timeout: Duration::from_secs(5),
        retries: 0,
        retry_backoff: Duration::from_millis(10),
        oauth_provider: None,
        logger: None,
    }
}

async fn mount_server(name: &str, tools: serde_json::Value) -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rpc"))
        .and(body_partial_json(json!({"method": "initialize"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 0,
            "result": {"serverInfo": {"name": name, "version": "1.0"}},
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rpc"))
        .and(body_partial_json(json!({"method": "notifications/initialized"})))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rpc"))
        .and(body_partial_json(json!({"method": "tools/list"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 0,
            "result": {"tools": tools},
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rpc"))
        .and(body_partial_json(json!({"method": "tools/call"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 0,
            "result": {"content": [{"type": "text", "text": format!("handled by {name}")}]},
        })))
        .mount(&server)
        .await;

    server
}

#[tokio::test]
async fn aggregates_tools_from_every_connected_server() {
    let alpha = mount_server(
        "alpha",
        json!([{"name": "search", "inputSchema": {"type": "object"}}]),
    )
    .await;
    let beta = mount_server(
        "beta",
        json!([
            {"name": "search", "inputSchema": {"type": "object"}},
            {"name": "fetch", "inputSchema": {"type": "object"}},
        ]),
    )
    .await;

    let client = ClientBuilder::new()
        .add_server(ServerConfig::Http(http_config("alpha", alpha.uri())))
        .add_server(ServerConfig::Http(http_config("beta", beta.uri())))
        .build()
        .await
        .unwrap();

    let tools = client.list_tools(true).await.unwrap();
    assert_eq!(tools.len(), 3);
}

#[tokio::test]
async fn ambiguous_tool_name_without_explicit_server_is_an_error() {
    let alpha = mount_server("alpha", json!([{"name": "search", "inputSchema": {"type": "object"}}])).await;
    let beta = mount_server("beta", json!([{"name": "search", "inputSchema": {"type": "object"}}])).await;

    let client = ClientBuilder::new()
        .add_server(ServerConfig::Http(http_config("alpha", alpha.uri())))
        .add_server(ServerConfig::Http(http_config("beta", beta.uri())))
        .build()
        .await
        .unwrap();

    let err = client.call_tool("search", json!({}), None, None).await.unwrap_err();
    assert!(matches!(err, McpError::AmbiguousToolName { .. }), "expected AmbiguousToolName, got {err:?}");
}

#[tokio::test]
async fn explicit_server_selector_resolves_an_ambiguous_name() {
    let alpha = mount_server("alpha", json!([{"name": "search", "inputSchema": {"type": "object"}}])).await;
    let beta = mount_server("beta", json!([{"name": "search", "inputSchema": {"type": "object"}}])).await;

    let client = ClientBuilder::new()
        .add_server(ServerConfig::Http(http_config("alpha", alpha.uri())))
        .add_server(ServerConfig::Http(http_config("beta", beta.uri())))
        .build()
        .await
        .unwrap();

    let result = client
        .call_tool("search", json!({}), Some(ServerSelector::Name("beta".to_string())), None)
        .await
        .unwrap();
    let text = result.content[0]["text"].as_str().unwrap();
    assert_eq!(text, "handled by beta");
}

#[tokio::test]
async fn unambiguous_name_resolves_without_a_selector() {
    let alpha = mount_server("alpha", json!([{"name": "search", "inputSchema": {"type": "object"}}])).await;
    let beta = mount_server("beta", json!([{"name": "fetch", "inputSchema": {"type": "object"}}])).await;

    let client = ClientBuilder::new()
        .add_server(ServerConfig::Http(http_config("alpha", alpha.uri())))
        .add_server(ServerConfig::Http(http_config("beta", beta.uri())))
        .build()
        .await
        .unwrap();

    let result = client.call_tool("fetch", json!({}), None, None).await.unwrap();
    let text = result.content[0]["text"].as_str().unwrap();
    assert_eq!(text, "handled by beta");
}

#[tokio::test]
async fn missing_required_argument_is_rejected_before_any_request() {
    let alpha = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rpc"))
        .and(body_partial_json(json!({"method": "initialize"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0", "id": 0, "result": {"serverInfo": {"name": "alpha", "version": "1.0"}},
        })))
        .mount(&alpha)
        .await;
    Mock::given(method("POST"))
        .and(path("/rpc"))
        .and(body_partial_json(json!({"method": "notifications/initialized"})))
        .respond_with(ResponseTemplate::new(202))
        .mount(&alpha)
        .await;
    Mock::given(method("POST"))
        .and(path("/rpc"))
        .and(body_partial_json(json!({"method": "tools/list"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 0,
            "result": {"tools": [{
                "name": "search",
                "inputSchema": {"type": "object", "required": ["query"]},
            }]},
        })))
        .mount(&alpha)
        .await;

    let client = ClientBuilder::new()
        .add_server(ServerConfig::Http(http_config("alpha", alpha.uri())))
        .build()
        .await
        .unwrap();

    let err = client.call_tool("search", json!({}), None, None).await.unwrap_err();
    assert!(matches!(err, McpError::Validation(_)), "expected Validation, got {err:?}");
}
