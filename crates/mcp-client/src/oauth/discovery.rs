//! Authorization-server and protected-resource metadata discovery
//! (spec.md §4.I step 2).

use serde::Deserialize;
use url::Url;

use crate::error::{McpError, McpResult, TransportError};

/// The subset of RFC 8414 authorization server metadata this helper needs.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthServerMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default)]
    pub registration_endpoint: Option<String>,
}

/// The subset of RFC 9728 protected-resource metadata needed to locate the
/// authorization server that issues tokens for a resource.
#[derive(Debug, Clone, Deserialize)]
pub struct ProtectedResourceMetadata {
    pub resource: String,
    #[serde(default)]
    pub authorization_servers: Vec<String>,
}

/// Build the discovery origin from scheme+host+port only; any path on
/// `server_url` is discarded (spec.md §4.I step 2).
fn origin_only(server_url: &Url) -> McpResult<Url> {
    let mut origin = server_url.clone();
    origin.set_path("");
    origin.set_query(None);
    origin.set_fragment(None);
    Url::parse(origin.as_str().trim_end_matches('/'))
        .map_err(|e| McpError::Transport(TransportError::Framing(format!("invalid server URL: {e}"))))
}

/// Discover authorization server metadata, preferring the self-contained
/// `/.well-known/oauth-authorization-server` endpoint and falling back to
/// the delegated `/.well-known/oauth-protected-resource` one (spec.md §4.I
/// step 2).
///
/// # Errors
///
/// Returns [`McpError::Connection`] if neither endpoint yields usable
/// metadata.
pub async fn discover(client: &reqwest::Client, server_url: &Url) -> McpResult<AuthServerMetadata> {
    let origin = origin_only(server_url)?;

    if let Some(metadata) = fetch_self_contained(client, &origin).await {
        return Ok(metadata);
    }

    let protected_resource = fetch_protected_resource(client, &origin).await?;
    let Some(as_url) = protected_resource.authorization_servers.first() else {
        return Err(McpError::Connection(crate::error::ConnectionError::Closed(
            "protected-resource metadata named no authorization server".to_string(),
        )));
    };
    let as_origin = Url::parse(as_url)
        .map_err(|e| McpError::Transport(TransportError::Framing(format!("invalid authorization server URL: {e}"))))?;
    fetch_self_contained(client, &as_origin).await.ok_or_else(|| {
        McpError::Connection(crate::error::ConnectionError::Closed(
            "delegated authorization server published no self-contained metadata".to_string(),
        ))
    })
}

async fn fetch_self_contained(client: &reqwest::Client, origin: &Url) -> Option<AuthServerMetadata> {
    let url = origin.join(".well-known/oauth-authorization-server").ok()?;
    let response = client.get(url).send().await.ok()?;
    if !response.status().is_success() {
        return None;
    }
    response.json::<AuthServerMetadata>().await.ok()
}

/// Fetch RFC 9728 protected-resource metadata for the 401 re-discovery path
/// (spec.md §4.I) as well as the delegated-discovery fallback above.
///
/// # Errors
///
/// Returns [`McpError::Connection`] if the endpoint is unreachable or its
/// body doesn't parse.
pub async fn fetch_protected_resource(client: &reqwest::Client, origin: &Url) -> McpResult<ProtectedResourceMetadata> {
    let url = origin
        .join(".well-known/oauth-protected-resource")
        .map_err(|e| McpError::Transport(TransportError::Framing(e.to_string())))?;
    let response = client.get(url).send().await.map_err(TransportError::Http)?;
    if !response.status().is_success() {
        return Err(McpError::Connection(crate::error::ConnectionError::Closed(format!(
            "protected-resource metadata request returned {}",
            response.status()
        ))));
    }
    response.json().await.map_err(|e| McpError::Transport(TransportError::Http(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_only_discards_path_and_query() {
        let url = Url::parse("https://example.com/mcp/rpc?x=1").unwrap();
        let origin = origin_only(&url).unwrap();
        assert_eq!(origin.as_str(), "https://example.com/");
    }

    #[tokio::test]
    async fn self_contained_discovery_succeeds() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/.well-known/oauth-authorization-server"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "issuer": "https://as.example.com",
                "authorization_endpoint": "https://as.example.com/authorize",
                "token_endpoint": "https://as.example.com/token",
            })))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let url = Url::parse(&server.uri()).unwrap();
        let metadata = discover(&client, &url).await.unwrap();
        assert_eq!(metadata.token_endpoint, "https://as.example.com/token");
    }

    #[tokio::test]
    async fn falls_back_to_delegated_discovery() {
        let resource_server = wiremock::MockServer::start().await;
        let auth_server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/.well-known/oauth-authorization-server"))
            .respond_with(wiremock::ResponseTemplate::new(404))
            .mount(&resource_server)
            .await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/.well-known/oauth-protected-resource"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "resource": resource_server.uri(),
                "authorization_servers": [auth_server.uri()],
            })))
            .mount(&resource_server)
            .await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/.well-known/oauth-authorization-server"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "issuer": auth_server.uri(),
                "authorization_endpoint": format!("{}/authorize", auth_server.uri()),
                "token_endpoint": format!("{}/token", auth_server.uri()),
            })))
            .mount(&auth_server)
            .await;

        let client = reqwest::Client::new();
        let url = Url::parse(&resource_server.uri()).unwrap();
        let metadata = discover(&client, &url).await.unwrap();
        assert!(metadata.token_endpoint.contains("/token"));
    }
}
