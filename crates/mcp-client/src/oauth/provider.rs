//! The browser-based OAuth 2.1 + PKCE helper (spec.md §4.I): discovery,
//! optional dynamic client registration, the local loopback redirect,
//! token exchange with the one-shot redirect-mismatch retry, and
//! expiry-aware bearer-token application.

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use url::Url;

use super::discovery::{self, AuthServerMetadata, ProtectedResourceMetadata};
use super::loopback;
use super::pkce::Pkce;
use super::store::TokenStore;
use crate::error::{ConnectionError, McpError, McpResult, TransportError};
use crate::models::OAuthToken;

/// How long `authenticate` waits for the browser redirect before giving up
/// (spec.md §4.I step 7 default).
const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

/// Static configuration for one OAuth provider.
#[derive(Debug, Clone)]
pub struct OAuthProviderConfig {
    pub server_url: Url,
    pub redirect_port: u16,
    pub redirect_path: String,
    pub scope: Option<String>,
    pub client_name: String,
    /// Used when the authorization server doesn't support dynamic client
    /// registration.
    pub static_client_id: Option<String>,
    pub callback_timeout: Duration,
}

impl OAuthProviderConfig {
    #[must_use]
    pub fn new(server_url: Url, redirect_port: u16) -> Self {
        Self {
            server_url,
            redirect_port,
            redirect_path: "/callback".to_string(),
            scope: None,
            client_name: "mcp-client".to_string(),
            static_client_id: None,
            callback_timeout: DEFAULT_CALLBACK_TIMEOUT,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: String,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl TokenResponse {
    fn into_token(self) -> OAuthToken {
        let expires_at = chrono::Utc::now() + chrono::Duration::seconds(self.expires_in.unwrap_or(3600));
        OAuthToken {
            access_token: self.access_token,
            token_type: self.token_type,
            expires_at,
            refresh_token: self.refresh_token,
            scope: self.scope,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: String,
}

struct TokenExchangeFailure {
    error: String,
    description: String,
}

fn redirect_uri_hint_pattern() -> &'static Regex {
    static PATTERN: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"https?://\S+").expect("redirect hint regex is valid"))
}

impl TokenExchangeFailure {
    /// Extract a URL from the error description, e.g. "...expected
    /// https://canonical.example" (spec.md §4.I step 9 / §8 scenario 6).
    fn redirect_hint(&self) -> Option<String> {
        redirect_uri_hint_pattern().find(&self.description).map(|m| m.as_str().trim_end_matches(['.', ',']).to_string())
    }
}

/// One configured OAuth provider: discovery + PKCE + loopback + token
/// exchange + refresh, backed by a pluggable [`TokenStore`].
pub struct OAuthProvider {
    name: String,
    config: OAuthProviderConfig,
    store: Arc<dyn TokenStore>,
    http: reqwest::Client,
}

impl OAuthProvider {
    #[must_use]
    pub fn new(name: impl Into<String>, config: OAuthProviderConfig, store: Arc<dyn TokenStore>) -> Self {
        Self { name: name.into(), config, store, http: reqwest::Client::new() }
    }

    #[must_use]
    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}{}", self.config.redirect_port, self.config.redirect_path)
    }

    /// Run the full flow (spec.md §4.I steps 1-10) and return the obtained
    /// token, also storing it.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::Connection`] on discovery failure, a missing or
    /// mismatched `state`, an `error` callback parameter, or a token
    /// exchange failure that survives the redirect-mismatch retry.
    pub async fn authenticate(&self) -> McpResult<OAuthToken> {
        let metadata = discovery::discover(&self.http, &self.config.server_url).await?;
        let client_id = self.resolve_client_id(&metadata).await?;

        let pkce = Pkce::generate();
        let state = generate_state();
        let auth_url = self.build_authorization_url(&metadata, &client_id, &pkce, &state)?;

        if let Err(e) = open_in_browser(auth_url.as_str()) {
            tracing::warn!(error = %e, url = %auth_url, "could not open browser automatically; visit the URL manually");
        }

        let outcome = loopback::await_callback(
            self.config.redirect_port,
            &self.config.redirect_path,
            self.config.callback_timeout,
        )
        .await?;

        if let Some(error) = outcome.error {
            return Err(McpError::Connection(ConnectionError::Closed(format!("authorization denied: {error}"))));
        }
        let code = outcome
            .code
            .ok_or_else(|| McpError::Connection(ConnectionError::Closed("callback was missing a code".to_string())))?;
        let returned_state = outcome
            .state
            .ok_or_else(|| McpError::Connection(ConnectionError::Closed("callback was missing state".to_string())))?;
        if returned_state != state {
            return Err(McpError::Connection(ConnectionError::Closed("state mismatch in OAuth callback".to_string())));
        }

        let token = self.exchange_code(&metadata, &client_id, &code, &pkce.code_verifier).await?;
        self.store.set(&self.name, token.clone()).await;
        Ok(token)
    }

    async fn resolve_client_id(&self, metadata: &AuthServerMetadata) -> McpResult<String> {
        if let Some(endpoint) = &metadata.registration_endpoint {
            let body = serde_json::json!({
                "client_name": self.config.client_name,
                "redirect_uris": [self.redirect_uri()],
                "token_endpoint_auth_method": "none",
            });
            let response = self.http.post(endpoint).json(&body).send().await.map_err(TransportError::Http)?;
            if response.status().is_success() {
                let parsed: serde_json::Value = response.json().await.map_err(TransportError::Http)?;
                if let Some(client_id) = parsed.get("client_id").and_then(|v| v.as_str()) {
                    return Ok(client_id.to_string());
                }
            }
            tracing::warn!("dynamic client registration failed, falling back to static client id");
        }

        self.config.static_client_id.clone().ok_or_else(|| {
            McpError::Connection(ConnectionError::Closed(
                "authorization server does not support dynamic registration and no static client_id was configured"
                    .to_string(),
            ))
        })
    }

    fn build_authorization_url(
        &self,
        metadata: &AuthServerMetadata,
        client_id: &str,
        pkce: &Pkce,
        state: &str,
    ) -> McpResult<Url> {
        let mut url = Url::parse(&metadata.authorization_endpoint)
            .map_err(|e| McpError::Transport(TransportError::Framing(format!("invalid authorization_endpoint: {e}"))))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("response_type", "code")
                .append_pair("client_id", client_id)
                .append_pair("redirect_uri", &self.redirect_uri())
                .append_pair("state", state)
                .append_pair("code_challenge", &pkce.code_challenge)
                .append_pair("code_challenge_method", "S256");
            if let Some(scope) = &self.config.scope {
                pairs.append_pair("scope", scope);
            }
        }
        Ok(url)
    }

    async fn try_exchange(
        &self,
        metadata: &AuthServerMetadata,
        client_id: &str,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<OAuthToken, TokenExchangeFailure> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", client_id),
            ("code_verifier", code_verifier),
        ];

        let response = self
            .http
            .post(&metadata.token_endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| TokenExchangeFailure { error: "transport_error".to_string(), description: e.to_string() })?;

        if response.status().is_success() {
            let body: TokenResponse = response
                .json()
                .await
                .map_err(|e| TokenExchangeFailure { error: "invalid_response".to_string(), description: e.to_string() })?;
            return Ok(body.into_token());
        }

        let body: TokenErrorBody = response.json().await.unwrap_or(TokenErrorBody {
            error: "unknown_error".to_string(),
            error_description: String::new(),
        });
        Err(TokenExchangeFailure { error: body.error, description: body.error_description })
    }

    /// Exchange an authorization code for a token, retrying exactly once
    /// with a server-hinted `redirect_uri` on a redirect-mismatch error
    /// (spec.md §4.I step 9, §8 scenario 6).
    async fn exchange_code(
        &self,
        metadata: &AuthServerMetadata,
        client_id: &str,
        code: &str,
        code_verifier: &str,
    ) -> McpResult<OAuthToken> {
        match self.try_exchange(metadata, client_id, code, code_verifier, &self.redirect_uri()).await {
            Ok(token) => Ok(token),
            Err(failure) => {
                let Some(hint) = failure.redirect_hint() else {
                    return Err(exchange_error(&failure));
                };
                tracing::warn!(redirect_uri = %hint, "retrying token exchange with the server's canonical redirect_uri");
                match self.try_exchange(metadata, client_id, code, code_verifier, &hint).await {
                    Ok(token) => Ok(token),
                    Err(_retry_failure) => Err(exchange_error(&failure)),
                }
            }
        }
    }

    /// Attempt a refresh-token exchange.
    async fn refresh(&self, refresh_token: &str) -> McpResult<OAuthToken> {
        let metadata = discovery::discover(&self.http, &self.config.server_url).await?;
        let params = [("grant_type", "refresh_token"), ("refresh_token", refresh_token)];
        let response = self.http.post(&metadata.token_endpoint).form(&params).send().await.map_err(TransportError::Http)?;
        if !response.status().is_success() {
            return Err(McpError::Connection(ConnectionError::Closed(format!(
                "token refresh failed with status {}",
                response.status()
            ))));
        }
        let body: TokenResponse = response.json().await.map_err(TransportError::Http)?;
        Ok(body.into_token())
    }

    /// Attach `Authorization: Bearer …` to `builder` if an unexpired token
    /// exists, refreshing first if it's expired and a refresh token is
    /// available; drops the token on a failed refresh (spec.md §4.I "Token
    /// application").
    pub async fn apply(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let Some(token) = self.store.get(&self.name).await else {
            return builder;
        };

        if !token.is_expired() {
            return builder.header(reqwest::header::AUTHORIZATION, token.authorization_header());
        }

        if let Some(refresh_token) = token.refresh_token.clone() {
            match self.refresh(&refresh_token).await {
                Ok(refreshed) => {
                    self.store.set(&self.name, refreshed.clone()).await;
                    return builder.header(reqwest::header::AUTHORIZATION, refreshed.authorization_header());
                }
                Err(e) => {
                    tracing::warn!(error = %e, "token refresh failed, dropping stored token");
                }
            }
        }

        self.store.clear(&self.name).await;
        builder
    }

    /// Resolve a current `Authorization` header value for a transport that
    /// cannot hook a per-request builder the way [`Self::apply`] does:
    /// reuses a stored unexpired token, refreshes an expired one, or falls
    /// back to the full interactive flow when nothing is stored yet.
    ///
    /// # Errors
    ///
    /// Propagates [`Self::authenticate`] failures.
    pub async fn ensure_authorization_header(&self) -> McpResult<String> {
        if let Some(token) = self.store.get(&self.name).await {
            if !token.is_expired() {
                return Ok(token.authorization_header());
            }
            if let Some(refresh_token) = token.refresh_token.clone() {
                if let Ok(refreshed) = self.refresh(&refresh_token).await {
                    self.store.set(&self.name, refreshed.clone()).await;
                    return Ok(refreshed.authorization_header());
                }
            }
        }
        let token = self.authenticate().await?;
        Ok(token.authorization_header())
    }

    /// Inspect a `401` response's `WWW-Authenticate` header for a
    /// `resource="…"` directive and, if present, re-fetch that resource's
    /// metadata for the caller to use in re-authorization (spec.md §4.I,
    /// last paragraph).
    ///
    /// # Errors
    ///
    /// Returns [`McpError::Connection`] if the directive is present but its
    /// metadata can't be fetched.
    pub async fn handle_unauthorized(
        &self,
        www_authenticate: Option<&str>,
    ) -> McpResult<Option<ProtectedResourceMetadata>> {
        let Some(header) = www_authenticate else { return Ok(None) };
        let Some(resource_url) = extract_resource_param(header) else { return Ok(None) };
        let url = Url::parse(&resource_url)
            .map_err(|e| McpError::Transport(TransportError::Framing(format!("invalid resource metadata URL: {e}"))))?;
        let mut origin = url.clone();
        origin.set_path("");
        let metadata = discovery::fetch_protected_resource(&self.http, &origin).await?;
        Ok(Some(metadata))
    }
}

fn exchange_error(failure: &TokenExchangeFailure) -> McpError {
    McpError::Connection(ConnectionError::Closed(format!(
        "token exchange failed: {} ({})",
        failure.error, failure.description
    )))
}

fn resource_param_pattern() -> &'static Regex {
    static PATTERN: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"resource="([^"]+)""#).expect("resource param regex is valid"))
}

fn extract_resource_param(www_authenticate: &str) -> Option<String> {
    resource_param_pattern().captures(www_authenticate).map(|c| c[1].to_string())
}

fn generate_state() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Launch the user's default browser at `url`; failure is logged and
/// non-fatal (spec.md §4.I step 6).
fn open_in_browser(url: &str) -> std::io::Result<std::process::Child> {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open").arg(url).spawn()
    }
    #[cfg(target_os = "linux")]
    {
        std::process::Command::new("xdg-open").arg(url).spawn()
    }
    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("cmd").args(["/C", "start", "", url]).spawn()
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        Err(std::io::Error::other(format!("no known browser-launch command for this platform: {url}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_hint_extracted_from_error_description() {
        let failure = TokenExchangeFailure {
            error: "unauthorized_client".to_string(),
            description: "redirect_uri mismatch, expected https://canonical.example".to_string(),
        };
        assert_eq!(failure.redirect_hint().as_deref(), Some("https://canonical.example"));
    }

    #[test]
    fn redirect_hint_absent_when_no_url_in_description() {
        let failure = TokenExchangeFailure { error: "invalid_grant".to_string(), description: "code expired".to_string() };
        assert!(failure.redirect_hint().is_none());
    }

    #[test]
    fn extracts_resource_param_from_www_authenticate() {
        let header = r#"Bearer resource="https://example.com/.well-known/oauth-protected-resource""#;
        assert_eq!(
            extract_resource_param(header).as_deref(),
            Some("https://example.com/.well-known/oauth-protected-resource")
        );
    }

    #[test]
    fn no_resource_param_returns_none() {
        assert!(extract_resource_param(r#"Bearer realm="example""#).is_none());
    }

    fn metadata(token_endpoint: String) -> AuthServerMetadata {
        AuthServerMetadata {
            issuer: "https://auth.example".to_string(),
            authorization_endpoint: "https://auth.example/authorize".to_string(),
            token_endpoint,
            registration_endpoint: None,
        }
    }

    fn provider() -> OAuthProvider {
        let config = OAuthProviderConfig::new(Url::parse("https://auth.example").unwrap(), 8765);
        OAuthProvider::new("test", config, crate::oauth::store::InMemoryTokenStore::new())
    }

    /// Spec.md §8 scenario 6: when the hinted retry also fails, the
    /// *original* failure is surfaced, not the retry's.
    #[tokio::test]
    async fn redirect_mismatch_retry_failure_surfaces_the_original_error() {
        use wiremock::matchers::{body_string_contains, method};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("localhost"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "error": "unauthorized_client",
                "error_description": "redirect_uri mismatch, expected https://canonical.example",
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("canonical.example"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "code already used",
            })))
            .mount(&server)
            .await;

        let provider = provider();
        let metadata = metadata(server.uri());
        let err = provider.exchange_code(&metadata, "client-id", "auth-code", "verifier").await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("unauthorized_client"), "expected the original failure, got: {message}");
        assert!(!message.contains("invalid_grant"), "must not surface the retry's failure, got: {message}");
    }

    /// When the hinted retry succeeds, its token is returned.
    #[tokio::test]
    async fn redirect_mismatch_retry_success_returns_the_retried_token() {
        use wiremock::matchers::{body_string_contains, method};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("localhost"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "error": "unauthorized_client",
                "error_description": "redirect_uri mismatch, expected https://canonical.example",
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("canonical.example"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok",
                "token_type": "Bearer",
                "expires_in": 3600,
                "scope": "read",
            })))
            .mount(&server)
            .await;

        let provider = provider();
        let metadata = metadata(server.uri());
        let token = provider.exchange_code(&metadata, "client-id", "auth-code", "verifier").await.unwrap();
        assert_eq!(token.access_token, "tok");
    }
}
