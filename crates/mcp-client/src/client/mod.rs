//! Multi-server aggregator (spec.md §4.H): registers servers from a config
//! factory, fans internal notifications out to user listeners, caches
//! tool/prompt/resource listings per server, disambiguates same-named
//! entries, validates arguments before contacting a server, and owns the
//! roots list shared across every roots-capable server.
//!
//! Grounded on the teacher's `client/mod.rs` cache-then-network constructor
//! shape (a `moka::future::Cache` alongside the HTTP client), generalized
//! from one REST surface with a single cache to a registry of independent
//! JSON-RPC servers each contributing to three shared caches.

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{BoxStream, StreamExt};
use moka::future::Cache;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio_stream::wrappers::{ReceiverStream, UnboundedReceiverStream};

use crate::config::{HttpConfig, ServerConfig};
use crate::error::{McpError, McpResult};
use crate::models::{Prompt, Resource, Root, ServerId, Tool};
use crate::oauth::OAuthProvider;
use crate::server::{CompletionResult, HookOutcome, LogLevel, McpServer, ResourceList, ToolCallResult};
use crate::transport::{HttpTransport, InboundEvent, SseTransport, StdioTransport, StreamableHttpTransport, Transport};

/// Selects a server explicitly, bypassing the cache/disambiguation rules
/// (spec.md §4.H step 1).
#[derive(Debug, Clone)]
pub enum ServerSelector {
    Id(ServerId),
    Name(String),
}

type NotificationListener = Arc<dyn Fn(&str, &str, Value) + Send + Sync>;
type ElicitationHandlerFn = Arc<dyn Fn(Value) -> HookOutcome + Send + Sync>;
type SamplingHandlerFn = Arc<dyn Fn(Value) -> HookOutcome + Send + Sync>;

struct ServerEntry {
    server: Arc<McpServer>,
}

/// Builds an [`McpClient`] incrementally: add server configs, register
/// global hooks, then [`Self::build`] to connect everything.
#[derive(Default)]
pub struct ClientBuilder {
    configs: Vec<ServerConfig>,
    oauth_providers: HashMap<String, Arc<OAuthProvider>>,
    notification_listeners: Vec<NotificationListener>,
    elicitation_handler: Option<ElicitationHandlerFn>,
    sampling_handler: Option<SamplingHandlerFn>,
    initial_roots: Vec<Root>,
}

impl ClientBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn add_server(mut self, config: ServerConfig) -> Self {
        self.configs.push(config);
        self
    }

    #[must_use]
    pub fn add_servers(mut self, configs: impl IntoIterator<Item = ServerConfig>) -> Self {
        self.configs.extend(configs);
        self
    }

    /// Register an [`OAuthProvider`] under the name a [`HttpConfig::oauth_provider`]
    /// refers to.
    #[must_use]
    pub fn with_oauth_provider(mut self, name: impl Into<String>, provider: Arc<OAuthProvider>) -> Self {
        self.oauth_providers.insert(name.into(), provider);
        self
    }

    #[must_use]
    pub fn with_notification_listener<F>(mut self, listener: F) -> Self
    where
        F: Fn(&str, &str, Value) + Send + Sync + 'static,
    {
        self.notification_listeners.push(Arc::new(listener));
        self
    }

    #[must_use]
    pub fn with_elicitation_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(Value) -> HookOutcome + Send + Sync + 'static,
    {
        self.elicitation_handler = Some(Arc::new(handler));
        self
    }

    #[must_use]
    pub fn with_sampling_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(Value) -> HookOutcome + Send + Sync + 'static,
    {
        self.sampling_handler = Some(Arc::new(handler));
        self
    }

    #[must_use]
    pub fn with_roots(mut self, roots: Vec<Root>) -> Self {
        self.initial_roots = roots;
        self
    }

    /// Connect every registered server config and bring up the aggregator
    /// (spec.md §4.H construction sequence).
    ///
    /// # Errors
    ///
    /// Returns the first connection error encountered; servers already
    /// connected are left running (callers that want partial-failure
    /// tolerance should connect servers with their own [`McpClient`]s).
    pub async fn build(self) -> McpResult<McpClient> {
        let client = McpClient {
            servers: RwLock::new(Vec::new()),
            tools_cache: Cache::builder().build(),
            prompts_cache: Cache::builder().build(),
            resources_cache: Cache::builder().build(),
            notification_listeners: Arc::new(RwLock::new(self.notification_listeners)),
            roots: RwLock::new(self.initial_roots),
        };

        for config in self.configs {
            client
                .connect_server(config, &self.oauth_providers, self.elicitation_handler.clone(), self.sampling_handler.clone())
                .await?;
        }

        Ok(client)
    }
}

/// The aggregator: a registry of connected servers plus the shared
/// caches/roots/listeners spanning all of them.
pub struct McpClient {
    servers: RwLock<Vec<ServerEntry>>,
    tools_cache: Cache<String, Tool>,
    prompts_cache: Cache<String, Prompt>,
    resources_cache: Cache<String, Resource>,
    notification_listeners: Arc<RwLock<Vec<NotificationListener>>>,
    roots: RwLock<Vec<Root>>,
}

impl McpClient {
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    async fn connect_server(
        &self,
        config: ServerConfig,
        oauth_providers: &HashMap<String, Arc<OAuthProvider>>,
        elicitation_handler: Option<ElicitationHandlerFn>,
        sampling_handler: Option<SamplingHandlerFn>,
    ) -> McpResult<ServerId> {
        let name = config.name().to_string();
        let id = {
            let servers = self.servers.read().await;
            ServerId::from_index(servers.len())
        };

        let (transport, inbound, http_compat) = Self::build_transport(config, oauth_providers).await?;
        let mut server = McpServer::new(name, id, transport);
        if http_compat {
            server = server.with_http_compat_version();
        }
        let server = Arc::new(server);

        if let Some(handler) = elicitation_handler {
            server.on_elicitation_request(move |params| handler(params)).await;
        }
        if let Some(handler) = sampling_handler {
            server.on_sampling_request(move |params| handler(params)).await;
        }
        let roots_snapshot = self.roots.read().await.clone();
        server
            .on_roots_list_request(move || serde_json::json!({ "roots": roots_snapshot.iter().map(Root::to_hash).collect::<Vec<_>>() }))
            .await;

        server.initialize().await?;

        if let Some(inbound) = inbound {
            let router_server = Arc::clone(&server);
            let listeners = Arc::clone(&self.notification_listeners);
            let tools_cache = self.tools_cache.clone();
            let prompts_cache = self.prompts_cache.clone();
            let resources_cache = self.resources_cache.clone();
            let server_name = router_server.name().to_string();
            tokio::spawn(async move {
                router_server
                    .run_inbound_router(inbound, move |method, params| {
                        dispatch_notification(&listeners, &tools_cache, &prompts_cache, &resources_cache, id, &server_name, method, &params);
                    })
                    .await;
            });
        }

        self.servers.write().await.push(ServerEntry { server });
        Ok(id)
    }

    async fn build_transport(
        config: ServerConfig,
        oauth_providers: &HashMap<String, Arc<OAuthProvider>>,
    ) -> McpResult<(Arc<dyn Transport>, Option<BoxStream<'static, InboundEvent>>, bool)> {
        match config {
            ServerConfig::Stdio(stdio_config) => {
                let (tx, rx) = tokio::sync::mpsc::channel(256);
                let transport: Arc<dyn Transport> = Arc::new(StdioTransport::new(stdio_config, tx));
                let stream = ReceiverStream::new(rx).boxed();
                Ok((transport, Some(stream), false))
            }
            ServerConfig::Http(http_config) => {
                let http_config = Self::apply_oauth_header(http_config, oauth_providers).await?;
                let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(http_config)?);
                Ok((transport, None, true))
            }
            ServerConfig::StreamableHttp(http_config) => {
                let http_config = Self::apply_oauth_header(http_config, oauth_providers).await?;
                let concrete = Arc::new(StreamableHttpTransport::new(http_config)?);
                let stream = concrete.take_inbound().await.map(|rx| UnboundedReceiverStream::new(rx).boxed());
                let transport: Arc<dyn Transport> = concrete;
                Ok((transport, stream, true))
            }
            ServerConfig::Sse(sse_config) => {
                let http = Self::apply_oauth_header(sse_config.http, oauth_providers).await?;
                let sse_config = crate::config::SseConfig { http, ping: sse_config.ping };
                let concrete = Arc::new(SseTransport::new(sse_config)?);
                let stream = concrete.take_inbound().await.map(|rx| UnboundedReceiverStream::new(rx).boxed());
                // SSE needs the full `connect()` (stream open + handshake) that
                // only the concrete type exposes; `ensure_connected` alone
                // would reject it (see `SseTransport::ensure_connected`).
                concrete.connect(serde_json::Value::Null).await.ok();
                let transport: Arc<dyn Transport> = concrete;
                Ok((transport, stream, true))
            }
            ServerConfig::Probe(http_config) => Self::probe(http_config, oauth_providers).await,
        }
    }

    /// Quick-connect left the transport undecided (spec.md §6): try
    /// Streamable HTTP, then SSE, then plain HTTP, keeping the first that
    /// completes `initialize` (spec.md §4.H probe order).
    async fn probe(
        http_config: HttpConfig,
        oauth_providers: &HashMap<String, Arc<OAuthProvider>>,
    ) -> McpResult<(Arc<dyn Transport>, Option<BoxStream<'static, InboundEvent>>, bool)> {
        let streamable = Self::build_transport(ServerConfig::StreamableHttp(http_config.clone()), oauth_providers).await;
        if let Ok((transport, stream, compat)) = streamable {
            if transport.ensure_connected(serde_json::Value::Null).await.is_ok() {
                return Ok((transport, stream, compat));
            }
        }

        let sse = Self::build_transport(
            ServerConfig::Sse(crate::config::SseConfig { http: http_config.clone(), ping: crate::config::defaults::PING }),
            oauth_providers,
        )
        .await;
        if let Ok((transport, stream, compat)) = sse {
            if transport.ensure_connected(serde_json::Value::Null).await.is_ok() {
                return Ok((transport, stream, compat));
            }
        }

        Self::build_transport(ServerConfig::Http(http_config), oauth_providers).await
    }

    async fn apply_oauth_header(
        mut config: HttpConfig,
        oauth_providers: &HashMap<String, Arc<OAuthProvider>>,
    ) -> McpResult<HttpConfig> {
        let Some(provider_name) = config.oauth_provider.clone() else {
            return Ok(config);
        };
        let Some(provider) = oauth_providers.get(&provider_name) else {
            return Err(McpError::Validation(format!("no OAuth provider registered under name {provider_name:?}")));
        };
        let header = provider.ensure_authorization_header().await?;
        config.headers.insert(reqwest::header::AUTHORIZATION.to_string(), header);
        Ok(config)
    }

    async fn server_by_selector(&self, selector: &ServerSelector) -> McpResult<Arc<McpServer>> {
        let servers = self.servers.read().await;
        match selector {
            ServerSelector::Id(id) => servers
                .iter()
                .find(|entry| entry.server.id() == *id)
                .map(|entry| Arc::clone(&entry.server))
                .ok_or_else(|| McpError::ServerNotFound(id.to_string())),
            ServerSelector::Name(name) => servers
                .iter()
                .find(|entry| entry.server.name() == name)
                .map(|entry| Arc::clone(&entry.server))
                .ok_or_else(|| McpError::ServerNotFound(name.clone())),
        }
    }

    fn cache_key(server: &ServerId, name: &str) -> String {
        format!("{}:{name}", server.index())
    }

    /// `list_tools(cache:true)` returns the aggregated cache contents if
    /// populated; `cache:false` forces a refresh from every server
    /// (spec.md §4.H).
    ///
    /// # Errors
    ///
    /// Propagates the first server's `list_tools` failure when refreshing.
    pub async fn list_tools(&self, cache: bool) -> McpResult<Vec<Tool>> {
        if cache && self.tools_cache.iter().next().is_some() {
            return Ok(self.tools_cache.iter().map(|(_, tool)| tool).collect());
        }
        self.refresh_tools().await
    }

    async fn refresh_tools(&self) -> McpResult<Vec<Tool>> {
        let servers = self.servers.read().await;
        let mut all = Vec::new();
        for entry in servers.iter() {
            let tools = entry.server.list_tools().await?;
            for tool in &tools {
                self.tools_cache.insert(Self::cache_key(&entry.server.id(), &tool.name), tool.clone()).await;
            }
            all.extend(tools);
        }
        Ok(all)
    }

    /// # Errors
    ///
    /// Propagates the first server's `list_prompts` failure when refreshing.
    pub async fn list_prompts(&self, cache: bool) -> McpResult<Vec<Prompt>> {
        if cache && self.prompts_cache.iter().next().is_some() {
            return Ok(self.prompts_cache.iter().map(|(_, prompt)| prompt).collect());
        }
        let servers = self.servers.read().await;
        let mut all = Vec::new();
        for entry in servers.iter() {
            let prompts = entry.server.list_prompts().await?;
            for prompt in &prompts {
                self.prompts_cache.insert(Self::cache_key(&entry.server.id(), &prompt.name), prompt.clone()).await;
            }
            all.extend(prompts);
        }
        Ok(all)
    }

    /// Applies only to the first registered server (documented
    /// simplification, see DESIGN.md Open Question decision #2).
    ///
    /// # Errors
    ///
    /// Propagates the server's `list_resources` failure.
    pub async fn list_resources(&self, cache: bool, cursor: Option<&str>) -> McpResult<ResourceList> {
        let servers = self.servers.read().await;
        let Some(first) = servers.first() else {
            return Ok(ResourceList { resources: Vec::new(), next_cursor: None });
        };
        if cache && cursor.is_none() && self.resources_cache.iter().next().is_some() {
            let resources = self.resources_cache.iter().map(|(_, resource)| resource).collect();
            return Ok(ResourceList { resources, next_cursor: None });
        }
        let list = first.server.list_resources(cursor).await?;
        for resource in &list.resources {
            self.resources_cache.insert(Self::cache_key(&first.server.id(), &resource.uri), resource.clone()).await;
        }
        Ok(list)
    }

    /// Invalidate every cache, as if every `*/list_changed` notification had
    /// arrived at once.
    pub async fn clear_cache(&self) {
        self.tools_cache.invalidate_all();
        self.prompts_cache.invalidate_all();
        self.resources_cache.invalidate_all();
    }

    /// Resolve which server owns `name` following spec.md §4.H's
    /// disambiguation rules.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::ServerNotFound`] for an unknown explicit
    /// selector, [`McpError::AmbiguousToolName`] when more than one server
    /// has a tool by this name and none was given, or
    /// [`McpError::ToolNotFound`] when none do.
    pub async fn resolve_tool(&self, name: &str, server: Option<ServerSelector>) -> McpResult<Arc<McpServer>> {
        if let Some(selector) = server {
            return self.server_by_selector(&selector).await;
        }
        if self.tools_cache.iter().next().is_none() {
            self.refresh_tools().await?;
        }
        let owners: Vec<ServerId> = self
            .tools_cache
            .iter()
            .filter(|(key, _)| key.ends_with(&format!(":{name}")))
            .filter_map(|(key, _)| key.split_once(':').and_then(|(idx, _)| idx.parse::<usize>().ok()).map(ServerId::from_index))
            .collect();

        match owners.as_slice() {
            [] => Err(McpError::ToolNotFound(name.to_string())),
            [only] => self.server_by_selector(&ServerSelector::Id(*only)).await,
            many => {
                let servers = self.servers.read().await;
                let names = many
                    .iter()
                    .filter_map(|id| servers.iter().find(|e| e.server.id() == *id).map(|e| e.server.name().to_string()))
                    .collect();
                Err(McpError::AmbiguousToolName { name: name.to_string(), servers: names })
            }
        }
    }

    /// # Errors
    ///
    /// Returns [`McpError::Validation`] if a required argument is missing,
    /// else whatever [`Self::resolve_tool`]/[`McpServer::call_tool`] return,
    /// wrapped in [`McpError::tool_call`] for context.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
        server: Option<ServerSelector>,
        meta: Option<Value>,
    ) -> McpResult<ToolCallResult> {
        let owner = self.resolve_tool(name, server).await?;
        if self.tools_cache.iter().next().is_none() {
            self.refresh_tools().await?;
        }
        if let Some((_, tool)) = self.tools_cache.iter().find(|(key, _)| key.ends_with(&format!(":{name}"))) {
            validate_required_arguments(&tool, &arguments)?;
        }

        owner
            .call_tool(name, arguments, meta)
            .await
            .map_err(|e| McpError::tool_call(name, owner.name(), e))
    }

    /// # Errors
    ///
    /// See [`Self::resolve_tool`]'s error modes, applied to prompts.
    pub async fn get_prompt(&self, name: &str, arguments: Value, server: Option<ServerSelector>) -> McpResult<Value> {
        let owner = self.resolve_prompt(name, server).await?;
        owner.get_prompt(name, arguments).await.map_err(|e| McpError::prompt_get(name, owner.name(), e))
    }

    async fn resolve_prompt(&self, name: &str, server: Option<ServerSelector>) -> McpResult<Arc<McpServer>> {
        if let Some(selector) = server {
            return self.server_by_selector(&selector).await;
        }
        if self.prompts_cache.iter().next().is_none() {
            self.list_prompts(false).await?;
        }
        let owners: Vec<ServerId> = self
            .prompts_cache
            .iter()
            .filter(|(key, _)| key.ends_with(&format!(":{name}")))
            .filter_map(|(key, _)| key.split_once(':').and_then(|(idx, _)| idx.parse::<usize>().ok()).map(ServerId::from_index))
            .collect();

        match owners.as_slice() {
            [] => Err(McpError::PromptNotFound(name.to_string())),
            [only] => self.server_by_selector(&ServerSelector::Id(*only)).await,
            many => {
                let servers = self.servers.read().await;
                let names = many
                    .iter()
                    .filter_map(|id| servers.iter().find(|e| e.server.id() == *id).map(|e| e.server.name().to_string()))
                    .collect();
                Err(McpError::AmbiguousPromptName { name: name.to_string(), servers: names })
            }
        }
    }

    /// # Errors
    ///
    /// See [`Self::resolve_tool`]'s error modes, applied to resources.
    pub async fn read_resource(&self, uri: &str, server: Option<ServerSelector>) -> McpResult<Value> {
        let owner = self.resolve_resource(uri, server).await?;
        let contents = owner.read_resource(uri).await.map_err(|e| McpError::resource_read(uri, owner.name(), e))?;
        serde_json::to_value(contents).map_err(|e| McpError::Transport(crate::error::TransportError::Serialization(e)))
    }

    async fn resolve_resource(&self, uri: &str, server: Option<ServerSelector>) -> McpResult<Arc<McpServer>> {
        if let Some(selector) = server {
            return self.server_by_selector(&selector).await;
        }
        if self.resources_cache.iter().next().is_none() {
            self.list_resources(false, None).await?;
        }
        let owners: Vec<ServerId> = self
            .resources_cache
            .iter()
            .filter(|(key, _)| key.ends_with(&format!(":{uri}")))
            .filter_map(|(key, _)| key.split_once(':').and_then(|(idx, _)| idx.parse::<usize>().ok()).map(ServerId::from_index))
            .collect();

        match owners.as_slice() {
            [] => Err(McpError::ResourceNotFound(uri.to_string())),
            [only] => self.server_by_selector(&ServerSelector::Id(*only)).await,
            many => {
                let servers = self.servers.read().await;
                let names = many
                    .iter()
                    .filter_map(|id| servers.iter().find(|e| e.server.id() == *id).map(|e| e.server.name().to_string()))
                    .collect();
                Err(McpError::AmbiguousResourceUri { uri: uri.to_string(), servers: names })
            }
        }
    }

    /// Reacts to `*/list_changed` notifications by clearing the matching
    /// cache; everything else is handed to user listeners unchanged
    /// (spec.md §4.H).
    pub async fn on_notification<F>(&self, listener: F)
    where
        F: Fn(&str, &str, Value) + Send + Sync + 'static,
    {
        self.notification_listeners.write().await.push(Arc::new(listener));
    }

    /// Replace the roots list, notifying every connected server
    /// (spec.md §4.H).
    ///
    /// # Errors
    ///
    /// Propagates the first server's notification-send failure.
    pub async fn set_roots(&self, roots: Vec<Root>) -> McpResult<()> {
        *self.roots.write().await = roots;
        let servers = self.servers.read().await;
        for entry in servers.iter() {
            entry.server.notify_roots_changed().await?;
        }
        Ok(())
    }

    #[must_use]
    pub async fn roots(&self) -> Vec<Root> {
        self.roots.read().await.clone()
    }

    /// Set the log level on every connected server (the "assignment-style
    /// all-servers variant", DESIGN.md Open Question decision #3).
    ///
    /// # Errors
    ///
    /// Propagates the first server's `set_log_level` failure.
    pub async fn set_log_level_all(&self, level: LogLevel) -> McpResult<()> {
        let servers = self.servers.read().await;
        for entry in servers.iter() {
            entry.server.set_log_level(level).await?;
        }
        Ok(())
    }

    /// # Errors
    ///
    /// See [`Self::resolve_tool`]'s error modes (applied via [`ServerSelector`]).
    pub async fn complete(&self, server: ServerSelector, reference: Value, argument: Value) -> McpResult<CompletionResult> {
        let owner = self.server_by_selector(&server).await?;
        owner.complete(reference, argument).await
    }

    /// Liveness check against one connected server (spec.md §4.E `ping`).
    ///
    /// # Errors
    ///
    /// See [`Self::resolve_tool`]'s error modes (applied via [`ServerSelector`]).
    pub async fn ping(&self, server: ServerSelector) -> McpResult<Value> {
        let owner = self.server_by_selector(&server).await?;
        owner.ping().await
    }

    /// Shut every connected server's transport down (spec.md §5: idempotent
    /// cleanup).
    pub async fn shutdown(&self) {
        let servers = self.servers.read().await;
        for entry in servers.iter() {
            if let Err(e) = entry.server.cleanup().await {
                tracing::warn!(error = %e, server = %entry.server.name(), "cleanup failed");
            }
        }
    }

    #[must_use]
    pub async fn server_names(&self) -> Vec<String> {
        self.servers.read().await.iter().map(|e| e.server.name().to_string()).collect()
    }
}

/// Spec.md §4.H's pre-flight validation: every schema `required` field
/// (minus those carrying a `default`) must be present in `arguments`.
fn validate_required_arguments(tool: &Tool, arguments: &Value) -> McpResult<()> {
    let provided = arguments.as_object();
    for required in tool.required_arguments() {
        let present = provided.is_some_and(|obj| obj.contains_key(&required));
        if !present {
            return Err(McpError::Validation(format!("missing required argument {required:?} for tool {:?}", tool.name)));
        }
    }
    Ok(())
}

/// Route one inbound notification: `*/list_changed` clears the matching
/// cache's entries for the originating server automatically (spec.md §4.H:
/// "On receipt of `notifications/tools/list_changed` (or the corresponding
/// prompts/resources variant) the aggregator clears the relevant cache
/// automatically"). `notifications/message` is mapped to a `tracing` level
/// and prefixed per spec.md §4.H; everything else is forwarded to
/// registered listeners verbatim.
#[allow(clippy::too_many_arguments)]
fn dispatch_notification(
    listeners: &Arc<RwLock<Vec<NotificationListener>>>,
    tools_cache: &Cache<String, Tool>,
    prompts_cache: &Cache<String, Prompt>,
    resources_cache: &Cache<String, Resource>,
    server_id: ServerId,
    server_name: &str,
    method: &str,
    params: &Value,
) {
    if method == "notifications/message" {
        log_server_message(server_name, params);
    }
    let listeners = Arc::clone(listeners);
    let tools_cache = tools_cache.clone();
    let prompts_cache = prompts_cache.clone();
    let resources_cache = resources_cache.clone();
    let server_name = server_name.to_string();
    let method = method.to_string();
    let params = params.clone();
    tokio::spawn(async move {
        match method.as_str() {
            "notifications/tools/list_changed" => invalidate_server_entries(&tools_cache, server_id).await,
            "notifications/prompts/list_changed" => invalidate_server_entries(&prompts_cache, server_id).await,
            "notifications/resources/list_changed" => invalidate_server_entries(&resources_cache, server_id).await,
            _ => {}
        }
        for listener in listeners.read().await.iter() {
            listener(&server_name, &method, params.clone());
        }
    });
}

/// Evict every cache entry keyed under `server_id` (the `"{index}:{name}"`
/// keys [`McpClient::cache_key`] produces), leaving other servers' entries
/// untouched.
async fn invalidate_server_entries<V: Clone + Send + Sync + 'static>(cache: &Cache<String, V>, server_id: ServerId) {
    let prefix = format!("{}:", server_id.index());
    let keys: Vec<String> = cache.iter().filter_map(|(key, _)| key.starts_with(&prefix).then(|| (*key).clone())).collect();
    for key in keys {
        cache.invalidate(&key).await;
    }
}

fn log_server_message(server_name: &str, params: &Value) {
    let level = params.get("level").and_then(Value::as_str).unwrap_or("info");
    let logger = params.get("logger").and_then(Value::as_str);
    let data = params.get("data").cloned().unwrap_or(Value::Null);
    let prefix = logger.map_or_else(|| format!("[{server_name}]"), |logger| format!("[{server_name}:{logger}]"));

    match level {
        "debug" => tracing::debug!(%prefix, %data, "server log"),
        "warning" => tracing::warn!(%prefix, %data, "server log"),
        "error" | "critical" => tracing::error!(%prefix, %data, "server log"),
        _ => tracing::info!(%prefix, %data, "server log"),
    }
}
