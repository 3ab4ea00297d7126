//! mcp-client
//!
//! A Rust client library for the Model Context Protocol (MCP). Connects to
//! one or more MCP servers over stdio, HTTP, SSE, or streamable-HTTP
//! transports, discovers their tools/prompts/resources, and aggregates them
//! behind a single facade so a host application can treat a fleet of
//! servers as one namespace.
//!
//! # Features
//!
//! - **Four transports**: stdio (child process), plain HTTP, SSE, and
//!   streamable HTTP, selected per server or auto-probed.
//! - **Multi-server aggregation**: tools/prompts/resources from every
//!   connected server are merged into one namespace, with disambiguation
//!   by server when names collide.
//! - **Bidirectional**: handles server-initiated elicitation, sampling, and
//!   roots requests, not just client-initiated calls.
//! - **OAuth 2.1 + PKCE**: built-in browser-based authorization flow with
//!   dynamic client registration and token refresh.
//!
//! # Example
//!
//! ```no_run
//! use mcp_client::ClientBuilder;
//! use mcp_client::config::quick_connect;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = ClientBuilder::new()
//!         .add_server(quick_connect("my-server", "stdio://my-server-binary")?)
//!         .build()
//!         .await?;
//!
//!     let tools = client.list_tools(true).await?;
//!     println!("{} tools available", tools.len());
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod oauth;
pub mod rpc;
pub mod schema;
pub mod server;
pub mod transport;

pub use client::{ClientBuilder, McpClient, ServerSelector};
pub use config::ServerConfig;
pub use error::{ConnectionError, McpError, McpResult, ServerError, TransportError, TransportResult};
pub use server::McpServer;
