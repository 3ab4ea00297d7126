//! Handshake metadata captured from `initialize` and exposed read-only.

use serde::{Deserialize, Serialize};

/// The `serverInfo` object returned in an `initialize` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerMetadata {
    pub name: String,
    pub version: String,
}

/// The client-identifying pair sent as `clientInfo` in an `initialize`
/// request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

impl ClientInfo {
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self { name: name.into(), version: version.into() }
    }
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self { name: "mcp-client".to_string(), version: env!("CARGO_PKG_VERSION").to_string() }
    }
}
