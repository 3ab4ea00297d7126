//! Pluggable token storage (spec.md §1: "does not mandate a persistence
//! backend for tokens; a pluggable store is defined").
//!
//! Grounded on the teacher's `server/oauth/store.rs` `Arc<RwLock<HashMap>>`
//! shape, narrowed from its full auth-code/client/token-pair lifecycle
//! (that crate *is* an authorization server) to the one thing a client
//! needs: remembering the token it was issued, per named provider.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::models::OAuthToken;

/// Where an [`super::OAuthProvider`] persists the token it obtains. Module-
/// scope defaults to [`InMemoryTokenStore`], but every provider can be
/// constructed with its own implementation (spec.md §9: "Token storage has
/// module-scope defaults but MUST remain replaceable per-provider").
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self, provider: &str) -> Option<OAuthToken>;
    async fn set(&self, provider: &str, token: OAuthToken);
    async fn clear(&self, provider: &str);
}

/// Default in-process store; tokens do not outlive the process.
#[derive(Debug, Default)]
pub struct InMemoryTokenStore {
    tokens: RwLock<HashMap<String, OAuthToken>>,
}

impl InMemoryTokenStore {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn get(&self, provider: &str) -> Option<OAuthToken> {
        self.tokens.read().await.get(provider).cloned()
    }

    async fn set(&self, provider: &str, token: OAuthToken) {
        self.tokens.write().await.insert(provider.to_string(), token);
    }

    async fn clear(&self, provider: &str) {
        self.tokens.write().await.remove(provider);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn token() -> OAuthToken {
        OAuthToken {
            access_token: "abc".into(),
            token_type: "Bearer".into(),
            expires_at: Utc::now() + chrono::Duration::seconds(60),
            refresh_token: None,
            scope: String::new(),
        }
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let store = InMemoryTokenStore::new();
        store.set("p1", token()).await;
        assert!(store.get("p1").await.is_some());
        assert!(store.get("p2").await.is_none());
    }

    #[tokio::test]
    async fn clear_removes_the_token() {
        let store = InMemoryTokenStore::new();
        store.set("p1", token()).await;
        store.clear("p1").await;
        assert!(store.get("p1").await.is_none());
    }
}
