//! Filesystem-scope roots the client exposes to servers.

use serde::{Deserialize, Serialize};

/// A filesystem-scope boundary the client exposes to a server, constraining
/// what it may reasonably operate on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Root {
    pub uri: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Root {
    #[must_use]
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into(), name: None }
    }

    #[must_use]
    pub fn with_name(uri: impl Into<String>, name: impl Into<String>) -> Self {
        Self { uri: uri.into(), name: Some(name.into()) }
    }

    /// The `{uri, name?}` hash shape sent over `roots/list` (spec.md §4.H).
    #[must_use]
    pub fn to_hash(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    #[must_use]
    pub fn from_hash(value: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_round_trip_omits_absent_name() {
        let root = Root::new("file:///tmp");
        let hash = root.to_hash();
        assert_eq!(hash, serde_json::json!({"uri": "file:///tmp"}));
        assert_eq!(Root::from_hash(&hash), Some(root));
    }

    #[test]
    fn hash_round_trip_with_name() {
        let root = Root::with_name("file:///tmp", "scratch");
        let hash = root.to_hash();
        let back = Root::from_hash(&hash).unwrap();
        assert_eq!(back, root);
    }
}
