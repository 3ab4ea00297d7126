//! Content payloads that can appear inside `resources/read` results and
//! tool-call result `content` arrays.

use serde::{Deserialize, Serialize};

use super::resource::ResourceAnnotations;

/// The body of a resource read. Exactly one of text/blob is ever present —
/// enforced here by using an untagged enum rather than two optional fields,
/// so "both present" and "neither present" are both unrepresentable
/// (spec.md §3 content-exclusivity invariant).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceContent {
    Text {
        uri: String,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        annotations: Option<ResourceAnnotations>,
    },
    Blob {
        uri: String,
        blob: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        annotations: Option<ResourceAnnotations>,
    },
}

impl ResourceContent {
    #[must_use]
    pub const fn is_text(&self) -> bool {
        matches!(self, Self::Text { .. })
    }

    #[must_use]
    pub const fn is_binary(&self) -> bool {
        matches!(self, Self::Blob { .. })
    }

    #[must_use]
    pub fn uri(&self) -> &str {
        match self {
            Self::Text { uri, .. } | Self::Blob { uri, .. } => uri,
        }
    }
}

/// A pointer to a resource appearing inside a tool result's `content` array,
/// as opposed to an inline [`ResourceContent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLink {
    pub uri: String,
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<ResourceAnnotations>,
}

/// Inline audio content. Both fields are required and must be non-empty
/// (spec.md §3 audio invariants).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioContent {
    /// Base64-encoded audio bytes.
    pub data: String,
    pub mime_type: String,
}

impl AudioContent {
    /// Construct audio content, rejecting the invariant violation at the
    /// boundary rather than deferring it to a later consumer.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` or `mime_type` is empty.
    pub fn new(data: impl Into<String>, mime_type: impl Into<String>) -> Result<Self, &'static str> {
        let data = data.into();
        let mime_type = mime_type.into();
        if data.is_empty() {
            return Err("audio data must not be empty");
        }
        if mime_type.is_empty() {
            return Err("audio mime_type must not be empty");
        }
        Ok(Self { data, mime_type })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_and_blob_are_mutually_exclusive_on_the_wire() {
        let text = ResourceContent::Text {
            uri: "file:///a".into(),
            text: "hello".into(),
            mime_type: None,
            annotations: None,
        };
        assert!(text.is_text());
        assert!(!text.is_binary());

        let blob = ResourceContent::Blob {
            uri: "file:///b".into(),
            blob: "aGVsbG8=".into(),
            mime_type: Some("image/png".into()),
            annotations: None,
        };
        assert!(blob.is_binary());
        assert!(!blob.is_text());
    }

    #[test]
    fn deserializes_text_variant_from_json() {
        let json = serde_json::json!({"uri": "file:///a", "text": "hi"});
        let content: ResourceContent = serde_json::from_value(json).unwrap();
        assert!(content.is_text());
    }

    #[test]
    fn audio_content_rejects_empty_fields() {
        assert!(AudioContent::new("", "audio/wav").is_err());
        assert!(AudioContent::new("abc", "").is_err());
        assert!(AudioContent::new("abc", "audio/wav").is_ok());
    }
}
