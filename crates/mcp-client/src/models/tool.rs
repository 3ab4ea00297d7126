//! Tool descriptor, as advertised by `tools/list` and invoked by `tools/call`.

use serde::{Deserialize, Serialize};

use super::server_id::ServerId;

/// Behavioral hints a server may attach to a tool. Defaults match
/// spec.md §3: `read_only = true`, `destructive = false`,
/// `idempotent = false`, `open_world = true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolAnnotations {
    #[serde(default = "default_true")]
    pub read_only_hint: bool,

    #[serde(default)]
    pub destructive_hint: bool,

    #[serde(default)]
    pub idempotent_hint: bool,

    #[serde(default = "default_true")]
    pub open_world_hint: bool,
}

impl Default for ToolAnnotations {
    fn default() -> Self {
        Self {
            read_only_hint: true,
            destructive_hint: false,
            idempotent_hint: false,
            open_world_hint: true,
        }
    }
}

const fn default_true() -> bool {
    true
}

/// A tool exposed by an MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Opaque JSON Schema describing accepted arguments.
    pub input_schema: serde_json::Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<ToolAnnotations>,

    /// Non-owning back-reference to the server that advertised this tool.
    /// Not part of the wire format.
    #[serde(skip)]
    pub server: Option<ServerId>,
}

impl Tool {
    /// Required-argument names per the tool's input schema's top-level
    /// `required` array, used by the aggregator's pre-flight validation
    /// (spec.md §4.H). A property that carries a `default` in the schema
    /// is excluded even if listed as required.
    #[must_use]
    pub fn required_arguments(&self) -> Vec<String> {
        let Some(required) = self.input_schema.get("required").and_then(|v| v.as_array()) else {
            return Vec::new();
        };
        let properties = self.input_schema.get("properties");

        required
            .iter()
            .filter_map(|v| v.as_str())
            .filter(|name| {
                let has_default = properties
                    .and_then(|p| p.get(name))
                    .and_then(|p| p.get("default"))
                    .is_some();
                !has_default
            })
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annotation_defaults_match_spec() {
        let annotations = ToolAnnotations::default();
        assert!(annotations.read_only_hint);
        assert!(!annotations.destructive_hint);
        assert!(!annotations.idempotent_hint);
        assert!(annotations.open_world_hint);
    }

    #[test]
    fn round_trip_preserves_name_description_schemas_and_hints() {
        let tool = Tool {
            name: "echo".into(),
            title: Some("Echo".into()),
            description: Some("echoes input".into()),
            input_schema: serde_json::json!({"type": "object"}),
            output_schema: Some(serde_json::json!({"type": "string"})),
            annotations: Some(ToolAnnotations { destructive_hint: true, ..Default::default() }),
            server: None,
        };

        let json = serde_json::to_value(&tool).unwrap();
        let back: Tool = serde_json::from_value(json).unwrap();

        assert_eq!(back.name, tool.name);
        assert_eq!(back.description, tool.description);
        assert_eq!(back.input_schema, tool.input_schema);
        assert_eq!(back.output_schema, tool.output_schema);
        assert_eq!(back.annotations, tool.annotations);
    }

    #[test]
    fn required_arguments_excludes_fields_with_defaults() {
        let tool = Tool {
            name: "search".into(),
            title: None,
            description: None,
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "limit": {"type": "integer", "default": 10}
                },
                "required": ["query", "limit"]
            }),
            output_schema: None,
            annotations: None,
            server: None,
        };

        assert_eq!(tool.required_arguments(), vec!["query".to_string()]);
    }
}
