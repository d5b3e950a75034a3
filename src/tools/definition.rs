//! Tool descriptors
//!
//! A descriptor is what a tool source declares about one callable action. It
//! lives for the duration of one call and is never persisted; routes refer to
//! tools by name only.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// A callable action declared by a tool source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Tool name (e.g., "web_search"), unique within a catalog
    pub name: String,
    /// Human-readable description for the planner
    #[serde(default)]
    pub description: String,
    /// JSON schema for input parameters
    #[serde(default = "empty_schema")]
    pub input_schema: Value,
    /// Tool source this tool was listed by
    #[serde(default)]
    pub source_id: String,
}

fn empty_schema() -> Value {
    json!({"type": "object", "properties": {}})
}

impl ToolDescriptor {
    /// Create a new descriptor with an empty object schema
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: empty_schema(),
            source_id: String::new(),
        }
    }

    /// Set input schema
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    /// Set the owning source
    pub fn with_source(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = source_id.into();
        self
    }

    /// Parameter names the schema marks as required
    pub fn required_fields(&self) -> Vec<&str> {
        self.input_schema
            .get("required")
            .and_then(|r| r.as_array())
            .map(|fields| fields.iter().filter_map(|f| f.as_str()).collect())
            .unwrap_or_default()
    }

    /// Required parameters absent from `arguments`
    pub fn missing_fields(&self, arguments: &Value) -> Vec<String> {
        self.required_fields()
            .into_iter()
            .filter(|field| arguments.get(*field).is_none())
            .map(String::from)
            .collect()
    }

    /// Parameter names with their declared types, for prompts
    pub fn parameter_summary(&self) -> String {
        let Some(props) = self.input_schema.get("properties").and_then(|p| p.as_object()) else {
            return String::new();
        };
        let required = self.required_fields();
        props
            .iter()
            .map(|(name, prop)| {
                let ty = prop.get("type").and_then(|t| t.as_str()).unwrap_or("any");
                if required.contains(&name.as_str()) {
                    format!("{}: {} (required)", name, ty)
                } else {
                    format!("{}: {}", name, ty)
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}
