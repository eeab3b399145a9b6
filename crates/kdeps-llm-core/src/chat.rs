// SPDX-License-Identifier: MIT OR Apache-2.0
//! Chat request configuration: the caller-facing knobs an LLM resource
//! declares, before expression evaluation and backend dispatch.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One file path reference attached to a chat turn. Resolved to either an
/// uploaded file or a filesystem path relative to the workflow's fs root.
pub type FileRef = String;

/// One scenario turn: an extra message inserted before or after the user
/// prompt, depending on its role.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScenarioItem {
    /// `"system"`, `"user"`, or `"assistant"`.
    pub role: String,
    /// The message body, possibly an expression placeholder.
    pub prompt: String,
    /// An optional caller-given name, emitted verbatim on the message.
    #[serde(default)]
    pub name: Option<String>,
}

/// A single named, typed parameter of a [`ToolSpec`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameter {
    /// Parameter name.
    pub name: String,
    /// JSON Schema type, e.g. `"string"`, `"number"`, `"boolean"`.
    #[serde(rename = "type")]
    pub param_type: String,
    /// Human-readable description surfaced in the tool-protocol system
    /// prompt.
    #[serde(default)]
    pub description: String,
    /// Whether the model must supply this parameter.
    #[serde(default)]
    pub required: bool,
}

/// A tool the model may call. `script` names the resource (by action id)
/// that is invoked when this tool is called.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Tool name, as presented to the model.
    pub name: String,
    /// Description surfaced to the model.
    #[serde(default)]
    pub description: String,
    /// The resource action id invoked when the model calls this tool.
    pub script: String,
    /// Declared parameters.
    #[serde(default)]
    pub parameters: Vec<ToolParameter>,
}

impl ToolSpec {
    /// Render this tool into the provider-agnostic `{type:"function",
    /// function:{...}}` shape shared by every OpenAI-derived tool-calling
    /// API.
    #[must_use]
    pub fn to_function_shape(&self) -> Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        for param in &self.parameters {
            properties.insert(
                param.name.clone(),
                serde_json::json!({
                    "type": param.param_type,
                    "description": param.description,
                }),
            );
            if param.required {
                required.push(Value::String(param.name.clone()));
            }
        }
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": {
                    "type": "object",
                    "properties": Value::Object(properties),
                    "required": required,
                }
            }
        })
    }
}

/// Render every tool in `tools` into the shared function-calling shape.
#[must_use]
pub fn tools_to_function_shape(tools: &[ToolSpec]) -> Vec<Value> {
    tools.iter().map(ToolSpec::to_function_shape).collect()
}

/// The full configuration of one chat turn, prior to expression
/// evaluation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Backend name; defaults to the local backend when absent.
    #[serde(default)]
    pub backend: Option<String>,
    /// Override for the backend's default base URL.
    #[serde(default, rename = "baseURL")]
    pub base_url: Option<String>,
    /// API key; when absent the executor falls back to the backend's
    /// configured environment variable.
    #[serde(default, rename = "apiKey")]
    pub api_key: Option<String>,
    /// The user message's role; defaults to `"user"`.
    #[serde(default)]
    pub role: Option<String>,
    /// The model identifier passed to the backend.
    pub model: String,
    /// The user prompt, possibly containing expression placeholders.
    pub prompt: String,
    /// Files attached to the prompt (uploaded-file names or fs paths).
    #[serde(default)]
    pub files: Vec<FileRef>,
    /// Extra messages inserted before/after the user turn.
    #[serde(default)]
    pub scenario: Vec<ScenarioItem>,
    /// Tools the model may call.
    #[serde(default)]
    pub tools: Vec<ToolSpec>,
    /// Maximum output token budget, provider-dependent.
    #[serde(default, rename = "contextLength")]
    pub context_length: Option<u32>,
    /// Request timeout in seconds; defaults to 60.
    #[serde(default, rename = "timeoutDuration")]
    pub timeout_duration: Option<u64>,
    /// Whether the response should be parsed as JSON.
    #[serde(default, rename = "jsonResponse")]
    pub json_response: bool,
    /// When `json_response` is set, project the parsed object onto these
    /// keys.
    #[serde(default, rename = "jsonResponseKeys")]
    pub json_response_keys: Vec<String>,
}

impl ChatConfig {
    /// The effective request timeout, defaulting to 60 seconds.
    #[must_use]
    pub fn timeout_secs(&self) -> u64 {
        self.timeout_duration.unwrap_or(60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_shape_lists_required_params() {
        let tool = ToolSpec {
            name: "lookup".into(),
            description: "look something up".into(),
            script: "@demo/lookup".into(),
            parameters: vec![
                ToolParameter {
                    name: "query".into(),
                    param_type: "string".into(),
                    description: "search text".into(),
                    required: true,
                },
                ToolParameter {
                    name: "limit".into(),
                    param_type: "number".into(),
                    description: "max results".into(),
                    required: false,
                },
            ],
        };
        let shape = tool.to_function_shape();
        assert_eq!(shape["function"]["name"], Value::from("lookup"));
        assert_eq!(shape["function"]["parameters"]["required"], serde_json::json!(["query"]));
    }

    #[test]
    fn default_timeout_is_60_seconds() {
        let config = ChatConfig {
            model: "test".into(),
            prompt: "hi".into(),
            ..Default::default()
        };
        assert_eq!(config.timeout_secs(), 60);
    }

    #[test]
    fn explicit_timeout_overrides_default() {
        let mut config = ChatConfig {
            model: "test".into(),
            prompt: "hi".into(),
            ..Default::default()
        };
        config.timeout_duration = Some(10);
        assert_eq!(config.timeout_secs(), 10);
    }

    #[test]
    fn tools_to_function_shape_renders_every_tool() {
        let tools = vec![
            ToolSpec { name: "a".into(), description: String::new(), script: "@x/a".into(), parameters: vec![] },
            ToolSpec { name: "b".into(), description: String::new(), script: "@x/b".into(), parameters: vec![] },
        ];
        assert_eq!(tools_to_function_shape(&tools).len(), 2);
    }
}
