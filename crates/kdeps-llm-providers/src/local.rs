// SPDX-License-Identifier: MIT OR Apache-2.0
//! A locally-hosted Ollama-compatible backend: `/api/chat`, always
//! `stream:false`, JSON mode via `format:"json"`, tools passed through
//! verbatim, and no authentication.

use kdeps_error::{Error, ErrorCode};
use kdeps_llm_core::chat::tools_to_function_shape;
use kdeps_llm_core::ir::{ChatMessage, ContentPart, MessageContent, Role};
use kdeps_llm_core::response::{NormalizedMessage, NormalizedResponse, Usage};
use kdeps_llm_core::{Backend, ChatConfig, ToolCall};
use serde_json::{Map, Value};

/// A locally-hosted Ollama-compatible backend.
pub struct LocalBackend;

fn message_to_wire(message: &ChatMessage) -> Value {
    let mut obj = Map::new();
    obj.insert("role".to_string(), Value::String(message.role.as_str().to_string()));
    let content = match &message.content {
        MessageContent::Text(text) => text.clone(),
        MessageContent::Parts(parts) => parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text { text } => Some(text.as_str()),
                ContentPart::ImageUrl { .. } => None,
            })
            .collect::<Vec<_>>()
            .join(""),
    };
    obj.insert("content".to_string(), Value::String(content));
    let images: Vec<Value> = match &message.content {
        MessageContent::Parts(parts) => parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::ImageUrl { image_url } => Some(Value::String(
                    image_url
                        .url
                        .split_once(";base64,")
                        .map(|(_, data)| data.to_string())
                        .unwrap_or_else(|| image_url.url.clone()),
                )),
                ContentPart::Text { .. } => None,
            })
            .collect(),
        MessageContent::Text(_) => Vec::new(),
    };
    if !images.is_empty() {
        obj.insert("images".to_string(), Value::Array(images));
    }
    if let Some(tool_calls) = &message.tool_calls {
        let wire: Vec<Value> = tool_calls
            .iter()
            .map(|tc| {
                let arguments: Value = serde_json::from_str(&tc.arguments)
                    .unwrap_or_else(|_| Value::String(tc.arguments.clone()));
                serde_json::json!({"function": {"name": tc.name, "arguments": arguments}})
            })
            .collect();
        obj.insert("tool_calls".to_string(), Value::Array(wire));
    }
    Value::Object(obj)
}

fn tool_call_from_wire(value: &Value) -> Option<ToolCall> {
    let function = value.get("function")?;
    let arguments = function
        .get("arguments")
        .map(|a| a.as_str().map(str::to_string).unwrap_or_else(|| a.to_string()))
        .unwrap_or_default();
    Some(ToolCall {
        id: value.get("id").and_then(Value::as_str).unwrap_or_default().to_string(),
        name: function.get("name")?.as_str()?.to_string(),
        arguments,
    })
}

impl Backend for LocalBackend {
    fn name(&self) -> &str {
        "local"
    }

    fn default_url(&self) -> &str {
        "http://localhost:11434"
    }

    fn chat_endpoint(&self, base_url: &str) -> String {
        format!("{base_url}/api/chat")
    }

    fn build_request(
        &self,
        model: &str,
        messages: &[ChatMessage],
        config: &ChatConfig,
    ) -> Result<Value, Error> {
        let mut body = Map::new();
        body.insert("model".to_string(), Value::String(model.to_string()));
        body.insert("stream".to_string(), Value::Bool(false));
        body.insert(
            "messages".to_string(),
            Value::Array(messages.iter().map(message_to_wire).collect()),
        );
        if config.json_response {
            body.insert("format".to_string(), Value::String("json".to_string()));
        }
        if !config.tools.is_empty() {
            body.insert("tools".to_string(), Value::Array(tools_to_function_shape(&config.tools)));
        }
        Ok(Value::Object(body))
    }

    fn parse_response(&self, response: &Value) -> Result<NormalizedResponse, Error> {
        let message = response.get("message").ok_or_else(|| malformed("missing message"))?;
        let content = message.get("content").and_then(Value::as_str).unwrap_or_default().to_string();
        let tool_calls = message
            .get("tool_calls")
            .and_then(Value::as_array)
            .map(|calls| calls.iter().filter_map(tool_call_from_wire).collect::<Vec<_>>())
            .filter(|calls| !calls.is_empty());
        let usage = Usage {
            prompt_tokens: response.get("prompt_eval_count").and_then(Value::as_u64).unwrap_or(0),
            completion_tokens: response.get("eval_count").and_then(Value::as_u64).unwrap_or(0),
        };
        Ok(NormalizedResponse {
            message: NormalizedMessage {
                role: Role::Assistant.as_str().to_string(),
                content,
                tool_calls,
            },
            usage,
        })
    }

    fn api_key_header(&self, _api_key: &str) -> (String, String) {
        (String::new(), String::new())
    }
}

fn malformed(detail: &str) -> Error {
    Error::new(ErrorCode::LlmRequestBuildFailed, format!("local: {detail}"))
}
