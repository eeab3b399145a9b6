// SPDX-License-Identifier: MIT OR Apache-2.0
//! Anthropic's Messages API: `x-api-key` auth plus a fixed version header,
//! a `/v1/messages` endpoint, and a response shape where the assistant
//! text lives at `content[0].text` rather than `choices[0].message.content`.

use kdeps_error::{Error, ErrorCode};
use kdeps_llm_core::chat::tools_to_function_shape;
use kdeps_llm_core::ir::{ChatMessage, ContentPart, MessageContent, Role};
use kdeps_llm_core::response::{NormalizedMessage, NormalizedResponse, Usage};
use kdeps_llm_core::{Backend, ChatConfig, ToolCall};
use serde_json::{Map, Value};

/// The `anthropic-version` header value this runtime speaks.
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic's Messages API.
pub struct AnthropicBackend;

fn content_to_blocks(content: &MessageContent) -> Value {
    match content {
        MessageContent::Text(text) => Value::String(text.clone()),
        MessageContent::Parts(parts) => Value::Array(
            parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text { text } => serde_json::json!({"type": "text", "text": text}),
                    ContentPart::ImageUrl { image_url } => {
                        let (media_type, data) = split_data_url(&image_url.url);
                        serde_json::json!({
                            "type": "image",
                            "source": {"type": "base64", "media_type": media_type, "data": data},
                        })
                    }
                })
                .collect(),
        ),
    }
}

fn split_data_url(url: &str) -> (String, String) {
    match url.strip_prefix("data:").and_then(|rest| rest.split_once(";base64,")) {
        Some((mime, data)) => (mime.to_string(), data.to_string()),
        None => ("application/octet-stream".to_string(), url.to_string()),
    }
}

fn message_to_wire(message: &ChatMessage) -> Value {
    if message.role == Role::Tool {
        let content = message.content.text();
        return serde_json::json!({
            "role": "user",
            "content": [{
                "type": "tool_result",
                "tool_use_id": message.tool_call_id.clone().unwrap_or_default(),
                "content": content,
            }],
        });
    }
    if let Some(tool_calls) = &message.tool_calls {
        let blocks: Vec<Value> = tool_calls
            .iter()
            .map(|tc| {
                let input: Value = serde_json::from_str(&tc.arguments)
                    .unwrap_or_else(|_| Value::String(tc.arguments.clone()));
                serde_json::json!({"type": "tool_use", "id": tc.id, "name": tc.name, "input": input})
            })
            .collect();
        return serde_json::json!({"role": message.role.as_str(), "content": blocks});
    }
    serde_json::json!({"role": message.role.as_str(), "content": content_to_blocks(&message.content)})
}

impl Backend for AnthropicBackend {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn default_url(&self) -> &str {
        "https://api.anthropic.com"
    }

    fn chat_endpoint(&self, base_url: &str) -> String {
        format!("{base_url}/v1/messages")
    }

    fn build_request(
        &self,
        model: &str,
        messages: &[ChatMessage],
        config: &ChatConfig,
    ) -> Result<Value, Error> {
        let mut body = Map::new();
        body.insert("model".to_string(), Value::String(model.to_string()));
        body.insert(
            "max_tokens".to_string(),
            Value::from(config.context_length.unwrap_or(4096)),
        );
        let (system, rest): (Vec<&ChatMessage>, Vec<&ChatMessage>) =
            messages.iter().partition(|m| m.role == Role::System);
        if let Some(system_msg) = system.first() {
            body.insert("system".to_string(), Value::String(system_msg.content.text()));
        }
        body.insert(
            "messages".to_string(),
            Value::Array(rest.into_iter().map(message_to_wire).collect()),
        );
        if !config.tools.is_empty() {
            let tools: Vec<Value> = tools_to_function_shape(&config.tools)
                .into_iter()
                .map(|shape| {
                    serde_json::json!({
                        "name": shape["function"]["name"],
                        "description": shape["function"]["description"],
                        "input_schema": shape["function"]["parameters"],
                    })
                })
                .collect();
            body.insert("tools".to_string(), Value::Array(tools));
        }
        Ok(Value::Object(body))
    }

    fn parse_response(&self, response: &Value) -> Result<NormalizedResponse, Error> {
        let blocks = response
            .get("content")
            .and_then(Value::as_array)
            .ok_or_else(|| malformed("missing content[]"))?;
        let content = blocks
            .iter()
            .filter_map(|b| b.get("type").and_then(Value::as_str).filter(|t| *t == "text").and(b.get("text")))
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join("");
        let tool_calls: Vec<ToolCall> = blocks
            .iter()
            .filter(|b| b.get("type").and_then(Value::as_str) == Some("tool_use"))
            .filter_map(|b| {
                Some(ToolCall {
                    id: b.get("id")?.as_str()?.to_string(),
                    name: b.get("name")?.as_str()?.to_string(),
                    arguments: serde_json::to_string(b.get("input")?).unwrap_or_default(),
                })
            })
            .collect();
        let usage = response
            .get("usage")
            .map(|u| Usage {
                prompt_tokens: u.get("input_tokens").and_then(Value::as_u64).unwrap_or(0),
                completion_tokens: u.get("output_tokens").and_then(Value::as_u64).unwrap_or(0),
            })
            .unwrap_or_default();
        Ok(NormalizedResponse {
            message: NormalizedMessage {
                role: Role::Assistant.as_str().to_string(),
                content,
                tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
            },
            usage,
        })
    }

    fn api_key_header(&self, api_key: &str) -> (String, String) {
        ("x-api-key".to_string(), api_key.to_string())
    }
}

fn malformed(detail: &str) -> Error {
    Error::new(ErrorCode::LlmRequestBuildFailed, format!("anthropic: {detail}"))
}
