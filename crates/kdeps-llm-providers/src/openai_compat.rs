// SPDX-License-Identifier: MIT OR Apache-2.0
//! The OpenAI Chat Completions wire format, shared by every provider that
//! speaks it natively: OpenAI itself, Mistral, Together, Perplexity, Groq,
//! DeepSeek, and Google's OpenAI-compatibility endpoint.
//!
//! One parameterized [`OpenAiCompatBackend`] stands in for seven
//! near-identical structs — the quirks between these providers are
//! entirely in their base URL and chat path, never in request/response
//! shape.

use kdeps_error::{Error, ErrorCode};
use kdeps_llm_core::chat::tools_to_function_shape;
use kdeps_llm_core::ir::{ChatMessage, ContentPart, MessageContent, Role};
use kdeps_llm_core::response::{NormalizedMessage, NormalizedResponse, Usage};
use kdeps_llm_core::{Backend, ChatConfig, ToolCall};
use serde_json::{Map, Value};

/// An OpenAI Chat Completions-compatible backend.
pub struct OpenAiCompatBackend {
    name: String,
    base_url: String,
    chat_path: String,
}

impl OpenAiCompatBackend {
    /// Build a backend for `name`, defaulting requests to `base_url` and
    /// appending `chat_path` for the chat-completions endpoint.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        chat_path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            chat_path: chat_path.into(),
        }
    }

    /// OpenAI itself, at `api.openai.com`.
    #[must_use]
    pub fn openai() -> Self {
        Self::new("openai", "https://api.openai.com/v1", "/chat/completions")
    }

    /// Mistral's hosted API.
    #[must_use]
    pub fn mistral() -> Self {
        Self::new("mistral", "https://api.mistral.ai/v1", "/chat/completions")
    }

    /// Together AI.
    #[must_use]
    pub fn together() -> Self {
        Self::new("together", "https://api.together.xyz/v1", "/chat/completions")
    }

    /// Perplexity.
    #[must_use]
    pub fn perplexity() -> Self {
        Self::new("perplexity", "https://api.perplexity.ai", "/chat/completions")
    }

    /// Groq.
    #[must_use]
    pub fn groq() -> Self {
        Self::new("groq", "https://api.groq.com/openai/v1", "/chat/completions")
    }

    /// DeepSeek.
    #[must_use]
    pub fn deepseek() -> Self {
        Self::new("deepseek", "https://api.deepseek.com/v1", "/chat/completions")
    }

    /// Google's OpenAI-compatibility endpoint.
    #[must_use]
    pub fn google_openai_compat() -> Self {
        Self::new(
            "google-openai-compat",
            "https://generativelanguage.googleapis.com/v1beta/openai",
            "/chat/completions",
        )
    }
}

fn content_to_wire(content: &MessageContent) -> Value {
    match content {
        MessageContent::Text(text) => Value::String(text.clone()),
        MessageContent::Parts(parts) => Value::Array(
            parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text { text } => serde_json::json!({"type": "text", "text": text}),
                    ContentPart::ImageUrl { image_url } => {
                        serde_json::json!({"type": "image_url", "image_url": {"url": image_url.url}})
                    }
                })
                .collect(),
        ),
    }
}

fn message_to_wire(message: &ChatMessage) -> Value {
    let mut obj = Map::new();
    obj.insert("role".to_string(), Value::String(message.role.as_str().to_string()));
    obj.insert("content".to_string(), content_to_wire(&message.content));
    if let Some(tool_calls) = &message.tool_calls {
        let wire: Vec<Value> = tool_calls
            .iter()
            .map(|tc| {
                serde_json::json!({
                    "id": tc.id,
                    "type": "function",
                    "function": {"name": tc.name, "arguments": tc.arguments},
                })
            })
            .collect();
        obj.insert("tool_calls".to_string(), Value::Array(wire));
    }
    if let Some(tool_call_id) = &message.tool_call_id {
        obj.insert("tool_call_id".to_string(), Value::String(tool_call_id.clone()));
    }
    if let Some(name) = &message.name {
        obj.insert("name".to_string(), Value::String(name.clone()));
    }
    Value::Object(obj)
}

fn tool_call_from_wire(value: &Value) -> Option<ToolCall> {
    Some(ToolCall {
        id: value.get("id")?.as_str()?.to_string(),
        name: value.get("function")?.get("name")?.as_str()?.to_string(),
        arguments: value
            .get("function")?
            .get("arguments")?
            .as_str()
            .unwrap_or_default()
            .to_string(),
    })
}

impl Backend for OpenAiCompatBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_url(&self) -> &str {
        &self.base_url
    }

    fn chat_endpoint(&self, base_url: &str) -> String {
        format!("{base_url}{}", self.chat_path)
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
            "messages".to_string(),
            Value::Array(messages.iter().map(message_to_wire).collect()),
        );
        if let Some(max_tokens) = config.context_length {
            body.insert("max_tokens".to_string(), Value::from(max_tokens));
        }
        if config.json_response {
            body.insert(
                "response_format".to_string(),
                serde_json::json!({"type": "json_object"}),
            );
        }
        if !config.tools.is_empty() {
            body.insert("tools".to_string(), Value::Array(tools_to_function_shape(&config.tools)));
        }
        Ok(Value::Object(body))
    }

    fn parse_response(&self, response: &Value) -> Result<NormalizedResponse, Error> {
        let choice = response
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|choices| choices.first())
            .ok_or_else(|| malformed(&self.name, "missing choices[0]"))?;
        let message = choice
            .get("message")
            .ok_or_else(|| malformed(&self.name, "missing choices[0].message"))?;
        let content = message
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let tool_calls = message
            .get("tool_calls")
            .and_then(Value::as_array)
            .map(|calls| calls.iter().filter_map(tool_call_from_wire).collect::<Vec<_>>())
            .filter(|calls| !calls.is_empty());
        let usage = response
            .get("usage")
            .map(|u| Usage {
                prompt_tokens: u.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0),
                completion_tokens: u.get("completion_tokens").and_then(Value::as_u64).unwrap_or(0),
            })
            .unwrap_or_default();
        Ok(NormalizedResponse {
            message: NormalizedMessage {
                role: Role::Assistant.as_str().to_string(),
                content,
                tool_calls,
            },
            usage,
        })
    }
}

fn malformed(backend: &str, detail: &str) -> Error {
    Error::new(ErrorCode::LlmRequestBuildFailed, format!("{backend}: {detail}"))
        .with_context("backend", backend)
}
