// SPDX-License-Identifier: MIT OR Apache-2.0
//! Google's native Gemini `generateContent` API: key-as-query auth rather
//! than a header, and a `candidates[0].content.parts` response shape.

use kdeps_error::{Error, ErrorCode};
use kdeps_llm_core::ir::{ChatMessage, ContentPart, MessageContent, Role};
use kdeps_llm_core::response::{NormalizedMessage, NormalizedResponse, Usage};
use kdeps_llm_core::{Backend, ChatConfig};
use serde_json::{Map, Value};

/// Google's native Gemini API.
pub struct GoogleBackend;

fn role_to_gemini(role: Role) -> &'static str {
    match role {
        Role::Assistant => "model",
        Role::System | Role::User | Role::Tool => "user",
    }
}

fn part_to_wire(part: &ContentPart) -> Value {
    match part {
        ContentPart::Text { text } => serde_json::json!({"text": text}),
        ContentPart::ImageUrl { image_url } => {
            let (mime_type, data) = split_data_url(&image_url.url);
            serde_json::json!({"inline_data": {"mime_type": mime_type, "data": data}})
        }
    }
}

fn split_data_url(url: &str) -> (String, String) {
    match url.strip_prefix("data:").and_then(|rest| rest.split_once(";base64,")) {
        Some((mime, data)) => (mime.to_string(), data.to_string()),
        None => ("application/octet-stream".to_string(), url.to_string()),
    }
}

fn message_to_wire(message: &ChatMessage) -> Value {
    let parts: Vec<Value> = match &message.content {
        MessageContent::Text(text) => vec![serde_json::json!({"text": text})],
        MessageContent::Parts(parts) => parts.iter().map(part_to_wire).collect(),
    };
    serde_json::json!({"role": role_to_gemini(message.role), "parts": parts})
}

impl Backend for GoogleBackend {
    fn name(&self) -> &str {
        "google"
    }

    fn default_url(&self) -> &str {
        "https://generativelanguage.googleapis.com/v1beta"
    }

    fn chat_endpoint(&self, base_url: &str) -> String {
        format!("{base_url}/models/gemini-pro:generateContent")
    }

    fn build_request(
        &self,
        _model: &str,
        messages: &[ChatMessage],
        config: &ChatConfig,
    ) -> Result<Value, Error> {
        let (system, rest): (Vec<&ChatMessage>, Vec<&ChatMessage>) =
            messages.iter().partition(|m| m.role == Role::System);
        let mut body = Map::new();
        if let Some(system_msg) = system.first() {
            body.insert(
                "systemInstruction".to_string(),
                serde_json::json!({"parts": [{"text": system_msg.content.text()}]}),
            );
        }
        body.insert(
            "contents".to_string(),
            Value::Array(rest.into_iter().map(message_to_wire).collect()),
        );
        if config.json_response {
            body.insert(
                "generationConfig".to_string(),
                serde_json::json!({"responseMimeType": "application/json"}),
            );
        }
        Ok(Value::Object(body))
    }

    fn parse_response(&self, response: &Value) -> Result<NormalizedResponse, Error> {
        let content = response
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|c| c.first())
            .and_then(|c| c.get("content"))
            .and_then(|c| c.get("parts"))
            .and_then(Value::as_array)
            .ok_or_else(|| malformed("missing candidates[0].content.parts"))?
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("");
        let usage = response
            .get("usageMetadata")
            .map(|u| Usage {
                prompt_tokens: u.get("promptTokenCount").and_then(Value::as_u64).unwrap_or(0),
                completion_tokens: u.get("candidatesTokenCount").and_then(Value::as_u64).unwrap_or(0),
            })
            .unwrap_or_default();
        Ok(NormalizedResponse {
            message: NormalizedMessage {
                role: Role::Assistant.as_str().to_string(),
                content,
                tool_calls: None,
            },
            usage,
        })
    }

    fn api_key_header(&self, _api_key: &str) -> (String, String) {
        (String::new(), String::new())
    }

    fn auth_via_query(&self) -> bool {
        true
    }

    fn chat_endpoint_with_key(&self, base_url: &str, api_key: &str) -> String {
        format!("{}?key={api_key}", self.chat_endpoint(base_url))
    }
}

fn malformed(detail: &str) -> Error {
    Error::new(ErrorCode::LlmRequestBuildFailed, format!("google: {detail}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assistant_role_maps_to_model() {
        assert_eq!(role_to_gemini(Role::Assistant), "model");
        assert_eq!(role_to_gemini(Role::User), "user");
    }

    #[test]
    fn chat_endpoint_with_key_embeds_api_key_as_query() {
        let backend = GoogleBackend;
        let url = backend.chat_endpoint_with_key("https://generativelanguage.googleapis.com/v1beta", "abc123");
        assert!(url.ends_with("?key=abc123"));
        assert!(backend.auth_via_query());
    }

    #[test]
    fn api_key_header_is_empty() {
        let backend = GoogleBackend;
        assert_eq!(backend.api_key_header("abc123"), (String::new(), String::new()));
    }

    #[test]
    fn system_message_becomes_system_instruction() {
        let backend = GoogleBackend;
        let messages = vec![
            ChatMessage::text(Role::System, "be terse"),
            ChatMessage::text(Role::User, "hi"),
        ];
        let config = ChatConfig { model: "gemini-pro".into(), prompt: "hi".into(), ..Default::default() };
        let request = backend.build_request("gemini-pro", &messages, &config).unwrap();
        assert_eq!(request["systemInstruction"]["parts"][0]["text"], Value::from("be terse"));
        assert_eq!(request["contents"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn parse_response_joins_text_parts() {
        let backend = GoogleBackend;
        let response = serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": "hello"}, {"text": " world"}]}}],
        });
        let parsed = backend.parse_response(&response).unwrap();
        assert_eq!(parsed.message.content, "hello world");
    }

    #[test]
    fn parse_response_missing_candidates_is_an_error() {
        let backend = GoogleBackend;
        let err = backend.parse_response(&serde_json::json!({})).unwrap_err();
        assert_eq!(err.code, ErrorCode::LlmRequestBuildFailed);
    }
}
