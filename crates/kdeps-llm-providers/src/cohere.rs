// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cohere's Chat API: a bespoke `{message, chat_history}` split rather than
//! a flat messages array. The last user message becomes `message`;
//! everything before it accumulates into `chat_history` with `USER` /
//! `CHATBOT` role labels (system messages are dropped from history —
//! Cohere has no system turn in this API version).

use kdeps_error::{Error, ErrorCode};
use kdeps_llm_core::ir::{ChatMessage, MessageContent, Role};
use kdeps_llm_core::response::{NormalizedMessage, NormalizedResponse, Usage};
use kdeps_llm_core::{Backend, ChatConfig};
use serde_json::{Map, Value};

/// Cohere's Chat API.
pub struct CohereBackend;

/// Flatten a message's content to plain text: for a multimodal array,
/// extract `.text` from the first part only (Cohere's Chat API has no
/// multimodal input in this version).
fn flatten_text(content: &MessageContent) -> String {
    match content {
        MessageContent::Text(text) => text.clone(),
        MessageContent::Parts(parts) => parts
            .first()
            .map(|part| match part {
                kdeps_llm_core::ContentPart::Text { text } => text.clone(),
                kdeps_llm_core::ContentPart::ImageUrl { .. } => String::new(),
            })
            .unwrap_or_default(),
    }
}

fn history_role(role: Role) -> Option<&'static str> {
    match role {
        Role::User => Some("USER"),
        Role::Assistant => Some("CHATBOT"),
        Role::System | Role::Tool => None,
    }
}

impl Backend for CohereBackend {
    fn name(&self) -> &str {
        "cohere"
    }

    fn default_url(&self) -> &str {
        "https://api.cohere.ai/v1"
    }

    fn chat_endpoint(&self, base_url: &str) -> String {
        format!("{base_url}/chat")
    }

    fn build_request(
        &self,
        model: &str,
        messages: &[ChatMessage],
        _config: &ChatConfig,
    ) -> Result<Value, Error> {
        let last_user_idx = messages
            .iter()
            .rposition(|m| m.role == Role::User)
            .ok_or_else(|| malformed("no user message to send"))?;

        let chat_history: Vec<Value> = messages[..last_user_idx]
            .iter()
            .filter_map(|m| {
                let role = history_role(m.role)?;
                Some(serde_json::json!({"role": role, "message": flatten_text(&m.content)}))
            })
            .collect();

        let mut body = Map::new();
        body.insert("model".to_string(), Value::String(model.to_string()));
        body.insert(
            "message".to_string(),
            Value::String(flatten_text(&messages[last_user_idx].content)),
        );
        body.insert("chat_history".to_string(), Value::Array(chat_history));
        Ok(Value::Object(body))
    }

    fn parse_response(&self, response: &Value) -> Result<NormalizedResponse, Error> {
        let content = response
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| malformed("missing text"))?
            .to_string();
        let usage = response
            .get("meta")
            .and_then(|m| m.get("tokens"))
            .map(|t| Usage {
                prompt_tokens: t.get("input_tokens").and_then(Value::as_u64).unwrap_or(0),
                completion_tokens: t.get("output_tokens").and_then(Value::as_u64).unwrap_or(0),
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
}

fn malformed(detail: &str) -> Error {
    Error::new(ErrorCode::LlmRequestBuildFailed, format!("cohere: {detail}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_user_message_becomes_message_field() {
        let backend = CohereBackend;
        let messages = vec![
            ChatMessage::text(Role::User, "first"),
            ChatMessage::text(Role::Assistant, "reply"),
            ChatMessage::text(Role::User, "second"),
        ];
        let config = ChatConfig { model: "command-r".into(), prompt: "second".into(), ..Default::default() };
        let request = backend.build_request("command-r", &messages, &config).unwrap();
        assert_eq!(request["message"], Value::from("second"));
        let history = request["chat_history"].as_array().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0]["role"], Value::from("USER"));
        assert_eq!(history[1]["role"], Value::from("CHATBOT"));
    }

    #[test]
    fn system_messages_are_dropped_from_history() {
        let backend = CohereBackend;
        let messages = vec![
            ChatMessage::text(Role::System, "be terse"),
            ChatMessage::text(Role::User, "hi"),
        ];
        let config = ChatConfig { model: "command-r".into(), prompt: "hi".into(), ..Default::default() };
        let request = backend.build_request("command-r", &messages, &config).unwrap();
        assert_eq!(request["chat_history"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn no_user_message_is_an_error() {
        let backend = CohereBackend;
        let messages = vec![ChatMessage::text(Role::System, "be terse")];
        let config = ChatConfig { model: "command-r".into(), prompt: String::new(), ..Default::default() };
        let err = backend.build_request("command-r", &messages, &config).unwrap_err();
        assert_eq!(err.code, ErrorCode::LlmRequestBuildFailed);
    }

    #[test]
    fn multimodal_content_flattens_to_first_text_part() {
        let message = ChatMessage::multimodal(
            Role::User,
            vec![
                kdeps_llm_core::ContentPart::Text { text: "describe".into() },
                kdeps_llm_core::ContentPart::ImageUrl {
                    image_url: kdeps_llm_core::ImageUrl { url: "data:image/png;base64,AA".into() },
                },
            ],
        );
        assert_eq!(flatten_text(&message.content), "describe");
    }

    #[test]
    fn parse_response_reads_text_field() {
        let backend = CohereBackend;
        let response = serde_json::json!({"text": "hello", "meta": {"tokens": {"input_tokens": 4, "output_tokens": 2}}});
        let parsed = backend.parse_response(&response).unwrap();
        assert_eq!(parsed.message.content, "hello");
        assert_eq!(parsed.usage.prompt_tokens, 4);
    }
}
