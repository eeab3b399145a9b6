// SPDX-License-Identifier: MIT OR Apache-2.0
//! Provider-agnostic chat message representation.
//!
//! [`ChatMessage`] is the shape every [`crate::Backend`] implementation
//! lowers into its own wire format and raises a parsed response back into.
//! It is deliberately smaller than a full conversation IR: kdeps messages
//! only ever carry text, a single multimodal content array, or tool-call
//! bookkeeping — there is no separate "thinking" block or vendor metadata
//! bag to round-trip.

use serde::{Deserialize, Serialize};

/// The author of a [`ChatMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt / instructions.
    System,
    /// User / caller turn.
    User,
    /// Model turn.
    Assistant,
    /// Tool result turn, correlated to a prior tool call by id.
    Tool,
}

impl Role {
    /// The wire string most providers use verbatim.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// A single part of a multimodal message body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Plain text.
    Text {
        /// The text payload.
        text: String,
    },
    /// An inline image, referenced by a data URL.
    ImageUrl {
        /// The image reference.
        image_url: ImageUrl,
    },
}

/// An image reference, always a `data:<mime>;base64,<...>` URL in this
/// runtime — no remote image URLs are fetched on the caller's behalf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    /// The data URL.
    pub url: String,
}

/// A message body: plain text, or a multimodal array of parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain text body.
    Text(String),
    /// Ordered multimodal parts (text interleaved with images).
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// The concatenation of every text part (or the text body itself).
    #[must_use]
    pub fn text(&self) -> String {
        match self {
            Self::Text(t) => t.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned call id, echoed back in the matching tool result.
    pub id: String,
    /// The tool's name.
    pub name: String,
    /// Raw JSON arguments, as returned by the provider (a string, since
    /// most providers return a JSON-encoded string rather than a parsed
    /// object).
    pub arguments: String,
}

/// A single turn in a chat conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The author of this turn.
    pub role: Role,
    /// The message body.
    pub content: MessageContent,
    /// Present on assistant messages that request tool calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Present on tool-result messages: the id of the call this result
    /// answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Present on tool-result and system messages carrying a caller-given
    /// name (scenario items may name themselves).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    /// A plain-text message with no tool bookkeeping.
    #[must_use]
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(text.into()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    /// A multimodal message (text plus image parts).
    #[must_use]
    pub fn multimodal(role: Role, parts: Vec<ContentPart>) -> Self {
        Self {
            role,
            content: MessageContent::Parts(parts),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    /// A tool-result message answering `tool_call_id`.
    #[must_use]
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: MessageContent::Text(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
            name: None,
        }
    }

    /// Attach a caller-given name (used by scenario items).
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_content_concatenates_parts() {
        let content = MessageContent::Parts(vec![
            ContentPart::Text { text: "a".into() },
            ContentPart::ImageUrl {
                image_url: ImageUrl { url: "data:image/png;base64,xx".into() },
            },
            ContentPart::Text { text: "b".into() },
        ]);
        assert_eq!(content.text(), "ab");
    }

    #[test]
    fn plain_text_content_passes_through() {
        assert_eq!(MessageContent::Text("hello".into()).text(), "hello");
    }

    #[test]
    fn role_as_str_matches_wire_tokens() {
        assert_eq!(Role::System.as_str(), "system");
        assert_eq!(Role::Tool.as_str(), "tool");
    }

    #[test]
    fn tool_result_message_carries_call_id() {
        let msg = ChatMessage::tool_result("call-1", "42");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call-1"));
        assert_eq!(msg.content.text(), "42");
    }
}
