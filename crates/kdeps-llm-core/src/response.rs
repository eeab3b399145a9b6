// SPDX-License-Identifier: MIT OR Apache-2.0
//! The normalized shape every [`crate::Backend::parse_response`]
//! implementation raises a provider's native response into.

use crate::ir::ToolCall;
use serde::{Deserialize, Serialize};

/// Token accounting, when the provider reports it. Providers that omit
/// usage data leave both fields zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Prompt tokens consumed.
    pub prompt_tokens: u64,
    /// Completion tokens produced.
    pub completion_tokens: u64,
}

/// The assistant turn extracted from a provider response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NormalizedMessage {
    /// Always `"assistant"` for a successful chat completion.
    pub role: String,
    /// The text content, or empty when the turn is tool-calls-only.
    pub content: String,
    /// Tool calls requested by the model, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

/// A provider response, normalized to a single shape regardless of the
/// backend that produced it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NormalizedResponse {
    /// The assistant message.
    pub message: NormalizedMessage,
    /// Token usage, if reported.
    #[serde(default)]
    pub usage: Usage,
}

impl NormalizedResponse {
    /// `true` when the model requested at least one tool call.
    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        self.message
            .tool_calls
            .as_ref()
            .is_some_and(|calls| !calls.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_without_tool_calls_reports_false() {
        let response = NormalizedResponse {
            message: NormalizedMessage {
                role: "assistant".into(),
                content: "hi".into(),
                tool_calls: None,
            },
            usage: Usage::default(),
        };
        assert!(!response.has_tool_calls());
    }

    #[test]
    fn response_with_empty_tool_calls_reports_false() {
        let response = NormalizedResponse {
            message: NormalizedMessage {
                role: "assistant".into(),
                content: String::new(),
                tool_calls: Some(vec![]),
            },
            usage: Usage::default(),
        };
        assert!(!response.has_tool_calls());
    }

    #[test]
    fn response_with_tool_calls_reports_true() {
        let response = NormalizedResponse {
            message: NormalizedMessage {
                role: "assistant".into(),
                content: String::new(),
                tool_calls: Some(vec![ToolCall {
                    id: "1".into(),
                    name: "lookup".into(),
                    arguments: "{}".into(),
                }]),
            },
            usage: Usage::default(),
        };
        assert!(response.has_tool_calls());
    }
}
