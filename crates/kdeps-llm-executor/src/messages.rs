// SPDX-License-Identifier: MIT OR Apache-2.0
//! Ordered chat-message assembly: the generated system prompt, scenario
//! items, and the user turn, in the order the model sees them.

use kdeps_llm_core::chat::{ChatConfig, ScenarioItem};
use kdeps_llm_core::ir::{ChatMessage, Role};

pub(crate) fn parse_role(role: &str) -> Role {
    match role {
        "system" => Role::System,
        "assistant" => Role::Assistant,
        "tool" => Role::Tool,
        _ => Role::User,
    }
}

/// Build the JSON-instruction + tool-protocol system prompt, when JSON
/// mode or tools make one necessary. Returns `None` otherwise — no bare
/// system turn is ever emitted for a plain-text, tool-free request.
#[must_use]
pub fn build_system_prompt(config: &ChatConfig) -> Option<String> {
    if !config.json_response && config.tools.is_empty() {
        return None;
    }

    let mut prompt = String::new();

    if config.json_response {
        prompt.push_str("Respond with a single JSON object and nothing else.");
        if !config.json_response_keys.is_empty() {
            prompt.push_str(" The object must contain exactly these keys: ");
            prompt.push_str(&config.json_response_keys.join(", "));
            prompt.push('.');
        }
    }

    if !config.tools.is_empty() {
        if !prompt.is_empty() {
            prompt.push('\n');
        }
        prompt.push_str("You may call the following tools when needed:\n");
        for tool in &config.tools {
            prompt.push_str(&format!("- {}: {}\n", tool.name, tool.description));
            for param in &tool.parameters {
                let required = if param.required { "required" } else { "optional" };
                prompt.push_str(&format!(
                    "    {} ({}, {}): {}\n",
                    param.name, param.param_type, required, param.description
                ));
            }
        }
    }

    Some(prompt)
}

/// Assemble the ordered message list: system prompt, scenario-before
/// (role `system`), the user turn, scenario-after (every other role).
///
/// `scenario` items are expected to already have their `prompt` expression
/// evaluated by the caller.
#[must_use]
pub fn build_messages(
    system_prompt: Option<&str>,
    scenario: &[ScenarioItem],
    user_content: ChatMessage,
) -> Vec<ChatMessage> {
    let mut messages = Vec::new();

    if let Some(system) = system_prompt {
        messages.push(ChatMessage::text(Role::System, system));
    }

    let scenario_messages: Vec<ChatMessage> = scenario
        .iter()
        .map(|item| {
            let mut msg = ChatMessage::text(parse_role(&item.role), item.prompt.clone());
            if let Some(name) = &item.name {
                msg = msg.with_name(name.clone());
            }
            msg
        })
        .collect();

    for (item, msg) in scenario.iter().zip(scenario_messages.iter()) {
        if parse_role(&item.role) == Role::System {
            messages.push(msg.clone());
        }
    }

    messages.push(user_content);

    for (item, msg) in scenario.iter().zip(scenario_messages.iter()) {
        if parse_role(&item.role) != Role::System {
            messages.push(msg.clone());
        }
    }

    messages
}
