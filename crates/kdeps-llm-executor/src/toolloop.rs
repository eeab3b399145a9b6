// SPDX-License-Identifier: MIT OR Apache-2.0
//! The bounded tool-call loop: dispatching model-requested tool calls back
//! into the scheduler and folding their results into follow-up messages.

use async_trait::async_trait;
use kdeps_context::ExecutionContext;
use kdeps_error::{Error, ErrorCode};
use kdeps_llm_core::chat::ToolSpec;
use kdeps_llm_core::ir::{ChatMessage, ToolCall};
use serde_json::Value;

/// The hard cap on tool-call round trips within a single `execute` call.
pub const MAX_TOOL_ITERATIONS: u32 = 5;

/// Re-enters the scheduler to run a tool-declared resource.
///
/// A recoverable failure of the invoked resource (e.g. a failing HTTP
/// call or non-zero exit code) should be returned as `Err` — the loop
/// folds it into the tool result as `Error: ...` and gives the model a
/// chance to recover, rather than aborting the whole chat turn.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Invoke the resource identified by `action_id`, with its arguments
    /// already staged in `ctx`'s Tool scope.
    async fn invoke(&self, action_id: &str, ctx: &ExecutionContext) -> Result<Value, Error>;
}

/// The outcome of a single tool call.
#[derive(Debug, Clone)]
pub struct ToolCallRecord {
    /// Echoes the provider's call id, for the matching tool-result
    /// message.
    pub tool_call_id: String,
    /// The tool's name.
    pub name: String,
    /// Present on a successful invocation.
    pub content: Option<Value>,
    /// Present when the invoked resource failed.
    pub error: Option<String>,
}

/// If `value` is a string that parses as a JSON object or array, replace
/// it with the parsed value; otherwise pass it through unchanged.
#[must_use]
pub fn normalize_content(value: Value) -> Value {
    let Value::String(text) = &value else {
        return value;
    };
    let trimmed = text.trim_start();
    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return value;
    }
    serde_json::from_str(text).unwrap_or(value)
}

/// Invoke every call in `calls`, storing each call's arguments in the
/// context's Tool scope before re-entering the scheduler.
///
/// Fails with [`ErrorCode::ToolScriptNotFound`] when a call names a tool
/// absent from `tools` — a configuration error, not a recoverable one.
pub async fn invoke_tool_calls(
    executor: &dyn ToolExecutor,
    tools: &[ToolSpec],
    calls: &[ToolCall],
    ctx: &ExecutionContext,
) -> Result<Vec<ToolCallRecord>, Error> {
    let mut records = Vec::with_capacity(calls.len());
    for call in calls {
        let spec = tools.iter().find(|t| t.name == call.name).ok_or_else(|| {
            Error::new(
                ErrorCode::ToolScriptNotFound,
                format!("model called undeclared tool '{}'", call.name),
            )
            .with_context("tool", call.name.clone())
        })?;

        let args: serde_json::Map<String, Value> =
            serde_json::from_str(&call.arguments).unwrap_or_default();
        for (key, value) in &args {
            ctx.tool.set(spec.script.clone(), key.clone(), value.clone()).await;
        }

        let record = match executor.invoke(&spec.script, ctx).await {
            Ok(value) => ToolCallRecord {
                tool_call_id: call.id.clone(),
                name: call.name.clone(),
                content: Some(normalize_content(value)),
                error: None,
            },
            Err(e) => ToolCallRecord {
                tool_call_id: call.id.clone(),
                name: call.name.clone(),
                content: None,
                error: Some(e.to_string()),
            },
        };
        records.push(record);
    }
    Ok(records)
}

/// Render one [`ToolCallRecord`] as the `role: "tool"` message fed back to
/// the model.
#[must_use]
pub fn tool_result_message(record: &ToolCallRecord) -> ChatMessage {
    let text = match (&record.content, &record.error) {
        (Some(Value::String(s)), _) => s.clone(),
        (Some(value), _) => serde_json::to_string(value).unwrap_or_default(),
        (None, Some(err)) => format!("Error: {err}"),
        (None, None) => String::new(),
    };
    ChatMessage::tool_result(record.tool_call_id.clone(), text)
}
