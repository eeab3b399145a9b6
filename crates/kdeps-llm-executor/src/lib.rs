// SPDX-License-Identifier: MIT OR Apache-2.0
//! Expression evaluation, multimodal assembly, backend dispatch, and the
//! bounded tool-call loop for kdeps LLM resources.
//!
//! [`Executor::execute`] is the crate's single entry point: it resolves
//! every expression-bearing [`ChatConfig`] field through an
//! [`ExecutionContext`], assembles the ordered message list, dispatches to
//! the configured [`kdeps_llm_core::Backend`], drives the tool-call loop
//! when tools are declared and a [`ToolExecutor`] is attached, and finally
//! shapes the response per `jsonResponse`/`jsonResponseKeys`.
//!
//! Network and provider-side failures are not Rust errors here — they
//! come back as `{"error": "..."}` data so the orchestrating scheduler can
//! route them like any other resource output. Only configuration mistakes
//! (an unknown backend, an unparseable expression, a tool call naming an
//! undeclared tool) surface as [`Error`].
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// JSON response shaping (`jsonResponse`/`jsonResponseKeys` projection).
pub mod jsonshape;
/// Ordered chat-message assembly.
pub mod messages;
/// Multimodal content-part resolution (uploaded files / filesystem paths).
pub mod multimodal;
/// The bounded tool-call loop.
pub mod toolloop;

pub use toolloop::{ToolCallRecord, ToolExecutor, MAX_TOOL_ITERATIONS};

use async_trait::async_trait;
use kdeps_context::ExecutionContext;
use kdeps_error::{Error, ErrorCode};
use kdeps_llm_core::chat::ChatConfig;
use kdeps_llm_core::ir::{ChatMessage, Role};
use kdeps_llm_core::{Backend, BackendRegistry};
use kdeps_telemetry::{MetricsCollector, RunMetrics};
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Stages a model for serving ahead of a chat dispatch, e.g. pulling a
/// local Ollama model. Implementors are expected to log and swallow their
/// own failures — `ensure_model` never aborts a chat turn.
#[async_trait]
pub trait ModelManager: Send + Sync {
    /// Ensure `model` is available for `backend`.
    async fn ensure_model(&self, backend: &str, model: &str);
}

/// Maps a backend's registry name to the environment variable this
/// runtime falls back to for its API key.
#[must_use]
pub fn env_var_for_backend(backend: &str) -> Option<&'static str> {
    match backend {
        "openai" => Some("OPENAI_API_KEY"),
        "anthropic" => Some("ANTHROPIC_API_KEY"),
        "google" | "google-openai-compat" => Some("GOOGLE_API_KEY"),
        "cohere" => Some("COHERE_API_KEY"),
        "mistral" => Some("MISTRAL_API_KEY"),
        "together" => Some("TOGETHER_API_KEY"),
        "perplexity" => Some("PERPLEXITY_API_KEY"),
        "groq" => Some("GROQ_API_KEY"),
        "deepseek" => Some("DEEPSEEK_API_KEY"),
        _ => None,
    }
}

/// A string is treated as a literal filesystem path (never run through
/// `{{…}}` expression evaluation) when it looks like one: a leading path
/// separator, a Windows drive letter, or an embedded `/.` segment.
fn looks_like_path(s: &str) -> bool {
    if s.starts_with('/') || s.starts_with('\\') {
        return true;
    }
    let bytes = s.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return true;
    }
    s.contains("/.")
}

/// Evaluate `field` through `ctx` when it carries a `{{…}}` placeholder and
/// doesn't look like a literal filesystem path; otherwise pass it through
/// unchanged. Evaluation failures are wrapped as
/// [`ErrorCode::LlmEvaluationFailed`].
async fn resolve_field(ctx: &ExecutionContext, field: &str) -> Result<String, Error> {
    if field.contains("{{") && !looks_like_path(field) {
        ctx.evaluate(field)
            .await
            .map_err(|e| Error::new(ErrorCode::LlmEvaluationFailed, e.message).with_context("field", field))
    } else {
        Ok(field.to_string())
    }
}

/// The result of resolving every expression-bearing field of a
/// [`ChatConfig`].
struct ResolvedConfig {
    backend: Option<String>,
    base_url: Option<String>,
    api_key: Option<String>,
    role: String,
    model: String,
    prompt: String,
    files: Vec<String>,
    scenario: Vec<kdeps_llm_core::chat::ScenarioItem>,
    json_response_keys: Vec<String>,
}

async fn resolve_config(ctx: &ExecutionContext, config: &ChatConfig) -> Result<ResolvedConfig, Error> {
    let backend = match &config.backend {
        Some(b) => Some(resolve_field(ctx, b).await?),
        None => None,
    };
    let base_url = match &config.base_url {
        Some(u) => Some(resolve_field(ctx, u).await?),
        None => None,
    };
    let api_key = match &config.api_key {
        Some(k) => Some(resolve_field(ctx, k).await?),
        None => None,
    };
    let role = resolve_field(ctx, config.role.as_deref().unwrap_or("user")).await?;
    let model = resolve_field(ctx, &config.model).await?;
    let prompt = resolve_field(ctx, &config.prompt).await?;

    let mut files = Vec::with_capacity(config.files.len());
    for f in &config.files {
        files.push(resolve_field(ctx, f).await?);
    }

    let mut scenario = Vec::with_capacity(config.scenario.len());
    for item in &config.scenario {
        scenario.push(kdeps_llm_core::chat::ScenarioItem {
            role: resolve_field(ctx, &item.role).await?,
            prompt: resolve_field(ctx, &item.prompt).await?,
            name: match &item.name {
                Some(n) => Some(resolve_field(ctx, n).await?),
                None => None,
            },
        });
    }

    let mut json_response_keys = Vec::with_capacity(config.json_response_keys.len());
    for k in &config.json_response_keys {
        json_response_keys.push(resolve_field(ctx, k).await?);
    }

    Ok(ResolvedConfig {
        backend,
        base_url,
        api_key,
        role,
        model,
        prompt,
        files,
        scenario,
        json_response_keys,
    })
}

/// Drives [`ChatConfig`] execution against a [`BackendRegistry`].
///
/// Holds the single shared `reqwest::Client` every backend dispatch reuses
/// (the provider traits are stateless), plus the optional tool executor,
/// model manager, and metrics sink a caller may attach.
pub struct Executor {
    client: Client,
    registry: BackendRegistry,
    tool_executor: Option<Arc<dyn ToolExecutor>>,
    model_manager: Option<Arc<dyn ModelManager>>,
    metrics: Option<MetricsCollector>,
    offline: bool,
}

impl Executor {
    /// Build an executor around `registry`. No tool executor, model
    /// manager, or metrics sink attached; not offline.
    #[must_use]
    pub fn new(registry: BackendRegistry) -> Self {
        Self {
            client: Client::new(),
            registry,
            tool_executor: None,
            model_manager: None,
            metrics: None,
            offline: false,
        }
    }

    /// Attach a tool executor — required for the tool-call loop to run at
    /// all; without one, tool calls in a response are left unresolved and
    /// the loop exits after the first response.
    #[must_use]
    pub fn with_tool_executor(mut self, executor: Arc<dyn ToolExecutor>) -> Self {
        self.tool_executor = Some(executor);
        self
    }

    /// Attach a model manager, consulted before dispatch when the runtime
    /// is not offline.
    #[must_use]
    pub fn with_model_manager(mut self, manager: Arc<dyn ModelManager>) -> Self {
        self.model_manager = Some(manager);
        self
    }

    /// Attach a metrics collector; every `execute` call records one
    /// [`RunMetrics`] entry on completion (success, data-error, or
    /// hard error alike).
    #[must_use]
    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Mark the runtime offline: [`ModelManager::ensure_model`] is never
    /// invoked regardless of whether one is attached.
    #[must_use]
    pub fn offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    /// Run one chat turn to completion, including the tool-call loop.
    ///
    /// Returns `Ok` for both a successful chat response and a recoverable
    /// transient failure (network error, non-200, wire-level JSON decode
    /// failure) — those come back embedded as `{"error": "..."}`. Returns
    /// `Err` only for configuration/programmer errors: unknown backend,
    /// unparseable expression, request-build/marshal failure, or a tool
    /// call naming an undeclared tool.
    pub async fn execute(&self, ctx: &ExecutionContext, config: &ChatConfig) -> Result<Value, Error> {
        let started = Instant::now();
        let mut iterations: u64 = 0;
        let mut tool_calls_count: u64 = 0;
        let mut errors_count: u64 = 0;

        let result = self
            .execute_inner(ctx, config, &mut iterations, &mut tool_calls_count, &mut errors_count)
            .await;

        if let Some(metrics) = &self.metrics {
            let backend_name = config.backend.clone().unwrap_or_else(|| "local".to_string());
            metrics.record(RunMetrics {
                backend_name,
                model: config.model.clone(),
                duration_ms: started.elapsed().as_millis() as u64,
                iterations_count: iterations,
                tokens_in: 0,
                tokens_out: 0,
                tool_calls_count,
                errors_count,
            });
        }

        result
    }

    async fn execute_inner(
        &self,
        ctx: &ExecutionContext,
        config: &ChatConfig,
        iterations: &mut u64,
        tool_calls_count: &mut u64,
        errors_count: &mut u64,
    ) -> Result<Value, Error> {
        let resolved = resolve_config(ctx, config).await?;

        let backend = match &resolved.backend {
            Some(name) => self.registry.get(name).ok_or_else(|| {
                Error::new(ErrorCode::LlmUnknownBackend, format!("no backend registered as '{name}'"))
                    .with_context("backend", name)
            })?,
            None => self.registry.get_default().ok_or_else(|| {
                Error::new(ErrorCode::LlmUnknownBackend, "no default backend registered")
            })?,
        };

        if let Some(manager) = &self.model_manager {
            if !self.offline {
                manager.ensure_model(backend.name(), &resolved.model).await;
            }
        }

        let image_parts = multimodal::resolve_image_parts(ctx, &resolved.files).await?;
        let content = multimodal::build_content(resolved.prompt.clone(), image_parts);
        let role = messages::parse_role(&resolved.role);
        let user_message = ChatMessage {
            role,
            content,
            tool_calls: None,
            tool_call_id: None,
            name: None,
        };

        let system_prompt = messages::build_system_prompt(config);
        let mut conversation =
            messages::build_messages(system_prompt.as_deref(), &resolved.scenario, user_message);

        let base_url = resolved.base_url.clone().unwrap_or_else(|| backend.default_url().to_string());
        let api_key = resolved
            .api_key
            .clone()
            .or_else(|| env_var_for_backend(backend.name()).and_then(|var| std::env::var(var).ok()))
            .unwrap_or_default();

        let timeout = Duration::from_secs(config.timeout_secs());

        loop {
            *iterations += 1;
            let response = self
                .dispatch(backend.as_ref(), &base_url, &api_key, &resolved.model, &conversation, config, timeout)
                .await;

            let normalized = match response {
                Ok(n) => n,
                Err(data_error) => {
                    *errors_count += 1;
                    return Ok(data_error);
                }
            };

            if !normalized.has_tool_calls() || *iterations > MAX_TOOL_ITERATIONS {
                return Ok(self.finalize(config, &resolved, &normalized));
            }

            let Some(tool_executor) = &self.tool_executor else {
                return Ok(self.finalize(config, &resolved, &normalized));
            };

            let calls = normalized.message.tool_calls.clone().unwrap_or_default();
            *tool_calls_count += calls.len() as u64;
            let records =
                toolloop::invoke_tool_calls(tool_executor.as_ref(), &config.tools, &calls, ctx).await?;

            conversation.push(ChatMessage {
                role: Role::Assistant,
                content: kdeps_llm_core::ir::MessageContent::Text(normalized.message.content.clone()),
                tool_calls: Some(calls),
                tool_call_id: None,
                name: None,
            });
            for record in &records {
                conversation.push(toolloop::tool_result_message(record));
            }

            if *iterations >= MAX_TOOL_ITERATIONS {
                return Ok(self.finalize(config, &resolved, &normalized));
            }
        }
    }

    /// Dispatch one request/response round trip. Network failures,
    /// non-200 responses, and response-parse failures are all returned as
    /// `Ok(data_error_value)` — only request-build/marshal failures
    /// propagate as `Err`.
    #[allow(clippy::too_many_arguments)]
    async fn dispatch(
        &self,
        backend: &dyn Backend,
        base_url: &str,
        api_key: &str,
        model: &str,
        messages: &[ChatMessage],
        config: &ChatConfig,
        timeout: Duration,
    ) -> Result<kdeps_llm_core::response::NormalizedResponse, Value> {
        let body = backend
            .build_request(model, messages, config)
            .map_err(|e| serde_json::json!({"error": e.to_string()}))?;

        let url = if backend.auth_via_query() {
            backend.chat_endpoint_with_key(base_url, api_key)
        } else {
            backend.chat_endpoint(base_url)
        };

        let mut request = self
            .client
            .post(&url)
            .timeout(timeout)
            .header("Content-Type", "application/json")
            .header("User-Agent", concat!("kdeps-runtime/", env!("CARGO_PKG_VERSION")));

        if !backend.auth_via_query() && !api_key.is_empty() {
            let (header, value) = backend.api_key_header(api_key);
            if !header.is_empty() {
                request = request.header(header, value);
            }
        }
        if backend.name() == "anthropic" {
            request = request.header("anthropic-version", kdeps_llm_providers::anthropic::ANTHROPIC_VERSION);
        }

        let response = request
            .json(&body)
            .send()
            .await
            .map_err(|e| serde_json::json!({"error": format!("request failed: {e}")}))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(serde_json::json!({
                "error": format!("provider returned status {status}: {text}")
            }));
        }

        let wire: Value = response
            .json()
            .await
            .map_err(|e| serde_json::json!({"error": format!("invalid response JSON: {e}")}))?;

        backend
            .parse_response(&wire)
            .map_err(|e| serde_json::json!({"error": e.to_string()}))
    }

    fn finalize(
        &self,
        config: &ChatConfig,
        resolved: &ResolvedConfig,
        normalized: &kdeps_llm_core::response::NormalizedResponse,
    ) -> Value {
        if config.json_response {
            jsonshape::shape_json_response(&normalized.message.content, &resolved.json_response_keys)
        } else {
            serde_json::to_value(normalized).unwrap_or(Value::Null)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kdeps_error::ErrorCode;
    use kdeps_llm_core::chat::ChatConfig;
    use kdeps_llm_providers::LocalBackend;

    fn registry() -> BackendRegistry {
        let mut r = BackendRegistry::new();
        r.register(Arc::new(LocalBackend));
        r.set_default("local");
        r
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new("demo", "/tmp")
    }

    #[test]
    fn looks_like_path_detects_leading_slash() {
        assert!(looks_like_path("/tmp/img.png"));
        assert!(looks_like_path("C:\\img.png"));
        assert!(!looks_like_path("{{ item.current }}"));
    }

    #[tokio::test]
    async fn resolve_field_evaluates_expression_placeholders() {
        let ctx = ctx();
        ctx.memory.set("name", Value::from("Bob")).await;
        let out = resolve_field(&ctx, "hi {{name}}").await.unwrap();
        assert_eq!(out, "hi Bob");
    }

    #[tokio::test]
    async fn resolve_field_passes_through_literal_paths_unevaluated() {
        let ctx = ctx();
        let out = resolve_field(&ctx, "/tmp/img.png").await.unwrap();
        assert_eq!(out, "/tmp/img.png");
    }

    #[tokio::test]
    async fn unknown_backend_is_a_hard_error() {
        let executor = Executor::new(registry());
        let config = ChatConfig {
            backend: Some("ghost-provider".to_string()),
            model: "x".into(),
            prompt: "hi".into(),
            ..Default::default()
        };
        let err = executor.execute(&ctx(), &config).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::LlmUnknownBackend);
    }

    #[tokio::test]
    async fn unparseable_expression_is_a_hard_error() {
        let executor = Executor::new(registry());
        let config = ChatConfig {
            model: "x".into(),
            prompt: "{{unterminated".into(),
            ..Default::default()
        };
        let err = executor.execute(&ctx(), &config).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::LlmEvaluationFailed);
    }

    #[tokio::test]
    async fn network_failure_is_embedded_as_data_not_propagated() {
        let executor = Executor::new(registry());
        let config = ChatConfig {
            backend: Some("local".to_string()),
            base_url: Some("http://127.0.0.1:1".to_string()),
            model: "x".into(),
            prompt: "hi".into(),
            timeout_duration: Some(1),
            ..Default::default()
        };
        let result = executor.execute(&ctx(), &config).await.unwrap();
        assert!(result.get("error").is_some());
    }

    #[tokio::test]
    async fn metrics_are_recorded_on_completion() {
        let metrics = MetricsCollector::new();
        let executor = Executor::new(registry()).with_metrics(metrics.clone());
        let config = ChatConfig {
            backend: Some("local".to_string()),
            base_url: Some("http://127.0.0.1:1".to_string()),
            model: "x".into(),
            prompt: "hi".into(),
            timeout_duration: Some(1),
            ..Default::default()
        };
        let _ = executor.execute(&ctx(), &config).await;
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics.runs()[0].errors_count, 1);
    }
}
