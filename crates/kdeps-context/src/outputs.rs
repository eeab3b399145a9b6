use kdeps_error::{Error, ErrorCode};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Per-resource output store, keyed by action id.
///
/// A resource's recorded output is either a bare string (the "whole"
/// output, e.g. an exec resource whose only interesting field is stdout)
/// or a JSON mapping with named fields. The typed accessors below treat a
/// bare string as the requested field's value directly, matching the
/// original source's "whether it is a mapping or a bare string" behavior.
#[derive(Clone, Default)]
pub struct Outputs {
    inner: Arc<RwLock<HashMap<String, Value>>>,
}

impl Outputs {
    /// An empty output store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `action_id`'s output, replacing any prior value.
    pub async fn set(&self, action_id: impl Into<String>, value: Value) {
        self.inner.write().await.insert(action_id.into(), value);
    }

    /// Fetch the raw recorded output for `action_id`, if any.
    pub async fn get(&self, action_id: &str) -> Option<Value> {
        self.inner.read().await.get(action_id).cloned()
    }

    async fn field(&self, action_id: &str, field: &str) -> Result<String, Error> {
        let output = self.get(action_id).await.ok_or_else(|| missing_resource(action_id))?;
        Ok(extract_field(&output, field))
    }

    /// `GetPythonStdout`.
    pub async fn get_python_stdout(&self, action_id: &str) -> Result<String, Error> {
        self.field(action_id, "stdout").await
    }

    /// `GetPythonStderr`.
    pub async fn get_python_stderr(&self, action_id: &str) -> Result<String, Error> {
        self.field(action_id, "stderr").await
    }

    /// `GetPythonExitCode`.
    pub async fn get_python_exit_code(&self, action_id: &str) -> Result<String, Error> {
        self.field(action_id, "exitCode").await
    }

    /// `GetExecStdout`.
    pub async fn get_exec_stdout(&self, action_id: &str) -> Result<String, Error> {
        self.field(action_id, "stdout").await
    }

    /// `GetExecStderr`.
    pub async fn get_exec_stderr(&self, action_id: &str) -> Result<String, Error> {
        self.field(action_id, "stderr").await
    }

    /// `GetExecExitCode`.
    pub async fn get_exec_exit_code(&self, action_id: &str) -> Result<String, Error> {
        self.field(action_id, "exitCode").await
    }

    /// `GetHTTPResponseBody`.
    pub async fn get_http_response_body(&self, action_id: &str) -> Result<String, Error> {
        self.field(action_id, "body").await
    }

    /// `GetHTTPResponseHeader`: a case-insensitive lookup inside the
    /// output's nested `headers` object.
    pub async fn get_http_response_header(
        &self,
        action_id: &str,
        header: &str,
    ) -> Result<String, Error> {
        let output = self.get(action_id).await.ok_or_else(|| missing_resource(action_id))?;
        let found = output
            .get("headers")
            .and_then(Value::as_object)
            .and_then(|headers| headers.iter().find(|(k, _)| k.eq_ignore_ascii_case(header)))
            .map(|(_, v)| value_to_string(v));
        Ok(found.unwrap_or_default())
    }

    /// `GetLLMResponse`.
    pub async fn get_llm_response(&self, action_id: &str) -> Result<String, Error> {
        self.field(action_id, "response").await
    }
}

fn missing_resource(action_id: &str) -> Error {
    Error::new(
        ErrorCode::ContextMissingResource,
        format!("no recorded output for resource '{action_id}'"),
    )
    .with_context("action_id", action_id)
}

fn extract_field(output: &Value, field: &str) -> String {
    match output {
        Value::Object(map) => map.get(field).map(value_to_string).unwrap_or_default(),
        Value::String(s) => s.clone(),
        _ => String::new(),
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn mapping_output_extracts_named_field() {
        let outputs = Outputs::new();
        outputs.set("exec1", json!({"stdout": "hi", "exitCode": 0})).await;
        assert_eq!(outputs.get_exec_stdout("exec1").await.unwrap(), "hi");
        assert_eq!(outputs.get_exec_exit_code("exec1").await.unwrap(), "0");
    }

    #[tokio::test]
    async fn bare_string_output_is_used_directly_for_any_field() {
        let outputs = Outputs::new();
        outputs.set("exec1", json!("just stdout text")).await;
        assert_eq!(outputs.get_exec_stdout("exec1").await.unwrap(), "just stdout text");
        assert_eq!(outputs.get_exec_stderr("exec1").await.unwrap(), "just stdout text");
    }

    #[tokio::test]
    async fn missing_resource_is_an_error() {
        let outputs = Outputs::new();
        let err = outputs.get_exec_stdout("ghost").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ContextMissingResource);
    }

    #[tokio::test]
    async fn missing_field_on_mapping_is_empty_not_error() {
        let outputs = Outputs::new();
        outputs.set("exec1", json!({"stdout": "hi"})).await;
        assert_eq!(outputs.get_exec_stderr("exec1").await.unwrap(), "");
    }

    #[tokio::test]
    async fn http_response_header_lookup_is_case_insensitive() {
        let outputs = Outputs::new();
        outputs
            .set("http1", json!({"body": "ok", "headers": {"Content-Type": "text/plain"}}))
            .await;
        assert_eq!(
            outputs.get_http_response_header("http1", "content-type").await.unwrap(),
            "text/plain"
        );
    }

    #[tokio::test]
    async fn llm_response_field() {
        let outputs = Outputs::new();
        outputs.set("llm1", json!({"response": "hello"})).await;
        assert_eq!(outputs.get_llm_response("llm1").await.unwrap(), "hello");
    }
}
