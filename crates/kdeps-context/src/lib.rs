// SPDX-License-Identifier: MIT OR Apache-2.0
//! Unified execution-context accessor over items, memory, session, outputs,
//! request, and file state for the kdeps workflow runtime.
//!
//! [`ExecutionContext`] is constructed once per workflow invocation and
//! destroyed when it returns. Its [`ExecutionContext::get`] method is the
//! single place the LLM executor (and sibling resource executors) resolve
//! `{{…}}` expression placeholders from: it walks Items, Memory, Session,
//! Outputs, request body/query/headers, metadata fields, uploaded files,
//! and finally file-glob patterns, in that order, unless a [`TypeHint`]
//! pins the lookup to one store.
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// File-glob pattern matching (`HandleGlobPattern`) over uploaded files.
pub mod glob;
/// Iteration-scalar state for `foreach`-style resources.
pub mod iteration;
/// The process-lifetime mutable key-value map.
pub mod memory;
/// Per-resource output store and its typed accessors.
pub mod outputs;
/// Request-scoped input: method, path, headers, query, body, files.
pub mod request;
/// The request-lifetime session map, with optional per-entry TTL.
pub mod session;
/// Tool-call argument scope.
pub mod tool;

pub use iteration::Iteration;
pub use memory::Memory;
pub use outputs::Outputs;
pub use request::{Request, UploadedFile};
pub use session::Session;
pub use tool::Tool;

use kdeps_error::{Error, ErrorCode};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Pins a [`ExecutionContext::get`] lookup to a single store, skipping the
/// rest of the priority chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeHint {
    /// Route to the [`Iteration`] accessor.
    Item,
    /// Route to [`Memory`].
    Memory,
    /// Route to [`Session`].
    Session,
    /// Route to [`Outputs`] (the whole recorded output for the key as
    /// action id).
    Output,
    /// Route to the request body.
    RequestBody,
    /// Route to the request query string.
    RequestQuery,
    /// Route to request headers.
    RequestHeader,
    /// Route to workflow/request metadata fields.
    Metadata,
    /// Route to an uploaded file by name.
    File,
}

/// Everything a single workflow invocation needs to resolve an expression
/// placeholder or serve a typed output accessor.
///
/// Memory, Session, Outputs, and Tool all share their backing storage
/// across clones (each wraps an `Arc`), so a cloned context may be handed
/// to a tool-invoked sub-task without losing visibility into state the
/// parent task writes. Items, Request, filters, and the resource registry
/// are effectively immutable snapshots taken at construction time.
#[derive(Clone)]
pub struct ExecutionContext {
    items: Arc<RwLock<Iteration>>,
    /// Process-lifetime mutable map.
    pub memory: Memory,
    /// Request-lifetime map with optional TTL.
    pub session: Session,
    /// Per-resource recorded outputs.
    pub outputs: Outputs,
    /// Tool-call argument scope.
    pub tool: Tool,
    request: Option<Arc<Request>>,
    fs_root: PathBuf,
    workflow_name: String,
    allowed_params: Vec<String>,
    allowed_headers: Vec<String>,
    resources: Arc<RwLock<HashMap<String, Value>>>,
}

impl ExecutionContext {
    /// Build a context for `workflow_name`, rooted at `fs_root` for
    /// filesystem-relative path resolution. Items start empty (no active
    /// iteration), Request is `None` (not request-scoped), and the allow
    /// lists start empty (no filtering).
    #[must_use]
    pub fn new(workflow_name: impl Into<String>, fs_root: impl Into<PathBuf>) -> Self {
        Self {
            items: Arc::new(RwLock::new(Iteration::empty())),
            memory: Memory::new(),
            session: Session::disabled(),
            outputs: Outputs::new(),
            tool: Tool::new(),
            request: None,
            fs_root: fs_root.into(),
            workflow_name: workflow_name.into(),
            allowed_params: Vec::new(),
            allowed_headers: Vec::new(),
            resources: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Attach a request scope.
    #[must_use]
    pub fn with_request(mut self, request: Request) -> Self {
        self.request = Some(Arc::new(request));
        self
    }

    /// Attach a session (replacing the default disabled one).
    #[must_use]
    pub fn with_session(mut self, session: Session) -> Self {
        self.session = session;
        self
    }

    /// Restrict request-body/query lookups to this allow list. Empty means
    /// unfiltered.
    #[must_use]
    pub fn with_allowed_params(mut self, params: Vec<String>) -> Self {
        self.allowed_params = params;
        self
    }

    /// Restrict request-header lookups to this allow list. Empty means
    /// unfiltered.
    #[must_use]
    pub fn with_allowed_headers(mut self, headers: Vec<String>) -> Self {
        self.allowed_headers = headers;
        self
    }

    /// The filesystem workspace root, for resolving relative file paths
    /// (e.g. multimodal image attachments).
    #[must_use]
    pub fn fs_root(&self) -> &Path {
        &self.fs_root
    }

    /// The request scope, if this invocation is request-bound.
    #[must_use]
    pub fn request(&self) -> Option<&Request> {
        self.request.as_deref()
    }

    /// Replace the active iteration state (entering/advancing a `foreach`).
    pub async fn set_items(&self, items: Iteration) {
        *self.items.write().await = items;
    }

    /// A snapshot of the current iteration state.
    pub async fn items(&self) -> Iteration {
        self.items.read().await.clone()
    }

    /// `Item(name)`: resolve an iteration-scalar accessor.
    pub async fn item(&self, name: &str) -> Option<Value> {
        self.items.read().await.item(name)
    }

    /// Register a resource descriptor under its action id, for the tool
    /// loop's `script` → resource lookup.
    pub async fn register_resource(&self, action_id: impl Into<String>, descriptor: Value) {
        self.resources.write().await.insert(action_id.into(), descriptor);
    }

    /// Fetch a registered resource descriptor.
    pub async fn resource(&self, action_id: &str) -> Option<Value> {
        self.resources.read().await.get(action_id).cloned()
    }

    fn param_allowed(&self, name: &str) -> bool {
        self.allowed_params.is_empty() || self.allowed_params.iter().any(|p| p == name)
    }

    fn header_allowed(&self, name: &str) -> bool {
        self.allowed_headers.is_empty()
            || self.allowed_headers.iter().any(|h| h.eq_ignore_ascii_case(name))
    }

    /// The unified `Get(key, typeHint?)` accessor: walks the priority
    /// chain described at module level, or routes directly when `type_hint`
    /// is given.
    pub async fn get(&self, key: &str, type_hint: Option<TypeHint>) -> Result<Value, Error> {
        if let Some(hint) = type_hint {
            return self.get_hinted(key, hint).await;
        }

        if let Some(v) = self.item(key).await {
            return Ok(v);
        }
        if let Some(v) = self.memory.get(key).await {
            return Ok(v);
        }
        if let Some(v) = self.session.get(key).await {
            return Ok(v);
        }
        if let Some(v) = self.outputs.get(key).await {
            return Ok(v);
        }
        if let Some(req) = &self.request {
            if self.param_allowed(key) {
                if let Some(v) = req.body_field(key) {
                    return Ok(v);
                }
                if let Some(v) = req.query.get(key) {
                    return Ok(Value::String(v.clone()));
                }
            }
            if self.header_allowed(key) {
                if let Some(v) = req.header(key) {
                    return Ok(Value::String(v.to_string()));
                }
            }
        }
        if let Some(v) = self.metadata_field(key).await {
            return Ok(v);
        }
        if let Some(req) = &self.request {
            if let Some(v) = lookup_uploaded_file(&req.files, key) {
                return Ok(v);
            }
            if glob::is_glob_pattern(key) {
                return glob::handle_glob_pattern(&req.files, key, key, &[]);
            }
        }

        Err(lookup_exhausted(key))
    }

    async fn get_hinted(&self, key: &str, hint: TypeHint) -> Result<Value, Error> {
        match hint {
            TypeHint::Item => self.item(key).await.ok_or_else(|| lookup_exhausted(key)),
            TypeHint::Memory => self.memory.get(key).await.ok_or_else(|| lookup_exhausted(key)),
            TypeHint::Session => self.session.get(key).await.ok_or_else(|| lookup_exhausted(key)),
            TypeHint::Output => self.outputs.get(key).await.ok_or_else(|| lookup_exhausted(key)),
            TypeHint::RequestBody => {
                let req = self.request_or_err(key)?;
                if !self.param_allowed(key) {
                    return Err(param_not_allowed(key));
                }
                req.body_field(key).ok_or_else(|| lookup_exhausted(key))
            }
            TypeHint::RequestQuery => {
                let req = self.request_or_err(key)?;
                if !self.param_allowed(key) {
                    return Err(param_not_allowed(key));
                }
                req.query
                    .get(key)
                    .map(|v| Value::String(v.clone()))
                    .ok_or_else(|| lookup_exhausted(key))
            }
            TypeHint::RequestHeader => {
                let req = self.request_or_err(key)?;
                if !self.header_allowed(key) {
                    return Err(header_not_allowed(key));
                }
                req.header(key)
                    .map(|v| Value::String(v.to_string()))
                    .ok_or_else(|| lookup_exhausted(key))
            }
            TypeHint::Metadata => self.metadata_field(key).await.ok_or_else(|| lookup_exhausted(key)),
            TypeHint::File => {
                let req = self.request_or_err(key)?;
                lookup_uploaded_file(&req.files, key).ok_or_else(|| lookup_exhausted(key))
            }
        }
    }

    fn request_or_err(&self, key: &str) -> Result<&Request, Error> {
        self.request.as_deref().ok_or_else(|| lookup_exhausted(key))
    }

    /// The aggregated request view (`GetRequestData`): method, path, query,
    /// body, and headers, each with filtered-out fields excluded.
    pub async fn request_data(&self) -> Option<Value> {
        let req = self.request.as_deref()?;
        let query: serde_json::Map<String, Value> = req
            .query
            .iter()
            .filter(|(k, _)| self.param_allowed(k))
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        let headers: serde_json::Map<String, Value> = req
            .headers
            .iter()
            .filter(|(k, _)| self.header_allowed(k))
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        let body = match req.body.as_object() {
            Some(obj) => Value::Object(
                obj.iter()
                    .filter(|(k, _)| self.param_allowed(k))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
            None => req.body.clone(),
        };
        Some(serde_json::json!({
            "method": req.method,
            "path": req.path,
            "query": query,
            "body": body,
            "headers": headers,
        }))
    }

    async fn metadata_field(&self, key: &str) -> Option<Value> {
        match key {
            "workflow.name" => Some(Value::String(self.workflow_name.clone())),
            "method" => Some(Value::String(self.request.as_ref()?.method.clone())),
            "path" => Some(Value::String(self.request.as_ref()?.path.clone())),
            "filecount" => Some(Value::from(self.request.as_ref()?.files.len())),
            "files" => Some(Value::Array(
                self.request
                    .as_ref()?
                    .files
                    .iter()
                    .map(|f| Value::String(f.name.clone()))
                    .collect(),
            )),
            "index" => Some(self.items.read().await.item("index").unwrap_or(Value::from(0))),
            "count" => Some(self.items.read().await.item("count").unwrap_or(Value::from(0))),
            "current" => self.items.read().await.item("current"),
            "prev" => self.items.read().await.item("prev"),
            "next" => self.items.read().await.item("next"),
            "current_time" | "timestamp" => Some(Value::String(chrono::Utc::now().to_rfc3339())),
            _ => None,
        }
    }

    /// Substitute every `{{ expr }}` placeholder in `template` with the
    /// stringified result of `get(expr, None)`. A template with no `{{`
    /// passes through unchanged (the literal-vs-expression distinction the
    /// LLM executor applies before calling this).
    pub async fn evaluate(&self, template: &str) -> Result<String, Error> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after.find("}}").ok_or_else(|| {
                Error::new(
                    ErrorCode::ContextLookupExhausted,
                    "unterminated '{{' expression placeholder",
                )
                .with_context("template", template)
            })?;
            let expr = after[..end].trim();
            let value = self.get(expr, None).await?;
            out.push_str(&value_to_plain_string(&value));
            rest = &after[end + 2..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

fn value_to_plain_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn lookup_uploaded_file(files: &[UploadedFile], key: &str) -> Option<Value> {
    if let Some(f) = files.iter().find(|f| f.name == key) {
        return Some(Value::String(String::from_utf8_lossy(&f.bytes).into_owned()));
    }
    if let Some(idx_str) = key.strip_prefix("file[").and_then(|s| s.strip_suffix(']')) {
        let idx: usize = idx_str.parse().ok()?;
        return files
            .get(idx)
            .map(|f| Value::String(String::from_utf8_lossy(&f.bytes).into_owned()));
    }
    if key == "file" {
        return files
            .first()
            .map(|f| Value::String(String::from_utf8_lossy(&f.bytes).into_owned()));
    }
    None
}

fn lookup_exhausted(key: &str) -> Error {
    Error::new(
        ErrorCode::ContextLookupExhausted,
        format!(
            "no accessor resolved '{key}' — retry with a type hint, check Memory/Session/Outputs, \
             or verify the request body/query/headers and allow lists"
        ),
    )
    .with_context("key", key)
}

fn param_not_allowed(key: &str) -> Error {
    Error::new(
        ErrorCode::ContextParamNotAllowed,
        format!("'{key}' is not in the allowed params list"),
    )
    .with_context("key", key)
}

fn header_not_allowed(key: &str) -> Error {
    Error::new(
        ErrorCode::ContextHeaderNotAllowed,
        format!("'{key}' is not in the allowed headers list"),
    )
    .with_context("key", key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ExecutionContext {
        ExecutionContext::new("demo", "/tmp")
    }

    #[tokio::test]
    async fn memory_resolves_through_unhinted_chain() {
        let ctx = ctx();
        ctx.memory.set("greeting", Value::from("hi")).await;
        assert_eq!(ctx.get("greeting", None).await.unwrap(), Value::from("hi"));
    }

    #[tokio::test]
    async fn items_take_priority_over_memory() {
        let ctx = ctx();
        ctx.memory.set("current", Value::from("from-memory")).await;
        ctx.set_items(Iteration::at(vec![Value::from("from-items")], 0)).await;
        assert_eq!(ctx.get("current", None).await.unwrap(), Value::from("from-items"));
    }

    #[tokio::test]
    async fn outputs_resolve_after_session() {
        let ctx = ctx();
        ctx.outputs.set("step1", Value::from("done")).await;
        assert_eq!(ctx.get("step1", None).await.unwrap(), Value::from("done"));
    }

    #[tokio::test]
    async fn unresolved_key_is_lookup_exhausted() {
        let ctx = ctx();
        let err = ctx.get("nonexistent", None).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ContextLookupExhausted);
    }

    #[tokio::test]
    async fn type_hint_pins_lookup_to_one_store() {
        let ctx = ctx();
        ctx.memory.set("x", Value::from(1)).await;
        let err = ctx.get("x", Some(TypeHint::Session)).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ContextLookupExhausted);
        assert_eq!(ctx.get("x", Some(TypeHint::Memory)).await.unwrap(), Value::from(1));
    }

    #[tokio::test]
    async fn request_body_and_query_resolve_when_request_attached() {
        let mut req = Request::default();
        req.body = serde_json::json!({"name": "Bob"});
        req.query.insert("q".to_string(), "rust".to_string());
        let ctx = ctx().with_request(req);
        assert_eq!(ctx.get("name", None).await.unwrap(), Value::from("Bob"));
        assert_eq!(ctx.get("q", None).await.unwrap(), Value::from("rust"));
    }

    #[tokio::test]
    async fn disallowed_param_fails_even_if_present() {
        let mut req = Request::default();
        req.body = serde_json::json!({"secret": "x"});
        let ctx = ctx().with_request(req).with_allowed_params(vec!["name".to_string()]);
        let err = ctx.get("secret", Some(TypeHint::RequestBody)).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ContextParamNotAllowed);
    }

    #[tokio::test]
    async fn disallowed_header_fails_even_if_present() {
        let mut req = Request::default();
        req.headers.insert("X-Secret".to_string(), "x".to_string());
        let ctx = ctx().with_request(req).with_allowed_headers(vec!["X-Public".to_string()]);
        let err = ctx.get("X-Secret", Some(TypeHint::RequestHeader)).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ContextHeaderNotAllowed);
    }

    #[tokio::test]
    async fn metadata_fields_resolve() {
        let ctx = ctx();
        assert_eq!(ctx.get("workflow.name", None).await.unwrap(), Value::from("demo"));
    }

    #[tokio::test]
    async fn iteration_outside_loop_is_empty_not_error() {
        let ctx = ctx();
        assert_eq!(ctx.item("current").await, None);
        assert_eq!(ctx.item("index").await, Some(Value::from(0)));
    }

    #[tokio::test]
    async fn uploaded_file_resolves_by_exact_name_and_shorthand() {
        let mut req = Request::default();
        req.files.push(UploadedFile {
            name: "a.txt".to_string(),
            path: None,
            bytes: b"hello".to_vec(),
        });
        let ctx = ctx().with_request(req);
        assert_eq!(ctx.get("a.txt", None).await.unwrap(), Value::from("hello"));
        assert_eq!(ctx.get("file", None).await.unwrap(), Value::from("hello"));
        assert_eq!(ctx.get("file[0]", None).await.unwrap(), Value::from("hello"));
    }

    #[tokio::test]
    async fn evaluate_substitutes_placeholders() {
        let ctx = ctx();
        ctx.memory.set("name", Value::from("Bob")).await;
        let out = ctx.evaluate("Hello, {{name}}!").await.unwrap();
        assert_eq!(out, "Hello, Bob!");
    }

    #[tokio::test]
    async fn evaluate_passes_through_literal_text() {
        let ctx = ctx();
        assert_eq!(ctx.evaluate("no placeholders here").await.unwrap(), "no placeholders here");
    }

    #[tokio::test]
    async fn evaluate_fails_on_unresolved_placeholder() {
        let ctx = ctx();
        let err = ctx.evaluate("{{missing}}").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ContextLookupExhausted);
    }

    #[tokio::test]
    async fn resource_registry_roundtrips() {
        let ctx = ctx();
        ctx.register_resource("step1", serde_json::json!({"script": "step1"})).await;
        assert!(ctx.resource("step1").await.is_some());
        assert!(ctx.resource("ghost").await.is_none());
    }

    #[tokio::test]
    async fn request_data_excludes_filtered_fields() {
        let mut req = Request::default();
        req.body = serde_json::json!({"name": "Bob", "secret": "x"});
        req.headers.insert("X-Secret".to_string(), "x".to_string());
        let ctx = ctx()
            .with_request(req)
            .with_allowed_params(vec!["name".to_string()])
            .with_allowed_headers(vec![]);
        let data = ctx.request_data().await.unwrap();
        assert_eq!(data["body"]["name"], Value::from("Bob"));
        assert!(data["body"].get("secret").is_none());
    }
}
