// SPDX-License-Identifier: MIT OR Apache-2.0
//! The [`Backend`] trait and its [`BackendRegistry`].

use crate::chat::ChatConfig;
use crate::ir::ChatMessage;
use crate::response::NormalizedResponse;
use kdeps_error::Error;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A chat-completions provider.
///
/// Implementors translate the provider-agnostic [`ChatMessage`] list and
/// [`ChatConfig`] into the provider's native request body, and translate
/// the provider's native response back into a [`NormalizedResponse`].
/// Implementations hold no network client of their own — the executor
/// owns the single shared `reqwest::Client` and calls `build_request` /
/// `parse_response` around its own dispatch.
pub trait Backend: Send + Sync {
    /// The backend's unique registry name, e.g. `"openai"`, `"anthropic"`.
    fn name(&self) -> &str;

    /// The canonical base URL used when the caller supplies none.
    fn default_url(&self) -> &str;

    /// Append the backend-specific chat-completions path onto `base_url`.
    fn chat_endpoint(&self, base_url: &str) -> String;

    /// Build the provider's native JSON request body.
    fn build_request(
        &self,
        model: &str,
        messages: &[ChatMessage],
        config: &ChatConfig,
    ) -> Result<Value, Error>;

    /// Parse the provider's native JSON response into a normalized shape.
    fn parse_response(&self, response: &Value) -> Result<NormalizedResponse, Error>;

    /// The auth header name/value pair for `api_key`. Local backends that
    /// need no auth return an empty pair.
    fn api_key_header(&self, api_key: &str) -> (String, String) {
        (
            "Authorization".to_string(),
            format!("Bearer {api_key}"),
        )
    }

    /// `true` for backends that authenticate via a query parameter instead
    /// of (or in addition to) a header — Google's native Gemini API.
    fn auth_via_query(&self) -> bool {
        false
    }

    /// The chat endpoint with `api_key` embedded as a query parameter, for
    /// backends where [`Self::auth_via_query`] is `true`. The default
    /// delegates to [`Self::chat_endpoint`] unchanged.
    fn chat_endpoint_with_key(&self, base_url: &str, _api_key: &str) -> String {
        self.chat_endpoint(base_url)
    }
}

/// A name → backend lookup table.
#[derive(Default)]
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn Backend>>,
    default_name: Option<String>,
}

impl BackendRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `backend`, replacing any prior registration under the same
    /// name.
    pub fn register(&mut self, backend: Arc<dyn Backend>) {
        self.backends.insert(backend.name().to_string(), backend);
    }

    /// Mark `name` as the backend `get_default` prefers. Does not need to
    /// already be registered at call time.
    pub fn set_default(&mut self, name: impl Into<String>) {
        self.default_name = Some(name.into());
    }

    /// Look up a backend by exact name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Backend>> {
        self.backends.get(name).cloned()
    }

    /// The default backend: the one named by [`Self::set_default`] if
    /// registered, else any registered backend, else `None`.
    #[must_use]
    pub fn get_default(&self) -> Option<Arc<dyn Backend>> {
        if let Some(name) = &self.default_name {
            if let Some(backend) = self.backends.get(name) {
                return Some(backend.clone());
            }
        }
        self.backends.values().next().cloned()
    }

    /// The names of every registered backend.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.backends.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Role;
    use kdeps_error::ErrorCode;

    struct StubBackend(&'static str);

    impl Backend for StubBackend {
        fn name(&self) -> &str {
            self.0
        }
        fn default_url(&self) -> &str {
            "https://example.invalid"
        }
        fn chat_endpoint(&self, base_url: &str) -> String {
            format!("{base_url}/chat")
        }
        fn build_request(
            &self,
            _model: &str,
            _messages: &[ChatMessage],
            _config: &ChatConfig,
        ) -> Result<Value, Error> {
            Ok(Value::Null)
        }
        fn parse_response(&self, _response: &Value) -> Result<NormalizedResponse, Error> {
            Err(Error::new(ErrorCode::LlmRequestBuildFailed, "stub"))
        }
    }

    #[test]
    fn registry_prefers_default_name() {
        let mut registry = BackendRegistry::new();
        registry.register(Arc::new(StubBackend("local")));
        registry.register(Arc::new(StubBackend("openai")));
        registry.set_default("local");
        assert_eq!(registry.get_default().unwrap().name(), "local");
    }

    #[test]
    fn registry_falls_back_to_any_backend_without_default() {
        let mut registry = BackendRegistry::new();
        registry.register(Arc::new(StubBackend("openai")));
        assert_eq!(registry.get_default().unwrap().name(), "openai");
    }

    #[test]
    fn empty_registry_has_no_default() {
        let registry = BackendRegistry::new();
        assert!(registry.get_default().is_none());
    }

    #[test]
    fn get_looks_up_by_exact_name() {
        let mut registry = BackendRegistry::new();
        registry.register(Arc::new(StubBackend("anthropic")));
        assert!(registry.get("anthropic").is_some());
        assert!(registry.get("cohere").is_none());
    }

    #[test]
    fn default_api_key_header_is_bearer() {
        let backend = StubBackend("x");
        let (header, value) = backend.api_key_header("sk-test");
        assert_eq!(header, "Authorization");
        assert_eq!(value, "Bearer sk-test");
    }

    #[test]
    fn chat_message_role_roundtrip_sanity() {
        let msg = ChatMessage::text(Role::User, "hi");
        assert_eq!(msg.role, Role::User);
    }
}
