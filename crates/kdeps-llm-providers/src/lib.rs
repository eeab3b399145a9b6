// SPDX-License-Identifier: MIT OR Apache-2.0
//! Concrete [`kdeps_llm_core::Backend`] implementations: the OpenAI
//! Chat Completions family (one parameterized backend for seven
//! providers), Anthropic, Google, Cohere, and a local Ollama-compatible
//! backend.
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Anthropic's Messages API.
pub mod anthropic;
/// Cohere's Chat API.
pub mod cohere;
/// Google's native Gemini API.
pub mod google;
/// A locally-hosted Ollama-compatible backend.
pub mod local;
/// The OpenAI Chat Completions wire format, shared by seven providers.
pub mod openai_compat;

pub use anthropic::AnthropicBackend;
pub use cohere::CohereBackend;
pub use google::GoogleBackend;
pub use kdeps_llm_core::Backend;
pub use local::LocalBackend;
pub use openai_compat::OpenAiCompatBackend;

use kdeps_llm_core::BackendRegistry;
use std::sync::Arc;

/// Build a [`BackendRegistry`] with every known backend registered, and
/// the local backend as default — matching the runtime's offline-first
/// posture when no `backend` is configured.
#[must_use]
pub fn default_registry() -> BackendRegistry {
    let mut registry = BackendRegistry::new();
    registry.register(Arc::new(LocalBackend));
    registry.register(Arc::new(AnthropicBackend));
    registry.register(Arc::new(GoogleBackend));
    registry.register(Arc::new(CohereBackend));
    registry.register(Arc::new(OpenAiCompatBackend::openai()));
    registry.register(Arc::new(OpenAiCompatBackend::mistral()));
    registry.register(Arc::new(OpenAiCompatBackend::together()));
    registry.register(Arc::new(OpenAiCompatBackend::perplexity()));
    registry.register(Arc::new(OpenAiCompatBackend::groq()));
    registry.register(Arc::new(OpenAiCompatBackend::deepseek()));
    registry.register(Arc::new(OpenAiCompatBackend::google_openai_compat()));
    registry.set_default("local");
    registry
}
