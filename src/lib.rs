// SPDX-License-Identifier: MIT OR Apache-2.0
//! kdeps-runtime
//!
//! A Cargo workspace, not a single crate: the workflow orchestration
//! runtime that executes AI-augmented agent workflows as directed
//! resource graphs lives across the `kdeps-*` members under `crates/`.
//!
//! | Crate | Responsibility |
//! |---|---|
//! | [`kdeps_core`] | Stable contract types: agent identity, dependency state, version ordering |
//! | [`kdeps_error`] | Unified error taxonomy with stable error codes |
//! | [`kdeps_config`] | Runtime settings loading and environment overrides |
//! | [`kdeps_telemetry`] | Structured telemetry and run-metrics collection |
//! | `kdeps_identity` | Agent/action canonicalization, version discovery, catalog registration |
//! | `kdeps_store` | The `pklres` scoped key-value store and dependency-status registry |
//! | `kdeps_context` | The unified execution-context accessor (`Get`) |
//! | `kdeps_llm_core` | The provider-agnostic chat IR and `Backend` trait |
//! | `kdeps_llm_providers` | Concrete backend implementations (OpenAI family, Anthropic, Google, Cohere, local) |
//! | `kdeps_llm_executor` | Expression evaluation, multimodal assembly, backend dispatch, the tool-call loop |
//! | `kdeps_files` | The on-disk `<agent>/<version>/<relative>` file registry |
//!
//! This package itself carries no production code — it exists to host the
//! workspace manifest and the cross-crate integration tests below, which
//! exercise the end-to-end scenarios the individual crates' unit tests
//! don't span on their own (a caller resolving a reference, writing it
//! into the store, and waiting on a dependency graph, all in one flow).
#![deny(unsafe_code)]
