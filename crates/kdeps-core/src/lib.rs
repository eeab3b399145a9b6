// SPDX-License-Identifier: MIT OR Apache-2.0
//! kdeps-core
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Stable contract types shared by every kdeps runtime crate: agent
//! identity, version ordering, parsed action references, dependency-graph
//! state, and catalog entries.
//!
//! If you only take one dependency from this workspace, take this one.

/// Dependency-graph node state shared between the registry and the
/// execution context.
pub mod dependency;
/// Parsing and canonicalization of `@agent/action:version` references.
pub mod reference;
/// Three-segment semantic version used throughout the catalog.
pub mod version;
/// Shared opaque-authority URI splitting, used by both `agent://` and
/// `pklres://` readers.
pub mod uri;

pub use dependency::{DependencyData, DependencyStatus};
pub use reference::ParsedRef;
pub use uri::split_scheme_and_query;
pub use version::Version;

use serde::{Deserialize, Serialize};

/// A single registered agent, as recorded in the catalog at registration
/// time. Immutable once created; replaced wholesale by unregister+register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInfo {
    /// Fully-qualified canonical id, e.g. `@demo/greet:1.0.0`.
    pub id: String,
    /// Version component, duplicated from `id` for convenient sorting.
    pub version: Version,
    /// Source control revision, when known. Empty string if not recorded.
    #[serde(default)]
    pub commit: String,
}

impl AgentInfo {
    /// Construct a new catalog entry.
    #[must_use]
    pub fn new(id: impl Into<String>, version: Version, commit: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version,
            commit: commit.into(),
        }
    }
}

/// Catalog row payload: the descriptor stored alongside a canonical id.
///
/// Distinct from [`AgentInfo`] — this is what `RegisterAllAgentsAndActions`
/// writes for every scanned action, while `AgentInfo` is what an explicit
/// `register` operation writes for a single id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Bare agent name (no `@`, no version).
    pub agent: String,
    /// Version string as discovered (e.g. from a directory name or `.pkl`).
    pub version: String,
    /// Action name, absent when the row describes the agent itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Filesystem path the entry was discovered at.
    pub path: String,
}
