// SPDX-License-Identifier: MIT OR Apache-2.0
//! Agent/action identity: canonicalization, version discovery, and the
//! on-disk catalog behind the `agent://` reader.
//!
//! [`IdentityReader`] is the single entry point other crates talk to —
//! it parses an `agent://` URI, dispatches to the right internal module,
//! and returns the JSON body the caller should hand back through the
//! reader boundary.
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// The embedded SQL catalog (`agents` table) backing registration.
pub mod catalog;
/// Ambient current-agent/version resolution.
pub mod context;
/// `findLatest` and the full canonicalization algorithm.
pub mod resolve;
/// The three-pass filesystem scan that populates the catalog.
pub mod scan;
/// `agent://` URI parsing.
pub mod uri;

pub use catalog::Catalog;
pub use context::AmbientContext;
pub use uri::{AgentOp, AgentUri};

use kdeps_core::{CatalogEntry, ParsedRef};
use kdeps_error::{Error, ErrorCode};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Handles `agent://` reader requests against a [`Catalog`] and the
/// on-disk agent tree rooted at `agents_root`.
pub struct IdentityReader {
    catalog: Catalog,
    ctx: AmbientContext,
    agents_root: PathBuf,
}

impl IdentityReader {
    /// Build a reader over an already-open catalog.
    #[must_use]
    pub fn new(catalog: Catalog, ctx: AmbientContext, agents_root: impl Into<PathBuf>) -> Self {
        Self {
            catalog,
            ctx,
            agents_root: agents_root.into(),
        }
    }

    /// Access the underlying catalog (used by callers that need raw
    /// `upsert`/`get` access outside the URI surface, e.g. the store).
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// `RegisterAllAgentsAndActions`: populate the catalog from
    /// `agents_root` and `project_root`. Safe to call repeatedly.
    pub fn scan(&self, project_root: &Path) -> Result<(), Error> {
        scan::register_all_agents_and_actions(&self.catalog, &self.agents_root, project_root)
    }

    /// Handle a raw `agent://...` URI and return its JSON (or plain
    /// string, for `resolve`) response body.
    pub fn handle(&self, raw_uri: &str) -> Result<String, Error> {
        let uri = AgentUri::parse(raw_uri)?;
        match uri.op {
            AgentOp::Resolve => resolve::resolve(
                &self.catalog,
                &self.ctx,
                &uri.identifier,
                uri.agent.as_deref(),
                uri.version.as_deref(),
            ),
            AgentOp::List => self.handle_list(&uri),
            AgentOp::ListInstalled => to_json(&scan::list_installed(&self.agents_root)),
            AgentOp::Register => self.handle_register(&uri),
            AgentOp::Unregister => self.handle_unregister(&uri),
        }
    }

    fn handle_list(&self, uri: &AgentUri) -> Result<String, Error> {
        let agent = uri.agent.as_deref().ok_or_else(missing_list_context)?;
        let version = uri.version.as_deref().ok_or_else(missing_list_context)?;
        #[derive(Serialize)]
        struct CopyAllResourcesMarker<'a> {
            agent: &'a str,
            operation: &'a str,
            message: String,
        }
        let marker = CopyAllResourcesMarker {
            agent,
            operation: "copy_all_resources",
            message: format!("copy all resources for @{agent}:{version}"),
        };
        to_json(&marker)
    }

    fn handle_register(&self, uri: &AgentUri) -> Result<String, Error> {
        let parsed = ParsedRef::parse(&uri.identifier)?;
        let canonical = parsed.canonical().ok_or_else(|| {
            Error::new(
                ErrorCode::IdentityMissingContext,
                "register requires a fully-qualified '@agent[/action]:version' identifier",
            )
            .with_context("identifier", &uri.identifier)
        })?;
        let path = uri.path.clone().ok_or_else(|| {
            Error::new(
                ErrorCode::IdentityMissingContext,
                "register requires a 'path' query parameter",
            )
        })?;
        let entry = CatalogEntry {
            agent: parsed.agent.clone().unwrap_or_default(),
            version: parsed
                .version
                .map(|v| v.to_string())
                .unwrap_or_default(),
            action: parsed.action.clone(),
            path,
        };
        self.catalog.upsert_entry(&canonical, &entry)?;
        to_json(&entry)
    }

    fn handle_unregister(&self, uri: &AgentUri) -> Result<String, Error> {
        self.catalog.remove(&uri.identifier)?;
        to_json(&serde_json::json!({ "removed": uri.identifier }))
    }
}

fn missing_list_context() -> Error {
    Error::new(
        ErrorCode::IdentityMissingContext,
        "list requires 'agent' and 'version' query parameters",
    )
}

fn to_json<T: Serialize>(value: &T) -> Result<String, Error> {
    serde_json::to_string(value).map_err(|e| {
        Error::new(ErrorCode::IdentityCatalogFailed, "failed to encode response body")
            .with_source(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn reader(dir: &std::path::Path) -> IdentityReader {
        IdentityReader::new(
            Catalog::open_in_memory().unwrap(),
            AmbientContext::empty(),
            dir.join("agents"),
        )
    }

    #[test]
    fn resolve_op_returns_canonical_string() {
        let dir = tempfile::tempdir().unwrap();
        let reader = reader(dir.path());
        reader.catalog().upsert("@demo:1.0.0", "{}").unwrap();
        let out = reader.handle("agent://@demo/greet").unwrap();
        assert_eq!(out, "@demo/greet:1.0.0");
    }

    #[test]
    fn list_op_requires_agent_and_version() {
        let dir = tempfile::tempdir().unwrap();
        let reader = reader(dir.path());
        let err = reader.handle("agent://x?op=list&path=/a").unwrap_err();
        assert_eq!(err.code, ErrorCode::IdentityMissingContext);
    }

    #[test]
    fn list_op_returns_copy_all_resources_marker() {
        let dir = tempfile::tempdir().unwrap();
        let reader = reader(dir.path());
        let out = reader
            .handle("agent://x?op=list&agent=demo&version=1.0.0&path=/a")
            .unwrap();
        assert!(out.contains("copy_all_resources"));
        assert!(out.contains("demo"));
    }

    #[test]
    fn register_then_resolve_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let reader = reader(dir.path());
        reader
            .handle("agent://@demo/greet:1.0.0?op=register&path=/agents/demo/1.0.0/workflow.pkl")
            .unwrap();
        let resolved = reader.handle("agent://@demo/greet").unwrap();
        assert_eq!(resolved, "@demo/greet:1.0.0");
    }

    #[test]
    fn register_without_version_fails() {
        let dir = tempfile::tempdir().unwrap();
        let reader = reader(dir.path());
        let err = reader
            .handle("agent://@demo/greet?op=register&path=/a")
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::IdentityMissingContext);
    }

    #[test]
    fn register_without_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let reader = reader(dir.path());
        let err = reader
            .handle("agent://@demo/greet:1.0.0?op=register")
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::IdentityMissingContext);
    }

    #[test]
    fn unregister_removes_row() {
        let dir = tempfile::tempdir().unwrap();
        let reader = reader(dir.path());
        reader.catalog().upsert("@demo:1.0.0", "{}").unwrap();
        reader.handle("agent://@demo:1.0.0?op=unregister").unwrap();
        assert!(reader.catalog().get("@demo:1.0.0").unwrap().is_none());
    }

    #[test]
    fn list_installed_op_reflects_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let agents_root = dir.path().join("agents");
        fs::create_dir_all(agents_root.join("demo/1.0.0")).unwrap();
        fs::write(agents_root.join("demo/1.0.0/workflow.pkl"), "").unwrap();
        let reader = reader(dir.path());
        let out = reader.handle("agent://x?op=list-installed").unwrap();
        assert!(out.contains("@demo:1.0.0"));
    }

    #[test]
    fn scan_then_resolve_sees_registered_agent() {
        let dir = tempfile::tempdir().unwrap();
        let agents_root = dir.path().join("agents");
        let project_root = dir.path().join("project");
        fs::create_dir_all(agents_root.join("demo/1.0.0")).unwrap();
        fs::write(
            agents_root.join("demo/1.0.0/workflow.pkl"),
            "ActionID = \"greet\"\n",
        )
        .unwrap();
        fs::create_dir_all(&project_root).unwrap();

        let reader = reader(dir.path());
        reader.scan(&project_root).unwrap();
        assert_eq!(reader.handle("agent://@demo/greet").unwrap(), "@demo/greet:1.0.0");
    }
}
