// SPDX-License-Identifier: MIT OR Apache-2.0
//! Scoped key-value store and dependency-status registry, both keyed by
//! `graphID`, behind the `pklres://` reader.
//!
//! One process-wide [`GraphRegistry`] is expected; it holds every graph
//! simultaneously. Collection names are canonicalized through
//! `kdeps-identity` before the KV maps are touched, so store locks are
//! always acquired *after* identity resolution returns — never the other
//! way around.
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// `current`-collection rewriting and identity-backed canonicalization.
pub mod collection;
/// The dependency-status registry and its callback store.
pub mod dependency;
/// The generic nested key-value space.
pub mod kv;
/// `pklres://` URI parsing.
pub mod uri;

pub use dependency::{DependencyCallback, DependencyRegistry};
pub use kv::KvStore;
pub use uri::{PklresOp, PklresUri};

use kdeps_core::DependencyStatus;
use kdeps_error::{Error, ErrorCode};
use kdeps_identity::{AmbientContext, Catalog};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, OnceLock, RwLock as StdRwLock};
use std::time::Duration;

const DEFAULT_ASYNC_RESOLVE_TIMEOUT: Duration = Duration::from_secs(30);

/// The combined KV store and dependency registry for every graph in the
/// process, plus the identity context needed to canonicalize collection
/// names.
pub struct GraphRegistry {
    kv: KvStore,
    dependencies: DependencyRegistry,
    catalog: Arc<Catalog>,
    ctx: AmbientContext,
}

impl GraphRegistry {
    /// Build a registry backed by `catalog` for collection-name
    /// canonicalization.
    #[must_use]
    pub fn new(catalog: Arc<Catalog>, ctx: AmbientContext) -> Self {
        Self {
            kv: KvStore::new(),
            dependencies: DependencyRegistry::new(),
            catalog,
            ctx,
        }
    }

    /// The dependency registry, for direct (non-URI) orchestrator calls —
    /// `PreResolveDependencies`, `UpdateDependencyStatus`,
    /// `RegisterDependencyCallback`, `IsInDependencyGraph`, and friends.
    #[must_use]
    pub fn dependencies(&self) -> &DependencyRegistry {
        &self.dependencies
    }

    /// `set(collection, key, value)`.
    pub async fn set(
        &self,
        graph_id: &str,
        collection: &str,
        key: &str,
        value: &str,
    ) -> Result<String, Error> {
        let canonical = collection::canonicalize_collection(&self.catalog, &self.ctx, graph_id, collection)?;
        self.kv.set(graph_id, &canonical, key, value).await
    }

    /// `get(collection, key)`.
    pub async fn get(&self, graph_id: &str, collection: &str, key: &str) -> Result<String, Error> {
        let canonical = collection::canonicalize_collection(&self.catalog, &self.ctx, graph_id, collection)?;
        self.kv.get(graph_id, &canonical, key).await
    }

    /// `list(collection)`.
    pub async fn list(&self, graph_id: &str, collection: &str) -> Result<Vec<String>, Error> {
        let canonical = collection::canonicalize_collection(&self.catalog, &self.ctx, graph_id, collection)?;
        self.kv.list(graph_id, &canonical).await
    }

    /// Dispatch a raw `pklres://...` URI to the KV store or the dependency
    /// registry, returning its JSON (or plain-string, for `get`/`set`)
    /// response body.
    pub async fn handle(&self, raw_uri: &str) -> Result<String, Error> {
        let uri = PklresUri::parse(raw_uri)?;
        let graph_id = uri.graph.as_deref().ok_or_else(|| {
            Error::new(ErrorCode::StoreUriInvalid, "pklres:// URIs require a 'graph' query parameter")
        })?;
        match uri.op {
            PklresOp::Get => {
                let key = required(&uri.key, "key")?;
                self.get(graph_id, &uri.identifier, key).await
            }
            PklresOp::Set => {
                let key = required(&uri.key, "key")?;
                let value = required(&uri.value, "value")?;
                self.set(graph_id, &uri.identifier, key, value).await
            }
            PklresOp::List => {
                let keys = self.list(graph_id, &uri.identifier).await?;
                serde_json::to_string(&keys).map_err(encode_err)
            }
            PklresOp::AsyncResolve => {
                let timeout = uri
                    .timeout_ms
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_ASYNC_RESOLVE_TIMEOUT);
                let node = self
                    .dependencies
                    .wait_for(graph_id, &uri.identifier, timeout)
                    .await?;
                serde_json::to_string(&node).map_err(encode_err)
            }
            PklresOp::AsyncStatus => {
                let node = self.dependencies.get(graph_id, &uri.identifier).await?;
                serde_json::to_string(&node).map_err(encode_err)
            }
        }
    }
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, Error> {
    value.as_deref().ok_or_else(|| {
        Error::new(
            ErrorCode::StoreUriInvalid,
            format!("pklres:// op requires a '{name}' query parameter"),
        )
    })
}

fn encode_err(e: serde_json::Error) -> Error {
    Error::new(ErrorCode::StoreUriInvalid, "failed to encode response body").with_source(e)
}

/// `BTreeMap`-backed, deterministic snapshot of dependency state across an
/// entire graph, as returned by `DependencyRegistry::status_summary`.
pub type StatusSummary = BTreeMap<String, DependencyStatus>;
/// The action ids still `Pending`, as returned by `DependencyRegistry::pending`.
pub type PendingList = Vec<String>;
/// Reverse-dependency map input to `PreResolveDependencies`.
pub type DependenciesOf = HashMap<String, Vec<String>>;

static GLOBAL: OnceLock<StdRwLock<Option<Arc<GraphRegistry>>>> = OnceLock::new();

/// Install a process-wide registry, for test fixtures and background scans
/// that have no natural call-site to thread an explicit registry through.
/// Every production call site should still take a `&GraphRegistry`
/// explicitly rather than reach for this.
pub fn install_global(registry: Arc<GraphRegistry>) {
    let slot = GLOBAL.get_or_init(|| StdRwLock::new(None));
    *slot.write().expect("global registry lock poisoned") = Some(registry);
}

/// Fetch the process-wide registry installed by [`install_global`], if any.
#[must_use]
pub fn global() -> Option<Arc<GraphRegistry>> {
    GLOBAL
        .get()
        .and_then(|slot| slot.read().expect("global registry lock poisoned").clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> GraphRegistry {
        GraphRegistry::new(Arc::new(Catalog::open_in_memory().unwrap()), AmbientContext::empty())
    }

    #[tokio::test]
    async fn set_then_get_through_system_collection() {
        let reg = registry();
        reg.set("g1", "@demo:1.0.0", "k", "\"v\"").await.unwrap();
        assert_eq!(reg.get("g1", "@demo:1.0.0", "k").await.unwrap(), "\"v\"");
    }

    #[tokio::test]
    async fn handle_get_and_set_uris() {
        let reg = registry();
        reg.handle("pklres://@demo:1.0.0?op=set&key=k&value=1&graph=g1")
            .await
            .unwrap();
        let out = reg
            .handle("pklres://@demo:1.0.0?op=get&key=k&graph=g1")
            .await
            .unwrap();
        assert_eq!(out, "1");
    }

    #[tokio::test]
    async fn handle_requires_graph_param() {
        let reg = registry();
        let err = reg.handle("pklres://@demo:1.0.0?op=get&key=k").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::StoreUriInvalid);
    }

    #[tokio::test]
    async fn handle_list_returns_json_array() {
        let reg = registry();
        reg.handle("pklres://@demo:1.0.0?op=set&key=a&value=1&graph=g1")
            .await
            .unwrap();
        let out = reg.handle("pklres://@demo:1.0.0?op=list&graph=g1").await.unwrap();
        assert_eq!(out, "[\"a\"]");
    }

    #[tokio::test]
    async fn handle_async_status_reflects_dependency_registry() {
        let reg = registry();
        reg.dependencies()
            .pre_resolve_dependencies("g1", &["a".to_string()], &HashMap::new())
            .await
            .unwrap();
        let out = reg
            .handle("pklres://a?op=async_status&graph=g1")
            .await
            .unwrap();
        assert!(out.contains("\"pending\""));
    }

    #[tokio::test]
    async fn handle_async_resolve_waits_then_returns() {
        let reg = Arc::new(registry());
        reg.dependencies()
            .pre_resolve_dependencies("g1", &["a".to_string()], &HashMap::new())
            .await
            .unwrap();
        reg.dependencies()
            .update_status("g1", "a", kdeps_core::DependencyStatus::Completed, None, None)
            .await
            .unwrap();
        let out = reg
            .handle("pklres://a?op=async_resolve&graph=g1&timeout_ms=100")
            .await
            .unwrap();
        assert!(out.contains("\"completed\""));
    }

    #[test]
    fn global_accessor_round_trips() {
        let reg = Arc::new(registry());
        install_global(reg.clone());
        assert!(global().is_some());
    }
}
