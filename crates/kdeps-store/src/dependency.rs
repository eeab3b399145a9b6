use chrono::Utc;
use kdeps_core::{DependencyData, DependencyStatus};
use kdeps_error::{Error, ErrorCode};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{debug, warn};

/// A registered dependency-status callback: invoked with a snapshot of the
/// node after every status transition.
pub type DependencyCallback = Arc<dyn Fn(DependencyData) + Send + Sync + 'static>;

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// The per-graph dependency-status registry and its callback store. Each
/// map lives behind its own lock, per the concurrency model: readers take
/// a read lock for the duration of the inspection, writers mutate the node
/// under the write lock, and callbacks are dispatched as independently
/// spawned tasks outside the critical section.
#[derive(Default)]
pub struct DependencyRegistry {
    nodes: RwLock<HashMap<String, HashMap<String, DependencyData>>>,
    callbacks: RwLock<HashMap<String, HashMap<String, Vec<DependencyCallback>>>>,
}

impl DependencyRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialize one [`DependencyData`] per entry in `order`, then install
    /// the reverse edges so every node's `dependents` is populated.
    /// Repeated calls for the same graph are additive.
    pub async fn pre_resolve_dependencies(
        &self,
        graph_id: &str,
        order: &[String],
        deps_of: &HashMap<String, Vec<String>>,
    ) -> Result<(), Error> {
        let mut graphs = self.nodes.write().await;
        let graph = graphs.entry(graph_id.to_string()).or_default();

        let now = Utc::now();
        for action_id in order {
            graph.entry(action_id.clone()).or_insert_with(|| {
                DependencyData::new(
                    action_id.clone(),
                    deps_of.get(action_id).cloned().unwrap_or_default(),
                    now,
                )
            });
        }

        let edges: Vec<(String, String)> = order
            .iter()
            .flat_map(|action_id| {
                deps_of
                    .get(action_id)
                    .into_iter()
                    .flatten()
                    .map(move |dep| (dep.clone(), action_id.clone()))
            })
            .collect();
        for (dependency, dependent) in edges {
            if let Some(node) = graph.get_mut(&dependency) {
                if !node.dependents.contains(&dependent) {
                    node.dependents.push(dependent);
                }
            }
        }
        Ok(())
    }

    /// Mutate `action_id`'s node to `status`, stamping `completed_at` when
    /// the new status is terminal. Fires every registered callback for this
    /// action in its own spawned task, outside the lock.
    pub async fn update_status(
        &self,
        graph_id: &str,
        action_id: &str,
        status: DependencyStatus,
        result_data: Option<serde_json::Value>,
        err: Option<String>,
    ) -> Result<(), Error> {
        let snapshot = {
            let mut graphs = self.nodes.write().await;
            let graph = graphs
                .get_mut(graph_id)
                .ok_or_else(|| registry_uninitialized(graph_id))?;
            let node = graph
                .get_mut(action_id)
                .ok_or_else(|| unknown_node(graph_id, action_id))?;

            node.status = status;
            if result_data.is_some() {
                node.result_data = result_data;
            }
            if err.is_some() {
                node.error = err;
            }
            if status.is_terminal() && node.completed_at.is_none() {
                node.completed_at = Some(Utc::now());
            }
            node.clone()
        };

        let callbacks = {
            let callbacks = self.callbacks.read().await;
            callbacks
                .get(graph_id)
                .and_then(|m| m.get(action_id))
                .cloned()
                .unwrap_or_default()
        };
        debug!(graph_id, action_id, status = ?status, callbacks = callbacks.len(), "dependency status updated");
        for callback in callbacks {
            let snapshot = snapshot.clone();
            tokio::spawn(async move {
                callback(snapshot);
            });
        }
        Ok(())
    }

    /// Register a callback for `action_id`. Multiple callbacks per action
    /// id are preserved in registration order.
    pub async fn register_callback(
        &self,
        graph_id: &str,
        action_id: &str,
        callback: DependencyCallback,
    ) {
        let mut callbacks = self.callbacks.write().await;
        callbacks
            .entry(graph_id.to_string())
            .or_default()
            .entry(action_id.to_string())
            .or_default()
            .push(callback);
    }

    /// Fetch a snapshot of `action_id`'s node.
    pub async fn get(&self, graph_id: &str, action_id: &str) -> Result<DependencyData, Error> {
        let graphs = self.nodes.read().await;
        graphs
            .get(graph_id)
            .ok_or_else(|| registry_uninitialized(graph_id))?
            .get(action_id)
            .cloned()
            .ok_or_else(|| unknown_node(graph_id, action_id))
    }

    /// `true` iff `action_id`'s own status is terminal.
    pub async fn is_ready(&self, graph_id: &str, action_id: &str) -> Result<bool, Error> {
        Ok(self.get(graph_id, action_id).await?.status.is_terminal())
    }

    /// `true` iff every entry in `action_id`'s `dependencies` is itself
    /// ready. A dependency id unknown to the registry is treated as not
    /// ready, never an error — the caller may be racing registration.
    pub async fn are_all_ready(&self, graph_id: &str, action_id: &str) -> Result<bool, Error> {
        let node = self.get(graph_id, action_id).await?;
        let graphs = self.nodes.read().await;
        let graph = graphs.get(graph_id);
        Ok(node.dependencies.iter().all(|dep| {
            graph
                .and_then(|g| g.get(dep))
                .map(|n| n.status.is_terminal())
                .unwrap_or(false)
        }))
    }

    /// Poll [`Self::are_all_ready`] every 100 ms until satisfied or
    /// `timeout` elapses.
    pub async fn wait_for(
        &self,
        graph_id: &str,
        action_id: &str,
        timeout: Duration,
    ) -> Result<DependencyData, Error> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.are_all_ready(graph_id, action_id).await? {
                return self.get(graph_id, action_id).await;
            }
            if tokio::time::Instant::now() >= deadline {
                warn!(graph_id, action_id, ?timeout, "timed out waiting for dependencies");
                return Err(Error::new(
                    ErrorCode::DependencyWaitTimeout,
                    format!("timed out waiting for dependencies of '{action_id}'"),
                )
                .with_context("graph_id", graph_id)
                .with_context("action_id", action_id));
            }
            sleep(WAIT_POLL_INTERVAL.min(deadline.saturating_duration_since(tokio::time::Instant::now())))
                .await;
        }
    }

    /// Deterministic `actionID -> status` snapshot for the whole graph.
    pub async fn status_summary(
        &self,
        graph_id: &str,
    ) -> Result<BTreeMap<String, DependencyStatus>, Error> {
        let graphs = self.nodes.read().await;
        let graph = graphs
            .get(graph_id)
            .ok_or_else(|| registry_uninitialized(graph_id))?;
        Ok(graph.iter().map(|(id, node)| (id.clone(), node.status)).collect())
    }

    /// Every action id still `Pending`, in no particular order beyond the
    /// deterministic iteration `status_summary` provides underneath.
    pub async fn pending(&self, graph_id: &str) -> Result<Vec<String>, Error> {
        Ok(self
            .status_summary(graph_id)
            .await?
            .into_iter()
            .filter(|(_, status)| *status == DependencyStatus::Pending)
            .map(|(id, _)| id)
            .collect())
    }

    /// Admission test: `true` when `action_id` looks like a system
    /// collection (`@agent/...`), when the graph's registry is empty
    /// (permissive startup), or when the node is registered.
    pub async fn is_in_dependency_graph(&self, graph_id: &str, action_id: &str) -> bool {
        if action_id.starts_with('@') && action_id.contains('/') {
            return true;
        }
        let graphs = self.nodes.read().await;
        match graphs.get(graph_id) {
            None => true,
            Some(graph) if graph.is_empty() => true,
            Some(graph) => graph.contains_key(action_id),
        }
    }
}

fn registry_uninitialized(graph_id: &str) -> Error {
    Error::new(
        ErrorCode::DependencyRegistryUninitialized,
        format!("dependency registry for graph '{graph_id}' has not been initialized"),
    )
    .with_context("graph_id", graph_id)
}

fn unknown_node(graph_id: &str, action_id: &str) -> Error {
    Error::new(
        ErrorCode::DependencyUnknownNode,
        format!("'{action_id}' is not registered in graph '{graph_id}'"),
    )
    .with_context("graph_id", graph_id)
    .with_context("action_id", action_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn deps_of(pairs: &[(&str, &[&str])]) -> HashMap<String, Vec<String>> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
            .collect()
    }

    #[tokio::test]
    async fn pre_resolve_populates_pending_nodes_and_reverse_edges() {
        let reg = DependencyRegistry::new();
        let order = vec!["a".to_string(), "b".to_string()];
        let deps = deps_of(&[("b", &["a"])]);
        reg.pre_resolve_dependencies("g1", &order, &deps).await.unwrap();

        let a = reg.get("g1", "a").await.unwrap();
        assert_eq!(a.status, DependencyStatus::Pending);
        assert_eq!(a.dependents, vec!["b".to_string()]);
        let b = reg.get("g1", "b").await.unwrap();
        assert_eq!(b.dependencies, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn pre_resolve_is_additive_across_calls() {
        let reg = DependencyRegistry::new();
        reg.pre_resolve_dependencies("g1", &["a".to_string()], &HashMap::new())
            .await
            .unwrap();
        reg.pre_resolve_dependencies("g1", &["b".to_string()], &HashMap::new())
            .await
            .unwrap();
        assert!(reg.get("g1", "a").await.is_ok());
        assert!(reg.get("g1", "b").await.is_ok());
    }

    #[tokio::test]
    async fn update_status_unknown_graph_fails() {
        let reg = DependencyRegistry::new();
        let err = reg
            .update_status("missing", "a", DependencyStatus::Completed, None, None)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::DependencyRegistryUninitialized);
    }

    #[tokio::test]
    async fn update_status_unknown_node_fails() {
        let reg = DependencyRegistry::new();
        reg.pre_resolve_dependencies("g1", &["a".to_string()], &HashMap::new())
            .await
            .unwrap();
        let err = reg
            .update_status("g1", "ghost", DependencyStatus::Completed, None, None)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::DependencyUnknownNode);
    }

    #[tokio::test]
    async fn update_status_stamps_completed_at_on_terminal() {
        let reg = DependencyRegistry::new();
        reg.pre_resolve_dependencies("g1", &["a".to_string()], &HashMap::new())
            .await
            .unwrap();
        reg.update_status("g1", "a", DependencyStatus::Completed, None, None)
            .await
            .unwrap();
        assert!(reg.get("g1", "a").await.unwrap().completed_at.is_some());
    }

    #[tokio::test]
    async fn are_all_ready_true_when_no_dependencies() {
        let reg = DependencyRegistry::new();
        reg.pre_resolve_dependencies("g1", &["a".to_string()], &HashMap::new())
            .await
            .unwrap();
        assert!(reg.are_all_ready("g1", "a").await.unwrap());
    }

    #[tokio::test]
    async fn are_all_ready_false_until_dependency_completes() {
        let reg = DependencyRegistry::new();
        let order = vec!["a".to_string(), "b".to_string()];
        let deps = deps_of(&[("b", &["a"])]);
        reg.pre_resolve_dependencies("g1", &order, &deps).await.unwrap();
        assert!(!reg.are_all_ready("g1", "b").await.unwrap());
        reg.update_status("g1", "a", DependencyStatus::Completed, None, None)
            .await
            .unwrap();
        assert!(reg.are_all_ready("g1", "b").await.unwrap());
    }

    #[tokio::test]
    async fn wait_for_returns_once_ready() {
        let reg = Arc::new(DependencyRegistry::new());
        let order = vec!["a".to_string(), "b".to_string()];
        let deps = deps_of(&[("b", &["a"])]);
        reg.pre_resolve_dependencies("g1", &order, &deps).await.unwrap();

        let reg2 = reg.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(20)).await;
            reg2.update_status("g1", "a", DependencyStatus::Completed, None, None)
                .await
                .unwrap();
        });

        let node = reg
            .wait_for("g1", "b", Duration::from_millis(500))
            .await
            .unwrap();
        assert_eq!(node.action_id, "b");
    }

    #[tokio::test]
    async fn wait_for_times_out() {
        let reg = DependencyRegistry::new();
        let order = vec!["a".to_string(), "b".to_string()];
        let deps = deps_of(&[("b", &["a"])]);
        reg.pre_resolve_dependencies("g1", &order, &deps).await.unwrap();
        let err = reg
            .wait_for("g1", "b", Duration::from_millis(50))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::DependencyWaitTimeout);
    }

    #[tokio::test]
    async fn status_summary_and_pending_reflect_state() {
        let reg = DependencyRegistry::new();
        let order = vec!["a".to_string(), "b".to_string()];
        reg.pre_resolve_dependencies("g1", &order, &HashMap::new())
            .await
            .unwrap();
        reg.update_status("g1", "a", DependencyStatus::Completed, None, None)
            .await
            .unwrap();
        let summary = reg.status_summary("g1").await.unwrap();
        assert_eq!(summary.get("a"), Some(&DependencyStatus::Completed));
        assert_eq!(reg.pending("g1").await.unwrap(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn callback_fires_after_status_update() {
        let reg = DependencyRegistry::new();
        reg.pre_resolve_dependencies("g1", &["a".to_string()], &HashMap::new())
            .await
            .unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        reg.register_callback(
            "g1",
            "a",
            Arc::new(move |_node| {
                calls2.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .await;
        reg.update_status("g1", "a", DependencyStatus::Completed, None, None)
            .await
            .unwrap();
        // Callbacks run in spawned tasks; yield so they get scheduled.
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn admission_allows_system_collections() {
        let reg = DependencyRegistry::new();
        assert!(reg.is_in_dependency_graph("g1", "@demo/greet:1.0.0").await);
    }

    #[tokio::test]
    async fn admission_permissive_when_graph_unseen() {
        let reg = DependencyRegistry::new();
        assert!(reg.is_in_dependency_graph("missing", "anything").await);
    }

    #[tokio::test]
    async fn admission_requires_registration_once_graph_is_populated() {
        let reg = DependencyRegistry::new();
        reg.pre_resolve_dependencies("g1", &["a".to_string()], &HashMap::new())
            .await
            .unwrap();
        assert!(reg.is_in_dependency_graph("g1", "a").await);
        assert!(!reg.is_in_dependency_graph("g1", "ghost").await);
    }
}
