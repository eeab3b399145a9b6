use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a node in the dependency graph.
///
/// Status only moves forward: `Pending` → `Processing` → (`Completed` |
/// `Error`). `Completed` and `Error` are terminal; there is no resurrection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyStatus {
    /// Registered but not yet picked up by the scheduler.
    Pending,
    /// Currently executing.
    Processing,
    /// Finished successfully; `result_data` is populated.
    Completed,
    /// Finished with a failure; `error` is populated.
    Error,
}

impl DependencyStatus {
    /// `true` for `Completed` or `Error` — no further transitions are valid.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// Whether transitioning from `self` to `next` is a legal forward move.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use DependencyStatus::{Completed, Error, Pending, Processing};
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Completed)
                | (Pending, Error)
                | (Processing, Completed)
                | (Processing, Error)
        )
    }
}

/// A single node in the dependency graph, tracking its own edges and
/// lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyData {
    /// The action this node represents.
    pub action_id: String,
    /// Actions that depend on this one completing.
    #[serde(default)]
    pub dependents: Vec<String>,
    /// Actions this one depends on.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Current lifecycle state.
    pub status: DependencyStatus,
    /// Result payload, populated on `Completed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_data: Option<serde_json::Value>,
    /// Error message, populated on `Error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When this node was created (pre-resolve time).
    pub timestamp: DateTime<Utc>,
    /// When this node reached a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl DependencyData {
    /// Create a fresh `Pending` node with no result recorded yet.
    #[must_use]
    pub fn new(
        action_id: impl Into<String>,
        dependencies: Vec<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            action_id: action_id.into(),
            dependents: Vec::new(),
            dependencies,
            status: DependencyStatus::Pending,
            result_data: None,
            error: None,
            timestamp,
            completed_at: None,
        }
    }

    /// `true` when every entry in `dependencies` names a node whose status
    /// is itself reported `Completed` by `is_ready`.
    #[must_use]
    pub fn is_ready<F>(&self, is_ready: F) -> bool
    where
        F: Fn(&str) -> bool,
    {
        self.dependencies.iter().all(|d| is_ready(d))
    }
}
