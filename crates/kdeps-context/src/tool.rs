use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Tool-call argument storage, keyed `(tool name, argument name)`.
///
/// A dedicated scope rather than double-writing into [`crate::Memory`] —
/// tool arguments are request-local and should not leak into or be shadowed
/// by the general-purpose memory map.
#[derive(Clone, Default)]
pub struct Tool {
    args: Arc<RwLock<HashMap<(String, String), Value>>>,
}

impl Tool {
    /// An empty tool-argument scope.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an argument value for `(name, arg)`.
    pub async fn set(&self, name: impl Into<String>, arg: impl Into<String>, value: Value) {
        self.args
            .write()
            .await
            .insert((name.into(), arg.into()), value);
    }

    /// `tool(name, arg)` lookup.
    pub async fn get(&self, name: &str, arg: &str) -> Option<Value> {
        self.args
            .read()
            .await
            .get(&(name.to_string(), arg.to_string()))
            .cloned()
    }
}
