use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// The process-lifetime mutable key-value map. Shared across workflow
/// invocations via `Arc` — outlives any single [`crate::ExecutionContext`].
#[derive(Clone, Default)]
pub struct Memory {
    inner: Arc<RwLock<HashMap<String, Value>>>,
}

impl Memory {
    /// A fresh, empty memory map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch `key`, if set.
    pub async fn get(&self, key: &str) -> Option<Value> {
        self.inner.read().await.get(key).cloned()
    }

    /// Set `key -> value`.
    pub async fn set(&self, key: impl Into<String>, value: Value) {
        self.inner.write().await.insert(key.into(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_roundtrips() {
        let mem = Memory::new();
        mem.set("a", Value::from(1)).await;
        assert_eq!(mem.get("a").await, Some(Value::from(1)));
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let mem = Memory::new();
        assert_eq!(mem.get("a").await, None);
    }

    #[tokio::test]
    async fn clones_share_the_same_backing_map() {
        let mem = Memory::new();
        let clone = mem.clone();
        mem.set("a", Value::from(1)).await;
        assert_eq!(clone.get("a").await, Some(Value::from(1)));
    }
}
