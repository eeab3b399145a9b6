use kdeps_error::{Error, ErrorCode};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// The generic nested key-value space: `graphID -> collection -> key ->
/// value`. Values are opaque JSON-encoded text — this layer never inspects
/// them.
#[derive(Default)]
pub struct KvStore {
    graphs: RwLock<HashMap<String, HashMap<String, HashMap<String, String>>>>,
}

impl KvStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert `key -> value` in `collection` under `graph_id`. Returns the
    /// stored (JSON-encoded) value.
    pub async fn set(
        &self,
        graph_id: &str,
        collection: &str,
        key: &str,
        value: &str,
    ) -> Result<String, Error> {
        let mut graphs = self.graphs.write().await;
        graphs
            .entry(graph_id.to_string())
            .or_default()
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(value.to_string())
    }

    /// Fetch `key` from `collection`. A missing collection is an error; a
    /// missing key within an existing collection returns the JSON literal
    /// `"null"`, not an error.
    pub async fn get(&self, graph_id: &str, collection: &str, key: &str) -> Result<String, Error> {
        let graphs = self.graphs.read().await;
        let bucket = graphs
            .get(graph_id)
            .and_then(|collections| collections.get(collection))
            .ok_or_else(|| {
                Error::new(ErrorCode::StoreMissingCollection, "collection has no entries")
                    .with_context("graph_id", graph_id)
                    .with_context("collection", collection)
            })?;
        Ok(bucket
            .get(key)
            .cloned()
            .unwrap_or_else(|| "null".to_string()))
    }

    /// List every key present in `collection`. A missing collection is an
    /// error.
    pub async fn list(&self, graph_id: &str, collection: &str) -> Result<Vec<String>, Error> {
        let graphs = self.graphs.read().await;
        let bucket = graphs
            .get(graph_id)
            .and_then(|collections| collections.get(collection))
            .ok_or_else(|| {
                Error::new(ErrorCode::StoreMissingCollection, "collection has no entries")
                    .with_context("graph_id", graph_id)
                    .with_context("collection", collection)
            })?;
        let mut keys: Vec<String> = bucket.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_roundtrips() {
        let store = KvStore::new();
        store.set("g1", "@demo:1.0.0", "name", "\"alice\"").await.unwrap();
        assert_eq!(
            store.get("g1", "@demo:1.0.0", "name").await.unwrap(),
            "\"alice\""
        );
    }

    #[tokio::test]
    async fn missing_key_returns_null_literal_not_error() {
        let store = KvStore::new();
        store.set("g1", "@demo:1.0.0", "name", "1").await.unwrap();
        assert_eq!(store.get("g1", "@demo:1.0.0", "other").await.unwrap(), "null");
    }

    #[tokio::test]
    async fn missing_collection_is_an_error() {
        let store = KvStore::new();
        let err = store.get("g1", "@nope:1.0.0", "k").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::StoreMissingCollection);
    }

    #[tokio::test]
    async fn list_returns_sorted_keys() {
        let store = KvStore::new();
        store.set("g1", "c", "b", "1").await.unwrap();
        store.set("g1", "c", "a", "2").await.unwrap();
        assert_eq!(store.list("g1", "c").await.unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn list_missing_collection_is_an_error() {
        let store = KvStore::new();
        assert!(store.list("g1", "c").await.is_err());
    }

    #[tokio::test]
    async fn graphs_are_isolated() {
        let store = KvStore::new();
        store.set("g1", "c", "k", "1").await.unwrap();
        let err = store.get("g2", "c", "k").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::StoreMissingCollection);
    }

    #[tokio::test]
    async fn set_is_an_upsert() {
        let store = KvStore::new();
        store.set("g1", "c", "k", "1").await.unwrap();
        store.set("g1", "c", "k", "2").await.unwrap();
        assert_eq!(store.get("g1", "c", "k").await.unwrap(), "2");
    }
}
