use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

/// The request-lifetime session map, with an optional per-entry TTL.
///
/// A session with no explicit id (`enabled() == false`) means the workflow
/// has session support disabled by configuration — every lookup behaves as
/// an empty map, never an error.
#[derive(Clone)]
pub struct Session {
    id: Option<String>,
    ttl: Option<Duration>,
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl Session {
    /// No session scope — disabled by configuration.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            id: None,
            ttl: None,
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// A live session with an explicit id and optional entry TTL.
    #[must_use]
    pub fn new(id: impl Into<String>, ttl: Option<Duration>) -> Self {
        Self {
            id: Some(id.into()),
            ttl,
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// `true` if this session is active (not configuration-disabled).
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.id.is_some()
    }

    /// The session id, if active.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Fetch `key`, if set and not expired. An expired entry is treated as
    /// absent (lazily evicted on next write, not eagerly swept).
    pub async fn get(&self, key: &str) -> Option<Value> {
        if !self.enabled() {
            return None;
        }
        let entries = self.entries.read().await;
        let entry = entries.get(key)?;
        if entry.expires_at.is_some_and(|exp| Instant::now() >= exp) {
            return None;
        }
        Some(entry.value.clone())
    }

    /// Set `key -> value`, stamping the configured TTL if any. A no-op
    /// (values are simply dropped) when the session is disabled.
    pub async fn set(&self, key: impl Into<String>, value: Value) {
        if !self.enabled() {
            return;
        }
        let expires_at = self.ttl.map(|ttl| Instant::now() + ttl);
        self.entries
            .write()
            .await
            .insert(key.into(), Entry { value, expires_at });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_session_never_stores() {
        let session = Session::disabled();
        session.set("a", Value::from(1)).await;
        assert_eq!(session.get("a").await, None);
        assert!(!session.enabled());
    }

    #[tokio::test]
    async fn enabled_session_roundtrips() {
        let session = Session::new("sess-1", None);
        session.set("a", Value::from(1)).await;
        assert_eq!(session.get("a").await, Some(Value::from(1)));
        assert_eq!(session.id(), Some("sess-1"));
    }

    #[tokio::test]
    async fn entry_expires_after_ttl() {
        let session = Session::new("sess-1", Some(Duration::from_millis(10)));
        session.set("a", Value::from(1)).await;
        assert!(session.get("a").await.is_some());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(session.get("a").await.is_none());
    }
}
