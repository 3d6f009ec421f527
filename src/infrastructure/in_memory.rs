use crate::domain::ports::{StateStore, StateStoreRef};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory key-value store.
///
/// State lives as long as the store; cloning shares the same map. Used in
/// tests and whenever process recreation does not need to be survived.
#[derive(Default, Clone)]
pub struct InMemoryStateStore {
    entries: Arc<RwLock<HashMap<String, Value>>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let entries = self.entries.read().await;
        Ok(entries.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Value) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_owned(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.remove(key);
        Ok(())
    }
}

/// Prefixes every key with a scope so several components can share one store.
#[derive(Clone)]
pub struct ScopedStateStore {
    inner: StateStoreRef,
    scope: String,
}

impl ScopedStateStore {
    pub fn new(inner: StateStoreRef, scope: impl Into<String>) -> Self {
        Self {
            inner,
            scope: scope.into(),
        }
    }

    fn scoped(&self, key: &str) -> String {
        format!("{}/{}", self.scope, key)
    }
}

#[async_trait]
impl StateStore for ScopedStateStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.inner.get(&self.scoped(key)).await
    }

    async fn put(&self, key: &str, value: Value) -> Result<()> {
        self.inner.put(&self.scoped(key), value).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.inner.remove(&self.scoped(key)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_in_memory_state_store() {
        let store = InMemoryStateStore::new();
        store.put("PAYMENT_DATA_KEY", json!("pd")).await.unwrap();

        assert_eq!(store.get("PAYMENT_DATA_KEY").await.unwrap(), Some(json!("pd")));
        assert!(store.get("ACTION_KEY").await.unwrap().is_none());

        store.remove("PAYMENT_DATA_KEY").await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_scoped_stores_do_not_collide() {
        let shared = InMemoryStateStore::new();
        let a = ScopedStateStore::new(Arc::new(shared.clone()), "await");
        let b = ScopedStateStore::new(Arc::new(shared.clone()), "qr");

        a.put("IS_POLLING_KEY", json!(true)).await.unwrap();
        assert!(b.get("IS_POLLING_KEY").await.unwrap().is_none());
        assert_eq!(shared.get("await/IS_POLLING_KEY").await.unwrap(), Some(json!(true)));
    }

    #[tokio::test]
    async fn test_typed_access() {
        let store: StateStoreRef = Arc::new(InMemoryStateStore::new());
        store.put_as("IS_FLOW_TAKEN_OVER_KEY", &true).await.unwrap();

        let taken_over: Option<bool> = store.get_as("IS_FLOW_TAKEN_OVER_KEY").await.unwrap();
        assert_eq!(taken_over, Some(true));
        let missing: Option<String> = store.get_as("SESSION_DATA_KEY").await.unwrap();
        assert_eq!(missing, None);
    }
}
