use crate::platform::{KeyValueStore, PlatformError, PlatformResult};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Process-local key-value store.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sorted snapshot of stored keys.
    pub fn keys(&self) -> Vec<String> {
        self.entries
            .lock()
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn with_entries<T>(
        &self,
        operation: &str,
        f: impl FnOnce(&mut BTreeMap<String, String>) -> T,
    ) -> PlatformResult<T> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| PlatformError::new(operation, "memory store lock poisoned"))?;
        Ok(f(&mut entries))
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> PlatformResult<Option<String>> {
        self.with_entries("kv_get", |entries| entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> PlatformResult<()> {
        self.with_entries("kv_set", |entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    async fn remove(&self, key: &str) -> PlatformResult<()> {
        self.with_entries("kv_remove", |entries| {
            entries.remove(key);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryKeyValueStore;
    use crate::platform::KeyValueStore;

    #[tokio::test]
    async fn set_get_remove() {
        let store = MemoryKeyValueStore::new();
        assert_eq!(store.get("a").await.expect("get"), None);
        store.set("a", "1").await.expect("set");
        store.set("a", "2").await.expect("overwrite");
        assert_eq!(store.get("a").await.expect("get").as_deref(), Some("2"));
        store.remove("a").await.expect("remove");
        store.remove("a").await.expect("remove missing");
        assert!(store.keys().is_empty());
    }
}
