//! Key/value storage seam behind the state partitions.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::error::Result;

/// Persistence backend for state partitions. Values are JSON documents.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn read(&self, key: &str) -> Result<Option<Value>>;

    async fn write(&self, key: &str, value: Value) -> Result<()>;

    /// Remove `key` only while it still holds `expected`.
    ///
    /// Returns `false` when the key is missing or was overwritten since
    /// `expected` was read. The compare and the removal must be atomic.
    async fn delete_if_unchanged(&self, key: &str, expected: &Value) -> Result<bool>;
}

/// Process-local storage. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryStorage {
    items: DashMap<String, Value>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.items.contains_key(key)
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn read(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.items.get(key).map(|entry| entry.value().clone()))
    }

    async fn write(&self, key: &str, value: Value) -> Result<()> {
        self.items.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete_if_unchanged(&self, key: &str, expected: &Value) -> Result<bool> {
        Ok(self.items.remove_if(key, |_, v| v == expected).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_storage_read_write_delete() {
        let storage = MemoryStorage::new();
        assert!(storage.read("k").await.unwrap().is_none());

        storage.write("k", json!({"a": 1})).await.unwrap();
        assert_eq!(storage.read("k").await.unwrap(), Some(json!({"a": 1})));
        assert_eq!(storage.len(), 1);

        assert!(storage.delete_if_unchanged("k", &json!({"a": 1})).await.unwrap());
        assert!(storage.is_empty());
        assert!(!storage.delete_if_unchanged("k", &json!({"a": 1})).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_skips_overwritten_value() {
        let storage = MemoryStorage::new();
        storage.write("k", json!({"step": 1})).await.unwrap();
        let seen = storage.read("k").await.unwrap().unwrap();

        storage.write("k", json!({"step": 0})).await.unwrap();
        assert!(!storage.delete_if_unchanged("k", &seen).await.unwrap());
        assert_eq!(storage.read("k").await.unwrap(), Some(json!({"step": 0})));
    }
}
