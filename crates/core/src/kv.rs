//! Key-value store contract used for engagement attribution: mapping a
//! mail provider's message id back to the step and contact that sent it.

use std::sync::Arc;

use dashmap::DashMap;

/// Trait for a flat string key-value store.
pub trait KeyValueStore: Send + Sync {
    fn set(&self, key: &str, value: &str);
    fn get(&self, key: &str) -> Option<String>;
}

/// DashMap-backed store for tests and single-process deployments.
#[derive(Default)]
pub struct InMemoryKeyValueStore {
    entries: DashMap<String, String>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for InMemoryKeyValueStore {
    fn set(&self, key: &str, value: &str) {
        self.entries.insert(key.to_string(), value.to_string());
    }

    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|v| v.clone())
    }
}

/// Convenience: an in-memory store for tests.
pub fn memory_kv() -> Arc<InMemoryKeyValueStore> {
    Arc::new(InMemoryKeyValueStore::new())
}
