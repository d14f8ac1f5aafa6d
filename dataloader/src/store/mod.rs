//! Key/value store populated by the loader.
//!
//! The loader only ever writes through [`Store::set`]; it never creates or
//! destroys the store it is bound to.

use parking_lot::RwLock;
use serde_json::{Map, Value};

/// Key/value sink a loader writes into.
pub trait Store: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;

    fn set(&self, key: &str, value: Value);
}

/// In-memory store backed by an insertion-ordered JSON object.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<Map<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with initial data.
    pub fn with_context(context: Map<String, Value>) -> Self {
        Self {
            data: RwLock::new(context),
        }
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.data.write().remove(key)
    }

    /// Copy every pair of `values` into the store.
    pub fn fill(&self, values: Map<String, Value>) {
        self.data.write().extend(values);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    pub fn clear(&self) {
        self.data.write().clear();
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> Map<String, Value> {
        self.data.read().clone()
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.data.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) {
        self.data.write().insert(key.to_string(), value);
    }
}
