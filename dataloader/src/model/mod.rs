//! Model - a store with an attached loader and a post-load prepare hook.
//!
//! Load flow:
//!
//! ```text
//! load()  ──→  DataLoader::load()  ──→  prepare()  ──→  results + "$prepare"
//! ```
//!
//! A loader failure is returned as is and `prepare` is skipped. A failing
//! `prepare` does not fail the load; it is reported in the `$prepare` entry.

use crate::loader::{DataLoader, LoadFailure, ResultEntry};
use crate::store::{MemoryStore, Store};
use async_trait::async_trait;
use dataloader_shared::{LoaderError, TaskError};
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;

/// Hook that adjusts loaded data before it is used.
#[async_trait]
pub trait PrepareHook: Send + Sync {
    async fn prepare(&self, store: &MemoryStore) -> Result<(), TaskError>;
}

/// Prepare hook that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPrepare;

#[async_trait]
impl PrepareHook for NoopPrepare {
    async fn prepare(&self, _store: &MemoryStore) -> Result<(), TaskError> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error(transparent)]
    Loader(#[from] LoaderError),

    #[error(transparent)]
    Load(#[from] LoadFailure),
}

/// Store plus the loader that fills it.
pub struct Model {
    store: Arc<MemoryStore>,
    loader: Option<DataLoader>,
    prepare: Arc<dyn PrepareHook>,
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("keys", &self.store.len())
            .field("loader", &self.loader)
            .finish()
    }
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

impl Model {
    pub fn new() -> Self {
        Self::with_context(Map::new())
    }

    /// Create a model whose store starts with `context`.
    pub fn with_context(context: Map<String, Value>) -> Self {
        Self {
            store: Arc::new(MemoryStore::with_context(context)),
            loader: None,
            prepare: Arc::new(NoopPrepare),
        }
    }

    pub fn with_prepare(mut self, prepare: impl PrepareHook + 'static) -> Self {
        self.prepare = Arc::new(prepare);
        self
    }

    /// Attach a loader; it is bound to this model's store.
    pub fn set_data_loader(&mut self, loader: DataLoader) {
        loader.bind_store(self.store.clone());
        self.loader = Some(loader);
    }

    pub fn data_loader(&self) -> Option<&DataLoader> {
        self.loader.as_ref()
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.store.get(key)
    }

    pub fn set(&self, key: &str, value: Value) {
        self.store.set(key, value);
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.store.remove(key)
    }

    pub fn fill(&self, values: Map<String, Value>) {
        self.store.fill(values);
    }

    /// Load data, then run the prepare hook.
    ///
    /// Without a loader only `prepare` runs and the result holds just the
    /// `$prepare` entry.
    pub async fn load(&self) -> Result<Vec<ResultEntry>, ModelError> {
        let results = match &self.loader {
            Some(loader) => loader.load()?.await?,
            None => Vec::new(),
        };

        Ok(self.forward_to_prepare(results).await)
    }

    async fn forward_to_prepare(&self, mut results: Vec<ResultEntry>) -> Vec<ResultEntry> {
        let outcome = self.prepare.prepare(&self.store).await;
        if let Err(e) = &outcome {
            tracing::warn!(error = %e, "Prepare hook failed");
        }
        results.push(ResultEntry::prepare(outcome));
        results
    }

    /// Dispose the attached loader, stopping any load in progress.
    pub fn dispose(&self) {
        if let Some(loader) = &self.loader {
            loader.dispose();
        }
    }
}
