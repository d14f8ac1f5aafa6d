//! Staged, cancellable loading of named data into a key/value store.
//!
//! Work is registered as named tasks grouped into stages. Stages run one after
//! another; tasks inside a stage run concurrently. Each resolved value is
//! written to the bound [`Store`], and a failing task can be recovered through
//! an [`ErrorHandler`]. Results are reported in registration order.
//!
//! ```no_run
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use dataloader::{DataLoader, LoadConfig, MemoryStore, retrieve};
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new());
//! let loader = DataLoader::new();
//! loader.bind_store(store.clone());
//!
//! loader.register(LoadConfig::single("user", retrieve::value("ada")), None)?;
//! loader.register(
//!     LoadConfig::single("feed", retrieve::from_async(|| async { Ok(serde_json::json!([1, 2])) })),
//!     None,
//! )?;
//!
//! let results = loader.load()?.await?;
//! assert_eq!(results.len(), 2);
//! # Ok(())
//! # }
//! ```

pub mod loader;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod plan;
pub mod store;

/// Constructors for retrieve functions.
pub mod retrieve {
    pub use crate::pipeline::{
        PendingValue, Retrieval, Retrieve, RetrieveFn, from_async, from_fn, from_retrieval, value,
    };
}

pub use dataloader_shared::{LoaderError, LoaderResult, TaskError};
pub use loader::{
    ANONYMOUS_TASK_NAME, DataLoader, ErrorHandler, LoadConfig, LoadFailure, LoaderOptions,
    LoaderState, PREPARE_ENTRY_NAME, Recovery, ResultEntry, RethrowHandler, TaskFailure, TaskMap,
    TaskSpec, handler_fn,
};
pub use logging::{LoggingOptions, init_logging};
pub use model::{Model, ModelError, NoopPrepare, PrepareHook};
pub use pipeline::{LoadMetrics, LoadTask, TaskOptions};
pub use plan::{Plan, PlanStep};
pub use store::{MemoryStore, Store};
