//! Data loader - staged loading of named tasks into a store.
//!
//! ## Architecture
//!
//! - `registry`: Normalizes caller configuration into load tasks
//! - `outcome`: Store writes and error recovery for settled tasks
//! - `collector`: Result entries, reported in registration order
//! - `cancel`: Abort tokens of pending retrievals
//!
//! Scheduling itself lives in [`crate::pipeline`].
//!
//! ## Lifecycle
//!
//! ```text
//! Active ──dispose()──→ Disposed
//! ```
//!
//! Registration and loading are only possible while Active. Disposal cancels
//! pending retrievals that accept cancellation and discards any outcome that
//! arrives afterwards.

pub(crate) mod cancel;
pub(crate) mod collector;
pub(crate) mod outcome;
mod registry;

pub use collector::{LoadFailure, PREPARE_ENTRY_NAME, ResultEntry};
pub use outcome::{ErrorHandler, FnHandler, Recovery, RethrowHandler, TaskFailure, handler_fn};
pub use registry::{ANONYMOUS_TASK_NAME, LoadConfig, TaskMap, TaskSpec};

use crate::pipeline::{ExecutionPlan, LoadContext, LoadMetrics, PipelineExecutor};
use crate::store::Store;
use cancel::InFlight;
use dataloader_shared::{LoaderError, LoaderResult};
use parking_lot::Mutex;
use registry::TaskRegistry;
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Loader lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderState {
    Active,
    Disposed,
}

impl LoaderState {
    pub fn is_disposed(&self) -> bool {
        matches!(self, LoaderState::Disposed)
    }
}

/// Loader configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoaderOptions {
    /// Shown in log spans to tell loaders apart.
    pub label: Option<String>,
}

/// State shared between a loader and its running loads.
pub(crate) struct LoaderShared {
    pub(crate) inner: Mutex<LoaderInner>,
    /// Cancelled exactly once, on disposal.
    disposed: CancellationToken,
    options: LoaderOptions,
}

pub(crate) struct LoaderInner {
    pub(crate) state: LoaderState,
    registry: TaskRegistry,
    store: Option<Arc<dyn Store>>,
    handler: Arc<dyn ErrorHandler>,
    pub(crate) in_flight: InFlight,
    last_metrics: Option<LoadMetrics>,
}

/// Staged data loader.
///
/// Register tasks, bind a store, then `load()`. Tasks registered by separate
/// calls without a stage run one call after another; tasks sharing a stage
/// run concurrently.
///
/// **Cloning**: cheap, all clones share the same registry and state.
///
/// # Example
///
/// ```no_run
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// use dataloader::{DataLoader, LoadConfig, MemoryStore, retrieve};
/// use std::sync::Arc;
///
/// let store = Arc::new(MemoryStore::new());
/// let loader = DataLoader::new();
/// loader.bind_store(store.clone());
/// loader.register(LoadConfig::single("user", retrieve::value("ada")), None)?;
///
/// let results = loader.load()?.await?;
/// assert!(results[0].success);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DataLoader {
    shared: Arc<LoaderShared>,
}

impl std::fmt::Debug for DataLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.shared.inner.lock();
        f.debug_struct("DataLoader")
            .field("label", &self.shared.options.label)
            .field("state", &inner.state)
            .field("tasks", &inner.registry.len())
            .finish()
    }
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLoader {
    pub fn new() -> Self {
        Self::with_options(LoaderOptions::default())
    }

    pub fn with_options(options: LoaderOptions) -> Self {
        Self {
            shared: Arc::new(LoaderShared {
                inner: Mutex::new(LoaderInner {
                    state: LoaderState::Active,
                    registry: TaskRegistry::default(),
                    store: None,
                    handler: Arc::new(RethrowHandler),
                    in_flight: InFlight::default(),
                    last_metrics: None,
                }),
                disposed: CancellationToken::new(),
                options,
            }),
        }
    }

    /// Builder-style variant of [`DataLoader::set_error_handler`].
    pub fn with_error_handler(self, handler: impl ErrorHandler + 'static) -> Self {
        self.set_error_handler(handler);
        self
    }

    /// Replace the strategy consulted when a task fails.
    ///
    /// Applies to loads started after the call.
    pub fn set_error_handler(&self, handler: impl ErrorHandler + 'static) {
        self.shared.inner.lock().handler = Arc::new(handler);
    }

    /// Bind the store that successful tasks write into.
    pub fn bind_store(&self, store: Arc<dyn Store>) {
        self.shared.inner.lock().store = Some(store);
    }

    pub fn store(&self) -> Option<Arc<dyn Store>> {
        self.shared.inner.lock().store.clone()
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.shared.options
    }

    pub fn state(&self) -> LoaderState {
        self.shared.inner.lock().state
    }

    pub fn is_disposed(&self) -> bool {
        self.state().is_disposed()
    }

    /// Number of registered tasks.
    pub fn task_count(&self) -> usize {
        self.shared.inner.lock().registry.len()
    }

    /// Timings of the most recent load that ran to an end.
    pub fn last_metrics(&self) -> Option<LoadMetrics> {
        self.shared.inner.lock().last_metrics.clone()
    }

    /// Register tasks.
    ///
    /// Without `stage`, the tasks form a new stage that runs after everything
    /// registered so far. With `stage`, they join that stage and run
    /// concurrently with its other tasks.
    ///
    /// # Errors
    ///
    /// Returns `LoaderError::Disposed` after [`DataLoader::dispose`], and
    /// `LoaderError::Config` when an unstaged call finds no stage index left
    /// above the highest one in use.
    pub fn register(&self, config: impl Into<LoadConfig>, stage: Option<usize>) -> LoaderResult<()> {
        let mut inner = self.shared.inner.lock();
        if inner.state.is_disposed() {
            return Err(LoaderError::Disposed);
        }

        let stage = inner.registry.register(config.into(), stage)?;
        tracing::debug!(
            label = ?self.shared.options.label,
            stage,
            tasks = inner.registry.len(),
            "Registered load configuration"
        );

        Ok(())
    }

    /// Start loading every registered task.
    ///
    /// The returned future fulfils with one entry per task in registration
    /// order, or fails with [`LoadFailure::TaskFailed`] carrying the entries
    /// recorded up to the first unrecovered failure. Disposal while it runs
    /// makes it fail with [`LoadFailure::Disposed`].
    ///
    /// # Errors
    ///
    /// Fails synchronously with `LoaderError::Disposed` after disposal and
    /// with `LoaderError::StoreNotBound` when no store was bound.
    pub fn load(
        &self,
    ) -> LoaderResult<impl Future<Output = Result<Vec<ResultEntry>, LoadFailure>> + Send + 'static>
    {
        let (tasks, store, handler) = {
            let inner = self.shared.inner.lock();
            if inner.state.is_disposed() {
                return Err(LoaderError::Disposed);
            }
            let store = inner.store.clone().ok_or(LoaderError::StoreNotBound)?;
            (inner.registry.snapshot(), store, Arc::clone(&inner.handler))
        };

        let load_id = uuid::Uuid::new_v4().to_string();
        let plan = ExecutionPlan::from_tasks(tasks);
        let span = tracing::debug_span!(
            "load",
            load_id = %load_id,
            label = ?self.shared.options.label
        );

        tracing::debug!(
            parent: &span,
            stages = plan.stage_count(),
            tasks = plan.task_count(),
            "Starting load"
        );

        let ctx = LoadContext {
            shared: Arc::clone(&self.shared),
            store,
            handler,
            load_id,
        };

        Ok(run_load(plan, ctx).instrument(span))
    }

    /// Dispose the loader.
    ///
    /// Further `register`/`load` calls fail. Pending retrievals with an abort
    /// token are cancelled; outcomes that still arrive are discarded. Calling
    /// this more than once has no further effect.
    pub fn dispose(&self) {
        let tokens = {
            let mut inner = self.shared.inner.lock();
            if inner.state.is_disposed() {
                return;
            }
            inner.state = LoaderState::Disposed;
            inner.in_flight.drain()
        };

        tracing::debug!(
            label = ?self.shared.options.label,
            pending = tokens.len(),
            "Disposing data loader"
        );

        self.shared.disposed.cancel();
        for token in tokens {
            token.cancel();
        }
    }

    #[cfg(test)]
    pub(crate) fn shared(&self) -> &Arc<LoaderShared> {
        &self.shared
    }
}

async fn run_load(plan: ExecutionPlan, ctx: LoadContext) -> Result<Vec<ResultEntry>, LoadFailure> {
    let disposed = ctx.shared.disposed.clone();

    let (outcome, metrics) = tokio::select! {
        biased;
        _ = disposed.cancelled() => {
            tracing::debug!(load_id = %ctx.load_id, "Load interrupted by disposal");
            return Err(LoadFailure::Disposed);
        }
        run = PipelineExecutor::execute(plan, &ctx) => run,
    };

    metrics.log_stages(&ctx.load_id);
    ctx.shared.inner.lock().last_metrics = Some(metrics);

    outcome
}
