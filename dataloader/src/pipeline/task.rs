//! Retrieval abstraction for load tasks.

use dataloader_shared::TaskError;
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A zero-argument retrieval producing a value for the store.
///
/// Returning `Err` is the synchronous failure path; it is handled exactly like
/// a pending retrieval that later rejects.
pub trait Retrieve: Send + Sync {
    fn retrieve(&self) -> Result<Retrieval, TaskError>;
}

impl<F> Retrieve for F
where
    F: Fn() -> Result<Retrieval, TaskError> + Send + Sync,
{
    fn retrieve(&self) -> Result<Retrieval, TaskError> {
        self()
    }
}

pub type RetrieveFn = Arc<dyn Retrieve>;

/// What a retrieve function hands back.
pub enum Retrieval {
    /// Value available immediately.
    Ready(Value),
    /// Value arrives later.
    Pending(PendingValue),
}

impl Retrieval {
    pub fn ready(value: impl Into<Value>) -> Self {
        Retrieval::Ready(value.into())
    }

    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = Result<Value, TaskError>> + Send + 'static,
    {
        Retrieval::Pending(PendingValue::new(future))
    }
}

impl fmt::Debug for Retrieval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Retrieval::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            Retrieval::Pending(pending) => f.debug_tuple("Pending").field(pending).finish(),
        }
    }
}

/// A value that is still being produced.
///
/// The optional cancellation token is the cooperative abort affordance: the
/// loader cancels it on disposal, and the producer decides whether to stop.
pub struct PendingValue {
    future: BoxFuture<'static, Result<Value, TaskError>>,
    abort: Option<CancellationToken>,
}

impl PendingValue {
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = Result<Value, TaskError>> + Send + 'static,
    {
        Self {
            future: Box::pin(future),
            abort: None,
        }
    }

    /// Attach a token the loader cancels when the work is no longer wanted.
    pub fn abortable(mut self, token: CancellationToken) -> Self {
        self.abort = Some(token);
        self
    }

    /// Capability check: does this pending value accept cancellation?
    pub fn abort_handle(&self) -> Option<&CancellationToken> {
        self.abort.as_ref()
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        BoxFuture<'static, Result<Value, TaskError>>,
        Option<CancellationToken>,
    ) {
        (self.future, self.abort)
    }
}

impl fmt::Debug for PendingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingValue")
            .field("abortable", &self.abort.is_some())
            .finish()
    }
}

impl From<PendingValue> for Retrieval {
    fn from(pending: PendingValue) -> Self {
        Retrieval::Pending(pending)
    }
}

/// Retrieve that always yields the same value.
pub fn value(value: impl Into<Value>) -> RetrieveFn {
    let value = value.into();
    Arc::new(move || -> Result<Retrieval, TaskError> { Ok(Retrieval::Ready(value.clone())) })
}

/// Retrieve backed by a closure that decides between ready and pending itself.
pub fn from_retrieval<F>(f: F) -> RetrieveFn
where
    F: Fn() -> Result<Retrieval, TaskError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Retrieve backed by a synchronous closure.
pub fn from_fn<F>(f: F) -> RetrieveFn
where
    F: Fn() -> Result<Value, TaskError> + Send + Sync + 'static,
{
    Arc::new(move || f().map(Retrieval::Ready))
}

/// Retrieve backed by an async closure, invoked once per load.
pub fn from_async<F, Fut>(f: F) -> RetrieveFn
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, TaskError>> + Send + 'static,
{
    Arc::new(move || -> Result<Retrieval, TaskError> { Ok(Retrieval::pending(f())) })
}

/// Options echoed back in every result entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskOptions {
    pub name: String,
    pub dump: bool,
    pub stage: usize,
}

/// A normalized, immutable unit of loading work.
pub struct LoadTask {
    pub name: String,
    /// `None` when the caller supplied nothing callable.
    pub retrieve: Option<RetrieveFn>,
    pub dump: bool,
    pub stage: usize,
    pub registration_order: usize,
}

impl LoadTask {
    pub fn options(&self) -> TaskOptions {
        TaskOptions {
            name: self.name.clone(),
            dump: self.dump,
            stage: self.stage,
        }
    }

    /// Human-readable task name for logging.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for LoadTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadTask")
            .field("name", &self.name)
            .field("callable", &self.retrieve.is_some())
            .field("dump", &self.dump)
            .field("stage", &self.stage)
            .field("registration_order", &self.registration_order)
            .finish()
    }
}
