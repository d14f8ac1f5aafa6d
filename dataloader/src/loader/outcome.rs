//! Outcome handling: store writes and error recovery.
//!
//! Every settled retrieval ends up here. A value is written into the store
//! (key by key for dump tasks) and recorded as a success. A failure is first
//! offered to the loader's [`ErrorHandler`]; a recovered value is treated like
//! any other success, anything else becomes a failed entry that aborts the load.

use super::collector::ResultEntry;
use crate::pipeline::{LoadContext, LoadTask, TaskOptions};
use dataloader_shared::TaskError;
use futures::future::BoxFuture;
use serde_json::Value;
use std::fmt;
use std::future::Future;

/// Failure details handed to the error handler.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskFailure {
    pub name: String,
    pub options: TaskOptions,
    pub error: TaskError,
}

/// Replacement value produced by an error handler.
pub enum Recovery {
    Value(Value),
    /// Recovery that completes later; rejecting it is an unrecovered failure.
    Pending(BoxFuture<'static, Result<Value, TaskError>>),
}

impl Recovery {
    pub fn value(value: impl Into<Value>) -> Self {
        Recovery::Value(value.into())
    }

    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = Result<Value, TaskError>> + Send + 'static,
    {
        Recovery::Pending(Box::pin(future))
    }
}

impl fmt::Debug for Recovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recovery::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Recovery::Pending(_) => f.write_str("Pending"),
        }
    }
}

/// Strategy deciding what happens to a failed task.
///
/// `Err` means the failure stands (with the returned error, which may differ
/// from the original). `Ok` recovers the task with a value.
pub trait ErrorHandler: Send + Sync {
    fn handle_error(&self, failure: &TaskFailure, task: &LoadTask) -> Result<Recovery, TaskError>;
}

/// Default handler: never recovers, re-raises the original error unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct RethrowHandler;

impl ErrorHandler for RethrowHandler {
    fn handle_error(&self, failure: &TaskFailure, _task: &LoadTask) -> Result<Recovery, TaskError> {
        Err(failure.error.clone())
    }
}

/// Error handler backed by a closure.
pub struct FnHandler<F>(F);

impl<F> ErrorHandler for FnHandler<F>
where
    F: Fn(&TaskFailure, &LoadTask) -> Result<Recovery, TaskError> + Send + Sync,
{
    fn handle_error(&self, failure: &TaskFailure, task: &LoadTask) -> Result<Recovery, TaskError> {
        (self.0)(failure, task)
    }
}

/// Wrap a closure as an [`ErrorHandler`].
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(&TaskFailure, &LoadTask) -> Result<Recovery, TaskError> + Send + Sync,
{
    FnHandler(f)
}

enum Write {
    Written(Value),
    /// The loader was disposed; nothing was written.
    Discarded,
    Invalid(TaskError),
}

/// Turn a settled retrieval into a result entry.
///
/// Returns `None` when the outcome arrived after disposal and was discarded.
pub(crate) async fn settle(
    ctx: &LoadContext,
    task: &LoadTask,
    retrieved: Result<Value, TaskError>,
) -> Option<ResultEntry> {
    let error = match retrieved {
        Ok(value) => match write(ctx, task, value) {
            Write::Written(value) => return Some(ResultEntry::succeeded(task, value)),
            Write::Discarded => return None,
            Write::Invalid(error) => error,
        },
        Err(error) => error,
    };

    if ctx.shared.inner.lock().state.is_disposed() {
        return None;
    }

    tracing::debug!(
        load_id = %ctx.load_id,
        task = %task.name,
        error = %error,
        "Task failed, invoking error handler"
    );

    let recovered = match recover(ctx, task, error).await {
        Ok(value) => value,
        Err(error) => {
            tracing::warn!(
                load_id = %ctx.load_id,
                task = %task.name,
                error = %error,
                "Task failed without recovery"
            );
            return Some(ResultEntry::failed(task, error));
        }
    };

    match write(ctx, task, recovered) {
        Write::Written(value) => {
            tracing::debug!(load_id = %ctx.load_id, task = %task.name, "Task recovered");
            Some(ResultEntry::succeeded(task, value))
        }
        Write::Discarded => None,
        Write::Invalid(error) => Some(ResultEntry::failed(task, error)),
    }
}

async fn recover(ctx: &LoadContext, task: &LoadTask, error: TaskError) -> Result<Value, TaskError> {
    let failure = TaskFailure {
        name: task.name.clone(),
        options: task.options(),
        error,
    };

    match ctx.handler.handle_error(&failure, task)? {
        Recovery::Value(value) => Ok(value),
        Recovery::Pending(future) => future.await,
    }
}

/// Write a value into the store, unless the loader is disposed.
///
/// The state lock is released before the store is called; a store may call
/// back into its loader.
fn write(ctx: &LoadContext, task: &LoadTask, value: Value) -> Write {
    if task.dump && !value.is_object() {
        return Write::Invalid(TaskError::NotAMapping(task.name.clone()));
    }

    if ctx.shared.inner.lock().state.is_disposed() {
        tracing::debug!(task = %task.name, "Discarding outcome that arrived after disposal");
        return Write::Discarded;
    }

    match value.as_object() {
        Some(map) if task.dump => {
            for (key, item) in map {
                ctx.store.set(key, item.clone());
            }
        }
        _ => ctx.store.set(&task.name, value.clone()),
    }

    Write::Written(value)
}
