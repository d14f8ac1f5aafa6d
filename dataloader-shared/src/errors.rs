//! Error taxonomy for data loading.
//!
//! Two families:
//! - [`LoaderError`]: raised synchronously by `register`/`load` for structurally
//!   invalid input or for calls made after disposal. Never delivered through a
//!   load future.
//! - [`TaskError`]: a single task's failure, either from its retrieve function or
//!   re-raised by the error handler. Travels inside result entries.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Synchronous loader failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoaderError {
    /// Top-level configuration has an unacceptable shape.
    #[error("invalid load configuration: {0}")]
    Config(String),

    /// The loader has been disposed and accepts no further work.
    #[error("data loader is disposed")]
    Disposed,

    /// `load` was called before a store was bound.
    #[error("no store bound to data loader")]
    StoreNotBound,

    /// Unexpected failure inside the loader or its setup.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Failure of a single load task.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum TaskError {
    /// The retrieve function (or an error handler) failed with a value.
    #[error("rejected with {0}")]
    Rejected(Value),

    /// The task has no callable retrieve function.
    #[error("task '{0}' has no callable retrieve function")]
    NotCallable(String),

    /// A dump task resolved to something other than a mapping.
    #[error("task '{0}' is marked dump but did not resolve to a mapping")]
    NotAMapping(String),

    /// The pending retrieval was cancelled before it settled.
    #[error("task '{0}' was aborted")]
    Aborted(String),

    /// Free-form failure, e.g. from a prepare hook.
    #[error("{0}")]
    Other(String),
}

impl TaskError {
    /// Rejection carrying an arbitrary JSON payload.
    pub fn rejected(payload: impl Into<Value>) -> Self {
        TaskError::Rejected(payload.into())
    }

    pub fn other(message: impl Into<String>) -> Self {
        TaskError::Other(message.into())
    }
}

pub type LoaderResult<T> = Result<T, LoaderError>;
