//! Staged task execution.
//!
//! This module provides the scheduling half of the loader:
//! - Grouping of tasks into stages by index
//! - Sequential execution between stages, concurrent execution inside one
//! - Per-task and per-stage timing
//!
//! ## Architecture
//!
//! ```text
//! ExecutionPlan → Stages → Tasks
//!
//! - ExecutionPlan: Tasks in registration order, grouped into stages
//! - Stage: Tasks sharing an index; all run concurrently
//! - Task: One retrieve function and where its value goes
//! ```
//!
//! A stage starts only after every task of the previous stage has settled.
//! The first unrecovered failure ends the whole run.

mod metrics;
#[allow(clippy::module_inception)]
mod pipeline;
mod stage;
mod task;

pub use metrics::{LoadMetrics, StageMetrics, TaskMetrics};
pub(crate) use pipeline::{ExecutionPlan, LoadContext, PipelineExecutor};
pub use stage::{Stage, group_stages};
pub use task::{
    LoadTask, PendingValue, Retrieval, Retrieve, RetrieveFn, TaskOptions, from_async, from_fn,
    from_retrieval, value,
};
