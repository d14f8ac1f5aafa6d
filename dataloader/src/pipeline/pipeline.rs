//! Stage scheduler.
//!
//! Runs an execution plan stage by stage. Tasks inside a stage are driven
//! concurrently from a single future; each settled task goes through the
//! outcome handler in completion order, while results are reported in
//! registration order.

use super::metrics::{LoadMetrics, StageMetrics, TaskMetrics};
use super::stage::{Stage, group_stages};
use super::task::{LoadTask, Retrieval};
use crate::loader::cancel::AbortGuard;
use crate::loader::collector::{LoadFailure, ResultCollector, ResultEntry};
use crate::loader::outcome::{self, ErrorHandler};
use crate::loader::LoaderShared;
use crate::store::Store;
use dataloader_shared::TaskError;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use serde_json::Value;
use std::sync::Arc;
use tokio::time::Instant;

/// A task paired with its slot in registration order.
pub(crate) struct SlottedTask {
    pub slot: usize,
    pub task: Arc<LoadTask>,
}

pub(crate) struct ExecutionPlan {
    stages: Vec<Stage<SlottedTask>>,
    task_count: usize,
}

impl ExecutionPlan {
    /// Build a plan from tasks given in registration order.
    pub fn from_tasks(tasks: Vec<Arc<LoadTask>>) -> Self {
        let task_count = tasks.len();
        let slotted = tasks
            .into_iter()
            .enumerate()
            .map(|(slot, task)| SlottedTask { slot, task });

        Self {
            stages: group_stages(slotted, |slotted| slotted.task.stage),
            task_count,
        }
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn task_count(&self) -> usize {
        self.task_count
    }
}

/// Everything a running load needs besides the plan itself.
pub(crate) struct LoadContext {
    pub shared: Arc<LoaderShared>,
    pub store: Arc<dyn Store>,
    pub handler: Arc<dyn ErrorHandler>,
    pub load_id: String,
}

struct SettledTask {
    slot: usize,
    /// `None` when the outcome arrived after disposal and was discarded.
    entry: Option<ResultEntry>,
    metrics: TaskMetrics,
}

pub(crate) type LoadOutcome = Result<Vec<ResultEntry>, LoadFailure>;

/// Stage scheduler.
pub(crate) struct PipelineExecutor;

impl PipelineExecutor {
    /// Execute a plan to completion or to the first unrecovered failure.
    ///
    /// Stages run in ascending index order. An unrecovered failure stops the
    /// pipeline immediately: running siblings are dropped (which cancels their
    /// abort tokens) and later stages never start.
    pub async fn execute(plan: ExecutionPlan, ctx: &LoadContext) -> (LoadOutcome, LoadMetrics) {
        let total_start = Instant::now();
        let mut collector = ResultCollector::new(plan.task_count);
        let mut stage_metrics = Vec::with_capacity(plan.stages.len());
        let mut outcome = None;

        for stage in plan.stages {
            let index = stage.index;
            let stage_start = Instant::now();
            let mut task_metrics = Vec::with_capacity(stage.len());

            tracing::debug!(
                load_id = %ctx.load_id,
                stage = index,
                tasks = stage.len(),
                "Starting stage"
            );

            let mut running: FuturesUnordered<_> = stage
                .tasks
                .into_iter()
                .map(|slotted| run_task(slotted, ctx))
                .collect();

            while let Some(settled) = running.next().await {
                task_metrics.push(settled.metrics);

                let Some(entry) = settled.entry else {
                    outcome = Some(Err(LoadFailure::Disposed));
                    break;
                };

                let failed = !entry.success;
                collector.record(settled.slot, entry);

                if failed {
                    tracing::warn!(
                        load_id = %ctx.load_id,
                        stage = index,
                        remaining = running.len(),
                        "Unrecovered task failure, aborting load"
                    );
                    outcome = Some(Err(LoadFailure::TaskFailed {
                        results: collector.snapshot(),
                    }));
                    break;
                }
            }
            drop(running);

            stage_metrics.push(StageMetrics {
                index,
                duration_ms: stage_start.elapsed().as_millis(),
                tasks: task_metrics,
            });

            if outcome.is_some() {
                break;
            }
        }

        let metrics = LoadMetrics {
            total_duration_ms: total_start.elapsed().as_millis(),
            stages: stage_metrics,
        };

        let outcome = outcome.unwrap_or_else(|| Ok(collector.into_results()));
        (outcome, metrics)
    }
}

async fn run_task(slotted: SlottedTask, ctx: &LoadContext) -> SettledTask {
    let SlottedTask { slot, task } = slotted;
    let task_start = Instant::now();

    tracing::trace!(load_id = %ctx.load_id, task = %task.name, "Task started");

    let retrieved = retrieve(&task, ctx).await;
    let entry = outcome::settle(ctx, &task, retrieved).await;

    let metrics = TaskMetrics {
        name: task.name.clone(),
        duration_ms: task_start.elapsed().as_millis(),
        success: entry.as_ref().is_some_and(|entry| entry.success),
    };

    SettledTask {
        slot,
        entry,
        metrics,
    }
}

/// Invoke a task's retrieve function and wait for its value.
///
/// Synchronous and asynchronous failures come out the same way.
async fn retrieve(task: &LoadTask, ctx: &LoadContext) -> Result<Value, TaskError> {
    let retrieve = task
        .retrieve
        .as_ref()
        .ok_or_else(|| TaskError::NotCallable(task.name.clone()))?;

    match retrieve.retrieve()? {
        Retrieval::Ready(value) => Ok(value),
        Retrieval::Pending(pending) => {
            let (future, abort) = pending.into_parts();
            let mut guard = abort.map(|token| AbortGuard::register(&ctx.shared, token));
            let result = future.await;
            if let Some(guard) = guard.as_mut() {
                guard.disarm();
            }
            result
        }
    }
}
