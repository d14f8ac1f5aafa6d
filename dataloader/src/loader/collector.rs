//! Result entries and their collection in registration order.

use crate::pipeline::{LoadTask, TaskOptions};
use dataloader_shared::TaskError;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Name of the synthetic entry appended by the lifecycle wrapper.
pub const PREPARE_ENTRY_NAME: &str = "$prepare";

/// Outcome of one task, as reported to the caller of `load`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultEntry {
    pub name: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    pub options: TaskOptions,
}

impl ResultEntry {
    pub(crate) fn succeeded(task: &LoadTask, value: Value) -> Self {
        Self {
            name: task.name.clone(),
            success: true,
            value: Some(value),
            error: None,
            options: task.options(),
        }
    }

    pub(crate) fn failed(task: &LoadTask, error: TaskError) -> Self {
        Self {
            name: task.name.clone(),
            success: false,
            value: None,
            error: Some(error),
            options: task.options(),
        }
    }

    /// Entry describing the post-load prepare hook.
    pub fn prepare(outcome: Result<(), TaskError>) -> Self {
        let (success, error) = match outcome {
            Ok(()) => (true, None),
            Err(e) => (false, Some(e)),
        };
        Self {
            name: PREPARE_ENTRY_NAME.to_string(),
            success,
            value: None,
            error,
            options: TaskOptions::default(),
        }
    }
}

/// Why a load did not fulfil.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoadFailure {
    /// A task failed and the error handler did not recover it.
    ///
    /// `results` holds every entry recorded up to and including the failure,
    /// in registration order.
    #[error("load aborted: {}", describe_failures(.results))]
    TaskFailed { results: Vec<ResultEntry> },

    /// The loader was disposed while the load was running.
    #[error("data loader was disposed during load")]
    Disposed,
}

impl LoadFailure {
    /// Entries accumulated before the load stopped.
    pub fn results(&self) -> &[ResultEntry] {
        match self {
            LoadFailure::TaskFailed { results } => results,
            LoadFailure::Disposed => &[],
        }
    }

    /// First entry that failed, if any.
    pub fn failed_entry(&self) -> Option<&ResultEntry> {
        self.results().iter().find(|entry| !entry.success)
    }
}

fn describe_failures(results: &[ResultEntry]) -> String {
    let failed: Vec<String> = results
        .iter()
        .filter(|entry| !entry.success)
        .map(|entry| match &entry.error {
            Some(error) => format!("'{}' ({})", entry.name, error),
            None => format!("'{}'", entry.name),
        })
        .collect();

    if failed.is_empty() {
        "no failed task recorded".to_string()
    } else {
        format!("failed task {}", failed.join(", "))
    }
}

/// Slots indexed by registration order; completion order never reorders them.
#[derive(Debug)]
pub(crate) struct ResultCollector {
    slots: Vec<Option<ResultEntry>>,
}

impl ResultCollector {
    pub(crate) fn new(task_count: usize) -> Self {
        Self {
            slots: vec![None; task_count],
        }
    }

    pub(crate) fn record(&mut self, slot: usize, entry: ResultEntry) {
        debug_assert!(self.slots[slot].is_none(), "slot {} recorded twice", slot);
        self.slots[slot] = Some(entry);
    }

    /// Recorded entries so far, in registration order.
    pub(crate) fn snapshot(&self) -> Vec<ResultEntry> {
        self.slots.iter().flatten().cloned().collect()
    }

    pub(crate) fn into_results(self) -> Vec<ResultEntry> {
        self.slots.into_iter().flatten().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn task(name: &str, order: usize) -> LoadTask {
        LoadTask {
            name: name.to_string(),
            retrieve: None,
            dump: false,
            stage: 0,
            registration_order: order,
        }
    }

    #[test]
    fn test_collector_reports_registration_order() {
        let mut collector = ResultCollector::new(3);
        collector.record(2, ResultEntry::succeeded(&task("c", 2), json!(3)));
        collector.record(0, ResultEntry::succeeded(&task("a", 0), json!(1)));

        let names: Vec<String> = collector.snapshot().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["a", "c"]);

        collector.record(1, ResultEntry::succeeded(&task("b", 1), json!(2)));
        let names: Vec<String> = collector.into_results().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_prepare_entry() {
        let ok = ResultEntry::prepare(Ok(()));
        assert_eq!(ok.name, PREPARE_ENTRY_NAME);
        assert!(ok.success);
        assert_eq!(ok.options, TaskOptions::default());

        let failed = ResultEntry::prepare(Err(TaskError::other("boom")));
        assert!(!failed.success);
        assert_eq!(failed.error, Some(TaskError::other("boom")));
    }

    #[test]
    fn test_load_failure_names_failed_task() {
        let failure = LoadFailure::TaskFailed {
            results: vec![
                ResultEntry::succeeded(&task("a", 0), json!(1)),
                ResultEntry::failed(&task("b", 1), TaskError::rejected(0)),
            ],
        };

        assert_eq!(failure.failed_entry().map(|e| e.name.as_str()), Some("b"));
        assert!(failure.to_string().contains("'b'"));
        assert!(LoadFailure::Disposed.results().is_empty());
    }

    #[test]
    fn test_entry_serialization_skips_empty_fields() {
        let entry = ResultEntry::succeeded(&task("x", 0), json!(1));
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            value,
            json!({
                "name": "x",
                "success": true,
                "value": 1,
                "options": {"name": "x", "dump": false, "stage": 0}
            })
        );
    }
}
