//! Declarative load plans.
//!
//! A plan is a JSON document describing registration calls. Because JSON has
//! no functions, each task is a fixture: a value (or error) delivered after an
//! optional delay. This is the dynamic entry point where the shape of caller
//! input is checked.
//!
//! ```json
//! {
//!   "options": { "label": "dashboard" },
//!   "logging": { "default_filter": "dataloader=debug" },
//!   "steps": [
//!     { "config": { "user": { "value": "ada", "delay_ms": 20 } } },
//!     { "stage": 1, "config": [ { "feed": [1, 2, 3] }, { "flags": null } ] }
//!   ]
//! }
//! ```

use crate::loader::{DataLoader, LoadConfig, LoaderOptions, TaskMap, TaskSpec};
use crate::logging::LoggingOptions;
use crate::pipeline::{self, PendingValue, Retrieval, RetrieveFn};
use dataloader_shared::{LoaderError, LoaderResult, TaskError};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Keys that turn a JSON object leaf into a fixture rather than a literal.
const FIXTURE_KEYS: &[&str] = &["value", "error", "delay_ms", "dump", "name", "abortable"];

/// A task that delivers a canned value or error.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct Fixture {
    name: Option<String>,
    #[serde(default)]
    value: Value,
    error: Option<Value>,
    #[serde(default)]
    delay_ms: u64,
    #[serde(default)]
    dump: bool,
    #[serde(default)]
    abortable: bool,
}

impl Fixture {
    fn into_spec(self, key: &str) -> TaskSpec {
        let task_name = self.name.clone().unwrap_or_else(|| key.to_string());
        let retrieve = fixture_retrieve(
            task_name,
            self.value,
            self.error,
            self.delay_ms,
            self.abortable,
        );

        let mut spec = TaskSpec::new(retrieve);
        if let Some(name) = self.name {
            spec = spec.named(name);
        }
        if self.dump {
            spec = spec.dump();
        }
        spec
    }
}

fn fixture_retrieve(
    task_name: String,
    value: Value,
    error: Option<Value>,
    delay_ms: u64,
    abortable: bool,
) -> RetrieveFn {
    let outcome = match error {
        Some(error) => Err(TaskError::Rejected(error)),
        None => Ok(value),
    };

    if delay_ms == 0 && !abortable {
        return pipeline::from_fn(move || outcome.clone());
    }

    pipeline::from_retrieval(move || {
        let outcome = outcome.clone();
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let task_name = task_name.clone();

        let pending = PendingValue::new(async move {
            tokio::select! {
                _ = cancelled.cancelled() => Err(TaskError::Aborted(task_name)),
                _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => outcome,
            }
        });

        Ok(Retrieval::Pending(if abortable {
            pending.abortable(token)
        } else {
            pending
        }))
    })
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}

fn parse_leaf(key: &str, leaf: Value) -> LoaderResult<TaskSpec> {
    match leaf {
        Value::Null => Ok(TaskSpec::missing()),
        Value::Object(object) if object.keys().any(|k| FIXTURE_KEYS.contains(&k.as_str())) => {
            let fixture: Fixture = serde_json::from_value(Value::Object(object)).map_err(|e| {
                LoaderError::Config(format!("invalid task '{}': {}", key, e))
            })?;
            Ok(fixture.into_spec(key))
        }
        literal => Ok(TaskSpec::new(pipeline::value(literal))),
    }
}

fn parse_map(map: Map<String, Value>) -> LoaderResult<TaskMap> {
    map.into_iter()
        .map(|(key, leaf)| {
            let spec = parse_leaf(&key, leaf)?;
            Ok((key, spec))
        })
        .collect()
}

impl LoadConfig {
    /// Resolve dynamic JSON input into a configuration.
    ///
    /// # Errors
    ///
    /// `LoaderError::Config` when the input is absent, a scalar, or a sequence
    /// containing something other than mappings.
    pub fn from_json(config: Option<Value>) -> LoaderResult<Self> {
        match config {
            None | Some(Value::Null) => Err(LoaderError::Config(
                "a configuration is required".to_string(),
            )),
            Some(Value::Object(map)) => parse_map(map).map(LoadConfig::Map),
            Some(Value::Array(items)) => items
                .into_iter()
                .enumerate()
                .map(|(index, item)| match item {
                    Value::Object(map) => parse_map(map),
                    other => Err(LoaderError::Config(format!(
                        "sequence element {} must be a mapping, got {}",
                        index,
                        describe(&other)
                    ))),
                })
                .collect::<LoaderResult<Vec<_>>>()
                .map(LoadConfig::Sequence),
            Some(other) => Err(LoaderError::Config(format!(
                "expected a mapping or a sequence of mappings, got {}",
                describe(&other)
            ))),
        }
    }
}

/// One registration call.
#[derive(Debug, Clone, Deserialize)]
pub struct PlanStep {
    #[serde(default)]
    pub stage: Option<usize>,
    #[serde(default)]
    pub config: Option<Value>,
}

/// A sequence of registration calls plus loader and logging options.
#[derive(Debug, Clone, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub options: LoaderOptions,
    #[serde(default)]
    pub logging: LoggingOptions,
    pub steps: Vec<PlanStep>,
}

impl Plan {
    pub fn from_json_str(source: &str) -> LoaderResult<Self> {
        serde_json::from_str(source)
            .map_err(|e| LoaderError::Config(format!("invalid plan: {}", e)))
    }

    pub fn from_path(path: &Path) -> LoaderResult<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            LoaderError::Config(format!("failed to read plan {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&source)
    }

    /// Loader configured with this plan's options.
    pub fn loader(&self) -> DataLoader {
        DataLoader::with_options(self.options.clone())
    }

    /// Register every step into `loader`, in order.
    ///
    /// Stops at the first step that is rejected.
    pub fn register_into(&self, loader: &DataLoader) -> LoaderResult<()> {
        for (index, step) in self.steps.iter().enumerate() {
            let config = LoadConfig::from_json(step.config.clone()).map_err(|e| match e {
                LoaderError::Config(msg) => LoaderError::Config(format!("step {}: {}", index, msg)),
                other => other,
            })?;
            loader.register(config, step.stage)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::LoadFailure;
    use crate::store::{MemoryStore, Store};
    use serde_json::json;
    use std::io::Write;
    use std::sync::Arc;

    #[test]
    fn test_rejects_unacceptable_shapes() {
        for config in [
            None,
            Some(Value::Null),
            Some(json!(1)),
            Some(json!("string")),
            Some(json!(true)),
        ] {
            let result = LoadConfig::from_json(config.clone());
            assert!(
                matches!(result, Err(LoaderError::Config(_))),
                "accepted {:?}",
                config
            );
        }
    }

    #[test]
    fn test_rejects_sequence_with_scalar() {
        let result = LoadConfig::from_json(Some(json!([{"x": 1}, 2])));
        let Err(LoaderError::Config(msg)) = result else {
            panic!("expected config error");
        };
        assert!(msg.contains("element 1"));
    }

    #[test]
    fn test_accepts_mapping_and_sequence() {
        assert!(matches!(
            LoadConfig::from_json(Some(json!({"x": 1}))),
            Ok(LoadConfig::Map(_))
        ));
        assert!(matches!(
            LoadConfig::from_json(Some(json!([{"x": 1}, {"y": 2}]))),
            Ok(LoadConfig::Sequence(maps)) if maps.len() == 2
        ));
    }

    #[test]
    fn test_fixture_with_unknown_key_is_rejected() {
        let result = LoadConfig::from_json(Some(json!({"x": {"value": 1, "bogus": 2}})));
        assert!(matches!(result, Err(LoaderError::Config(_))));
    }

    #[test]
    fn test_null_leaf_is_missing_task() {
        let Ok(LoadConfig::Map(map)) = LoadConfig::from_json(Some(json!({"x": null}))) else {
            panic!("expected map");
        };
        assert!(map["x"].retrieve.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_plan_runs_fixtures() {
        let plan = Plan::from_json_str(
            r#"{
                "options": {"label": "test"},
                "steps": [
                    {"config": {"x": {"value": 1, "delay_ms": 10}}},
                    {"config": {"pair": {"value": {"a": 1, "b": 2}, "dump": true}}},
                    {"config": {"y": [1, 2], "z": {"name": "renamed", "value": "v"}}}
                ]
            }"#,
        )
        .unwrap();
        let loader = plan.loader();
        let store = Arc::new(MemoryStore::new());
        loader.bind_store(store.clone());
        plan.register_into(&loader).unwrap();

        let results = loader.load().unwrap().await.unwrap();

        assert_eq!(loader.options().label.as_deref(), Some("test"));
        assert_eq!(results.len(), 4);
        assert_eq!(store.get("x"), Some(json!(1)));
        assert_eq!(store.get("a"), Some(json!(1)));
        assert_eq!(store.get("b"), Some(json!(2)));
        assert_eq!(store.get("y"), Some(json!([1, 2])));
        assert_eq!(store.get("renamed"), Some(json!("v")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixture_error_rejects() {
        let plan = Plan::from_json_str(
            r#"{"steps": [{"config": {"x": {"error": "down", "delay_ms": 5}}}]}"#,
        )
        .unwrap();
        let loader = plan.loader();
        loader.bind_store(Arc::new(MemoryStore::new()));
        plan.register_into(&loader).unwrap();

        let err = loader.load().unwrap().await.unwrap_err();

        assert_eq!(
            err.failed_entry().and_then(|e| e.error.clone()),
            Some(TaskError::rejected("down"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_abortable_fixture_is_cancelled_on_dispose() {
        let plan = Plan::from_json_str(
            r#"{"steps": [{"config": {"x": {"value": 1, "delay_ms": 1000, "abortable": true}}}]}"#,
        )
        .unwrap();
        let loader = plan.loader();
        let store = Arc::new(MemoryStore::new());
        loader.bind_store(store.clone());
        plan.register_into(&loader).unwrap();

        let load = tokio::spawn(loader.load().unwrap());
        tokio::task::yield_now().await;
        loader.dispose();

        assert_eq!(load.await.unwrap(), Err(LoadFailure::Disposed));
        assert!(store.is_empty());
    }

    #[test]
    fn test_register_into_reports_step() {
        let plan = Plan::from_json_str(r#"{"steps": [{"config": {"x": 1}}, {"config": 3}]}"#)
            .unwrap();
        let loader = plan.loader();

        let Err(LoaderError::Config(msg)) = plan.register_into(&loader) else {
            panic!("expected config error");
        };
        assert!(msg.starts_with("step 1"));
        assert_eq!(loader.task_count(), 1);
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"steps": [{{"stage": 2, "config": {{"x": 1}}}}]}}"#).unwrap();

        let plan = Plan::from_path(file.path()).unwrap();
        assert_eq!(plan.logging, LoggingOptions::default());
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].stage, Some(2));

        assert!(Plan::from_path(Path::new("/nonexistent/plan.json")).is_err());
    }
}
