//! Task registry.
//!
//! Callers describe work in one of three shapes ([`LoadConfig`]). The registry
//! resolves each shape exactly once into [`LoadTask`]s carrying a stage index
//! and a registration order; nothing past this point looks at the shape again.

use crate::pipeline::{LoadTask, RetrieveFn};
use dataloader_shared::{LoaderError, LoaderResult};
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// Name given to the task created from a bare retrieve function.
pub const ANONYMOUS_TASK_NAME: &str = "$dump";

/// One entry of a task mapping.
#[derive(Clone, Default)]
pub struct TaskSpec {
    /// Overrides the mapping key as the task (and store) name.
    pub name: Option<String>,
    /// `None` is accepted here and fails once the load runs.
    pub retrieve: Option<RetrieveFn>,
    pub dump: bool,
}

impl TaskSpec {
    pub fn new(retrieve: RetrieveFn) -> Self {
        Self {
            name: None,
            retrieve: Some(retrieve),
            dump: false,
        }
    }

    /// A task without a callable retrieve function.
    pub fn missing() -> Self {
        Self::default()
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Merge the resolved mapping into the store key by key.
    pub fn dump(mut self) -> Self {
        self.dump = true;
        self
    }
}

impl From<RetrieveFn> for TaskSpec {
    fn from(retrieve: RetrieveFn) -> Self {
        TaskSpec::new(retrieve)
    }
}

impl fmt::Debug for TaskSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSpec")
            .field("name", &self.name)
            .field("callable", &self.retrieve.is_some())
            .field("dump", &self.dump)
            .finish()
    }
}

/// Task name → spec, iterated in insertion order.
pub type TaskMap = IndexMap<String, TaskSpec>;

/// Accepted registration shapes.
#[derive(Clone)]
pub enum LoadConfig {
    Map(TaskMap),
    /// Several mappings registered in one call, sharing one stage.
    Sequence(Vec<TaskMap>),
    /// One anonymous task whose value is a mapping merged into the store.
    Function(RetrieveFn),
}

impl LoadConfig {
    pub fn map<I, K, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, S)>,
        K: Into<String>,
        S: Into<TaskSpec>,
    {
        LoadConfig::Map(
            entries
                .into_iter()
                .map(|(name, spec)| (name.into(), spec.into()))
                .collect(),
        )
    }

    pub fn single(name: impl Into<String>, spec: impl Into<TaskSpec>) -> Self {
        Self::map([(name.into(), spec.into())])
    }

    pub fn sequence(maps: Vec<TaskMap>) -> Self {
        LoadConfig::Sequence(maps)
    }

    pub fn function(retrieve: RetrieveFn) -> Self {
        LoadConfig::Function(retrieve)
    }
}

impl From<TaskMap> for LoadConfig {
    fn from(map: TaskMap) -> Self {
        LoadConfig::Map(map)
    }
}

impl From<Vec<TaskMap>> for LoadConfig {
    fn from(maps: Vec<TaskMap>) -> Self {
        LoadConfig::Sequence(maps)
    }
}

impl From<RetrieveFn> for LoadConfig {
    fn from(retrieve: RetrieveFn) -> Self {
        LoadConfig::Function(retrieve)
    }
}

impl fmt::Debug for LoadConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadConfig::Map(map) => f.debug_tuple("Map").field(map).finish(),
            LoadConfig::Sequence(maps) => f.debug_tuple("Sequence").field(maps).finish(),
            LoadConfig::Function(_) => f.write_str("Function"),
        }
    }
}

/// Registered tasks in registration order.
#[derive(Debug, Default)]
pub(crate) struct TaskRegistry {
    tasks: Vec<Arc<LoadTask>>,
    highest_stage: Option<usize>,
}

impl TaskRegistry {
    /// Normalize `config` into tasks and append them.
    ///
    /// Without an explicit stage, the call gets a fresh index above every
    /// index seen so far. Returns the stage index used.
    ///
    /// Fails without registering anything when no higher index is left.
    pub(crate) fn register(
        &mut self,
        config: LoadConfig,
        stage: Option<usize>,
    ) -> LoaderResult<usize> {
        let stage = match (stage, self.highest_stage) {
            (Some(stage), _) => stage,
            (None, None) => 0,
            (None, Some(highest)) => highest.checked_add(1).ok_or_else(|| {
                LoaderError::Config(format!(
                    "no stage index left above {}; pass an explicit stage",
                    highest
                ))
            })?,
        };
        self.highest_stage = Some(self.highest_stage.map_or(stage, |highest| highest.max(stage)));

        for (name, spec) in normalize(config) {
            let task = LoadTask {
                name: spec.name.unwrap_or(name),
                retrieve: spec.retrieve,
                dump: spec.dump,
                stage,
                registration_order: self.tasks.len(),
            };
            tracing::trace!(
                task = %task.name,
                stage,
                order = task.registration_order,
                "Registered load task"
            );
            self.tasks.push(Arc::new(task));
        }

        Ok(stage)
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<LoadTask>> {
        self.tasks.clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }
}

fn normalize(config: LoadConfig) -> Vec<(String, TaskSpec)> {
    match config {
        LoadConfig::Map(map) => map.into_iter().collect(),
        LoadConfig::Sequence(maps) => maps.into_iter().flatten().collect(),
        LoadConfig::Function(retrieve) => {
            vec![(ANONYMOUS_TASK_NAME.to_string(), TaskSpec::new(retrieve).dump())]
        }
    }
}
