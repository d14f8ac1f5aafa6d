#[derive(Debug, Clone)]
pub struct TaskMetrics {
    pub name: String,
    pub duration_ms: u128,
    pub success: bool,
}

#[derive(Debug, Clone)]
pub struct StageMetrics {
    pub index: usize,
    pub duration_ms: u128,
    pub tasks: Vec<TaskMetrics>,
}

#[derive(Debug, Clone, Default)]
pub struct LoadMetrics {
    pub total_duration_ms: u128,
    pub stages: Vec<StageMetrics>,
}

impl LoadMetrics {
    pub fn task_duration_ms(&self, name: &str) -> Option<u128> {
        self.stages
            .iter()
            .flat_map(|stage| stage.tasks.iter())
            .find(|task| task.name == name)
            .map(|task| task.duration_ms)
    }

    pub fn task_count(&self) -> usize {
        self.stages.iter().map(|stage| stage.tasks.len()).sum()
    }

    /// Log per-stage timings at debug level.
    pub fn log_stages(&self, load_id: &str) {
        for stage in &self.stages {
            tracing::debug!(
                load_id = %load_id,
                stage = stage.index,
                tasks = stage.tasks.len(),
                duration_ms = stage.duration_ms,
                "Stage settled"
            );
        }
        tracing::debug!(
            load_id = %load_id,
            stages = self.stages.len(),
            tasks = self.task_count(),
            total_duration_ms = self.total_duration_ms,
            "Load finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_duration_lookup() {
        let metrics = LoadMetrics {
            total_duration_ms: 12,
            stages: vec![
                StageMetrics {
                    index: 0,
                    duration_ms: 10,
                    tasks: vec![TaskMetrics {
                        name: "x".into(),
                        duration_ms: 10,
                        success: true,
                    }],
                },
                StageMetrics {
                    index: 1,
                    duration_ms: 2,
                    tasks: vec![TaskMetrics {
                        name: "y".into(),
                        duration_ms: 2,
                        success: false,
                    }],
                },
            ],
        };

        assert_eq!(metrics.task_duration_ms("y"), Some(2));
        assert_eq!(metrics.task_duration_ms("z"), None);
        assert_eq!(metrics.task_count(), 2);
    }
}
