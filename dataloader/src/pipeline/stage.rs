//! Stage grouping for staged loading.

use std::collections::BTreeMap;

/// A stage contains tasks that run concurrently.
///
/// Stages are executed in ascending `index` order; a stage starts only once
/// the previous one has fully settled.
///
/// Generic over task type T so grouping stays independent of what a task is.
#[derive(Debug, Clone)]
pub struct Stage<T> {
    pub index: usize,
    pub tasks: Vec<T>,
}

impl<T> Stage<T> {
    pub fn new(index: usize, tasks: Vec<T>) -> Self {
        Self { index, tasks }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Group tasks by stage index, ascending, keeping input order inside a stage.
pub fn group_stages<T, F>(tasks: impl IntoIterator<Item = T>, stage_of: F) -> Vec<Stage<T>>
where
    F: Fn(&T) -> usize,
{
    let mut grouped: BTreeMap<usize, Vec<T>> = BTreeMap::new();
    for task in tasks {
        grouped.entry(stage_of(&task)).or_default().push(task);
    }

    grouped
        .into_iter()
        .map(|(index, tasks)| Stage::new(index, tasks))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_stages_orders_by_index() {
        let tasks = vec![("a", 3), ("b", 0), ("c", 3), ("d", 1)];
        let stages = group_stages(tasks, |(_, stage)| *stage);

        let indices: Vec<usize> = stages.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1, 3]);

        let last: Vec<&str> = stages[2].tasks.iter().map(|(name, _)| *name).collect();
        assert_eq!(last, vec!["a", "c"]);
    }

    #[test]
    fn test_group_stages_empty() {
        let stages = group_stages(Vec::<(&str, usize)>::new(), |(_, s)| *s);
        assert!(stages.is_empty());
    }
}
