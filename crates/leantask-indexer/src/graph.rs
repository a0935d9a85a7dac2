//! DAG validation over a manifest's task declarations, ahead of writing
//! them to the store (spec.md §4.6 step 4: "construct the fresh Task rows
//! and Edge rows... ").

use std::collections::{HashMap, HashSet};

use leantask_contracts::IndexError;

use crate::manifest::TaskManifest;

/// Checks task names are unique, every `upstream` reference resolves to a
/// declared task, and the resulting graph has no cycle.
pub fn validate(tasks: &[TaskManifest]) -> Result<(), IndexError> {
    let mut seen = HashSet::new();
    for task in tasks {
        if !seen.insert(task.name.as_str()) {
            return Err(IndexError::DuplicateTaskName(task.name.clone()));
        }
    }

    let names: HashSet<&str> = tasks.iter().map(|t| t.name.as_str()).collect();
    for task in tasks {
        for upstream in &task.upstream {
            if !names.contains(upstream.as_str()) {
                return Err(IndexError::UnknownTask(upstream.clone()));
            }
        }
    }

    if has_cycle(tasks) {
        return Err(IndexError::CyclicGraph);
    }

    Ok(())
}

fn has_cycle(tasks: &[TaskManifest]) -> bool {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        InProgress,
        Done,
    }

    let by_name: HashMap<&str, &TaskManifest> =
        tasks.iter().map(|t| (t.name.as_str(), t)).collect();
    let mut marks: HashMap<&str, Mark> =
        tasks.iter().map(|t| (t.name.as_str(), Mark::Unvisited)).collect();

    fn visit<'a>(
        name: &'a str,
        by_name: &HashMap<&'a str, &'a TaskManifest>,
        marks: &mut HashMap<&'a str, Mark>,
    ) -> bool {
        match marks.get(name) {
            Some(Mark::InProgress) => return true,
            Some(Mark::Done) => return false,
            _ => {}
        }
        marks.insert(name, Mark::InProgress);
        if let Some(task) = by_name.get(name) {
            for upstream in &task.upstream {
                if visit(upstream, by_name, marks) {
                    return true;
                }
            }
        }
        marks.insert(name, Mark::Done);
        false
    }

    for task in tasks {
        if visit(&task.name, &by_name, &mut marks) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::TaskKind;

    fn task(name: &str, upstream: &[&str]) -> TaskManifest {
        TaskManifest {
            name: name.to_string(),
            kind: TaskKind::Noop,
            retry_max: 0,
            retry_delay_secs: 0,
            upstream: upstream.iter().map(|s| s.to_string()).collect(),
            config: toml::Table::new(),
        }
    }

    #[test]
    fn accepts_a_simple_dag() {
        let tasks = vec![task("a", &[]), task("b", &["a"]), task("c", &["b"])];
        assert!(validate(&tasks).is_ok());
    }

    #[test]
    fn rejects_a_cycle() {
        let tasks = vec![task("a", &["b"]), task("b", &["a"])];
        assert!(matches!(validate(&tasks), Err(IndexError::CyclicGraph)));
    }

    #[test]
    fn rejects_duplicate_names() {
        let tasks = vec![task("a", &[]), task("a", &[])];
        assert!(matches!(
            validate(&tasks),
            Err(IndexError::DuplicateTaskName(_))
        ));
    }

    #[test]
    fn rejects_unknown_upstream() {
        let tasks = vec![task("a", &["ghost"])];
        assert!(matches!(validate(&tasks), Err(IndexError::UnknownTask(_))));
    }
}
