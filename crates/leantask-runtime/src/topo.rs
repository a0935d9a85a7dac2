//! Deterministic topological order over a flow's stored tasks and edges
//! (spec.md §4.4 step 1: "deterministic tie-break by task name").

use std::collections::{HashMap, HashSet};

use leantask_contracts::{Task, TaskEdge};
use uuid::Uuid;

/// Returns task ids in an order where every task follows all of its
/// upstream tasks; ties within a ready layer are broken by name.
///
/// Panics on a cyclic graph, which should never happen here: the indexer
/// refuses to write a cyclic task graph to the store.
pub fn order(tasks: &[Task], edges: &[TaskEdge]) -> Vec<Uuid> {
    let mut indegree: HashMap<Uuid, usize> = tasks.iter().map(|t| (t.id, 0)).collect();
    let mut downstream: HashMap<Uuid, Vec<Uuid>> = tasks.iter().map(|t| (t.id, Vec::new())).collect();
    for edge in edges {
        *indegree.entry(edge.downstream_task_id).or_insert(0) += 1;
        downstream
            .entry(edge.source_task_id)
            .or_default()
            .push(edge.downstream_task_id);
    }

    let name_of: HashMap<Uuid, &str> = tasks.iter().map(|t| (t.id, t.name.as_str())).collect();
    let mut ready: Vec<Uuid> = tasks
        .iter()
        .filter(|t| indegree.get(&t.id).copied().unwrap_or(0) == 0)
        .map(|t| t.id)
        .collect();
    ready.sort_by_key(|id| name_of[id]);

    let mut order = Vec::with_capacity(tasks.len());
    let mut visited = HashSet::new();

    while let Some(next) = ready.first().copied() {
        ready.remove(0);
        if !visited.insert(next) {
            continue;
        }
        order.push(next);

        let mut newly_ready = Vec::new();
        if let Some(children) = downstream.get(&next) {
            for &child in children {
                if let Some(deg) = indegree.get_mut(&child) {
                    *deg -= 1;
                    if *deg == 0 {
                        newly_ready.push(child);
                    }
                }
            }
        }
        newly_ready.sort_by_key(|id| name_of[id]);
        ready.extend(newly_ready);
        ready.sort_by_key(|id| name_of[id]);
    }

    order
}

/// All transitive descendants of `start` (exclusive), via the downstream
/// edge direction.
pub fn descendants(start: Uuid, edges: &[TaskEdge]) -> HashSet<Uuid> {
    let mut downstream: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for edge in edges {
        downstream
            .entry(edge.source_task_id)
            .or_default()
            .push(edge.downstream_task_id);
    }

    let mut result = HashSet::new();
    let mut stack = vec![start];
    while let Some(current) = stack.pop() {
        if let Some(children) = downstream.get(&current) {
            for &child in children {
                if result.insert(child) {
                    stack.push(child);
                }
            }
        }
    }
    result
}
