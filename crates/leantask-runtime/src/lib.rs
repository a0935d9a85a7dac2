//! Flow runtime (spec.md §4.4): the child process that executes one
//! flow-run's DAG to completion.

mod task;
mod topo;

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use leantask_contracts::{ExecutorError, FlowRunStatus, TaskRunStatus};
use leantask_indexer::{FlowManifest, TaskManifest};
use leantask_storage::Store;
use uuid::Uuid;

pub use task::{build, Task, TaskContext, TaskOutcome, UpstreamOutputs};

/// Run `flow_run_id` to completion against the manifest at `manifest_path`
/// and return its terminal status (spec.md §4.4 steps 1-6).
pub async fn run_flow(
    store: &Store,
    manifest_path: &Path,
    flow_run_id: Uuid,
) -> Result<FlowRunStatus, ExecutorError> {
    let flow_run = store.get_flow_run(flow_run_id).await?;
    let flow = store.get_flow(flow_run.flow_id).await?;

    let contents = std::fs::read_to_string(manifest_path)?;
    let manifest = FlowManifest::parse(&contents).map_err(|e| {
        ExecutorError::ChildProcessFailed(format!("manifest no longer parses: {e}"))
    })?;
    let manifest_by_name: HashMap<String, TaskManifest> = manifest
        .tasks
        .iter()
        .map(|t| (t.name.clone(), t.clone()))
        .collect();

    let tasks = store.list_tasks(flow.id).await?;
    if tasks.is_empty() {
        return Err(ExecutorError::ChildProcessFailed(
            "flow has an empty task set".to_string(),
        ));
    }
    let edges = store.list_edges(flow.id).await?;
    let order = topo::order(&tasks, &edges);
    let tasks_by_id: HashMap<Uuid, &leantask_contracts::Task> =
        tasks.iter().map(|t| (t.id, t)).collect();

    store
        .transition_flow_run(flow_run_id, FlowRunStatus::Running)
        .await?;

    let existing_runs = store.list_task_runs(flow_run_id).await?;
    let mut current_run_by_task: HashMap<Uuid, Uuid> = HashMap::new();
    for run in &existing_runs {
        current_run_by_task.insert(run.task_id, run.id);
    }
    for task in &tasks {
        if !current_run_by_task.contains_key(&task.id) {
            let run = store
                .create_task_run(
                    flow_run_id,
                    task.id,
                    task.retry_max,
                    task.retry_delay_secs,
                    TaskRunStatus::Pending,
                )
                .await?;
            current_run_by_task.insert(task.id, run.id);
        }
    }

    let mut outputs: HashMap<Uuid, serde_json::Value> = HashMap::new();

    for task_id in &order {
        let task_run_id = current_run_by_task[task_id];
        let current = store.get_task_run(task_run_id).await?;
        if !matches!(
            current.status,
            TaskRunStatus::Scheduled | TaskRunStatus::Pending
        ) {
            continue;
        }

        let task = tasks_by_id[task_id];
        let manifest_task = manifest_by_name.get(&task.name);
        let kind = manifest_task
            .map(|m| m.kind)
            .unwrap_or(leantask_indexer::TaskKind::Noop);
        let config = manifest_task
            .map(|m| m.config.clone())
            .unwrap_or_default();
        let body = task::build(kind);

        let upstream_outputs: UpstreamOutputs = edges
            .iter()
            .filter(|e| e.downstream_task_id == *task_id)
            .filter_map(|e| {
                let name = tasks_by_id.get(&e.source_task_id)?.name.clone();
                outputs.get(&e.source_task_id).map(|v| (name, v.clone()))
            })
            .collect();

        let mut attempt_task_run_id = task_run_id;
        let total_attempts = task.retry_max + 1;
        let mut final_status = TaskRunStatus::Failed;

        for attempt in 1..=total_attempts {
            store
                .transition_task_run(attempt_task_run_id, TaskRunStatus::Running)
                .await?;

            let ctx = TaskContext {
                task_name: task.name.clone(),
                config: config.clone(),
                upstream_outputs: upstream_outputs.clone(),
            };

            match body.run(&ctx).await {
                Ok(outcome) => {
                    store
                        .transition_task_run(attempt_task_run_id, TaskRunStatus::Done)
                        .await?;
                    outputs.insert(*task_id, outcome.output);
                    final_status = TaskRunStatus::Done;
                    break;
                }
                Err(leantask_contracts::TaskError::Skipped) => {
                    // A task deliberately skipping itself is CANCELED, not
                    // FAILED, and never retried (spec.md §4.4 failure
                    // semantics).
                    store.cancel_task_run(attempt_task_run_id).await?;
                    final_status = TaskRunStatus::Canceled;
                    break;
                }
                Err(_err) => {
                    store
                        .transition_task_run(attempt_task_run_id, TaskRunStatus::Failed)
                        .await?;
                    final_status = TaskRunStatus::Failed;

                    if attempt < total_attempts {
                        if task.retry_delay_secs > 0 {
                            tokio::time::sleep(Duration::from_secs(task.retry_delay_secs)).await;
                        }
                        let retried = store.create_retry_task_run(attempt_task_run_id).await?;
                        attempt_task_run_id = retried.id;
                        current_run_by_task.insert(*task_id, retried.id);
                    }
                }
            }
        }

        // Failed descendants cascade to FAILED_UPSTREAM; a skipped task's
        // descendants cascade to CANCELED instead (spec.md §4.4).
        if final_status == TaskRunStatus::Failed {
            for descendant in topo::descendants(*task_id, &edges) {
                if let Some(&descendant_run_id) = current_run_by_task.get(&descendant) {
                    let descendant_run = store.get_task_run(descendant_run_id).await?;
                    if !descendant_run.status.is_terminal() {
                        store
                            .transition_task_run(descendant_run_id, TaskRunStatus::FailedUpstream)
                            .await?;
                    }
                }
            }
        } else if final_status == TaskRunStatus::Canceled {
            for descendant in topo::descendants(*task_id, &edges) {
                if let Some(&descendant_run_id) = current_run_by_task.get(&descendant) {
                    store.cancel_task_run(descendant_run_id).await?;
                }
            }
        }
    }

    let final_runs = store.list_task_runs(flow_run_id).await?;
    let any_failed = final_runs.iter().any(|r| r.status.is_failure());
    let flow_status = if any_failed {
        FlowRunStatus::Failed
    } else {
        FlowRunStatus::Done
    };
    let run = store
        .transition_flow_run(flow_run_id, flow_status)
        .await?;

    if let Some(schedule_id) = run.schedule_id {
        // Best-effort: the schedule may already be gone (spec.md §8
        // "schedule deletion is idempotent").
        let _ = store.delete_schedule(schedule_id).await;
    }

    Ok(flow_status)
}
