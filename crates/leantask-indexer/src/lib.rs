//! Flow indexer (spec.md §4.6): reflects `*.flow.toml` manifests on disk
//! into the `Store`.

mod checksum;
mod graph;
pub mod manifest;

use std::path::{Path, PathBuf};

use leantask_contracts::{Flow, FlowIndexStatus, IndexError};
use leantask_storage::{NewEdge, NewFlow, NewTask, Store};

pub use manifest::{FlowManifest, TaskKind, TaskManifest};
pub use checksum::of as checksum_of;

/// Whether `flow`'s stored checksum has diverged from the manifest's
/// current on-disk content (spec.md §3: "Checksum changes ⇒ flow is
/// considered dirty"). Used by admission checks ahead of scheduling or
/// running a flow that may have failed to reindex this tick.
pub fn is_dirty(project_root: &Path, flow: &Flow) -> bool {
    let path = project_root.join(&flow.path);
    match std::fs::read(&path) {
        Ok(bytes) => checksum::of(&bytes) != flow.checksum,
        Err(_) => true,
    }
}

/// Walk `root` for `*.flow.toml` files. No file is ever executed; this is
/// a plain directory walk plus an extension check (spec.md §4.2 step 1's
/// "candidate" rule, adapted to a declarative manifest: a file is a
/// candidate iff its name ends in `.flow.toml`).
pub fn discover(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    walk(root, &mut found)?;
    found.sort();
    Ok(found)
}

fn walk(dir: &Path, found: &mut Vec<PathBuf>) -> std::io::Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            walk(&path, found)?;
        } else if path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(".flow.toml"))
        {
            found.push(path);
        }
    }
    Ok(())
}

/// Index a single manifest file against the store (spec.md §4.6).
///
/// `manifest_path` is resolved relative to `project_root`; the stored
/// `Flow.path` is the relative form so the project directory can be moved.
pub async fn index_flow(
    store: &Store,
    project_root: &Path,
    manifest_path: &Path,
    force: bool,
) -> Result<FlowIndexStatus, IndexError> {
    let relative = manifest_path
        .strip_prefix(project_root)
        .unwrap_or(manifest_path)
        .to_string_lossy()
        .to_string();

    let bytes = std::fs::read(manifest_path).map_err(|source| IndexError::Read {
        path: relative.clone(),
        source,
    })?;
    let new_checksum = checksum::of(&bytes);

    let existing = store.get_flow_by_path(&relative).await?;

    if let Some(flow) = &existing {
        if !force && flow.checksum == new_checksum {
            return Ok(FlowIndexStatus::Unchanged);
        }
    }

    let contents = String::from_utf8_lossy(&bytes).into_owned();
    let manifest = FlowManifest::parse(&contents).map_err(|source| IndexError::Parse {
        path: relative.clone(),
        source,
    })?;

    graph::validate(&manifest.tasks)?;

    let new_tasks: Vec<NewTask> = manifest
        .tasks
        .iter()
        .map(|t| NewTask {
            name: t.name.clone(),
            retry_max: t.retry_max,
            retry_delay_secs: t.retry_delay_secs,
        })
        .collect();
    let edges: Vec<NewEdge> = manifest
        .tasks
        .iter()
        .flat_map(|t| {
            t.upstream
                .iter()
                .map(|up| (up.clone(), t.name.clone()))
                .collect::<Vec<_>>()
        })
        .collect();

    match &existing {
        Some(existing) => {
            // spec.md §4.6 steps 3-6: the field update and the task/edge
            // replace are one atomic unit — either both commit or both
            // roll back.
            store
                .reindex_flow(
                    existing.id,
                    &manifest.name,
                    manifest.description.as_deref(),
                    &manifest.cron_schedules,
                    manifest.start_datetime,
                    manifest.end_datetime,
                    manifest.max_delay_secs,
                    &new_checksum,
                    &new_tasks,
                    &edges,
                )
                .await?;
        }
        None => {
            let flow: Flow = store
                .create_flow(NewFlow {
                    path: relative,
                    name: manifest.name.clone(),
                    description: manifest.description.clone(),
                    cron_schedules: manifest.cron_schedules.clone(),
                    start_datetime: manifest.start_datetime,
                    end_datetime: manifest.end_datetime,
                    max_delay_secs: manifest.max_delay_secs,
                    checksum: new_checksum,
                    active: manifest.active,
                })
                .await?;
            store.replace_task_graph(flow.id, &new_tasks, &edges).await?;
        }
    }

    Ok(FlowIndexStatus::Updated)
}

/// Reindex every manifest under `flows_dir`, and remove the `Flow` row for
/// any previously-indexed path that no longer exists on disk (spec.md
/// §4.2 step 2: "rediscover" + "reconcile index").
pub async fn reconcile_project(
    store: &Store,
    project_root: &Path,
    flows_dir: &Path,
) -> Result<Vec<(PathBuf, FlowIndexStatus)>, IndexError> {
    let on_disk = discover(flows_dir)?;
    let on_disk_relative: std::collections::HashSet<String> = on_disk
        .iter()
        .map(|p| {
            p.strip_prefix(project_root)
                .unwrap_or(p)
                .to_string_lossy()
                .to_string()
        })
        .collect();

    for flow in store.list_flows().await? {
        if !on_disk_relative.contains(&flow.path) {
            store.delete_flow(flow.id).await?;
        }
    }

    let mut results = Vec::new();
    for path in on_disk {
        // A single bad manifest must not stop the rest of the project
        // from being reconciled (spec.md §4.2: "per-flow errors are
        // logged and the loop continues").
        match index_flow(store, project_root, &path, false).await {
            Ok(status) => results.push((path, status)),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to index flow");
            }
        }
    }
    Ok(results)
}
