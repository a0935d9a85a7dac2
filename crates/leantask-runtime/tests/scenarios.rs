use leantask_contracts::{FlowRunStatus, TaskRunStatus};
use leantask_indexer::index_flow;
use leantask_runtime::run_flow;
use leantask_storage::Store;
use tempfile::tempdir;

async fn open_store(root: &std::path::Path) -> Store {
    Store::init_project(&root.join(".leantask"), "demo", None, false)
        .await
        .unwrap()
}

fn write_manifest(path: &std::path::Path, contents: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

async fn start_manual_run(
    store: &Store,
    root: &std::path::Path,
    manifest_path: &std::path::Path,
) -> uuid::Uuid {
    index_flow(store, root, manifest_path, false).await.unwrap();
    let relative = manifest_path.strip_prefix(root).unwrap().to_string_lossy().to_string();
    let flow = store.get_flow_by_path(&relative).await.unwrap().unwrap();
    let run = store
        .create_flow_run(flow.id, None, None, None, true, FlowRunStatus::Scheduled)
        .await
        .unwrap();
    run.id
}

#[tokio::test]
async fn hello_world_completes_with_one_done_task_run() {
    let root = tempdir().unwrap();
    let store = open_store(root.path()).await;
    let manifest_path = root.path().join("flows/hello.flow.toml");
    write_manifest(
        &manifest_path,
        r#"
            name = "hello"

            [[tasks]]
            name = "greet"
            kind = "noop"
        "#,
    );

    let run_id = start_manual_run(&store, root.path(), &manifest_path).await;
    let status = run_flow(&store, &manifest_path, run_id).await.unwrap();

    assert_eq!(status, FlowRunStatus::Done);
    let task_runs = store.list_task_runs(run_id).await.unwrap();
    assert_eq!(task_runs.len(), 1);
    assert_eq!(task_runs[0].attempt, 1);
    assert_eq!(task_runs[0].status, TaskRunStatus::Done);
}

#[tokio::test]
async fn retries_until_success_on_the_third_attempt() {
    let root = tempdir().unwrap();
    let store = open_store(root.path()).await;
    let counter_path = root.path().join("attempts");
    let manifest_path = root.path().join("flows/retry.flow.toml");
    write_manifest(
        &manifest_path,
        &format!(
            r#"
            name = "retry"

            [[tasks]]
            name = "flaky"
            kind = "shell"
            retry_max = 3
            retry_delay_secs = 0
            [tasks.config]
            command = "c=$(cat {path} 2>/dev/null || echo 0); c=$((c+1)); echo $c > {path}; [ $c -ge 3 ]"
            "#,
            path = counter_path.display()
        ),
    );

    let run_id = start_manual_run(&store, root.path(), &manifest_path).await;
    let status = run_flow(&store, &manifest_path, run_id).await.unwrap();

    assert_eq!(status, FlowRunStatus::Done);
    let mut task_runs = store.list_task_runs(run_id).await.unwrap();
    task_runs.sort_by_key(|r| r.attempt);
    let statuses: Vec<_> = task_runs.iter().map(|r| (r.attempt, r.status)).collect();
    assert_eq!(
        statuses,
        vec![
            (1, TaskRunStatus::Failed),
            (2, TaskRunStatus::Failed),
            (3, TaskRunStatus::Done),
        ]
    );
}

#[tokio::test]
async fn upstream_failure_cascades_to_failed_upstream_but_spares_the_sibling() {
    let root = tempdir().unwrap();
    let store = open_store(root.path()).await;
    let manifest_path = root.path().join("flows/diamond.flow.toml");
    write_manifest(
        &manifest_path,
        r#"
            name = "diamond"

            [[tasks]]
            name = "a"
            kind = "noop"

            [[tasks]]
            name = "b"
            kind = "shell"
            upstream = ["a"]
            retry_max = 0
            [tasks.config]
            command = "exit 1"

            [[tasks]]
            name = "c"
            kind = "noop"
            upstream = ["b"]

            [[tasks]]
            name = "d"
            kind = "noop"
            upstream = ["a"]
        "#,
    );

    let run_id = start_manual_run(&store, root.path(), &manifest_path).await;
    let status = run_flow(&store, &manifest_path, run_id).await.unwrap();

    assert_eq!(status, FlowRunStatus::Failed);

    let flow = store
        .get_flow_by_path("flows/diamond.flow.toml")
        .await
        .unwrap()
        .unwrap();
    let tasks = store.list_tasks(flow.id).await.unwrap();
    let by_name = |name: &str| tasks.iter().find(|t| t.name == name).unwrap().id;

    let task_runs = store.list_task_runs(run_id).await.unwrap();
    let status_of = |task_id: uuid::Uuid| {
        task_runs
            .iter()
            .find(|r| r.task_id == task_id)
            .unwrap()
            .status
    };

    assert_eq!(status_of(by_name("a")), TaskRunStatus::Done);
    assert_eq!(status_of(by_name("b")), TaskRunStatus::Failed);
    assert_eq!(status_of(by_name("c")), TaskRunStatus::FailedUpstream);
    assert_eq!(status_of(by_name("d")), TaskRunStatus::Done);
}

#[tokio::test]
async fn a_flow_with_no_tasks_is_refused() {
    let root = tempdir().unwrap();
    let store = open_store(root.path()).await;
    let manifest_path = root.path().join("flows/empty.flow.toml");
    write_manifest(&manifest_path, r#"name = "empty""#);

    let run_id = start_manual_run(&store, root.path(), &manifest_path).await;
    let err = run_flow(&store, &manifest_path, run_id).await.unwrap_err();
    assert!(matches!(
        err,
        leantask_contracts::ExecutorError::ChildProcessFailed(_)
    ));
}
