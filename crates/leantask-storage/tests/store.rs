use chrono::Utc;
use leantask_contracts::{FlowRunStatus, TaskRunStatus};
use leantask_storage::{NewEdge, NewFlow, NewTask, Store};
use tempfile::tempdir;

async fn open_store() -> (tempfile::TempDir, Store) {
    let dir = tempdir().unwrap();
    let store = Store::init_project(dir.path(), "demo", None, false)
        .await
        .unwrap();
    (dir, store)
}

#[tokio::test]
async fn init_project_seeds_an_active_project_row() {
    let (_dir, store) = open_store().await;
    let project = store.get_project().await.unwrap().unwrap();
    assert_eq!(project.name, "demo");
    assert!(project.active);
}

#[tokio::test]
async fn init_project_refuses_to_overwrite_without_replace() {
    let dir = tempdir().unwrap();
    Store::init_project(dir.path(), "demo", None, false)
        .await
        .unwrap();

    let err = Store::init_project(dir.path(), "demo", None, false).await;
    assert!(err.is_err());
}

#[tokio::test]
async fn flow_create_and_fetch_round_trips() {
    let (_dir, store) = open_store().await;
    let flow = store
        .create_flow(NewFlow {
            path: "flows/hello.flow.toml".into(),
            name: "hello".into(),
            description: None,
            cron_schedules: vec!["*/5 * * * *".into()],
            start_datetime: None,
            end_datetime: None,
            max_delay_secs: Some(300),
            checksum: "deadbeef".into(),
            active: true,
        })
        .await
        .unwrap();

    let fetched = store.get_flow(flow.id).await.unwrap();
    assert_eq!(fetched.name, "hello");
    assert_eq!(fetched.cron_schedules, vec!["*/5 * * * *".to_string()]);

    let by_name = store.get_flow_by_name("hello").await.unwrap().unwrap();
    assert_eq!(by_name.id, flow.id);

    let mirrored = store.log_for("flow", flow.id).await.unwrap();
    assert_eq!(mirrored.len(), 1);
}

#[tokio::test]
async fn replace_task_graph_resolves_edges_by_name() {
    let (_dir, store) = open_store().await;
    let flow = store
        .create_flow(NewFlow {
            path: "flows/chain.flow.toml".into(),
            name: "chain".into(),
            description: None,
            cron_schedules: vec![],
            start_datetime: None,
            end_datetime: None,
            max_delay_secs: None,
            checksum: "c0ffee".into(),
            active: true,
        })
        .await
        .unwrap();

    let tasks = vec![
        NewTask {
            name: "extract".into(),
            retry_max: 0,
            retry_delay_secs: 0,
        },
        NewTask {
            name: "load".into(),
            retry_max: 2,
            retry_delay_secs: 5,
        },
    ];
    let edges: Vec<NewEdge> = vec![("extract".into(), "load".into())];

    store
        .replace_task_graph(flow.id, &tasks, &edges)
        .await
        .unwrap();

    let stored_tasks = store.list_tasks(flow.id).await.unwrap();
    assert_eq!(stored_tasks.len(), 2);
    let stored_edges = store.list_edges(flow.id).await.unwrap();
    assert_eq!(stored_edges.len(), 1);

    // reindexing replaces rather than appends
    store
        .replace_task_graph(flow.id, &tasks, &edges)
        .await
        .unwrap();
    assert_eq!(store.list_tasks(flow.id).await.unwrap().len(), 2);
    assert_eq!(store.list_edges(flow.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn flow_run_status_transitions_are_monotone() {
    let (_dir, store) = open_store().await;
    let flow = store
        .create_flow(NewFlow {
            path: "flows/run.flow.toml".into(),
            name: "run".into(),
            description: None,
            cron_schedules: vec![],
            start_datetime: None,
            end_datetime: None,
            max_delay_secs: None,
            checksum: "abc123".into(),
            active: true,
        })
        .await
        .unwrap();

    let run = store
        .create_flow_run(flow.id, None, None, None, true, FlowRunStatus::Scheduled)
        .await
        .unwrap();

    let running = store
        .transition_flow_run(run.id, FlowRunStatus::Running)
        .await
        .unwrap();
    assert!(running.started_at.is_some());

    let done = store
        .transition_flow_run(run.id, FlowRunStatus::Done)
        .await
        .unwrap();
    assert_eq!(done.status, FlowRunStatus::Done);

    let rejected = store.transition_flow_run(run.id, FlowRunStatus::Running).await;
    assert!(rejected.is_err());
}

#[tokio::test]
async fn task_run_retry_creates_a_distinct_row_with_incremented_attempt() {
    let (_dir, store) = open_store().await;
    let flow = store
        .create_flow(NewFlow {
            path: "flows/retry.flow.toml".into(),
            name: "retry".into(),
            description: None,
            cron_schedules: vec![],
            start_datetime: None,
            end_datetime: None,
            max_delay_secs: None,
            checksum: "cafebabe".into(),
            active: true,
        })
        .await
        .unwrap();
    store
        .replace_task_graph(
            flow.id,
            &[NewTask {
                name: "flaky".into(),
                retry_max: 2,
                retry_delay_secs: 1,
            }],
            &[],
        )
        .await
        .unwrap();
    let task = &store.list_tasks(flow.id).await.unwrap()[0];

    let run = store
        .create_flow_run(flow.id, None, None, None, true, FlowRunStatus::Running)
        .await
        .unwrap();
    let task_run = store
        .create_task_run(run.id, task.id, 2, 1, TaskRunStatus::Pending)
        .await
        .unwrap();

    store
        .transition_task_run(task_run.id, TaskRunStatus::Running)
        .await
        .unwrap();
    store
        .transition_task_run(task_run.id, TaskRunStatus::Failed)
        .await
        .unwrap();

    let retried = store.create_retry_task_run(task_run.id).await.unwrap();
    assert_ne!(retried.id, task_run.id);
    assert_eq!(retried.attempt, 2);
    assert_eq!(retried.status, TaskRunStatus::Pending);

    let all_attempts = store.list_task_runs(run.id).await.unwrap();
    assert_eq!(all_attempts.len(), 2);
}

#[tokio::test]
async fn orphaned_schedules_are_reported_for_cleanup() {
    let (_dir, store) = open_store().await;
    let flow = store
        .create_flow(NewFlow {
            path: "flows/cleanup.flow.toml".into(),
            name: "cleanup".into(),
            description: None,
            cron_schedules: vec!["*/5 * * * *".into()],
            start_datetime: None,
            end_datetime: None,
            max_delay_secs: None,
            checksum: "00ff00".into(),
            active: true,
        })
        .await
        .unwrap();

    let schedule = store
        .create_schedule(flow.id, Utc::now(), Some(300), false)
        .await
        .unwrap();

    // no flow-run references it yet, so it is immediately orphaned
    let orphaned = store.list_orphaned_schedules().await.unwrap();
    assert_eq!(orphaned.len(), 1);
    assert_eq!(orphaned[0].id, schedule.id);

    store
        .create_flow_run(
            flow.id,
            Some(schedule.id),
            Some(schedule.schedule_datetime),
            Some(300),
            false,
            FlowRunStatus::Scheduled,
        )
        .await
        .unwrap();

    assert!(store.list_orphaned_schedules().await.unwrap().is_empty());
}

#[tokio::test]
async fn cancel_flow_run_cascades_to_pending_task_runs() {
    let (_dir, store) = open_store().await;
    let flow = store
        .create_flow(NewFlow {
            path: "flows/cancel.flow.toml".into(),
            name: "cancel".into(),
            description: None,
            cron_schedules: vec![],
            start_datetime: None,
            end_datetime: None,
            max_delay_secs: None,
            checksum: "beefcafe".into(),
            active: true,
        })
        .await
        .unwrap();
    store
        .replace_task_graph(
            flow.id,
            &[NewTask {
                name: "wait".into(),
                retry_max: 0,
                retry_delay_secs: 0,
            }],
            &[],
        )
        .await
        .unwrap();
    let task = &store.list_tasks(flow.id).await.unwrap()[0];

    let run = store
        .create_flow_run(flow.id, None, None, None, true, FlowRunStatus::Scheduled)
        .await
        .unwrap();
    let task_run = store
        .create_task_run(run.id, task.id, 0, 0, TaskRunStatus::Pending)
        .await
        .unwrap();

    let canceled = store.cancel_flow_run(run.id, true).await.unwrap();
    assert_eq!(canceled.status, FlowRunStatus::CanceledByUser);

    let task_run = store.get_task_run(task_run.id).await.unwrap();
    assert_eq!(task_run.status, TaskRunStatus::Canceled);
}

#[tokio::test]
async fn cancel_flow_run_on_a_terminal_run_is_a_no_op() {
    let (_dir, store) = open_store().await;
    let flow = store
        .create_flow(NewFlow {
            path: "flows/cancel2.flow.toml".into(),
            name: "cancel2".into(),
            description: None,
            cron_schedules: vec![],
            start_datetime: None,
            end_datetime: None,
            max_delay_secs: None,
            checksum: "facade00".into(),
            active: true,
        })
        .await
        .unwrap();
    let run = store
        .create_flow_run(flow.id, None, None, None, true, FlowRunStatus::Running)
        .await
        .unwrap();
    store
        .transition_flow_run(run.id, FlowRunStatus::Done)
        .await
        .unwrap();

    let still_done = store.cancel_flow_run(run.id, false).await.unwrap();
    assert_eq!(still_done.status, FlowRunStatus::Done);
}

#[tokio::test]
async fn cancel_task_run_from_running_bypasses_the_monotone_rank_check() {
    let (_dir, store) = open_store().await;
    let flow = store
        .create_flow(NewFlow {
            path: "flows/cancel3.flow.toml".into(),
            name: "cancel3".into(),
            description: None,
            cron_schedules: vec![],
            start_datetime: None,
            end_datetime: None,
            max_delay_secs: None,
            checksum: "decafbad".into(),
            active: true,
        })
        .await
        .unwrap();
    store
        .replace_task_graph(
            flow.id,
            &[NewTask {
                name: "skippy".into(),
                retry_max: 0,
                retry_delay_secs: 0,
            }],
            &[],
        )
        .await
        .unwrap();
    let task = &store.list_tasks(flow.id).await.unwrap()[0];
    let run = store
        .create_flow_run(flow.id, None, None, None, true, FlowRunStatus::Running)
        .await
        .unwrap();
    let task_run = store
        .create_task_run(run.id, task.id, 0, 0, TaskRunStatus::Pending)
        .await
        .unwrap();
    store
        .transition_task_run(task_run.id, TaskRunStatus::Running)
        .await
        .unwrap();

    // Running -> Canceled is a same-rank move the generic setter would
    // reject; cancel_task_run must still allow it.
    let canceled = store.cancel_task_run(task_run.id).await.unwrap();
    assert_eq!(canceled.status, TaskRunStatus::Canceled);
}
