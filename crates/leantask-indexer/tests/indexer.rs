use leantask_contracts::FlowIndexStatus;
use leantask_indexer::{index_flow, reconcile_project};
use leantask_storage::Store;
use tempfile::tempdir;

async fn open_store(root: &std::path::Path) -> Store {
    let meta = root.join(".leantask");
    Store::init_project(&meta, "demo", None, false)
        .await
        .unwrap()
}

fn write_manifest(path: &std::path::Path, contents: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

const HELLO_MANIFEST: &str = r#"
name = "hello"
cron_schedules = ["*/5 * * * *"]

[[tasks]]
name = "greet"
kind = "shell"
[tasks.config]
command = "echo hello"
"#;

#[tokio::test]
async fn indexing_a_new_manifest_creates_the_flow_and_returns_updated() {
    let root = tempdir().unwrap();
    let store = open_store(root.path()).await;
    let manifest_path = root.path().join("flows/hello.flow.toml");
    write_manifest(&manifest_path, HELLO_MANIFEST);

    let status = index_flow(&store, root.path(), &manifest_path, false)
        .await
        .unwrap();
    assert_eq!(status, FlowIndexStatus::Updated);

    let flow = store.get_flow_by_name("hello").await.unwrap().unwrap();
    assert_eq!(flow.cron_schedules, vec!["*/5 * * * *".to_string()]);
    let tasks = store.list_tasks(flow.id).await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].name, "greet");
}

#[tokio::test]
async fn reindexing_unchanged_manifest_is_unchanged() {
    let root = tempdir().unwrap();
    let store = open_store(root.path()).await;
    let manifest_path = root.path().join("flows/hello.flow.toml");
    write_manifest(&manifest_path, HELLO_MANIFEST);

    index_flow(&store, root.path(), &manifest_path, false)
        .await
        .unwrap();
    let second = index_flow(&store, root.path(), &manifest_path, false)
        .await
        .unwrap();
    assert_eq!(second, FlowIndexStatus::Unchanged);
}

#[tokio::test]
async fn editing_the_manifest_triggers_a_reindex() {
    let root = tempdir().unwrap();
    let store = open_store(root.path()).await;
    let manifest_path = root.path().join("flows/hello.flow.toml");
    write_manifest(&manifest_path, HELLO_MANIFEST);
    index_flow(&store, root.path(), &manifest_path, false)
        .await
        .unwrap();

    let edited = HELLO_MANIFEST.replace("echo hello", "echo goodbye");
    write_manifest(&manifest_path, &edited);
    let status = index_flow(&store, root.path(), &manifest_path, false)
        .await
        .unwrap();
    assert_eq!(status, FlowIndexStatus::Updated);
}

#[tokio::test]
async fn reconcile_removes_flows_whose_manifest_disappeared() {
    let root = tempdir().unwrap();
    let store = open_store(root.path()).await;
    let manifest_path = root.path().join("flows/hello.flow.toml");
    write_manifest(&manifest_path, HELLO_MANIFEST);

    reconcile_project(&store, root.path(), &root.path().join("flows"))
        .await
        .unwrap();
    assert!(store.get_flow_by_name("hello").await.unwrap().is_some());

    std::fs::remove_file(&manifest_path).unwrap();
    reconcile_project(&store, root.path(), &root.path().join("flows"))
        .await
        .unwrap();
    assert!(store.get_flow_by_name("hello").await.unwrap().is_none());
}

#[tokio::test]
async fn a_cyclic_manifest_is_rejected() {
    let root = tempdir().unwrap();
    let store = open_store(root.path()).await;
    let manifest_path = root.path().join("flows/cycle.flow.toml");
    write_manifest(
        &manifest_path,
        r#"
            name = "cycle"

            [[tasks]]
            name = "a"
            kind = "noop"
            upstream = ["b"]

            [[tasks]]
            name = "b"
            kind = "noop"
            upstream = ["a"]
        "#,
    );

    let err = index_flow(&store, root.path(), &manifest_path, false)
        .await
        .unwrap_err();
    assert!(matches!(err, leantask_contracts::IndexError::CyclicGraph));
}
