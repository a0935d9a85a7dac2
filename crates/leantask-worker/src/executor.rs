//! Flow Run Executor (spec.md §4.3): launches a `PENDING` flow-run as a
//! child process, waits for it, and maps its exit to a terminal status.

use std::io::Write;
use std::process::Stdio;
use std::time::Duration;

use leantask_contracts::{ExecutorError, Flow, FlowRun, FlowRunStatus};
use leantask_storage::Store;
use uuid::Uuid;

use crate::context::Context;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Run `flow_run` to completion as a child `leantask flow run` invocation
/// (SPEC_FULL.md §4.3 expansion: "the child process is the same `leantask`
/// binary"). Safe to call concurrently for distinct flow-runs.
///
/// While the child is alive the executor polls the flow-run's stored
/// status: if the tick externally marks it `FAILED_TIMEOUT_RUN` or
/// `CANCELED_BY_USER` (spec.md §5: "the executor is expected to kill the
/// child process when this happens"), the child is killed and that status
/// is returned without waiting for it to exit on its own.
pub async fn execute(
    ctx: &Context,
    store: &Store,
    flow: &Flow,
    flow_run: &FlowRun,
    scheduler_session_id: Uuid,
) -> Result<FlowRunStatus, ExecutorError> {
    let manifest_path = ctx.manifest_path(&flow.path);
    let log_path = ctx.flow_run_log_path(flow.id, flow_run.id);
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let log_file = std::fs::File::create(&log_path)?;
    let log_file_err = log_file.try_clone()?;

    let exe = std::env::current_exe()?;
    let mut child = tokio::process::Command::new(exe)
        .arg("flow")
        .arg("run")
        .arg("--manifest")
        .arg(&manifest_path)
        .arg("--run-id")
        .arg(flow_run.id.to_string())
        .arg("--scheduler-session-id")
        .arg(scheduler_session_id.to_string())
        .stdout(Stdio::from(log_file))
        .stderr(Stdio::from(log_file_err))
        .spawn()
        .map_err(|e| ExecutorError::ChildProcessFailed(e.to_string()))?;

    let exit_status = loop {
        tokio::select! {
            result = child.wait() => {
                break Some(result.map_err(|e| ExecutorError::ChildProcessFailed(e.to_string()))?);
            }
            _ = tokio::time::sleep(POLL_INTERVAL) => {
                let reloaded = store.get_flow_run(flow_run.id).await?;
                if reloaded.status.is_terminal() {
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                    break None;
                }
            }
        }
    };

    let reloaded = store.get_flow_run(flow_run.id).await?;
    if reloaded.status.is_terminal() {
        return Ok(reloaded.status);
    }

    // The child exited without reaching a terminal status itself; the
    // executor forces FAILED (spec.md §4.3).
    if let Some(status) = &exit_status {
        if !status.success() {
            log_abnormal_exit(&log_path, status)?;
        }
    }
    let forced = store
        .transition_flow_run(flow_run.id, FlowRunStatus::Failed)
        .await?;
    Ok(forced.status)
}

fn log_abnormal_exit(
    log_path: &std::path::Path,
    status: &std::process::ExitStatus,
) -> std::io::Result<()> {
    let mut file = std::fs::OpenOptions::new().append(true).open(log_path)?;
    writeln!(file, "\n[executor] child exited abnormally: {status}")
}
