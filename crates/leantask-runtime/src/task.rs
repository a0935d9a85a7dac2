//! The `Task` interface (SPEC_FULL.md §4.4 expansion): a named operation
//! with `run(ctx) -> outcome | error`. The engine knows only this
//! interface; built-in kinds are thin adapters over it.

use std::collections::HashMap;

use async_trait::async_trait;
use leantask_contracts::TaskError;

/// What a task's upstream neighbors produced, keyed by task name.
pub type UpstreamOutputs = HashMap<String, serde_json::Value>;

/// The task's declared config (the manifest's `[tasks.config]` table) plus
/// the outputs of its already-completed upstream tasks.
pub struct TaskContext {
    pub task_name: String,
    pub config: toml::Table,
    pub upstream_outputs: UpstreamOutputs,
}

#[derive(Debug, Clone, Default)]
pub struct TaskOutcome {
    pub output: serde_json::Value,
}

#[async_trait]
pub trait Task: Send + Sync {
    async fn run(&self, ctx: &TaskContext) -> Result<TaskOutcome, TaskError>;
}

/// Succeeds immediately with a null output. Used by tests and any task
/// declared `kind = "noop"`.
pub struct NoopTask;

#[async_trait]
impl Task for NoopTask {
    async fn run(&self, _ctx: &TaskContext) -> Result<TaskOutcome, TaskError> {
        Ok(TaskOutcome::default())
    }
}

/// The exit code a shell command uses to signal a deliberate skip rather
/// than a failure, mirroring the original implementation's `TaskSkipped`
/// exception (examples/original_source/leantask/scheduler/task.py).
const SKIP_EXIT_CODE: i32 = 99;

/// Runs a command line through the system shell, capturing stdout as the
/// task's output. A non-zero exit is a `TaskError::Failed`, except for
/// `SKIP_EXIT_CODE` which is a deliberate `TaskError::Skipped`.
pub struct ShellTask;

#[async_trait]
impl Task for ShellTask {
    async fn run(&self, ctx: &TaskContext) -> Result<TaskOutcome, TaskError> {
        let command = ctx
            .config
            .get("command")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                TaskError::Failed(format!(
                    "task '{}' is kind=shell but declares no config.command",
                    ctx.task_name
                ))
            })?;

        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .output()
            .await?;

        if output.status.code() == Some(SKIP_EXIT_CODE) {
            return Err(TaskError::Skipped);
        }

        if !output.status.success() {
            return Err(TaskError::Failed(format!(
                "command exited with {}: {}",
                output
                    .status
                    .code()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string()),
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        Ok(TaskOutcome {
            output: serde_json::Value::String(
                String::from_utf8_lossy(&output.stdout).trim_end().to_string(),
            ),
        })
    }
}

/// Resolve the `Task` implementation for a manifest task kind.
pub fn build(kind: leantask_indexer::TaskKind) -> Box<dyn Task> {
    match kind {
        leantask_indexer::TaskKind::Shell => Box::new(ShellTask),
        leantask_indexer::TaskKind::Noop => Box::new(NoopTask),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_always_succeeds() {
        let ctx = TaskContext {
            task_name: "n".into(),
            config: toml::Table::new(),
            upstream_outputs: HashMap::new(),
        };
        assert!(NoopTask.run(&ctx).await.is_ok());
    }

    #[tokio::test]
    async fn shell_task_captures_stdout() {
        let mut config = toml::Table::new();
        config.insert("command".into(), toml::Value::String("echo hi".into()));
        let ctx = TaskContext {
            task_name: "s".into(),
            config,
            upstream_outputs: HashMap::new(),
        };
        let outcome = ShellTask.run(&ctx).await.unwrap();
        assert_eq!(outcome.output, serde_json::Value::String("hi".into()));
    }

    #[tokio::test]
    async fn shell_task_treats_exit_99_as_skipped() {
        let mut config = toml::Table::new();
        config.insert("command".into(), toml::Value::String("exit 99".into()));
        let ctx = TaskContext {
            task_name: "s".into(),
            config,
            upstream_outputs: HashMap::new(),
        };
        assert!(matches!(ShellTask.run(&ctx).await, Err(TaskError::Skipped)));
    }

    #[tokio::test]
    async fn shell_task_reports_nonzero_exit_as_failed() {
        let mut config = toml::Table::new();
        config.insert("command".into(), toml::Value::String("exit 7".into()));
        let ctx = TaskContext {
            task_name: "s".into(),
            config,
            upstream_outputs: HashMap::new(),
        };
        assert!(matches!(
            ShellTask.run(&ctx).await,
            Err(TaskError::Failed(_))
        ));
    }
}
