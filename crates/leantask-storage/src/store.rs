//! `Store`: the operational/log database pair (spec.md §4.1).

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use uuid::Uuid;

use leantask_contracts::{
    Flow, FlowRun, FlowRunStatus, FlowSchedule, Project, SchedulerSession, StoreError, Task,
    TaskEdge, TaskRun, TaskRunStatus,
};

use crate::log;
use crate::models::{
    to_rfc3339, FlowRow, FlowRunRow, FlowScheduleRow, NewEdge, NewFlow, NewTask,
    SchedulerSessionRow, TaskEdgeRow, TaskRow, TaskRunRow,
};
use crate::operational;

/// The two project-local SQLite databases, opened side by side.
#[derive(Clone)]
pub struct Store {
    operational: SqlitePool,
    log: SqlitePool,
}

impl Store {
    /// Open (creating if absent) the two databases rooted at `dir`, which
    /// must already exist. Runs idempotent schema setup on both.
    pub async fn open(dir: &Path) -> Result<Self, StoreError> {
        let operational = open_pool(&dir.join("operational.db")).await?;
        let log_pool = open_pool(&dir.join("log.db")).await?;

        operational::ensure_schema(&operational).await?;
        log::ensure_schema(&log_pool).await?;

        Ok(Self {
            operational,
            log: log_pool,
        })
    }

    /// Create a brand new project at `dir`. Refuses if `dir` already
    /// contains a non-empty `operational.db`, unless `replace` is set, in
    /// which case the existing directory is renamed to a timestamped
    /// backup before recreation (spec.md §4.1 Initialization).
    pub async fn init_project(
        dir: &Path,
        name: &str,
        description: Option<&str>,
        replace: bool,
    ) -> Result<Self, StoreError> {
        let op_path = dir.join("operational.db");
        if op_path.exists() {
            if !replace {
                return Err(StoreError::Conflict(format!(
                    "{} already has a project; pass replace=true to overwrite",
                    dir.display()
                )));
            }
            backup_existing(dir)?;
        }

        std::fs::create_dir_all(dir)?;
        let store = Self::open(dir).await?;

        let now = Utc::now();
        sqlx::query(
            "INSERT INTO project (name, description, active, created_at, modified_at) \
             VALUES (?, ?, 1, ?, ?)",
        )
        .bind(name)
        .bind(description)
        .bind(to_rfc3339(now))
        .bind(to_rfc3339(now))
        .execute(&store.operational)
        .await?;

        Ok(store)
    }

    pub fn operational_pool(&self) -> &SqlitePool {
        &self.operational
    }

    pub fn log_pool(&self) -> &SqlitePool {
        &self.log
    }

    pub async fn begin(&self) -> Result<sqlx::Transaction<'_, sqlx::Sqlite>, StoreError> {
        Ok(self.operational.begin().await?)
    }

    // ================= Project =================

    pub async fn get_project(&self) -> Result<Option<Project>, StoreError> {
        let row = sqlx::query_as::<_, crate::models::ProjectRow>(
            "SELECT name, description, active, created_at, modified_at FROM project LIMIT 1",
        )
        .fetch_optional(&self.operational)
        .await?;
        Ok(row.map(Into::into))
    }

    // ================= Flows =================

    pub async fn get_flow(&self, id: Uuid) -> Result<Flow, StoreError> {
        let row = sqlx::query_as::<_, FlowRow>(
            "SELECT id, path, name, description, cron_schedules, start_datetime, end_datetime, \
             max_delay_secs, checksum, active, created_at, modified_at FROM flows WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.operational)
        .await?
        .ok_or(StoreError::NotFound {
            entity: "flow",
            id,
        })?;
        Ok(row.into())
    }

    pub async fn get_flow_by_path(&self, path: &str) -> Result<Option<Flow>, StoreError> {
        let row = sqlx::query_as::<_, FlowRow>(
            "SELECT id, path, name, description, cron_schedules, start_datetime, end_datetime, \
             max_delay_secs, checksum, active, created_at, modified_at FROM flows WHERE path = ?",
        )
        .bind(path)
        .fetch_optional(&self.operational)
        .await?;
        Ok(row.map(Into::into))
    }

    pub async fn get_flow_by_name(&self, name: &str) -> Result<Option<Flow>, StoreError> {
        let row = sqlx::query_as::<_, FlowRow>(
            "SELECT id, path, name, description, cron_schedules, start_datetime, end_datetime, \
             max_delay_secs, checksum, active, created_at, modified_at FROM flows WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.operational)
        .await?;
        Ok(row.map(Into::into))
    }

    pub async fn list_flows(&self) -> Result<Vec<Flow>, StoreError> {
        let rows = sqlx::query_as::<_, FlowRow>(
            "SELECT id, path, name, description, cron_schedules, start_datetime, end_datetime, \
             max_delay_secs, checksum, active, created_at, modified_at FROM flows ORDER BY name",
        )
        .fetch_all(&self.operational)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Create a flow and mirror it, in one transaction.
    pub async fn create_flow(&self, input: NewFlow) -> Result<Flow, StoreError> {
        let now = Utc::now();
        let id = Uuid::new_v4();
        let cron_json = serde_json::to_string(&input.cron_schedules).unwrap_or_default();

        let mut tx = self.begin().await?;
        sqlx::query(
            "INSERT INTO flows (id, path, name, description, cron_schedules, start_datetime, \
             end_datetime, max_delay_secs, checksum, active, created_at, modified_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(&input.path)
        .bind(&input.name)
        .bind(&input.description)
        .bind(&cron_json)
        .bind(input.start_datetime.map(to_rfc3339))
        .bind(input.end_datetime.map(to_rfc3339))
        .bind(input.max_delay_secs)
        .bind(&input.checksum)
        .bind(input.active)
        .bind(to_rfc3339(now))
        .bind(to_rfc3339(now))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        let flow = self.get_flow(id).await?;
        self.mirror_flow(&flow).await?;
        Ok(flow)
    }

    /// Atomically reindex an existing flow: update its declared fields
    /// (name/description/schedule/checksum) and replace its task graph in
    /// one transaction, so a graph-validation/insert failure can never
    /// leave a committed checksum pointing at a stale or partial graph
    /// (spec.md §4.6 steps 3-6: "Open a transaction... Commit... Any
    /// failure ⇒ rollback").
    #[allow(clippy::too_many_arguments)]
    pub async fn reindex_flow(
        &self,
        id: Uuid,
        name: &str,
        description: Option<&str>,
        cron_schedules: &[String],
        start_datetime: Option<DateTime<Utc>>,
        end_datetime: Option<DateTime<Utc>>,
        max_delay_secs: Option<i64>,
        checksum: &str,
        tasks: &[NewTask],
        edges: &[NewEdge],
    ) -> Result<Flow, StoreError> {
        let now = Utc::now();
        let cron_json = serde_json::to_string(cron_schedules).unwrap_or_default();

        let mut tx = self.begin().await?;

        let result = sqlx::query(
            "UPDATE flows SET name = ?, description = ?, cron_schedules = ?, start_datetime = ?, \
             end_datetime = ?, max_delay_secs = ?, checksum = ?, modified_at = ? WHERE id = ?",
        )
        .bind(name)
        .bind(description)
        .bind(&cron_json)
        .bind(start_datetime.map(to_rfc3339))
        .bind(end_datetime.map(to_rfc3339))
        .bind(max_delay_secs)
        .bind(checksum)
        .bind(to_rfc3339(now))
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "flow",
                id,
            });
        }

        replace_task_graph_in(&mut tx, id, tasks, edges).await?;

        tx.commit().await?;

        let flow = self.get_flow(id).await?;
        self.mirror_flow(&flow).await?;
        Ok(flow)
    }

    pub async fn set_flow_active(&self, id: Uuid, active: bool) -> Result<(), StoreError> {
        sqlx::query("UPDATE flows SET active = ?, modified_at = ? WHERE id = ?")
            .bind(active)
            .bind(to_rfc3339(Utc::now()))
            .bind(id.to_string())
            .execute(&self.operational)
            .await?;
        Ok(())
    }

    pub async fn delete_flow(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM flows WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.operational)
            .await?;
        Ok(())
    }

    async fn mirror_flow(&self, flow: &Flow) -> Result<(), StoreError> {
        log::append(&self.log, "flow", flow.id, json!(flow)).await?;
        Ok(())
    }

    // ================= Tasks & Edges =================

    pub async fn list_tasks(&self, flow_id: Uuid) -> Result<Vec<Task>, StoreError> {
        let rows = sqlx::query_as::<_, TaskRow>(
            "SELECT id, flow_id, name, retry_max, retry_delay_secs FROM tasks WHERE flow_id = ? \
             ORDER BY name",
        )
        .bind(flow_id.to_string())
        .fetch_all(&self.operational)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn list_edges(&self, flow_id: Uuid) -> Result<Vec<TaskEdge>, StoreError> {
        let rows = sqlx::query_as::<_, TaskEdgeRow>(
            "SELECT e.id, e.source_task_id, e.downstream_task_id FROM task_edges e \
             JOIN tasks t ON t.id = e.source_task_id WHERE t.flow_id = ?",
        )
        .bind(flow_id.to_string())
        .fetch_all(&self.operational)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Atomically replace a flow's entire task graph on its own, used
    /// directly by tests that set up a graph without going through a full
    /// reindex.
    pub async fn replace_task_graph(
        &self,
        flow_id: Uuid,
        tasks: &[NewTask],
        edges: &[NewEdge],
    ) -> Result<(), StoreError> {
        let mut tx = self.begin().await?;
        replace_task_graph_in(&mut tx, flow_id, tasks, edges).await?;
        tx.commit().await?;
        Ok(())
    }

    // ================= Flow Schedules =================

    pub async fn get_schedule(&self, id: Uuid) -> Result<FlowSchedule, StoreError> {
        let row = sqlx::query_as::<_, FlowScheduleRow>(
            "SELECT id, flow_id, schedule_datetime, max_delay_secs, is_manual, created_at \
             FROM flow_schedules WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.operational)
        .await?
        .ok_or(StoreError::NotFound {
            entity: "flow_schedule",
            id,
        })?;
        Ok(row.into())
    }

    /// The schedule currently bound to `flow_id`, if any (spec.md §4.2
    /// admission rules assume at most one live schedule per flow).
    pub async fn get_active_schedule(
        &self,
        flow_id: Uuid,
    ) -> Result<Option<FlowSchedule>, StoreError> {
        let row = sqlx::query_as::<_, FlowScheduleRow>(
            "SELECT id, flow_id, schedule_datetime, max_delay_secs, is_manual, created_at \
             FROM flow_schedules WHERE flow_id = ? ORDER BY created_at DESC LIMIT 1",
        )
        .bind(flow_id.to_string())
        .fetch_optional(&self.operational)
        .await?;
        Ok(row.map(Into::into))
    }

    pub async fn create_schedule(
        &self,
        flow_id: Uuid,
        schedule_datetime: DateTime<Utc>,
        max_delay_secs: Option<i64>,
        is_manual: bool,
    ) -> Result<FlowSchedule, StoreError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO flow_schedules (id, flow_id, schedule_datetime, max_delay_secs, \
             is_manual, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(flow_id.to_string())
        .bind(to_rfc3339(schedule_datetime))
        .bind(max_delay_secs)
        .bind(is_manual)
        .bind(to_rfc3339(now))
        .execute(&self.operational)
        .await?;

        let schedule = self.get_schedule(id).await?;
        log::append(&self.log, "flow_schedule", id, json!(schedule)).await?;
        Ok(schedule)
    }

    pub async fn delete_schedule(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM flow_schedules WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.operational)
            .await?;
        Ok(())
    }

    /// Schedules with no non-terminal flow-run referencing them anymore
    /// (spec.md §4.2 step 5: cleanup).
    pub async fn list_orphaned_schedules(&self) -> Result<Vec<FlowSchedule>, StoreError> {
        let rows = sqlx::query_as::<_, FlowScheduleRow>(
            "SELECT s.id, s.flow_id, s.schedule_datetime, s.max_delay_secs, s.is_manual, \
             s.created_at FROM flow_schedules s \
             WHERE NOT EXISTS ( \
                SELECT 1 FROM flow_runs r WHERE r.schedule_id = s.id \
                AND r.status IN ('scheduled', 'scheduled_by_user', 'running') \
             )",
        )
        .fetch_all(&self.operational)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    // ================= Flow Runs =================

    pub async fn get_flow_run(&self, id: Uuid) -> Result<FlowRun, StoreError> {
        let row = sqlx::query_as::<_, FlowRunRow>(
            "SELECT id, flow_id, schedule_id, schedule_datetime, max_delay_secs, is_manual, \
             status, created_at, modified_at, started_at FROM flow_runs WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.operational)
        .await?
        .ok_or(StoreError::NotFound {
            entity: "flow_run",
            id,
        })?;
        Ok(row.into())
    }

    pub async fn list_flow_runs(&self, flow_id: Uuid) -> Result<Vec<FlowRun>, StoreError> {
        let rows = sqlx::query_as::<_, FlowRunRow>(
            "SELECT id, flow_id, schedule_id, schedule_datetime, max_delay_secs, is_manual, \
             status, created_at, modified_at, started_at FROM flow_runs WHERE flow_id = ? \
             ORDER BY created_at DESC",
        )
        .bind(flow_id.to_string())
        .fetch_all(&self.operational)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Flow-runs bound to a schedule that is due, plus unbound non-terminal
    /// runs (spec.md §4.2 step 4: harvest due and unfinished runs).
    pub async fn list_due_flow_runs(&self, now: DateTime<Utc>) -> Result<Vec<FlowRun>, StoreError> {
        let rows = sqlx::query_as::<_, FlowRunRow>(
            "SELECT id, flow_id, schedule_id, schedule_datetime, max_delay_secs, is_manual, \
             status, created_at, modified_at, started_at FROM flow_runs \
             WHERE (schedule_id IS NOT NULL AND schedule_datetime <= ? \
                    AND status IN ('scheduled', 'scheduled_by_user', 'running')) \
                OR (schedule_id IS NULL \
                    AND status IN ('scheduled', 'scheduled_by_user', 'running'))",
        )
        .bind(to_rfc3339(now))
        .fetch_all(&self.operational)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn create_flow_run(
        &self,
        flow_id: Uuid,
        schedule_id: Option<Uuid>,
        schedule_datetime: Option<DateTime<Utc>>,
        max_delay_secs: Option<i64>,
        is_manual: bool,
        status: FlowRunStatus,
    ) -> Result<FlowRun, StoreError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO flow_runs (id, flow_id, schedule_id, schedule_datetime, \
             max_delay_secs, is_manual, status, created_at, modified_at, started_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, NULL)",
        )
        .bind(id.to_string())
        .bind(flow_id.to_string())
        .bind(schedule_id.map(|s| s.to_string()))
        .bind(schedule_datetime.map(to_rfc3339))
        .bind(max_delay_secs)
        .bind(is_manual)
        .bind(status.as_str())
        .bind(to_rfc3339(now))
        .bind(to_rfc3339(now))
        .execute(&self.operational)
        .await?;

        let run = self.get_flow_run(id).await?;
        self.mirror_flow_run(&run).await?;
        Ok(run)
    }

    /// Monotonic status transition (spec.md §4.4). Returns `Conflict` if
    /// the transition would move the run backwards.
    pub async fn transition_flow_run(
        &self,
        id: Uuid,
        next: FlowRunStatus,
    ) -> Result<FlowRun, StoreError> {
        let current = self.get_flow_run(id).await?;
        if !current.status.can_transition_to(next) {
            return Err(StoreError::Conflict(format!(
                "flow_run {id} cannot move from {} to {next}",
                current.status
            )));
        }

        let now = Utc::now();
        let started_at = if next == FlowRunStatus::Running && current.started_at.is_none() {
            Some(to_rfc3339(now))
        } else {
            current.started_at.map(to_rfc3339)
        };

        sqlx::query(
            "UPDATE flow_runs SET status = ?, modified_at = ?, started_at = ? WHERE id = ?",
        )
        .bind(next.as_str())
        .bind(to_rfc3339(now))
        .bind(started_at)
        .bind(id.to_string())
        .execute(&self.operational)
        .await?;

        let run = self.get_flow_run(id).await?;
        self.mirror_flow_run(&run).await?;
        Ok(run)
    }

    async fn mirror_flow_run(&self, run: &FlowRun) -> Result<(), StoreError> {
        log::append(&self.log, "flow_run", run.id, json!(run)).await?;
        Ok(())
    }

    /// Cancel a flow-run regardless of its current rank, cascading to any
    /// task-run still in `{PENDING, SCHEDULED}` (spec.md §4.4: "Entering
    /// CANCELED* cascades task-runs still in {SCHEDULED, PENDING}").
    /// A no-op if the run is already terminal.
    pub async fn cancel_flow_run(&self, id: Uuid, by_user: bool) -> Result<FlowRun, StoreError> {
        let current = self.get_flow_run(id).await?;
        if current.status.is_terminal() {
            return Ok(current);
        }

        let next = if by_user {
            FlowRunStatus::CanceledByUser
        } else {
            FlowRunStatus::Canceled
        };
        sqlx::query("UPDATE flow_runs SET status = ?, modified_at = ? WHERE id = ?")
            .bind(next.as_str())
            .bind(to_rfc3339(Utc::now()))
            .bind(id.to_string())
            .execute(&self.operational)
            .await?;

        let run = self.get_flow_run(id).await?;
        self.mirror_flow_run(&run).await?;

        for task_run in self.list_task_runs(id).await? {
            if matches!(task_run.status, TaskRunStatus::Pending | TaskRunStatus::Scheduled) {
                self.cancel_task_run(task_run.id).await?;
            }
        }

        Ok(run)
    }

    // ================= Task Runs =================

    pub async fn get_task_run(&self, id: Uuid) -> Result<TaskRun, StoreError> {
        let row = sqlx::query_as::<_, TaskRunRow>(
            "SELECT id, flow_run_id, task_id, attempt, retry_max, retry_delay_secs, status, \
             created_at, modified_at, started_at FROM task_runs WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.operational)
        .await?
        .ok_or(StoreError::NotFound {
            entity: "task_run",
            id,
        })?;
        Ok(row.into())
    }

    pub async fn list_task_runs(&self, flow_run_id: Uuid) -> Result<Vec<TaskRun>, StoreError> {
        let rows = sqlx::query_as::<_, TaskRunRow>(
            "SELECT id, flow_run_id, task_id, attempt, retry_max, retry_delay_secs, status, \
             created_at, modified_at, started_at FROM task_runs WHERE flow_run_id = ? \
             ORDER BY created_at ASC",
        )
        .bind(flow_run_id.to_string())
        .fetch_all(&self.operational)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn create_task_run(
        &self,
        flow_run_id: Uuid,
        task_id: Uuid,
        retry_max: u32,
        retry_delay_secs: u64,
        status: TaskRunStatus,
    ) -> Result<TaskRun, StoreError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO task_runs (id, flow_run_id, task_id, attempt, retry_max, \
             retry_delay_secs, status, created_at, modified_at, started_at) \
             VALUES (?, ?, ?, 1, ?, ?, ?, ?, ?, NULL)",
        )
        .bind(id.to_string())
        .bind(flow_run_id.to_string())
        .bind(task_id.to_string())
        .bind(retry_max as i64)
        .bind(retry_delay_secs as i64)
        .bind(status.as_str())
        .bind(to_rfc3339(now))
        .bind(to_rfc3339(now))
        .execute(&self.operational)
        .await?;

        let run = self.get_task_run(id).await?;
        self.mirror_task_run(&run).await?;
        Ok(run)
    }

    pub async fn transition_task_run(
        &self,
        id: Uuid,
        next: TaskRunStatus,
    ) -> Result<TaskRun, StoreError> {
        let current = self.get_task_run(id).await?;
        if !current.status.can_transition_to(next) {
            return Err(StoreError::Conflict(format!(
                "task_run {id} cannot move from {} to {next}",
                current.status
            )));
        }

        let now = Utc::now();
        let started_at = if next == TaskRunStatus::Running && current.started_at.is_none() {
            Some(to_rfc3339(now))
        } else {
            current.started_at.map(to_rfc3339)
        };

        sqlx::query(
            "UPDATE task_runs SET status = ?, modified_at = ?, started_at = ? WHERE id = ?",
        )
        .bind(next.as_str())
        .bind(to_rfc3339(now))
        .bind(started_at)
        .bind(id.to_string())
        .execute(&self.operational)
        .await?;

        let run = self.get_task_run(id).await?;
        self.mirror_task_run(&run).await?;
        Ok(run)
    }

    /// Force a task-run into CANCELED regardless of its current rank
    /// (spec.md §4.4: a task signaling "skip" is reported CANCELED, not
    /// FAILED, from whatever state the attempt was in). A no-op if the
    /// run is already terminal.
    pub async fn cancel_task_run(&self, id: Uuid) -> Result<TaskRun, StoreError> {
        let current = self.get_task_run(id).await?;
        if current.status.is_terminal() {
            return Ok(current);
        }

        sqlx::query("UPDATE task_runs SET status = 'canceled', modified_at = ? WHERE id = ?")
            .bind(to_rfc3339(Utc::now()))
            .bind(id.to_string())
            .execute(&self.operational)
            .await?;

        let run = self.get_task_run(id).await?;
        self.mirror_task_run(&run).await?;
        Ok(run)
    }

    /// Create the next attempt's task-run row, distinct from the previous
    /// one (spec.md §4.4: "create a new task-run row for the next
    /// attempt"; §8: `(flow_run_id, task_id, attempt)` is unique).
    pub async fn create_retry_task_run(
        &self,
        previous_id: Uuid,
    ) -> Result<TaskRun, StoreError> {
        let previous = self.get_task_run(previous_id).await?;
        let id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO task_runs (id, flow_run_id, task_id, attempt, retry_max, \
             retry_delay_secs, status, created_at, modified_at, started_at) \
             VALUES (?, ?, ?, ?, ?, ?, 'pending', ?, ?, NULL)",
        )
        .bind(id.to_string())
        .bind(previous.flow_run_id.to_string())
        .bind(previous.task_id.to_string())
        .bind(previous.attempt as i64 + 1)
        .bind(previous.retry_max as i64)
        .bind(previous.retry_delay_secs as i64)
        .bind(to_rfc3339(now))
        .bind(to_rfc3339(now))
        .execute(&self.operational)
        .await?;

        let run = self.get_task_run(id).await?;
        self.mirror_task_run(&run).await?;
        Ok(run)
    }

    async fn mirror_task_run(&self, run: &TaskRun) -> Result<(), StoreError> {
        log::append(&self.log, "task_run", run.id, json!(run)).await?;
        Ok(())
    }

    // ================= Scheduler Sessions =================

    pub async fn create_scheduler_session(
        &self,
        heartbeat_secs: u64,
        worker_count: u32,
        log_path: &str,
    ) -> Result<SchedulerSession, StoreError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO scheduler_sessions (id, heartbeat_secs, worker_count, log_path, \
             created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(heartbeat_secs as i64)
        .bind(worker_count as i64)
        .bind(log_path)
        .bind(to_rfc3339(now))
        .execute(&self.operational)
        .await?;

        let row = sqlx::query_as::<_, SchedulerSessionRow>(
            "SELECT id, heartbeat_secs, worker_count, log_path, created_at \
             FROM scheduler_sessions WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_one(&self.operational)
        .await?;

        let session: SchedulerSession = row.into();
        log::append(&self.log, "scheduler_session", id, json!(session)).await?;
        Ok(session)
    }

    // ================= Log mirror (read side) =================

    pub async fn log_for(
        &self,
        entity: &str,
        ref_id: Uuid,
    ) -> Result<Vec<leantask_contracts::LogRecord>, StoreError> {
        log::list_for(&self.log, entity, ref_id).await
    }
}

/// Delete-then-insert a flow's task graph against an already-open
/// transaction, shared by `replace_task_graph` (its own transaction) and
/// `reindex_flow` (folded into the flow-field UPDATE's transaction).
async fn replace_task_graph_in(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    flow_id: Uuid,
    tasks: &[NewTask],
    edges: &[NewEdge],
) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM tasks WHERE flow_id = ?")
        .bind(flow_id.to_string())
        .execute(&mut *tx)
        .await?;

    let mut ids_by_name = std::collections::HashMap::new();
    for task in tasks {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO tasks (id, flow_id, name, retry_max, retry_delay_secs) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(flow_id.to_string())
        .bind(&task.name)
        .bind(task.retry_max as i64)
        .bind(task.retry_delay_secs as i64)
        .execute(&mut *tx)
        .await?;
        ids_by_name.insert(task.name.clone(), id);
    }

    for (source_name, downstream_name) in edges {
        let source_id = *ids_by_name.get(source_name).ok_or_else(|| {
            StoreError::Conflict(format!("edge references unknown task '{source_name}'"))
        })?;
        let downstream_id = *ids_by_name.get(downstream_name).ok_or_else(|| {
            StoreError::Conflict(format!(
                "edge references unknown task '{downstream_name}'"
            ))
        })?;
        sqlx::query(
            "INSERT INTO task_edges (id, source_task_id, downstream_task_id) \
             VALUES (?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(source_id.to_string())
        .bind(downstream_id.to_string())
        .execute(&mut *tx)
        .await?;
    }

    Ok(())
}

async fn open_pool(path: &Path) -> Result<SqlitePool, StoreError> {
    let url = format!("sqlite://{}", path.display());
    let options = SqliteConnectOptions::from_str(&url)
        .map_err(StoreError::from)?
        .create_if_missing(true);
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .map_err(StoreError::from)
}

fn backup_existing(dir: &Path) -> Result<(), StoreError> {
    let stamp = Utc::now().format("%Y%m%dT%H%M%S");
    let backup: PathBuf = dir.with_file_name(format!(
        "{}-backup-{stamp}",
        dir.file_name().and_then(|n| n.to_str()).unwrap_or("project")
    ));
    std::fs::rename(dir, backup)?;
    Ok(())
}
