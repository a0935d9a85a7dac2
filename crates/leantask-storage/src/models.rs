// Row <-> entity conversions. SQLite has no native timestamp or array
// type, so timestamps are stored as RFC3339 text and the cron expression
// list as a JSON array, decoded back into the domain entities on read.

use chrono::{DateTime, Utc};
use leantask_contracts::{
    Flow, FlowRun, FlowSchedule, LogRecord, Project, SchedulerSession, Task, TaskEdge, TaskRun,
};
use leantask_contracts::{FlowRunStatus, TaskRunStatus};
use sqlx::FromRow;
use uuid::Uuid;

pub(crate) fn to_rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

pub(crate) fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .expect("stored timestamp is always RFC3339")
        .with_timezone(&Utc)
}

pub(crate) fn parse_ts_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.map(|s| parse_ts(&s))
}

#[derive(Debug, Clone, FromRow)]
pub struct ProjectRow {
    pub name: String,
    pub description: Option<String>,
    pub active: bool,
    pub created_at: String,
    pub modified_at: String,
}

impl From<ProjectRow> for Project {
    fn from(r: ProjectRow) -> Self {
        Project {
            name: r.name,
            description: r.description,
            active: r.active,
            created_at: parse_ts(&r.created_at),
            modified_at: parse_ts(&r.modified_at),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct FlowRow {
    pub id: String,
    pub path: String,
    pub name: String,
    pub description: Option<String>,
    pub cron_schedules: String,
    pub start_datetime: Option<String>,
    pub end_datetime: Option<String>,
    pub max_delay_secs: Option<i64>,
    pub checksum: String,
    pub active: bool,
    pub created_at: String,
    pub modified_at: String,
}

impl From<FlowRow> for Flow {
    fn from(r: FlowRow) -> Self {
        Flow {
            id: Uuid::parse_str(&r.id).expect("stored id is always a UUID"),
            path: r.path,
            name: r.name,
            description: r.description,
            cron_schedules: serde_json::from_str(&r.cron_schedules).unwrap_or_default(),
            start_datetime: parse_ts_opt(r.start_datetime),
            end_datetime: parse_ts_opt(r.end_datetime),
            max_delay_secs: r.max_delay_secs,
            checksum: r.checksum,
            active: r.active,
            created_at: parse_ts(&r.created_at),
            modified_at: parse_ts(&r.modified_at),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct TaskRow {
    pub id: String,
    pub flow_id: String,
    pub name: String,
    pub retry_max: i64,
    pub retry_delay_secs: i64,
}

impl From<TaskRow> for Task {
    fn from(r: TaskRow) -> Self {
        Task {
            id: Uuid::parse_str(&r.id).unwrap(),
            flow_id: Uuid::parse_str(&r.flow_id).unwrap(),
            name: r.name,
            retry_max: r.retry_max as u32,
            retry_delay_secs: r.retry_delay_secs as u64,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct TaskEdgeRow {
    pub id: String,
    pub source_task_id: String,
    pub downstream_task_id: String,
}

impl From<TaskEdgeRow> for TaskEdge {
    fn from(r: TaskEdgeRow) -> Self {
        TaskEdge {
            id: Uuid::parse_str(&r.id).unwrap(),
            source_task_id: Uuid::parse_str(&r.source_task_id).unwrap(),
            downstream_task_id: Uuid::parse_str(&r.downstream_task_id).unwrap(),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct FlowScheduleRow {
    pub id: String,
    pub flow_id: String,
    pub schedule_datetime: String,
    pub max_delay_secs: Option<i64>,
    pub is_manual: bool,
    pub created_at: String,
}

impl From<FlowScheduleRow> for FlowSchedule {
    fn from(r: FlowScheduleRow) -> Self {
        FlowSchedule {
            id: Uuid::parse_str(&r.id).unwrap(),
            flow_id: Uuid::parse_str(&r.flow_id).unwrap(),
            schedule_datetime: parse_ts(&r.schedule_datetime),
            max_delay_secs: r.max_delay_secs,
            is_manual: r.is_manual,
            created_at: parse_ts(&r.created_at),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct FlowRunRow {
    pub id: String,
    pub flow_id: String,
    pub schedule_id: Option<String>,
    pub schedule_datetime: Option<String>,
    pub max_delay_secs: Option<i64>,
    pub is_manual: bool,
    pub status: String,
    pub created_at: String,
    pub modified_at: String,
    pub started_at: Option<String>,
}

impl From<FlowRunRow> for FlowRun {
    fn from(r: FlowRunRow) -> Self {
        FlowRun {
            id: Uuid::parse_str(&r.id).unwrap(),
            flow_id: Uuid::parse_str(&r.flow_id).unwrap(),
            schedule_id: r.schedule_id.map(|s| Uuid::parse_str(&s).unwrap()),
            schedule_datetime: parse_ts_opt(r.schedule_datetime),
            max_delay_secs: r.max_delay_secs,
            is_manual: r.is_manual,
            status: r.status.parse::<FlowRunStatus>().unwrap(),
            created_at: parse_ts(&r.created_at),
            modified_at: parse_ts(&r.modified_at),
            started_at: parse_ts_opt(r.started_at),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct TaskRunRow {
    pub id: String,
    pub flow_run_id: String,
    pub task_id: String,
    pub attempt: i64,
    pub retry_max: i64,
    pub retry_delay_secs: i64,
    pub status: String,
    pub created_at: String,
    pub modified_at: String,
    pub started_at: Option<String>,
}

impl From<TaskRunRow> for TaskRun {
    fn from(r: TaskRunRow) -> Self {
        TaskRun {
            id: Uuid::parse_str(&r.id).unwrap(),
            flow_run_id: Uuid::parse_str(&r.flow_run_id).unwrap(),
            task_id: Uuid::parse_str(&r.task_id).unwrap(),
            attempt: r.attempt as u32,
            retry_max: r.retry_max as u32,
            retry_delay_secs: r.retry_delay_secs as u64,
            status: r.status.parse::<TaskRunStatus>().unwrap(),
            created_at: parse_ts(&r.created_at),
            modified_at: parse_ts(&r.modified_at),
            started_at: parse_ts_opt(r.started_at),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct SchedulerSessionRow {
    pub id: String,
    pub heartbeat_secs: i64,
    pub worker_count: i64,
    pub log_path: String,
    pub created_at: String,
}

impl From<SchedulerSessionRow> for SchedulerSession {
    fn from(r: SchedulerSessionRow) -> Self {
        SchedulerSession {
            id: Uuid::parse_str(&r.id).unwrap(),
            heartbeat_secs: r.heartbeat_secs as u64,
            worker_count: r.worker_count as u32,
            log_path: r.log_path,
            created_at: parse_ts(&r.created_at),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct LogRecordRow {
    pub id: String,
    pub entity: String,
    pub ref_id: String,
    pub payload: String,
    pub created_at: String,
}

impl From<LogRecordRow> for LogRecord {
    fn from(r: LogRecordRow) -> Self {
        LogRecord {
            id: Uuid::parse_str(&r.id).unwrap(),
            entity: r.entity,
            ref_id: Uuid::parse_str(&r.ref_id).unwrap(),
            payload: serde_json::from_str(&r.payload).unwrap_or(serde_json::Value::Null),
            created_at: parse_ts(&r.created_at),
        }
    }
}

/// Input for creating a flow. `checksum` must be computed by the caller
/// (the indexer) so this crate stays hash-agnostic.
#[derive(Debug, Clone)]
pub struct NewFlow {
    pub path: String,
    pub name: String,
    pub description: Option<String>,
    pub cron_schedules: Vec<String>,
    pub start_datetime: Option<DateTime<Utc>>,
    pub end_datetime: Option<DateTime<Utc>>,
    pub max_delay_secs: Option<i64>,
    pub checksum: String,
    pub active: bool,
}

#[derive(Debug, Clone)]
pub struct NewTask {
    pub name: String,
    pub retry_max: u32,
    pub retry_delay_secs: u64,
}

/// `(source task name, downstream task name)` edges resolved against the
/// task ids assigned by `Store::replace_tasks`.
pub type NewEdge = (String, String);
