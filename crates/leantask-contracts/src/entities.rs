//! Domain entities (spec.md §3). These are plain in-memory records; the
//! storage crate owns their `sqlx::FromRow` mapping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::status::{FlowRunStatus, TaskRunStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    pub description: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flow {
    pub id: Uuid,
    /// Path to the manifest, relative to the project root.
    pub path: String,
    pub name: String,
    pub description: Option<String>,
    /// Ordered list of cron expressions; empty for manually-run-only flows.
    pub cron_schedules: Vec<String>,
    pub start_datetime: Option<DateTime<Utc>>,
    pub end_datetime: Option<DateTime<Utc>>,
    pub max_delay_secs: Option<i64>,
    /// SHA-256 hex digest of the manifest file at last index time.
    pub checksum: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub flow_id: Uuid,
    pub name: String,
    pub retry_max: u32,
    pub retry_delay_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEdge {
    pub id: Uuid,
    pub source_task_id: Uuid,
    pub downstream_task_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowSchedule {
    pub id: Uuid,
    pub flow_id: Uuid,
    pub schedule_datetime: DateTime<Utc>,
    pub max_delay_secs: Option<i64>,
    pub is_manual: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowRun {
    pub id: Uuid,
    pub flow_id: Uuid,
    pub schedule_id: Option<Uuid>,
    pub schedule_datetime: Option<DateTime<Utc>>,
    pub max_delay_secs: Option<i64>,
    pub is_manual: bool,
    pub status: FlowRunStatus,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRun {
    pub id: Uuid,
    pub flow_run_id: Uuid,
    pub task_id: Uuid,
    pub attempt: u32,
    pub retry_max: u32,
    pub retry_delay_secs: u64,
    pub status: TaskRunStatus,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSession {
    pub id: Uuid,
    pub heartbeat_secs: u64,
    pub worker_count: u32,
    pub log_path: String,
    pub created_at: DateTime<Utc>,
}

/// Append-only mirror of a single operational write (spec.md §3 `LogRecord(X)`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: Uuid,
    pub entity: String,
    pub ref_id: Uuid,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
