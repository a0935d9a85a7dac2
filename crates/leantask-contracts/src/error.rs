// Error taxonomy (spec.md §7), orthogonal to the status enums.

use thiserror::Error;
use uuid::Uuid;

/// Errors from the persistent store (spec.md §4.1).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("unique violation on {0}")]
    UniqueViolation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A schedule/run request refused by the admission rules (spec.md §4.2).
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("flow is inactive")]
    NoSchedule,

    #[error("flow is dirty; reindex before scheduling or running")]
    FailedIndex,

    #[error("flow already has a non-terminal schedule")]
    FailedScheduleExists,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from the flow indexer (spec.md §4.6).
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("failed to read manifest {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse manifest {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("flow manifest declares a cyclic task graph")]
    CyclicGraph,

    #[error("duplicate task name '{0}' within flow")]
    DuplicateTaskName(String),

    #[error("edge references unknown task '{0}'")]
    UnknownTask(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from executing a flow-run as a subprocess (spec.md §4.3).
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("child process failed: {0}")]
    ChildProcessFailed(String),

    #[error("flow run {0} timed out")]
    Timeout(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised while running a single task body (spec.md §4.4).
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task failed: {0}")]
    Failed(String),

    #[error("task was skipped")]
    Skipped,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
