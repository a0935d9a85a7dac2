//! Status enums for the run-state model (spec.md §4.3/§4.4).
//!
//! Numeric values are part of the external contract: every command and
//! every child process exits with the numeric value of the status that
//! applies (spec.md §6), so these discriminants must never be renumbered.

use serde::{Deserialize, Serialize};

/// Outcome of `leantask flow index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum FlowIndexStatus {
    /// Successfully indexed all changes in the flow manifest.
    Updated = 0,
    /// No change was found in the flow manifest.
    Unchanged = 10,
    /// An error occurred while indexing the flow manifest.
    Failed = 20,
}

impl FlowIndexStatus {
    pub fn exit_code(self) -> i32 {
        self as i32
    }
}

/// Outcome of `leantask flow schedule`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum FlowScheduleStatus {
    /// Successfully placed a schedule for the flow.
    Scheduled = 0,
    /// The flow has no reachable next fire-time.
    NoSchedule = 10,
    /// An error occurred while scheduling the flow.
    Failed = 20,
    /// The flow already has a non-terminal schedule within its max-delay window.
    FailedScheduleExists = 21,
}

impl FlowScheduleStatus {
    pub fn exit_code(self) -> i32 {
        self as i32
    }
}

/// Lifecycle of a single flow-run (spec.md §4.4).
///
/// The setter enforces monotonicity: a transition is accepted only if it
/// strictly increases `rank()`. `Done` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum FlowRunStatus {
    Done = 0,
    Unknown = 1,
    Scheduled = 10,
    ScheduledByUser = 11,
    Canceled = 12,
    CanceledByUser = 13,
    /// Claimed by the tick and handed to the worker pool, but not yet
    /// observed running by the child process (spec.md §4.4: a required
    /// rung strictly between `SCHEDULED_BY_USER` and `RUNNING`, so a
    /// flow-run can't be re-selected by a later tick while its child is
    /// still starting up).
    Pending = 15,
    Running = 20,
    Failed = 30,
    FailedTimeoutDelay = 31,
    FailedTimeoutRun = 32,
}

impl FlowRunStatus {
    pub fn exit_code(self) -> i32 {
        self as i32
    }

    /// Monotonicity rank used by the transition setter. `Done` ranks highest
    /// so that it is absorbing even though its exit code is 0.
    pub fn rank(self) -> u8 {
        use FlowRunStatus::*;
        match self {
            Unknown => 0,
            Scheduled | ScheduledByUser => 1,
            Canceled | CanceledByUser => 2,
            Pending => 3,
            Running => 4,
            Failed | FailedTimeoutDelay | FailedTimeoutRun => 5,
            Done => 6,
        }
    }

    pub fn is_terminal(self) -> bool {
        use FlowRunStatus::*;
        matches!(
            self,
            Done | Failed | FailedTimeoutDelay | FailedTimeoutRun | Canceled | CanceledByUser
        )
    }

    /// Can only move strictly forward; `Done` never accepts a further
    /// transition (spec.md §4.4: "Done is absorbing").
    pub fn can_transition_to(self, next: FlowRunStatus) -> bool {
        if self == FlowRunStatus::Done {
            return false;
        }
        next.rank() > self.rank()
    }

    pub fn as_str(self) -> &'static str {
        use FlowRunStatus::*;
        match self {
            Done => "done",
            Unknown => "unknown",
            Scheduled => "scheduled",
            ScheduledByUser => "scheduled_by_user",
            Canceled => "canceled",
            CanceledByUser => "canceled_by_user",
            Pending => "pending",
            Running => "running",
            Failed => "failed",
            FailedTimeoutDelay => "failed_timeout_delay",
            FailedTimeoutRun => "failed_timeout_run",
        }
    }
}

impl std::str::FromStr for FlowRunStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use FlowRunStatus::*;
        Ok(match s {
            "done" => Done,
            "scheduled" => Scheduled,
            "scheduled_by_user" => ScheduledByUser,
            "canceled" => Canceled,
            "canceled_by_user" => CanceledByUser,
            "pending" => Pending,
            "running" => Running,
            "failed" => Failed,
            "failed_timeout_delay" => FailedTimeoutDelay,
            "failed_timeout_run" => FailedTimeoutRun,
            _ => Unknown,
        })
    }
}

impl std::fmt::Display for FlowRunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a single task-run attempt (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum TaskRunStatus {
    Done = 0,
    Unknown = 1,
    Pending = 10,
    Scheduled = 15,
    Canceled = 11,
    Running = 20,
    Failed = 30,
    FailedTimeoutDelay = 31,
    FailedTimeoutRun = 32,
    FailedByUser = 33,
    FailedUpstream = 39,
}

impl TaskRunStatus {
    pub fn exit_code(self) -> i32 {
        self as i32
    }

    pub fn rank(self) -> u8 {
        use TaskRunStatus::*;
        match self {
            Unknown => 0,
            Pending | Scheduled | Canceled => 1,
            Running => 2,
            Failed | FailedTimeoutDelay | FailedTimeoutRun | FailedByUser | FailedUpstream => 3,
            Done => 4,
        }
    }

    pub fn is_terminal(self) -> bool {
        use TaskRunStatus::*;
        matches!(
            self,
            Done | Failed
                | FailedTimeoutDelay
                | FailedTimeoutRun
                | FailedByUser
                | FailedUpstream
                | Canceled
        )
    }

    pub fn is_failure(self) -> bool {
        use TaskRunStatus::*;
        matches!(
            self,
            Failed | FailedTimeoutDelay | FailedTimeoutRun | FailedByUser | FailedUpstream
        )
    }

    pub fn can_transition_to(self, next: TaskRunStatus) -> bool {
        if self == TaskRunStatus::Done {
            return false;
        }
        next.rank() > self.rank()
    }

    pub fn as_str(self) -> &'static str {
        use TaskRunStatus::*;
        match self {
            Done => "done",
            Unknown => "unknown",
            Pending => "pending",
            Scheduled => "scheduled",
            Canceled => "canceled",
            Running => "running",
            Failed => "failed",
            FailedTimeoutDelay => "failed_timeout_delay",
            FailedTimeoutRun => "failed_timeout_run",
            FailedByUser => "failed_by_user",
            FailedUpstream => "failed_upstream",
        }
    }
}

impl std::str::FromStr for TaskRunStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use TaskRunStatus::*;
        Ok(match s {
            "done" => Done,
            "pending" => Pending,
            "scheduled" => Scheduled,
            "canceled" => Canceled,
            "running" => Running,
            "failed" => Failed,
            "failed_timeout_delay" => FailedTimeoutDelay,
            "failed_timeout_run" => FailedTimeoutRun,
            "failed_by_user" => FailedByUser,
            "failed_upstream" => FailedUpstream,
            _ => Unknown,
        })
    }
}

impl std::fmt::Display for TaskRunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flow_run_status_is_monotone() {
        assert!(FlowRunStatus::Scheduled.can_transition_to(FlowRunStatus::Pending));
        assert!(FlowRunStatus::ScheduledByUser.can_transition_to(FlowRunStatus::Pending));
        assert!(FlowRunStatus::Pending.can_transition_to(FlowRunStatus::Running));
        assert!(!FlowRunStatus::Pending.can_transition_to(FlowRunStatus::Scheduled));
        assert!(FlowRunStatus::Running.can_transition_to(FlowRunStatus::Done));
        assert!(!FlowRunStatus::Running.can_transition_to(FlowRunStatus::Scheduled));
        assert!(!FlowRunStatus::Done.can_transition_to(FlowRunStatus::Failed));
    }

    #[test]
    fn task_run_status_is_monotone() {
        assert!(TaskRunStatus::Pending.can_transition_to(TaskRunStatus::Running));
        assert!(TaskRunStatus::Running.can_transition_to(TaskRunStatus::FailedUpstream));
        assert!(!TaskRunStatus::Failed.can_transition_to(TaskRunStatus::Running));
    }

    #[test]
    fn exit_codes_match_the_external_contract() {
        assert_eq!(FlowRunStatus::Done.exit_code(), 0);
        assert_eq!(FlowRunStatus::Unknown.exit_code(), 1);
        assert_eq!(FlowRunStatus::Failed.exit_code(), 30);
        assert_eq!(FlowIndexStatus::Updated.exit_code(), 0);
        assert_eq!(FlowIndexStatus::Unchanged.exit_code(), 10);
        assert_eq!(FlowScheduleStatus::FailedScheduleExists.exit_code(), 21);
    }

    #[test]
    fn round_trips_through_str() {
        for s in [
            FlowRunStatus::Done,
            FlowRunStatus::Scheduled,
            FlowRunStatus::FailedTimeoutRun,
        ] {
            assert_eq!(s.as_str().parse::<FlowRunStatus>().unwrap(), s);
        }
    }
}
