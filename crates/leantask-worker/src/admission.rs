//! Admission rules for (re)scheduling a flow (spec.md §4.2).

use chrono::{DateTime, Utc};
use leantask_contracts::{AdmissionError, Flow, FlowRunStatus, FlowSchedule, StoreError};
use leantask_storage::Store;

/// Outcome of `check_admission`: either the flow may be scheduled fresh,
/// or an existing schedule/run must be cleared (terminal, silently) or
/// timed out (mark `FAILED_TIMEOUT_DELAY`) before scheduling continues.
#[derive(Debug, PartialEq, Eq)]
pub enum Admission {
    /// No live schedule; safe to place a new one.
    Clear,
    /// The bound run was terminal; its schedule was just deleted.
    ClearedStale,
    /// The bound run's max-delay elapsed; it and its task-runs were just
    /// marked `FAILED_TIMEOUT_DELAY` and the schedule was deleted.
    TimedOut,
}

/// Apply spec.md §4.2's admission rules for flow `flow`, given its current
/// schedule (if any) bound to a flow-run. `force` overrides
/// `FailedScheduleExists` only, per spec.md §4.2.
pub async fn check_admission(
    store: &Store,
    flow: &Flow,
    now: DateTime<Utc>,
    force: bool,
) -> Result<Admission, AdmissionError> {
    if !flow.active {
        return Err(AdmissionError::NoSchedule);
    }

    let Some(schedule) = store.get_active_schedule(flow.id).await? else {
        return Ok(Admission::Clear);
    };

    let bound_run = find_run_for_schedule(store, &schedule).await?;

    let Some(run) = bound_run else {
        // Schedule with no run left referencing it; treat as stale.
        store.delete_schedule(schedule.id).await?;
        return Ok(Admission::ClearedStale);
    };

    if run.status.is_terminal() {
        store.delete_schedule(schedule.id).await?;
        return Ok(Admission::ClearedStale);
    }

    let deadline = schedule
        .max_delay_secs
        .map(|secs| schedule.schedule_datetime + chrono::Duration::seconds(secs));

    if let Some(deadline) = deadline {
        if deadline <= now {
            store
                .transition_flow_run(run.id, FlowRunStatus::FailedTimeoutDelay)
                .await?;
            for task_run in store.list_task_runs(run.id).await? {
                if !task_run.status.is_terminal() {
                    let _ = store
                        .transition_task_run(
                            task_run.id,
                            leantask_contracts::TaskRunStatus::FailedTimeoutDelay,
                        )
                        .await;
                }
            }
            store.delete_schedule(schedule.id).await?;
            return Ok(Admission::TimedOut);
        }

        if !force {
            return Err(AdmissionError::FailedScheduleExists);
        }
    } else if !force {
        return Err(AdmissionError::FailedScheduleExists);
    }

    // Forced past a live, non-timed-out schedule: clear it explicitly.
    store.delete_schedule(schedule.id).await?;
    Ok(Admission::ClearedStale)
}

async fn find_run_for_schedule(
    store: &Store,
    schedule: &FlowSchedule,
) -> Result<Option<leantask_contracts::FlowRun>, StoreError> {
    for run in store.list_flow_runs(schedule.flow_id).await? {
        if run.schedule_id == Some(schedule.id) {
            return Ok(Some(run));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use leantask_storage::NewFlow;
    use tempfile::tempdir;

    async fn store() -> Store {
        let dir = tempdir().unwrap();
        Store::init_project(dir.path(), "p", None, false)
            .await
            .unwrap()
    }

    async fn flow(store: &Store) -> Flow {
        store
            .create_flow(NewFlow {
                path: "a.flow.toml".into(),
                name: "a".into(),
                description: None,
                cron_schedules: vec!["*/5 * * * *".into()],
                start_datetime: None,
                end_datetime: None,
                max_delay_secs: Some(60),
                checksum: "c1".into(),
                active: true,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn inactive_flow_is_refused() {
        let store = store().await;
        let mut f = flow(&store).await;
        f.active = false;
        let result = check_admission(&store, &f, Utc::now(), false).await;
        assert!(matches!(result, Err(AdmissionError::NoSchedule)));
    }

    #[tokio::test]
    async fn no_schedule_is_clear() {
        let store = store().await;
        let f = flow(&store).await;
        let result = check_admission(&store, &f, Utc::now(), false).await.unwrap();
        assert_eq!(result, Admission::Clear);
    }

    #[tokio::test]
    async fn live_schedule_within_window_is_refused_unless_forced() {
        let store = store().await;
        let f = flow(&store).await;
        let now = Utc::now();
        let schedule = store
            .create_schedule(f.id, now + Duration::seconds(30), Some(60), false)
            .await
            .unwrap();
        store
            .create_flow_run(
                f.id,
                Some(schedule.id),
                Some(schedule.schedule_datetime),
                Some(60),
                false,
                FlowRunStatus::Scheduled,
            )
            .await
            .unwrap();

        let refused = check_admission(&store, &f, now, false).await;
        assert!(matches!(
            refused,
            Err(AdmissionError::FailedScheduleExists)
        ));

        let forced = check_admission(&store, &f, now, true).await.unwrap();
        assert_eq!(forced, Admission::ClearedStale);
    }

    #[tokio::test]
    async fn elapsed_max_delay_times_out_the_bound_run() {
        let store = store().await;
        let f = flow(&store).await;
        let fired_at = Utc::now() - Duration::seconds(120);
        let schedule = store
            .create_schedule(f.id, fired_at, Some(60), false)
            .await
            .unwrap();
        let run = store
            .create_flow_run(
                f.id,
                Some(schedule.id),
                Some(fired_at),
                Some(60),
                false,
                FlowRunStatus::Scheduled,
            )
            .await
            .unwrap();

        let result = check_admission(&store, &f, Utc::now(), false)
            .await
            .unwrap();
        assert_eq!(result, Admission::TimedOut);

        let reloaded = store.get_flow_run(run.id).await.unwrap();
        assert_eq!(reloaded.status, FlowRunStatus::FailedTimeoutDelay);
    }

    #[tokio::test]
    async fn terminal_bound_run_is_silently_cleared() {
        let store = store().await;
        let f = flow(&store).await;
        let now = Utc::now();
        let schedule = store
            .create_schedule(f.id, now, Some(60), false)
            .await
            .unwrap();
        let run = store
            .create_flow_run(
                f.id,
                Some(schedule.id),
                Some(now),
                Some(60),
                false,
                FlowRunStatus::Scheduled,
            )
            .await
            .unwrap();
        store
            .transition_flow_run(run.id, FlowRunStatus::Running)
            .await
            .unwrap();
        store
            .transition_flow_run(run.id, FlowRunStatus::Done)
            .await
            .unwrap();

        let result = check_admission(&store, &f, now, false).await.unwrap();
        assert_eq!(result, Admission::ClearedStale);
        assert!(store.get_schedule(schedule.id).await.is_err());
    }
}
