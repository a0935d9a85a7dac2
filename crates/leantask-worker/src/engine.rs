//! Scheduler Engine (spec.md §4.2): the supervisor loop that keeps the
//! Store's schedules and runs in sync with disk state and wall-clock time.

use chrono::Utc;
use leantask_contracts::{Flow, FlowRunStatus, StoreError};
use leantask_storage::Store;
use tracing::{info, warn};
use uuid::Uuid;

use crate::admission::{check_admission, Admission};
use crate::context::Context;
use crate::executor;
use crate::pool::WorkerPool;

/// One heartbeat iteration (spec.md §4.2, exposed standalone for tests).
/// Per-flow errors are logged and do not abort the tick; only
/// `StoreUnavailable` is fatal to the caller.
pub async fn tick(
    ctx: &Context,
    store: &Store,
    pool: &mut WorkerPool,
    scheduler_session_id: Uuid,
) -> Result<(), StoreError> {
    // 1 + 2. Rediscover and reconcile the flow index.
    if let Err(err) = leantask_indexer::reconcile_project(store, &ctx.project_dir, &ctx.flows_dir).await
    {
        warn!(error = %err, "flow index reconciliation failed this tick");
    }

    // 3. Place next schedules for active, clean flows with no live one.
    let now = Utc::now();
    for flow in store.list_flows().await? {
        if let Err(err) = place_next_schedule(&ctx.project_dir, store, &flow, now).await {
            warn!(flow = %flow.name, error = %err, "could not place next schedule");
        }
    }

    // 4. Harvest due/unfinished runs: dispatch the not-yet-started ones to
    // the worker pool, and time out any already-RUNNING run whose own
    // max-delay has elapsed (spec.md §5: "terminated with
    // FAILED_TIMEOUT_RUN by the tick").
    for run in store.list_due_flow_runs(now).await? {
        match run.status {
            FlowRunStatus::Scheduled | FlowRunStatus::ScheduledByUser => {
                let flow = match store.get_flow(run.flow_id).await {
                    Ok(flow) => flow,
                    Err(err) => {
                        warn!(flow_run = %run.id, error = %err, "flow missing for due run");
                        continue;
                    }
                };

                // Claim the run before handing it to the pool so a later
                // tick's `list_due_flow_runs` (scoped to
                // scheduled/scheduled_by_user/running) can't re-select it
                // while its child process is still starting up (spec.md
                // §4.2 step 4: "set status to PENDING, and submit it").
                if let Err(err) = store
                    .transition_flow_run(run.id, FlowRunStatus::Pending)
                    .await
                {
                    warn!(flow_run = %run.id, error = %err, "could not claim due run");
                    continue;
                }

                let ctx = ctx.clone();
                let store = store.clone();
                pool.submit(async move {
                    match executor::execute(&ctx, &store, &flow, &run, scheduler_session_id).await
                    {
                        Ok(status) => {
                            info!(flow = %flow.name, flow_run = %run.id, %status, "flow run finished")
                        }
                        Err(err) => {
                            warn!(flow = %flow.name, flow_run = %run.id, error = %err, "flow run execution failed")
                        }
                    }
                    // Best-effort reschedule after every execution (spec.md §4.3).
                    if let Ok(flow) = store.get_flow(flow.id).await {
                        let _ = place_next_schedule(&ctx.project_dir, &store, &flow, Utc::now()).await;
                    }
                })
                .await;
            }
            FlowRunStatus::Running => {
                if let (Some(started), Some(max_delay)) = (run.started_at, run.max_delay_secs) {
                    if started + chrono::Duration::seconds(max_delay) < now {
                        let _ = store
                            .transition_flow_run(run.id, FlowRunStatus::FailedTimeoutRun)
                            .await;
                        for task_run in store.list_task_runs(run.id).await? {
                            if !task_run.status.is_terminal() {
                                let _ = store
                                    .transition_task_run(
                                        task_run.id,
                                        leantask_contracts::TaskRunStatus::FailedTimeoutRun,
                                    )
                                    .await;
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }
    pool.reap_finished();

    // 5. Cleanup: delete schedules no non-terminal run references anymore.
    for schedule in store.list_orphaned_schedules().await? {
        let _ = store.delete_schedule(schedule.id).await;
    }

    Ok(())
}

/// Apply admission rules and, if clear, place a fresh `FlowSchedule` +
/// paired `FlowRun(SCHEDULED)` using the cron resolver's next fire-time
/// (spec.md §4.2 step 3).
pub async fn place_next_schedule(
    project_root: &std::path::Path,
    store: &Store,
    flow: &Flow,
    now: chrono::DateTime<Utc>,
) -> Result<(), leantask_contracts::AdmissionError> {
    if flow.cron_schedules.is_empty() {
        return Ok(());
    }
    if leantask_indexer::is_dirty(project_root, flow) {
        return Err(leantask_contracts::AdmissionError::FailedIndex);
    }

    match check_admission(store, flow, now, false).await {
        Ok(Admission::Clear) | Ok(Admission::ClearedStale) | Ok(Admission::TimedOut) => {}
        Err(leantask_contracts::AdmissionError::FailedScheduleExists) => return Ok(()),
        Err(err) => return Err(err),
    }

    // check_admission may have just cleared a stale/timed-out schedule;
    // re-check there is truly none bound before placing a new one.
    if store.get_active_schedule(flow.id).await?.is_some() {
        return Ok(());
    }

    let next = leantask_cron::next_after(
        &flow.cron_schedules,
        now,
        flow.start_datetime,
        flow.end_datetime,
    )
    .map_err(|e| leantask_contracts::AdmissionError::Store(StoreError::Conflict(e.to_string())))?;

    let Some(fire_time) = next else {
        return Ok(());
    };

    let schedule = store
        .create_schedule(flow.id, fire_time, flow.max_delay_secs, false)
        .await?;
    store
        .create_flow_run(
            flow.id,
            Some(schedule.id),
            Some(fire_time),
            flow.max_delay_secs,
            false,
            FlowRunStatus::Scheduled,
        )
        .await?;
    Ok(())
}

/// Place a user-requested schedule at an explicit datetime (spec.md §4.2:
/// "Manual schedules placed by users... admission rules are the same"),
/// used by `leantask flows schedule`.
pub async fn place_manual_schedule(
    project_root: &std::path::Path,
    store: &Store,
    flow: &Flow,
    at: chrono::DateTime<Utc>,
    force: bool,
) -> Result<leantask_contracts::FlowSchedule, leantask_contracts::AdmissionError> {
    if leantask_indexer::is_dirty(project_root, flow) {
        return Err(leantask_contracts::AdmissionError::FailedIndex);
    }

    check_admission(store, flow, Utc::now(), force).await?;

    let schedule = store
        .create_schedule(flow.id, at, flow.max_delay_secs, true)
        .await?;
    store
        .create_flow_run(
            flow.id,
            Some(schedule.id),
            Some(at),
            flow.max_delay_secs,
            true,
            FlowRunStatus::ScheduledByUser,
        )
        .await?;
    Ok(schedule)
}

/// Open a `SchedulerSession` and loop `tick()` forever at `heartbeat_secs`
/// intervals (spec.md §4.2 `start`). Prints the "ALIVE" heartbeat marker
/// each tick per spec.md §7.
pub async fn start(ctx: Context, store: Store) -> Result<(), StoreError> {
    crate::context::ensure_layout(&ctx.project_dir)?;
    let session_log_path = ctx.log_dir().join("scheduler_sessions");
    std::fs::create_dir_all(&session_log_path)?;

    let session = store
        .create_scheduler_session(
            ctx.heartbeat_secs,
            ctx.worker_count,
            &session_log_path.to_string_lossy(),
        )
        .await?;
    info!(session = %session.id, workers = ctx.worker_count, heartbeat = ctx.heartbeat_secs, "scheduler session started");

    let mut pool = WorkerPool::new(ctx.worker_count);
    let interval = std::time::Duration::from_secs(ctx.heartbeat_secs.max(1));

    loop {
        tick(&ctx, &store, &mut pool, session.id).await?;
        println!("ALIVE");
        let _ = ctx.gc_cache();
        tokio::time::sleep(interval).await;
    }
}
