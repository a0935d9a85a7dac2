// `leantask flows {list, log, run, schedule, status}` — project-level
// commands addressed by flow name (spec.md §6).

use anyhow::{Context as _, Result};
use chrono::Utc;
use clap::Subcommand;
use leantask_contracts::{AdmissionError, Flow, FlowRunStatus, FlowScheduleStatus};
use leantask_storage::Store;
use leantask_worker::Context;

use crate::output::{print_field, print_table_header, print_table_row, OutputFormat};
use crate::project;

#[derive(Subcommand)]
pub enum FlowsCommand {
    /// List every indexed flow
    List,

    /// Show the append-only log mirror for a flow
    Log {
        name: String,
    },

    /// Run a flow now
    Run {
        name: String,

        /// Bypass admission rules (refuse-unless-forced window, dirty checksum is never bypassed)
        #[arg(long, short = 'F')]
        force: bool,

        /// NOT RECOMMENDED: run in this process without going through the
        /// executor, so the run is not captured to a per-run log file.
        #[arg(long, short = 'L')]
        local: bool,
    },

    /// Place a manual schedule for a flow
    Schedule {
        name: String,

        /// RFC3339 datetime to schedule at (default: now)
        #[arg(long)]
        datetime: Option<String>,

        /// Schedule immediately (the default; kept for symmetry with `--datetime`)
        #[arg(long)]
        now: bool,

        #[arg(long, short = 'F')]
        force: bool,
    },

    /// Show the most recent run's status for a flow
    Status {
        name: String,
    },
}

pub async fn run(ctx: &Context, output: OutputFormat, command: FlowsCommand) -> Result<i32> {
    let store = project::open_store(ctx).await?;

    match command {
        FlowsCommand::List => list(&store, output).await,
        FlowsCommand::Log { name } => log(&store, output, &name).await,
        FlowsCommand::Run { name, force, local } => {
            run_flow(ctx, &store, &name, force, local).await
        }
        FlowsCommand::Schedule {
            name,
            datetime,
            now,
            force,
        } => schedule(ctx, &store, &name, datetime, now, force).await,
        FlowsCommand::Status { name } => status(&store, &name).await,
    }
}

async fn list(store: &Store, output: OutputFormat) -> Result<i32> {
    let flows = store.list_flows().await?;

    if output.is_text() {
        if flows.is_empty() {
            println!("No flows indexed yet");
            return Ok(0);
        }
        print_table_header(&[("NAME", 24), ("ACTIVE", 6), ("CRONS", 30), ("PATH", 40)]);
        for flow in &flows {
            print_table_row(&[
                (&flow.name, 24),
                (if flow.active { "yes" } else { "no" }, 6),
                (&flow.cron_schedules.join(","), 30),
                (&flow.path, 40),
            ]);
        }
    } else {
        output.print_value(&flows);
    }
    Ok(0)
}

async fn log(store: &Store, output: OutputFormat, name: &str) -> Result<i32> {
    let flow = project::require_flow_by_name(store, name).await?;
    let records = store.log_for("flow", flow.id).await?;

    if output.is_text() {
        for record in &records {
            println!("{}  {}", record.created_at.to_rfc3339(), record.payload);
        }
    } else {
        output.print_value(&records);
    }
    Ok(0)
}

async fn status(store: &Store, name: &str) -> Result<i32> {
    let flow = project::require_flow_by_name(store, name).await?;
    let runs = store.list_flow_runs(flow.id).await?;

    let Some(latest) = runs.into_iter().max_by_key(|r| r.created_at) else {
        println!("No runs yet for '{name}'");
        return Ok(FlowRunStatus::Unknown.exit_code());
    };

    print_field("Run", &latest.id.to_string());
    print_field("Status", &latest.status.to_string());
    if let Some(started) = latest.started_at {
        print_field("Started", &started.to_rfc3339());
    }
    Ok(latest.status.exit_code())
}

async fn schedule(
    ctx: &Context,
    store: &Store,
    name: &str,
    datetime: Option<String>,
    _now: bool,
    force: bool,
) -> Result<i32> {
    let flow = project::require_flow_by_name(store, name).await?;
    let at = match datetime {
        Some(s) => chrono::DateTime::parse_from_rfc3339(&s)
            .with_context(|| format!("'{s}' is not a valid RFC3339 datetime"))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };

    match leantask_worker::engine::place_manual_schedule(&ctx.project_dir, store, &flow, at, force)
        .await
    {
        Ok(schedule) => {
            println!("Scheduled '{name}' for {}", schedule.schedule_datetime.to_rfc3339());
            Ok(FlowScheduleStatus::Scheduled.exit_code())
        }
        Err(AdmissionError::NoSchedule) => {
            println!("Flow '{name}' is inactive");
            Ok(FlowScheduleStatus::NoSchedule.exit_code())
        }
        Err(AdmissionError::FailedScheduleExists) => {
            println!("Flow '{name}' already has a non-terminal schedule");
            Ok(FlowScheduleStatus::FailedScheduleExists.exit_code())
        }
        Err(err) => {
            println!("Failed to schedule '{name}': {err}");
            Ok(FlowScheduleStatus::Failed.exit_code())
        }
    }
}

async fn run_flow(
    ctx: &Context,
    store: &Store,
    name: &str,
    force: bool,
    local: bool,
) -> Result<i32> {
    let flow = project::require_flow_by_name(store, name).await?;
    let status = execute_once(ctx, store, &flow, force, local).await?;
    println!("'{name}' finished: {status}");
    Ok(status.exit_code())
}

/// Place an on-demand run for `flow` and drive it to completion, either
/// in-process (`local`, spec.md §6 `--local`: "not logged") or through the
/// normal executor subprocess path used by the scheduler.
pub async fn execute_once(
    ctx: &Context,
    store: &Store,
    flow: &Flow,
    force: bool,
    local: bool,
) -> Result<FlowRunStatus> {
    if leantask_indexer::is_dirty(&ctx.project_dir, flow) {
        anyhow::bail!("'{}' is dirty; run `leantask flow index` first", flow.name);
    }

    if local {
        if !force {
            leantask_worker::check_admission(store, flow, Utc::now(), force).await?;
        }
        let run = store
            .create_flow_run(
                flow.id,
                None,
                None,
                flow.max_delay_secs,
                true,
                FlowRunStatus::ScheduledByUser,
            )
            .await?;
        let manifest_path = ctx.manifest_path(&flow.path);
        let status = leantask_runtime::run_flow(store, &manifest_path, run.id).await?;
        return Ok(status);
    }

    let schedule =
        leantask_worker::engine::place_manual_schedule(&ctx.project_dir, store, flow, Utc::now(), force)
            .await?;
    let run = store
        .list_flow_runs(flow.id)
        .await?
        .into_iter()
        .find(|r| r.schedule_id == Some(schedule.id))
        .context("schedule was just created but its flow-run is missing")?;

    let session_log_dir = ctx.log_dir().join("scheduler_sessions");
    std::fs::create_dir_all(&session_log_dir)?;
    let session = store
        .create_scheduler_session(
            ctx.heartbeat_secs,
            ctx.worker_count,
            &session_log_dir.to_string_lossy(),
        )
        .await?;

    let status = leantask_worker::executor::execute(ctx, store, flow, &run, session.id).await?;
    Ok(status)
}
