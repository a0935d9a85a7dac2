// `leantask flow {info, index, run, schedule, status, log}` — flow-level
// commands addressed by manifest path (spec.md §6). `flow run` is the
// entry point the executor spawns as a child process
// (SPEC_FULL.md §2 item 8).

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use chrono::Utc;
use clap::Subcommand;
use leantask_contracts::{AdmissionError, FlowRunStatus, FlowScheduleStatus};
use uuid::Uuid;

use crate::output::OutputFormat;
use crate::project;

#[derive(Subcommand)]
pub enum FlowCommand {
    /// Show the manifest's declared name, description, and task graph
    Info {
        #[arg(long)]
        manifest: PathBuf,
    },

    /// Reindex this one manifest
    Index {
        #[arg(long)]
        manifest: PathBuf,

        /// Reindex even if the checksum is unchanged
        #[arg(long, short = 'F')]
        force: bool,
    },

    /// Execute one flow-run to completion. Invoked by the executor with
    /// `--run-id`/`--scheduler-session-id`; can also be used standalone
    /// against a run created out of band.
    Run {
        #[arg(long)]
        manifest: PathBuf,

        #[arg(long = "run-id")]
        run_id: Uuid,

        #[arg(long = "scheduler-session-id")]
        scheduler_session_id: Option<Uuid>,

        #[arg(long, short = 'F')]
        force: bool,
    },

    /// Place a manual schedule for this flow
    Schedule {
        #[arg(long)]
        manifest: PathBuf,

        #[arg(long)]
        datetime: Option<String>,

        #[arg(long)]
        now: bool,

        #[arg(long, short = 'F')]
        force: bool,
    },

    /// Show the most recent run's status
    Status {
        #[arg(long)]
        manifest: PathBuf,
    },

    /// Show the append-only log mirror for this flow
    Log {
        #[arg(long)]
        manifest: PathBuf,
    },
}

pub async fn run(
    ctx: &leantask_worker::Context,
    output: OutputFormat,
    command: FlowCommand,
) -> Result<i32> {
    let store = project::open_store(ctx).await?;

    match command {
        FlowCommand::Info { manifest } => info(&manifest, output).await,
        FlowCommand::Index { manifest, force } => index(ctx, &store, &manifest, force).await,
        FlowCommand::Run {
            manifest,
            run_id,
            scheduler_session_id,
            force: _,
        } => run_one(&store, &manifest, run_id, scheduler_session_id).await,
        FlowCommand::Schedule {
            manifest,
            datetime,
            now,
            force,
        } => schedule(ctx, &store, &manifest, datetime, now, force).await,
        FlowCommand::Status { manifest } => status(ctx, &store, &manifest).await,
        FlowCommand::Log { manifest } => log(ctx, &store, &manifest, output).await,
    }
}

async fn info(manifest: &std::path::Path, output: OutputFormat) -> Result<i32> {
    let contents = std::fs::read_to_string(manifest)
        .with_context(|| format!("reading {}", manifest.display()))?;
    let parsed = leantask_indexer::FlowManifest::parse(&contents)
        .with_context(|| format!("parsing {}", manifest.display()))?;

    if output.is_text() {
        println!("name:        {}", parsed.name);
        if let Some(desc) = &parsed.description {
            println!("description: {desc}");
        }
        println!("crons:       {}", parsed.cron_schedules.join(", "));
        println!("active:      {}", parsed.active);
        println!("tasks:");
        for task in &parsed.tasks {
            let upstream = if task.upstream.is_empty() {
                String::new()
            } else {
                format!(" <- {}", task.upstream.join(", "))
            };
            println!("  {} ({:?}){upstream}", task.name, task.kind);
        }
    } else {
        output.print_value(&serde_json::json!({
            "name": parsed.name,
            "description": parsed.description,
            "cron_schedules": parsed.cron_schedules,
            "active": parsed.active,
            "tasks": parsed.tasks.iter().map(|t| t.name.clone()).collect::<Vec<_>>(),
        }));
    }
    Ok(0)
}

async fn index(
    ctx: &leantask_worker::Context,
    store: &leantask_storage::Store,
    manifest: &std::path::Path,
    force: bool,
) -> Result<i32> {
    let status = leantask_indexer::index_flow(store, &ctx.project_dir, manifest, force).await?;
    println!("{}: {status:?}", manifest.display());
    Ok(status.exit_code())
}

async fn run_one(
    store: &leantask_storage::Store,
    manifest: &std::path::Path,
    run_id: Uuid,
    scheduler_session_id: Option<Uuid>,
) -> Result<i32> {
    if let Some(session) = scheduler_session_id {
        tracing::info!(%run_id, %session, "starting flow run");
    }
    let status = leantask_runtime::run_flow(store, manifest, run_id).await?;
    Ok(status.exit_code())
}

async fn schedule(
    ctx: &leantask_worker::Context,
    store: &leantask_storage::Store,
    manifest: &std::path::Path,
    datetime: Option<String>,
    _now: bool,
    force: bool,
) -> Result<i32> {
    let flow = project::require_flow_by_path(store, ctx, manifest).await?;
    let at = match datetime {
        Some(s) => chrono::DateTime::parse_from_rfc3339(&s)
            .with_context(|| format!("'{s}' is not a valid RFC3339 datetime"))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };

    match leantask_worker::engine::place_manual_schedule(&ctx.project_dir, store, &flow, at, force)
        .await
    {
        Ok(s) => {
            println!("Scheduled for {}", s.schedule_datetime.to_rfc3339());
            Ok(FlowScheduleStatus::Scheduled.exit_code())
        }
        Err(AdmissionError::NoSchedule) => {
            println!("Flow is inactive");
            Ok(FlowScheduleStatus::NoSchedule.exit_code())
        }
        Err(AdmissionError::FailedScheduleExists) => {
            println!("Flow already has a non-terminal schedule");
            Ok(FlowScheduleStatus::FailedScheduleExists.exit_code())
        }
        Err(err) => {
            println!("Failed to schedule: {err}");
            Ok(FlowScheduleStatus::Failed.exit_code())
        }
    }
}

async fn status(
    ctx: &leantask_worker::Context,
    store: &leantask_storage::Store,
    manifest: &std::path::Path,
) -> Result<i32> {
    let flow = project::require_flow_by_path(store, ctx, manifest).await?;
    let runs = store.list_flow_runs(flow.id).await?;
    let Some(latest) = runs.into_iter().max_by_key(|r| r.created_at) else {
        println!("No runs yet");
        return Ok(FlowRunStatus::Unknown.exit_code());
    };
    println!("{}: {}", latest.id, latest.status);
    Ok(latest.status.exit_code())
}

async fn log(
    ctx: &leantask_worker::Context,
    store: &leantask_storage::Store,
    manifest: &std::path::Path,
    output: OutputFormat,
) -> Result<i32> {
    let flow = project::require_flow_by_path(store, ctx, manifest).await?;
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
