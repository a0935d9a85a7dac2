// leantask CLI
//
// Design Decision: clap derive for ergonomic argument parsing (matches the
// teacher's `cli/src/main.rs`).
// Design Decision: one binary serves both the project-level supervisor
// surface and, via the `flow` subcommand tree, the flow-level runtime entry
// point the executor spawns as a child process (spec.md §4.3, §6).

mod commands;
mod output;
mod project;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "leantask")]
#[command(about = "leantask - a lightweight, cron-scheduled DAG workflow runner")]
#[command(version)]
pub struct Cli {
    /// Output format for commands that print structured data
    #[arg(long, short, global = true, default_value = "text", value_parser = ["text", "json", "yaml"])]
    pub output: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new project in PROJECT_DIR (default: current directory)
    Init {
        /// Project name (default: the directory's base name)
        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        description: Option<String>,

        /// Overwrite an existing project, backing up the old one
        #[arg(long)]
        replace: bool,
    },

    /// Show project-level information
    Info,

    /// Rediscover flow manifests under FLOWS_DIRNAME and reindex changed ones
    Discover,

    /// Run the scheduler supervisor loop until interrupted
    Scheduler,

    /// Project-level flow commands, addressed by flow name
    Flows {
        #[command(subcommand)]
        command: commands::flows::FlowsCommand,
    },

    /// Flow-level commands, addressed by manifest path. `flow run` is the
    /// entry point the executor invokes as a child process.
    Flow {
        #[command(subcommand)]
        command: commands::flow::FlowCommand,
    },
}

#[tokio::main]
async fn main() {
    // Ignore a missing .env; PROJECT_DIR etc. may come from the real
    // environment instead (teacher's bins do the same with dotenvy::dotenv()).
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let output = output::OutputFormat::from_str(&cli.output);
    let ctx = leantask_worker::Context::from_env();

    let result = match cli.command {
        Commands::Init {
            name,
            description,
            replace,
        } => commands::init::run(&ctx, name, description, replace).await,
        Commands::Info => commands::info::run(&ctx, output).await,
        Commands::Discover => commands::discover::run(&ctx, output).await,
        Commands::Scheduler => commands::scheduler::run(ctx).await,
        Commands::Flows { command } => commands::flows::run(&ctx, output, command).await,
        Commands::Flow { command } => commands::flow::run(&ctx, output, command).await,
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(leantask_contracts::FlowRunStatus::Unknown.exit_code());
        }
    }
}
