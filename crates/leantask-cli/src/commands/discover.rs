// `leantask discover` — rediscover and reindex flow manifests (spec.md
// §4.2 steps 1-2, run standalone rather than as part of the tick loop).

use anyhow::Result;

use crate::output::OutputFormat;
use crate::project;

pub async fn run(ctx: &leantask_worker::Context, output: OutputFormat) -> Result<i32> {
    let store = project::open_store(ctx).await?;
    let results =
        leantask_indexer::reconcile_project(&store, &ctx.project_dir, &ctx.flows_dir).await?;

    if output.is_text() {
        if results.is_empty() {
            println!("No flow manifests found under {}", ctx.flows_dir.display());
        }
        for (path, status) in &results {
            println!("{}  {}", status_name(*status), path.display());
        }
    } else {
        let rendered: Vec<(String, &'static str)> = results
            .iter()
            .map(|(path, status)| (path.display().to_string(), status_name(*status)))
            .collect();
        output.print_value(&rendered);
    }

    Ok(0)
}

fn status_name(status: leantask_contracts::FlowIndexStatus) -> &'static str {
    use leantask_contracts::FlowIndexStatus::*;
    match status {
        Updated => "updated",
        Unchanged => "unchanged",
        Failed => "failed",
    }
}
