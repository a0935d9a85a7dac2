// `leantask scheduler` — run the supervisor loop until interrupted
// (spec.md §4.2 `start`).

use anyhow::Result;

use crate::project;

pub async fn run(ctx: leantask_worker::Context) -> Result<i32> {
    let store = project::open_store(&ctx).await?;

    tokio::select! {
        result = leantask_worker::engine::start(ctx, store) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received shutdown signal");
        }
    }

    Ok(0)
}
