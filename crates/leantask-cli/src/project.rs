// Shared helpers for opening the project store from a `Context`.

use anyhow::{Context as _, Result};
use leantask_storage::Store;
use leantask_worker::Context;

pub async fn open_store(ctx: &Context) -> Result<Store> {
    Store::open(&ctx.metadata_dir).await.with_context(|| {
        format!(
            "no leantask project found at {} (run `leantask init` first)",
            ctx.project_dir.display()
        )
    })
}

pub async fn require_flow_by_name(
    store: &Store,
    name: &str,
) -> Result<leantask_contracts::Flow> {
    store
        .get_flow_by_name(name)
        .await?
        .with_context(|| format!("no flow named '{name}' in the project index"))
}

pub async fn require_flow_by_path(
    store: &Store,
    ctx: &Context,
    manifest: &std::path::Path,
) -> Result<leantask_contracts::Flow> {
    let relative = manifest
        .strip_prefix(&ctx.project_dir)
        .unwrap_or(manifest)
        .to_string_lossy()
        .to_string();
    store
        .get_flow_by_path(&relative)
        .await?
        .with_context(|| format!("'{relative}' is not indexed yet (run `leantask flow index` first)"))
}
