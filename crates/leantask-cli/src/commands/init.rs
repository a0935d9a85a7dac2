// `leantask init` (spec.md §4.1 Initialization).

use anyhow::Result;
use leantask_storage::Store;
use leantask_worker::Context;

pub async fn run(
    ctx: &Context,
    name: Option<String>,
    description: Option<String>,
    replace: bool,
) -> Result<i32> {
    std::fs::create_dir_all(&ctx.project_dir)?;
    let name = name.unwrap_or_else(|| {
        ctx.project_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".to_string())
    });

    Store::init_project(&ctx.metadata_dir, &name, description.as_deref(), replace).await?;
    leantask_worker::context::ensure_layout(&ctx.project_dir)?;

    println!(
        "Initialized leantask project '{}' at {}",
        name,
        ctx.project_dir.display()
    );
    Ok(0)
}
