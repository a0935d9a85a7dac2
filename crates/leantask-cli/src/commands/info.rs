// `leantask info` — project-level summary (spec.md §1: detailed prose
// formatting is out of scope; this is the minimal rendering).

use anyhow::Result;
use serde::Serialize;

use crate::output::{print_field, OutputFormat};
use crate::project;

#[derive(Serialize)]
struct ProjectInfo {
    name: String,
    description: Option<String>,
    active: bool,
    flow_count: usize,
}

pub async fn run(ctx: &leantask_worker::Context, output: OutputFormat) -> Result<i32> {
    let store = project::open_store(ctx).await?;
    let project = store
        .get_project()
        .await?
        .ok_or_else(|| anyhow::anyhow!("project row missing; the project store is corrupt"))?;
    let flows = store.list_flows().await?;

    let info = ProjectInfo {
        name: project.name,
        description: project.description,
        active: project.active,
        flow_count: flows.len(),
    };

    if output.is_text() {
        print_field("Name", &info.name);
        if let Some(desc) = &info.description {
            print_field("Description", desc);
        }
        print_field("Active", &info.active.to_string());
        print_field("Flows", &info.flow_count.to_string());
        print_field("Root", &ctx.project_dir.display().to_string());
    } else {
        output.print_value(&info);
    }

    Ok(0)
}
