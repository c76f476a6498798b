//! Worker scaling commands.

use anyhow::Result;
use clap::Args;

use crate::output::print_success;

use super::CommandContext;

#[derive(Debug, Args)]
pub struct AddWorkersArgs {
    /// Number of workers to add.
    pub count: usize,
}

#[derive(Debug, Args)]
pub struct RemoveWorkersArgs {
    /// Number of workers to remove, highest index first.
    pub count: usize,
}

/// Provision and bootstrap new workers.
pub async fn add_workers(ctx: CommandContext, args: AddWorkersArgs) -> Result<()> {
    let orchestrator = ctx.orchestrator()?;
    let added = orchestrator.add_workers(args.count).await?;

    let names: Vec<&str> = added.iter().map(|n| n.name.as_str()).collect();
    print_success(&format!("Added {} worker(s): {}", added.len(), names.join(", ")));
    Ok(())
}

/// Remove the highest-indexed workers.
pub async fn remove_workers(ctx: CommandContext, args: RemoveWorkersArgs) -> Result<()> {
    let orchestrator = ctx.orchestrator()?;
    let removed = orchestrator.remove_workers(args.count).await?;

    if removed.is_empty() {
        print_success("No workers to remove");
    } else {
        print_success(&format!(
            "Removed {} worker(s): {}",
            removed.len(),
            removed.join(", ")
        ));
    }
    Ok(())
}
