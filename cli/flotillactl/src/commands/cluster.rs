//! Cluster-level commands: create, restart, destroy.

use anyhow::Result;
use clap::Args;

use crate::output::{machine_rows, print_login_hint, print_machines, print_success};

use super::CommandContext;

#[derive(Debug, Args)]
pub struct CreateClusterArgs {
    /// Number of workers to start with.
    pub workers: usize,
}

/// Bring up a full cluster: coordinator first, then the workers.
pub async fn create_cluster(ctx: CommandContext, args: CreateClusterArgs) -> Result<()> {
    let orchestrator = ctx.orchestrator()?;

    let coordinator = orchestrator.create_coordinator().await?;
    if args.workers > 0 {
        orchestrator.add_workers(args.workers).await?;
    }

    print_success(&format!(
        "Cluster '{}' is up with {} worker(s)",
        ctx.config.cluster_name, args.workers
    ));

    let fleet = orchestrator.fleet().await?;
    print_machines(&machine_rows(&fleet), ctx.format);
    print_login_hint(&ctx.config, &coordinator);
    Ok(())
}

/// Restart every service, coordinator first.
pub async fn restart_cluster(ctx: CommandContext) -> Result<()> {
    let orchestrator = ctx.orchestrator()?;
    orchestrator.restart_cluster().await?;

    print_success(&format!(
        "Cluster '{}' restarted",
        ctx.config.cluster_name
    ));
    Ok(())
}

/// Terminate the whole fleet.
pub async fn destroy_cluster(ctx: CommandContext) -> Result<()> {
    let orchestrator = ctx.orchestrator()?;
    orchestrator.destroy_fleet().await?;

    print_success(&format!(
        "Cluster '{}' destroyed",
        ctx.config.cluster_name
    ));
    Ok(())
}
