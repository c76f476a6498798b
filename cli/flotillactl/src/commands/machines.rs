//! Machine listing.

use anyhow::Result;

use crate::output::{machine_rows, print_login_hint, print_machines};

use super::CommandContext;

/// Show every machine of the fleet, coordinator first.
pub async fn show_machines(ctx: CommandContext) -> Result<()> {
    let orchestrator = ctx.orchestrator()?;
    let fleet = orchestrator.fleet().await?;

    print_machines(&machine_rows(&fleet), ctx.format);

    if let Some(coordinator) = &fleet.coordinator {
        print_login_hint(&ctx.config, coordinator);
    }
    Ok(())
}
