//! Job submission.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::output::print_success;

use super::CommandContext;

#[derive(Debug, Args)]
pub struct SubmitJobArgs {
    /// Local path of the job artifact.
    pub artifact: PathBuf,

    /// Arguments passed through to the job.
    #[arg(trailing_var_arg = true)]
    pub args: Vec<String>,
}

/// Upload the artifact to the coordinator and invoke the runtime's submit
/// entry point.
pub async fn submit_job(ctx: CommandContext, args: SubmitJobArgs) -> Result<()> {
    let orchestrator = ctx.orchestrator()?;
    orchestrator.submit_job(&args.artifact, &args.args).await?;

    print_success(&format!("Job submitted: {}", args.artifact.display()));
    Ok(())
}
