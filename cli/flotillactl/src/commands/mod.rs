//! CLI commands.

mod cluster;
mod machines;
mod submit;
mod workers;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use flotilla_fleet::{FleetConfig, FleetOrchestrator};
use flotilla_provider::HttpProvider;
use flotilla_remote::{SshExec, SshSettings};

use crate::config::load_manifest;
use crate::output::OutputFormat;

/// flotilla - provision and bootstrap processing clusters.
#[derive(Debug, Parser)]
#[command(name = "flotilla")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the deployment manifest (defaults to ./flotilla.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format (table or json).
    #[arg(long, global = true, default_value = "table")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create the cluster: one coordinator plus the given number of workers.
    CreateCluster(cluster::CreateClusterArgs),

    /// Add workers to a running cluster.
    AddWorkers(workers::AddWorkersArgs),

    /// Remove the highest-indexed workers.
    RemoveWorkers(workers::RemoveWorkersArgs),

    /// Restart every service in the cluster, coordinator first.
    RestartCluster,

    /// Terminate every machine of the cluster.
    DestroyCluster,

    /// List the cluster's machines.
    ShowMachines,

    /// Upload a job artifact to the coordinator and submit it.
    SubmitJob(submit::SubmitJobArgs),
}

/// Shared state handed to every command.
pub struct CommandContext {
    pub config: FleetConfig,
    pub format: OutputFormat,
}

impl CommandContext {
    /// Build the orchestrator for this deployment.
    pub fn orchestrator(&self) -> Result<FleetOrchestrator> {
        let provider = HttpProvider::new(
            &self.config.provider.endpoint,
            &self.config.provider.api_token,
        )
        .context("Failed to create provider client")?;

        let ssh = SshSettings {
            user: self.config.ssh.user.clone(),
            port: self.config.ssh.port,
            identity_file: self.config.ssh.identity_file.clone().map(PathBuf::from),
            ..SshSettings::default()
        };
        let exec = SshExec::new(ssh, self.config.credentials.clone());

        Ok(FleetOrchestrator::new(
            self.config.clone(),
            Arc::new(provider),
            Arc::new(exec),
        ))
    }
}

impl Cli {
    /// Run the CLI command.
    pub async fn run(self) -> Result<()> {
        let format = match self.format.as_str() {
            "json" => OutputFormat::Json,
            _ => OutputFormat::Table,
        };

        let config = load_manifest(self.config.as_ref())?;
        let ctx = CommandContext { config, format };

        match self.command {
            Commands::CreateCluster(args) => cluster::create_cluster(ctx, args).await,
            Commands::AddWorkers(args) => workers::add_workers(ctx, args).await,
            Commands::RemoveWorkers(args) => workers::remove_workers(ctx, args).await,
            Commands::RestartCluster => cluster::restart_cluster(ctx).await,
            Commands::DestroyCluster => cluster::destroy_cluster(ctx).await,
            Commands::ShowMachines => machines::show_machines(ctx).await,
            Commands::SubmitJob(args) => submit::submit_job(ctx, args).await,
        }
    }
}
