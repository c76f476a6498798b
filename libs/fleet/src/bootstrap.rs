//! Per-node bootstrap steps.
//!
//! Each step is a remote command against one node: download and unpack the
//! processing runtime, write the cluster environment file, start or stop
//! the role's service. Steps report failures as results; sequencing and
//! aggregation live in the orchestrator.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use flotilla_remote::{ExecOptions, RemoteExec};
use tracing::info;

use crate::config::FleetConfig;
use crate::error::{FleetError, FleetResult};
use crate::node::Node;

/// Remote path of the cluster environment file, relative to the install dir.
const ENV_FILE: &str = "conf/cluster-env.sh";

/// Runs bootstrap steps on individual nodes.
pub struct NodeBootstrap {
    config: FleetConfig,
    exec: Arc<dyn RemoteExec>,
}

impl NodeBootstrap {
    /// Create a step runner for one deployment.
    pub fn new(config: FleetConfig, exec: Arc<dyn RemoteExec>) -> Self {
        Self { config, exec }
    }

    /// Download and unpack the processing runtime on a node.
    ///
    /// Retried by the transport: artifact downloads are the flakiest step
    /// of a bring-up. Store credentials are injected for private artifact
    /// locations.
    pub async fn install_runtime(&self, node: &Node) -> FleetResult<()> {
        info!(node = %node.name, "Installing runtime");

        let dir = &self.config.install_dir;
        let command = format!(
            "mkdir -p {dir} && curl -fsSL '{url}' -o /tmp/runtime.tgz \
             && tar -xzf /tmp/runtime.tgz -C {dir} --strip-components=1 \
             && rm -f /tmp/runtime.tgz",
            dir = dir,
            url = self.config.artifact_url,
        );

        let opts = ExecOptions {
            retry: true,
            inject_credentials: true,
            interactive: false,
        };
        self.run_step(node, &command, opts).await
    }

    /// Write the cluster environment file on a node.
    pub async fn write_env(&self, node: &Node, coordinator_addr: &str) -> FleetResult<()> {
        info!(node = %node.name, coordinator_addr, "Writing environment file");

        let content = render_env_file(
            &self.config.cluster_name,
            coordinator_addr,
            &self.config.env,
        );
        let path = format!("{}/{}", self.config.install_dir, ENV_FILE);
        let command = format!(
            "mkdir -p {dir}/conf && cat > {path} <<'EOF'\n{content}EOF",
            dir = self.config.install_dir,
            path = path,
            content = content,
        );

        self.run_step(node, &command, ExecOptions::retrying()).await
    }

    /// Start the coordinator service.
    pub async fn start_coordinator(&self, node: &Node) -> FleetResult<()> {
        info!(node = %node.name, "Starting coordinator service");
        self.run_script(node, "sbin/start-coordinator.sh").await
    }

    /// Stop the coordinator service.
    pub async fn stop_coordinator(&self, node: &Node) -> FleetResult<()> {
        info!(node = %node.name, "Stopping coordinator service");
        self.run_script(node, "sbin/stop-coordinator.sh").await
    }

    /// Start the worker service.
    pub async fn start_worker(&self, node: &Node) -> FleetResult<()> {
        info!(node = %node.name, "Starting worker service");
        self.run_script(node, "sbin/start-worker.sh").await
    }

    /// Stop the worker service.
    pub async fn stop_worker(&self, node: &Node) -> FleetResult<()> {
        info!(node = %node.name, "Stopping worker service");
        self.run_script(node, "sbin/stop-worker.sh").await
    }

    /// Full bring-up sequence for a coordinator node.
    pub async fn coordinator_sequence(&self, node: &Node) -> FleetResult<()> {
        self.install_runtime(node).await?;
        self.write_env(node, &node.addr).await?;
        self.start_coordinator(node).await
    }

    /// Full bring-up sequence for a worker node.
    pub async fn worker_sequence(&self, node: &Node, coordinator_addr: &str) -> FleetResult<()> {
        self.install_runtime(node).await?;
        self.write_env(node, coordinator_addr).await?;
        self.start_worker(node).await
    }

    /// Copy a local job artifact onto a node; returns the remote path.
    pub async fn upload_artifact(&self, node: &Node, artifact: &Path) -> FleetResult<String> {
        let file_name = artifact
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "job-artifact".to_string());
        let remote_path = format!("/tmp/{}", file_name);

        info!(node = %node.name, remote_path, "Uploading job artifact");
        self.exec
            .upload(&node.addr, artifact, &remote_path)
            .await
            .map_err(|e| self.step_error(node, e))?;

        Ok(remote_path)
    }

    /// Invoke the runtime's submit entry point with an uploaded artifact.
    pub async fn submit(
        &self,
        node: &Node,
        remote_artifact: &str,
        args: &[String],
    ) -> FleetResult<()> {
        info!(node = %node.name, remote_artifact, "Submitting job");

        let mut command = format!(
            "{}/bin/submit {}",
            self.config.install_dir, remote_artifact
        );
        for arg in args {
            command.push(' ');
            command.push_str(arg);
        }

        let opts = ExecOptions {
            retry: false,
            inject_credentials: true,
            interactive: false,
        };
        self.run_step(node, &command, opts).await
    }

    /// Run a service script from the install dir. Service transitions are
    /// not retried: a second start on a half-started service is not safe.
    async fn run_script(&self, node: &Node, script: &str) -> FleetResult<()> {
        let command = format!("bash {}/{}", self.config.install_dir, script);
        self.run_step(node, &command, ExecOptions::default()).await
    }

    async fn run_step(&self, node: &Node, command: &str, opts: ExecOptions) -> FleetResult<()> {
        self.exec
            .run(&node.addr, command, opts)
            .await
            .map_err(|e| self.step_error(node, e))
    }

    fn step_error(&self, node: &Node, err: flotilla_remote::RemoteError) -> FleetError {
        FleetError::Bootstrap {
            node: node.name.clone(),
            reason: err.to_string(),
        }
    }
}

/// Render the cluster environment file: cluster identity, coordinator
/// address, then the configured overrides in sorted order. Deterministic so
/// a rewrite on an unchanged cluster is a byte-for-byte no-op.
pub fn render_env_file(
    cluster: &str,
    coordinator_addr: &str,
    overrides: &BTreeMap<String, String>,
) -> String {
    let mut out = String::new();
    out.push_str(&format!("export CLUSTER_NAME={}\n", cluster));
    out.push_str(&format!("export COORDINATOR_ADDR={}\n", coordinator_addr));
    for (key, value) in overrides {
        out.push_str(&format!("export {}={}\n", key, value));
    }
    out
}
