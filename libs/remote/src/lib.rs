//! Remote command execution over ssh/scp.
//!
//! Bootstrap steps need to run commands on freshly provisioned nodes and to
//! copy job artifacts onto them. This crate provides:
//!
//! - [`RemoteExec`]: the capability trait the fleet consumes. Failures are
//!   reported as results; no particular transport is assumed.
//! - [`SshExec`]: subprocess implementation shelling out to `ssh`/`scp`,
//!   with bounded retry and optional credential injection.
//! - [`MockExec`]: recording double with substring-keyed failure injection.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from remote execution.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The remote command ran and failed.
    #[error("remote command failed on {addr} (exit {code:?}): {detail}")]
    CommandFailed {
        addr: String,
        code: Option<i32>,
        detail: String,
    },

    /// The transport process could not be started or awaited.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
}

/// Result type for remote operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Per-call execution options.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecOptions {
    /// Retry the command on failure, up to the transport's attempt budget.
    pub retry: bool,

    /// Prefix the command with exported deployment credentials.
    pub inject_credentials: bool,

    /// Attach the operator's terminal instead of capturing output.
    pub interactive: bool,
}

impl ExecOptions {
    /// Options for an idempotent command worth retrying.
    pub fn retrying() -> Self {
        Self {
            retry: true,
            ..Self::default()
        }
    }
}

/// Remote execution capability.
#[async_trait]
pub trait RemoteExec: Send + Sync {
    /// Run a shell command on the host at `addr`.
    async fn run(&self, addr: &str, command: &str, opts: ExecOptions) -> RemoteResult<()>;

    /// Copy a local file to `remote_path` on the host at `addr`.
    async fn upload(&self, addr: &str, local: &Path, remote_path: &str) -> RemoteResult<()>;
}

/// Transport settings for [`SshExec`].
#[derive(Debug, Clone)]
pub struct SshSettings {
    /// Login user on the nodes.
    pub user: String,

    /// SSH port.
    pub port: u16,

    /// Identity file, ssh-agent if unset.
    pub identity_file: Option<PathBuf>,

    /// Connection timeout passed to ssh.
    pub connect_timeout_secs: u64,

    /// Attempt budget for retried commands.
    pub exec_attempts: u32,

    /// Delay between attempts.
    pub retry_delay: Duration,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            user: "ubuntu".to_string(),
            port: 22,
            identity_file: None,
            connect_timeout_secs: 10,
            exec_attempts: 5,
            retry_delay: Duration::from_secs(5),
        }
    }
}

/// `RemoteExec` over ssh/scp subprocesses.
pub struct SshExec {
    settings: SshSettings,

    /// Deployment credentials exported into the remote environment when a
    /// call asks for injection (artifact store access and the like).
    credentials: BTreeMap<String, String>,
}

impl SshExec {
    /// Create a transport with the given settings and injectable credentials.
    pub fn new(settings: SshSettings, credentials: BTreeMap<String, String>) -> Self {
        Self {
            settings,
            credentials,
        }
    }

    /// Common ssh arguments for a host.
    fn ssh_args(&self, addr: &str, interactive: bool) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            self.settings.port.to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.settings.connect_timeout_secs),
        ];
        if !interactive {
            args.push("-o".to_string());
            args.push("BatchMode=yes".to_string());
        }
        if let Some(identity) = &self.settings.identity_file {
            args.push("-i".to_string());
            args.push(identity.display().to_string());
        }
        args.push(format!("{}@{}", self.settings.user, addr));
        args
    }

    /// The command line actually sent to the remote shell.
    fn remote_command(&self, command: &str, inject_credentials: bool) -> String {
        if !inject_credentials || self.credentials.is_empty() {
            return command.to_string();
        }

        let exports: Vec<String> = self
            .credentials
            .iter()
            .map(|(k, v)| format!("export {}='{}';", k, v))
            .collect();
        format!("{} {}", exports.join(" "), command)
    }

    async fn run_once(&self, addr: &str, command: &str, interactive: bool) -> RemoteResult<()> {
        let mut cmd = tokio::process::Command::new("ssh");
        cmd.args(self.ssh_args(addr, interactive)).arg(command);

        if interactive {
            let status = cmd.status().await?;
            if status.success() {
                return Ok(());
            }
            return Err(RemoteError::CommandFailed {
                addr: addr.to_string(),
                code: status.code(),
                detail: "interactive session exited nonzero".to_string(),
            });
        }

        cmd.stdin(Stdio::null());
        let output = cmd.output().await?;
        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(RemoteError::CommandFailed {
            addr: addr.to_string(),
            code: output.status.code(),
            detail: stderr.lines().last().unwrap_or("no output").to_string(),
        })
    }
}

#[async_trait]
impl RemoteExec for SshExec {
    async fn run(&self, addr: &str, command: &str, opts: ExecOptions) -> RemoteResult<()> {
        let command = self.remote_command(command, opts.inject_credentials);
        let attempts = if opts.retry {
            self.settings.exec_attempts.max(1)
        } else {
            1
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            debug!(addr, attempt, "Running remote command");

            match self.run_once(addr, &command, opts.interactive).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < attempts => {
                    warn!(addr, attempt, error = %e, "Remote command failed; retrying");
                    tokio::time::sleep(self.settings.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn upload(&self, addr: &str, local: &Path, remote_path: &str) -> RemoteResult<()> {
        let mut args = vec![
            "-P".to_string(),
            self.settings.port.to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
        ];
        if let Some(identity) = &self.settings.identity_file {
            args.push("-i".to_string());
            args.push(identity.display().to_string());
        }
        args.push(local.display().to_string());
        args.push(format!(
            "{}@{}:{}",
            self.settings.user, addr, remote_path
        ));

        debug!(addr, local = %local.display(), remote_path, "Uploading file");

        let output = tokio::process::Command::new("scp")
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(RemoteError::CommandFailed {
            addr: addr.to_string(),
            code: output.status.code(),
            detail: stderr.lines().last().unwrap_or("no output").to_string(),
        })
    }
}

/// One recorded call against a [`MockExec`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecCall {
    Run { addr: String, command: String },
    Upload { addr: String, remote_path: String },
}

/// Recording mock transport.
///
/// A call fails every time its command or host address contains one of the
/// configured failure patterns; all calls are recorded in invocation order.
#[derive(Default)]
pub struct MockExec {
    calls: Mutex<Vec<ExecCall>>,
    fail_patterns: Vec<String>,
}

impl MockExec {
    /// A transport where every call succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail any command containing one of the given substrings.
    pub fn with_failures(patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }

    /// All recorded calls, in invocation order.
    pub fn calls(&self) -> Vec<ExecCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Commands run against a specific host, in invocation order.
    pub fn commands_for(&self, addr: &str) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                ExecCall::Run { addr: a, command } if a == addr => Some(command.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl RemoteExec for MockExec {
    async fn run(&self, addr: &str, command: &str, _opts: ExecOptions) -> RemoteResult<()> {
        self.calls.lock().unwrap().push(ExecCall::Run {
            addr: addr.to_string(),
            command: command.to_string(),
        });

        for pattern in &self.fail_patterns {
            if command.contains(pattern.as_str()) || addr.contains(pattern.as_str()) {
                return Err(RemoteError::CommandFailed {
                    addr: addr.to_string(),
                    code: Some(1),
                    detail: format!("mock failure matching '{}'", pattern),
                });
            }
        }

        Ok(())
    }

    async fn upload(&self, addr: &str, _local: &Path, remote_path: &str) -> RemoteResult<()> {
        self.calls.lock().unwrap().push(ExecCall::Upload {
            addr: addr.to_string(),
            remote_path: remote_path.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssh_args_batch_mode_only_when_noninteractive() {
        let exec = SshExec::new(SshSettings::default(), BTreeMap::new());

        let batch = exec.ssh_args("10.0.0.1", false);
        assert!(batch.contains(&"BatchMode=yes".to_string()));
        assert_eq!(batch.last().unwrap(), "ubuntu@10.0.0.1");

        let interactive = exec.ssh_args("10.0.0.1", true);
        assert!(!interactive.contains(&"BatchMode=yes".to_string()));
    }

    #[test]
    fn test_credential_injection_prefix() {
        let mut creds = BTreeMap::new();
        creds.insert("STORE_KEY".to_string(), "abc".to_string());
        creds.insert("STORE_SECRET".to_string(), "xyz".to_string());
        let exec = SshExec::new(SshSettings::default(), creds);

        let plain = exec.remote_command("whoami", false);
        assert_eq!(plain, "whoami");

        let injected = exec.remote_command("whoami", true);
        assert_eq!(
            injected,
            "export STORE_KEY='abc'; export STORE_SECRET='xyz'; whoami"
        );
    }

    #[tokio::test]
    async fn test_mock_records_and_fails_on_pattern() {
        let mock = MockExec::with_failures(["start-worker"]);

        mock.run("10.0.0.1", "mkdir -p /opt", ExecOptions::default())
            .await
            .unwrap();
        let err = mock
            .run("10.0.0.1", "sbin/start-worker.sh", ExecOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::CommandFailed { .. }));

        assert_eq!(mock.commands_for("10.0.0.1").len(), 2);
    }
}
