//! Integration tests for fleet orchestration against the mock provider and
//! mock transport.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use flotilla_fleet::config::{
    FleetConfig, NetworkConfig, ProviderConfig, RetryConfig, RoleSizing, SshConfig,
};
use flotilla_fleet::{FleetError, FleetOrchestrator};
use flotilla_provider::MockProvider;
use flotilla_remote::{ExecCall, MockExec};

fn test_config() -> FleetConfig {
    FleetConfig {
        cluster_name: "demo".to_string(),
        key_name: "demo-key".to_string(),
        image: "img-base".to_string(),
        artifact_url: "https://artifacts.example.com/runtime.tgz".to_string(),
        install_dir: "/opt/flotilla".to_string(),
        coordinator: RoleSizing {
            instance_type: "m.large".to_string(),
            disk_gb: 64,
        },
        worker: RoleSizing {
            instance_type: "m.xlarge".to_string(),
            disk_gb: 256,
        },
        network: NetworkConfig::default(),
        env: BTreeMap::new(),
        credentials: BTreeMap::new(),
        use_public_addr: false,
        retries: RetryConfig {
            provision_attempts: 3,
            request_attempts: 3,
            tag_attempts: 3,
            address_attempts: 5,
            terminate_attempts: 5,
            poll_delay_ms: 1,
        },
        bootstrap_concurrency: 4,
        teardown_on_failure: false,
        ssh: SshConfig::default(),
        provider: ProviderConfig {
            endpoint: "http://localhost:1".to_string(),
            api_token: "test".to_string(),
        },
    }
}

fn orchestrator(
    config: FleetConfig,
    provider: &Arc<MockProvider>,
    exec: &Arc<MockExec>,
) -> FleetOrchestrator {
    FleetOrchestrator::new(config, provider.clone(), exec.clone())
}

/// Compress a recorded command into a readable step label.
fn step_label(command: &str) -> &'static str {
    if command.contains("curl") {
        "install"
    } else if command.contains("cluster-env.sh") {
        "write-env"
    } else if command.contains("start-coordinator") {
        "start-coordinator"
    } else if command.contains("stop-coordinator") {
        "stop-coordinator"
    } else if command.contains("start-worker") {
        "start-worker"
    } else if command.contains("stop-worker") {
        "stop-worker"
    } else if command.contains("bin/submit") {
        "submit"
    } else {
        "other"
    }
}

#[tokio::test]
async fn test_create_coordinator_runs_bootstrap_sequence() {
    let provider = Arc::new(MockProvider::new());
    let exec = Arc::new(MockExec::new());
    let orch = orchestrator(test_config(), &provider, &exec);

    let node = orch.create_coordinator().await.unwrap();
    assert_eq!(node.name, "demo-master");
    assert_eq!(node.addr, "10.0.0.1");

    let commands = exec.commands_for(&node.addr);
    let steps: Vec<&str> = commands.iter().map(|c| step_label(c)).collect();
    assert_eq!(steps, vec!["install", "write-env", "start-coordinator"]);

    let fleet = orch.fleet().await.unwrap();
    assert!(fleet.coordinator.is_some());
    assert!(fleet.workers.is_empty());
}

#[tokio::test]
async fn test_create_coordinator_twice_is_a_precondition_violation() {
    let provider = Arc::new(MockProvider::new());
    let exec = Arc::new(MockExec::new());
    let orch = orchestrator(test_config(), &provider, &exec);

    orch.create_coordinator().await.unwrap();
    let err = orch.create_coordinator().await.unwrap_err();

    assert!(matches!(err, FleetError::CoordinatorExists));
    // The violation created nothing and terminated nothing.
    assert_eq!(provider.create_requests(), vec![1]);
    assert!(provider.terminate_requests().is_empty());
}

#[tokio::test]
async fn test_add_workers_requires_coordinator() {
    let provider = Arc::new(MockProvider::new());
    let exec = Arc::new(MockExec::new());
    let orch = orchestrator(test_config(), &provider, &exec);

    let err = orch.add_workers(2).await.unwrap_err();
    assert!(matches!(err, FleetError::NoCoordinator));
    assert!(provider.create_requests().is_empty());
}

#[tokio::test]
async fn test_worker_env_points_at_coordinator() {
    let provider = Arc::new(MockProvider::new());
    let exec = Arc::new(MockExec::new());
    let orch = orchestrator(test_config(), &provider, &exec);

    let coordinator = orch.create_coordinator().await.unwrap();
    let workers = orch.add_workers(1).await.unwrap();
    assert_eq!(workers.len(), 1);

    let env_write = exec
        .commands_for(&workers[0].addr)
        .into_iter()
        .find(|c| c.contains("cluster-env.sh"))
        .expect("worker got no env file");
    assert!(env_write.contains(&format!("COORDINATOR_ADDR={}", coordinator.addr)));
}

#[tokio::test]
async fn test_removal_takes_highest_indices_and_never_reuses_them() {
    let provider = Arc::new(MockProvider::new());
    let exec = Arc::new(MockExec::new());
    let orch = orchestrator(test_config(), &provider, &exec);

    orch.create_coordinator().await.unwrap();
    orch.add_workers(5).await.unwrap();

    let removed = orch.remove_workers(2).await.unwrap();
    assert_eq!(removed, vec!["demo-worker-5", "demo-worker-4"]);

    // Survivors keep their indices; the next worker takes a fresh one.
    let added = orch.add_workers(1).await.unwrap();
    assert_eq!(added[0].name, "demo-worker-6");

    let fleet = orch.fleet().await.unwrap();
    let indices: Vec<u32> = fleet.workers.iter().map(|(i, _)| *i).collect();
    assert_eq!(indices, vec![1, 2, 3, 6]);
}

#[tokio::test]
async fn test_aggregate_bootstrap_failure_waits_for_all_and_keeps_siblings() {
    let provider = Arc::new(MockProvider::new());
    // The second worker's host (serial 3, coordinator is serial 1) rejects
    // every command.
    let exec = Arc::new(MockExec::with_failures(["10.0.0.3"]));
    let orch = orchestrator(test_config(), &provider, &exec);

    orch.create_coordinator().await.unwrap();
    let err = orch.add_workers(3).await.unwrap_err();

    // The aggregate reports the failed worker by name.
    match &err {
        FleetError::Bootstrap { node, .. } => assert_eq!(node, "demo-worker-2"),
        other => panic!("expected Bootstrap error, got {other}"),
    }

    // Teardown disabled: every sibling ran to completion and all three
    // workers are still part of the fleet.
    let fleet = orch.fleet().await.unwrap();
    assert_eq!(fleet.workers.len(), 3);
    let started: Vec<String> = ["10.0.0.2", "10.0.0.4"]
        .iter()
        .filter(|addr| {
            exec.commands_for(addr)
                .iter()
                .any(|c| c.contains("start-worker"))
        })
        .map(|a| a.to_string())
        .collect();
    assert_eq!(started.len(), 2);
}

#[tokio::test]
async fn test_aggregate_bootstrap_failure_with_teardown_removes_fleet() {
    let provider = Arc::new(MockProvider::new());
    let exec = Arc::new(MockExec::with_failures(["10.0.0.3"]));
    let mut config = test_config();
    config.teardown_on_failure = true;
    let orch = orchestrator(config, &provider, &exec);

    orch.create_coordinator().await.unwrap();
    let err = orch.add_workers(3).await.unwrap_err();
    assert!(matches!(err, FleetError::Bootstrap { .. }));

    let fleet = orch.fleet().await.unwrap();
    assert!(fleet.is_empty());
    assert!(provider.live_names().is_empty());
}

#[tokio::test]
async fn test_coordinator_bootstrap_failure_with_teardown() {
    let provider = Arc::new(MockProvider::new());
    let exec = Arc::new(MockExec::with_failures(["start-coordinator"]));
    let mut config = test_config();
    config.teardown_on_failure = true;
    let orch = orchestrator(config, &provider, &exec);

    let err = orch.create_coordinator().await.unwrap_err();
    assert!(matches!(err, FleetError::Bootstrap { .. }));

    // The half-configured coordinator did not survive.
    assert!(provider.live_names().is_empty());
}

#[tokio::test]
async fn test_restart_cluster_is_strictly_ordered() {
    let provider = Arc::new(MockProvider::new());
    let setup_exec = Arc::new(MockExec::new());
    let orch = orchestrator(test_config(), &provider, &setup_exec);

    orch.create_coordinator().await.unwrap();
    orch.add_workers(2).await.unwrap();

    // Fresh transport so only the restart's commands are recorded.
    let exec = Arc::new(MockExec::new());
    let orch = orchestrator(test_config(), &provider, &exec);
    orch.restart_cluster().await.unwrap();

    let steps: Vec<(String, &'static str)> = exec
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            ExecCall::Run { addr, command } => Some((addr, step_label(&command))),
            ExecCall::Upload { .. } => None,
        })
        .collect();

    let coordinator = "10.0.0.1".to_string();
    let w1 = "10.0.0.2".to_string();
    let w2 = "10.0.0.3".to_string();
    assert_eq!(
        steps,
        vec![
            (coordinator.clone(), "write-env"),
            (w1.clone(), "write-env"),
            (w2.clone(), "write-env"),
            (w1.clone(), "stop-worker"),
            (w2.clone(), "stop-worker"),
            (coordinator.clone(), "stop-coordinator"),
            (coordinator.clone(), "start-coordinator"),
            (w1, "start-worker"),
            (w2, "start-worker"),
        ]
    );
}

#[tokio::test]
async fn test_restart_requires_coordinator() {
    let provider = Arc::new(MockProvider::new());
    let exec = Arc::new(MockExec::new());
    let orch = orchestrator(test_config(), &provider, &exec);

    let err = orch.restart_cluster().await.unwrap_err();
    assert!(matches!(err, FleetError::NoCoordinator));
}

#[tokio::test]
async fn test_destroy_fleet_is_idempotent_when_empty() {
    let provider = Arc::new(MockProvider::new());
    let exec = Arc::new(MockExec::new());
    let orch = orchestrator(test_config(), &provider, &exec);

    orch.destroy_fleet().await.unwrap();
    assert!(provider.terminate_requests().is_empty());
}

#[tokio::test]
async fn test_destroy_fleet_removes_coordinator_and_workers() {
    let provider = Arc::new(MockProvider::new());
    let exec = Arc::new(MockExec::new());
    let orch = orchestrator(test_config(), &provider, &exec);

    orch.create_coordinator().await.unwrap();
    orch.add_workers(2).await.unwrap();

    orch.destroy_fleet().await.unwrap();

    assert!(provider.live_names().is_empty());
    assert!(orch.fleet().await.unwrap().is_empty());
    // One batch call for the whole fleet.
    assert_eq!(provider.terminate_requests().len(), 1);
    assert_eq!(provider.terminate_requests()[0].len(), 3);
}

#[tokio::test]
async fn test_submit_job_uploads_artifact_to_coordinator() {
    let provider = Arc::new(MockProvider::new());
    let exec = Arc::new(MockExec::new());
    let orch = orchestrator(test_config(), &provider, &exec);

    orch.create_coordinator().await.unwrap();
    orch.submit_job(Path::new("/builds/job.tgz"), &["--mode".to_string(), "fast".to_string()])
        .await
        .unwrap();

    let calls = exec.calls();
    assert!(calls.iter().any(|c| matches!(
        c,
        ExecCall::Upload { remote_path, .. } if remote_path == "/tmp/job.tgz"
    )));
    let submit = exec
        .commands_for("10.0.0.1")
        .into_iter()
        .find(|c| c.contains("bin/submit"))
        .expect("no submit command ran");
    assert!(submit.contains("/tmp/job.tgz --mode fast"));
}
