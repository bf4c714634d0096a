//! Startup and shutdown hook tests

use stackup_core::{
    CancellationToken, Lifecycle, Orchestrator, ProvisioningError, StackupConfig,
    EMBEDDED_AWS_PROFILE,
};
use stackup_test::{fast_plan, FakeBackend, FakeSupervisor, Operation};
use std::sync::Arc;

fn lifecycle(
    supervisor: FakeSupervisor,
    profiles: &[&str],
) -> (
    Lifecycle<FakeBackend, FakeSupervisor>,
    Arc<FakeBackend>,
    Arc<FakeSupervisor>,
) {
    let backend = Arc::new(FakeBackend::new());
    let supervisor = Arc::new(supervisor);
    let orchestrator = Orchestrator::new(backend.clone(), supervisor.clone());
    let profiles = profiles.iter().map(|p| p.to_string()).collect();

    (
        Lifecycle::new(orchestrator, fast_plan(2), profiles),
        backend,
        supervisor,
    )
}

#[tokio::test]
async fn test_inactive_profile_is_a_no_op() {
    let (lifecycle, backend, supervisor) = lifecycle(FakeSupervisor::new(), &["dev"]);

    assert!(!lifecycle.is_active());
    let outcome = lifecycle.on_startup(&CancellationToken::new()).await.unwrap();
    assert!(outcome.is_none());
    assert!(lifecycle.on_shutdown().await.is_none());

    assert!(backend.calls().is_empty());
    assert!(supervisor.calls().is_empty());
}

#[tokio::test]
async fn test_startup_and_shutdown() {
    let (lifecycle, backend, supervisor) =
        lifecycle(FakeSupervisor::new(), &["dev", EMBEDDED_AWS_PROFILE]);

    let outcome = lifecycle
        .on_startup(&CancellationToken::new())
        .await
        .unwrap()
        .unwrap();
    assert!(!outcome.is_reused());
    assert_eq!(backend.buckets(), vec!["sourcebucket", "targetbucket"]);

    let report = lifecycle.on_shutdown().await.unwrap();
    assert!(report.stopped);
    assert!(supervisor.containers().is_empty());
}

#[tokio::test]
async fn test_shutdown_runs_after_failed_startup() {
    let (lifecycle, backend, supervisor) =
        lifecycle(FakeSupervisor::new(), &[EMBEDDED_AWS_PROFILE]);
    backend.fail_always(Operation::CreateQueue, "stackup-queue-dlq");

    let err = lifecycle
        .on_startup(&CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ProvisioningError::ResourceProvisioningFailed { attempts: 2, .. }
    ));

    let report = lifecycle.on_shutdown().await.unwrap();
    assert!(report.stopped);
    assert!(report.is_clean());
    assert!(supervisor.containers().is_empty());
}

#[tokio::test]
async fn test_shutdown_after_cancelled_startup() {
    let (lifecycle, _, supervisor) = lifecycle(FakeSupervisor::new(), &[EMBEDDED_AWS_PROFILE]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = lifecycle.on_startup(&cancel).await.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(supervisor.start_count(), 0);

    // Never started, but the cleanup scan still runs
    let report = lifecycle.on_shutdown().await.unwrap();
    assert!(!report.stopped);
    assert!(report.is_clean());
}

#[tokio::test]
async fn test_lifecycle_from_config() {
    let mut config = StackupConfig::default();
    config.s3.bucket = "src".to_string();
    config.s3.target_bucket = "tgt".to_string();
    config.retry.max_attempts = 2;
    config.retry.interval_secs = 0;

    let backend = Arc::new(FakeBackend::new());
    let supervisor = Arc::new(FakeSupervisor::new());
    let orchestrator = Orchestrator::new(backend.clone(), supervisor)
        .with_cleanup_filter(config.localstack.cleanup_filter.clone());
    let lifecycle = Lifecycle::new(orchestrator, config.plan(), config.profiles.clone());

    assert!(lifecycle.is_active());
    lifecycle
        .on_startup(&CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(backend.bucket_calls(), vec!["src", "tgt"]);
}
