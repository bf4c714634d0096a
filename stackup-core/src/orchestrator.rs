//! Provisioning orchestrator
//!
//! Brings the emulator from "not ready" to "ready for dependent services":
//! start the process, create buckets, create the dead-letter queue, resolve its
//! ARN, then create the main queue with a redrive policy pointing at it. Every
//! backend round trip goes through [`retry`], and the first exhausted budget
//! aborts the whole sequence.

use crate::backend::BackendClient;
use crate::error::{BackendError, CleanupFailure, ProvisioningError, ResourceKind, ResourceRef};
use crate::model::{
    services_env, BucketSpec, LaunchOptions, ProvisionOutcome, ProvisionedQueue,
    QueueAttributeName, QueueSpec, RetryPolicy, ServiceEndpoint,
};
use crate::retry::retry;
use crate::supervisor::ProcessSupervisor;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Filter matching every container labelled with [`EMULATOR_LABEL`](crate::EMULATOR_LABEL)
pub const DEFAULT_CLEANUP_FILTER: &str = "label=stackup.emulator=localstack";

/// Everything one `provision` call needs
#[derive(Debug, Clone)]
pub struct ProvisioningPlan {
    pub endpoints: Vec<ServiceEndpoint>,
    pub queue: QueueSpec,
    pub buckets: Vec<BucketSpec>,
    pub retry: RetryPolicy,
    /// Base launch settings; `SERVICES` and published ports are derived from `endpoints`
    pub launch: LaunchOptions,
    /// Re-run bucket and queue creation when the emulator is already up
    pub verify_resources_on_reuse: bool,
}

impl Default for ProvisioningPlan {
    fn default() -> Self {
        Self {
            endpoints: vec![
                ServiceEndpoint::new("s3", 4572),
                ServiceEndpoint::new("sqs", 4576),
            ],
            queue: QueueSpec::default(),
            buckets: vec![
                BucketSpec::new("sourcebucket"),
                BucketSpec::new("targetbucket"),
            ],
            retry: RetryPolicy::default(),
            launch: LaunchOptions::default(),
            verify_resources_on_reuse: false,
        }
    }
}

impl ProvisioningPlan {
    /// Launch settings with the endpoint list applied
    pub fn launch_options(&self) -> LaunchOptions {
        let mut options = self.launch.clone();

        if let Some(services) = services_env(&self.endpoints) {
            options.environment.insert("SERVICES".to_string(), services);
            // Clients connect to the declared ports
            options.randomize_ports = false;
        }

        options.ports.clear();
        for endpoint in &self.endpoints {
            if !options.ports.contains(&endpoint.port) {
                options.ports.push(endpoint.port);
            }
        }
        if options.ports.is_empty() {
            // Clients fall back to the edge port
            options.ports.extend(options.container_port);
        }

        options
    }
}

/// What a cleanup pass did
#[derive(Debug, Default)]
#[must_use]
pub struct CleanupReport {
    /// The supervised process was running and has been stopped
    pub stopped: bool,
    pub removed: Vec<String>,
    pub failures: Vec<CleanupFailure>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn merge(&mut self, other: CleanupReport) {
        self.stopped |= other.stopped;
        self.removed.extend(other.removed);
        self.failures.extend(other.failures);
    }

    fn record(&mut self, failure: CleanupFailure) {
        warn!(error = %failure, "Emulator cleanup problem");
        self.failures.push(failure);
    }
}

/// Drives a [`ProcessSupervisor`] and a [`BackendClient`] through provisioning
pub struct Orchestrator<B, S> {
    backend: Arc<B>,
    supervisor: Arc<S>,
    cleanup_filter: String,
    /// Held for a whole `provision` run and by `deprovision`
    run_lock: tokio::sync::Mutex<()>,
    /// Cancelled by `deprovision` to stop an in-flight `provision`
    shutdown: Mutex<CancellationToken>,
    /// Outcome of the last successful run
    last_outcome: Mutex<Option<ProvisionOutcome>>,
}

impl<B, S> Orchestrator<B, S>
where
    B: BackendClient,
    S: ProcessSupervisor,
{
    pub fn new(backend: Arc<B>, supervisor: Arc<S>) -> Self {
        Self {
            backend,
            supervisor,
            cleanup_filter: DEFAULT_CLEANUP_FILTER.to_string(),
            run_lock: tokio::sync::Mutex::new(()),
            shutdown: Mutex::new(CancellationToken::new()),
            last_outcome: Mutex::new(None),
        }
    }

    pub fn with_cleanup_filter(mut self, filter: impl Into<String>) -> Self {
        self.cleanup_filter = filter.into();
        self
    }

    /// Start the emulator if needed and create every resource in `plan`.
    ///
    /// Concurrent callers are serialized; a caller that waited finds the
    /// emulator running and takes the reuse path. A concurrent `deprovision`
    /// cancels the run.
    pub async fn provision(
        &self,
        plan: &ProvisioningPlan,
        cancel: &CancellationToken,
    ) -> Result<ProvisionOutcome, ProvisioningError> {
        let _running = self.run_lock.lock().await;

        let run_cancel = self.shutdown.lock().child_token();
        let run = self.provision_locked(plan, &run_cancel);
        tokio::pin!(run);

        // Forward caller cancellation and let the run unwind on its own
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                run_cancel.cancel();
                run.await
            }
            result = &mut run => result,
        }
    }

    async fn provision_locked(
        &self,
        plan: &ProvisioningPlan,
        cancel: &CancellationToken,
    ) -> Result<ProvisionOutcome, ProvisioningError> {
        if self.supervisor.is_running().await {
            if !plan.verify_resources_on_reuse {
                info!("Emulator already running, not re-starting or re-provisioning");
                let queue = self
                    .last_outcome
                    .lock()
                    .as_ref()
                    .and_then(|o| o.queue().cloned());
                return Ok(ProvisionOutcome::Reused { queue });
            }
            info!("Emulator already running, verifying resources");
        } else {
            let stale = self.clean_stale().await;
            if !stale.is_clean() {
                warn!(
                    failures = stale.failures.len(),
                    "Starting emulator despite cleanup failures"
                );
            }
            self.start_emulator(plan, cancel).await?;
        }

        let outcome = self.provision_resources(plan, cancel).await?;
        *self.last_outcome.lock() = Some(outcome.clone());
        Ok(outcome)
    }

    /// Stop the emulator if it is running, then remove any stale containers.
    ///
    /// An in-flight `provision` is cancelled first. Never fails: problems are
    /// logged and returned in the report.
    pub async fn deprovision(&self) -> CleanupReport {
        self.shutdown.lock().cancel();
        let _running = self.run_lock.lock().await;
        *self.shutdown.lock() = CancellationToken::new();

        let mut report = CleanupReport::default();

        if self.supervisor.is_running().await {
            info!("Stopping emulator");
            match self.supervisor.stop().await {
                Ok(()) => {
                    report.stopped = true;
                    info!("Stopped emulator");
                }
                Err(source) => report.record(CleanupFailure {
                    container_id: None,
                    source,
                }),
            }
        }

        report.merge(self.clean_stale().await);
        *self.last_outcome.lock() = None;
        report
    }

    /// Force-remove every container matching the cleanup filter
    pub async fn clean_stale(&self) -> CleanupReport {
        let mut report = CleanupReport::default();

        let container_ids = match self.supervisor.list_container_ids(&self.cleanup_filter).await {
            Ok(ids) => ids,
            Err(source) => {
                report.record(CleanupFailure {
                    container_id: None,
                    source,
                });
                return report;
            }
        };

        info!(
            filter = %self.cleanup_filter,
            containers = ?container_ids,
            "Containers to be cleaned"
        );

        for container_id in container_ids {
            match self.supervisor.force_remove(&container_id).await {
                Ok(()) => {
                    debug!(container_id = %container_id, "Removed container");
                    report.removed.push(container_id);
                }
                Err(source) => report.record(CleanupFailure {
                    container_id: Some(container_id),
                    source,
                }),
            }
        }

        report
    }

    async fn start_emulator(
        &self,
        plan: &ProvisioningPlan,
        cancel: &CancellationToken,
    ) -> Result<(), ProvisioningError> {
        let options = plan.launch_options();
        info!(
            services = ?options.environment.get("SERVICES"),
            host = %options.host_name,
            pull_image = options.pull_image,
            randomize_ports = options.randomize_ports,
            "Starting emulator"
        );

        self.supervisor.configure(options).await;

        if cancel.is_cancelled() {
            return Err(ProvisioningError::StartCancelled);
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ProvisioningError::StartCancelled),
            result = self.supervisor.start() => result.map_err(ProvisioningError::ProcessStart),
        }
    }

    async fn provision_resources(
        &self,
        plan: &ProvisioningPlan,
        cancel: &CancellationToken,
    ) -> Result<ProvisionOutcome, ProvisioningError> {
        let buckets = self.create_buckets(plan, cancel).await?;
        let dead_letter = self.create_dead_letter_queue(plan, cancel).await?;
        let queue = self.create_main_queue(plan, &dead_letter, cancel).await?;

        info!(
            queue_url = %queue.url,
            dead_letter_arn = %dead_letter.arn,
            buckets = ?buckets,
            "Emulator resources ready"
        );

        Ok(ProvisionOutcome::Provisioned {
            queue,
            dead_letter,
            buckets,
        })
    }

    async fn create_buckets(
        &self,
        plan: &ProvisioningPlan,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, ProvisioningError> {
        let backend = &*self.backend;
        let mut created = Vec::with_capacity(plan.buckets.len());

        for bucket in &plan.buckets {
            let name = bucket.name.as_str();
            let resource = ResourceRef::new(ResourceKind::Bucket, name);

            retry(&plan.retry, cancel, &resource, || backend.create_bucket(name)).await?;

            info!(bucket = %name, "Bucket ready");
            created.push(bucket.name.clone());
        }

        Ok(created)
    }

    async fn create_dead_letter_queue(
        &self,
        plan: &ProvisioningPlan,
        cancel: &CancellationToken,
    ) -> Result<ProvisionedQueue, ProvisioningError> {
        let backend = &*self.backend;
        let name = plan.queue.dead_letter_queue_name.as_str();
        let attributes = plan.queue.dead_letter_attributes();

        let created = retry(
            &plan.retry,
            cancel,
            &ResourceRef::new(ResourceKind::DeadLetterQueue, name),
            || backend.create_queue(name, &attributes),
        )
        .await?;

        let arn = self.fetch_queue_arn(plan, &created.url, name, cancel).await?;
        info!(queue = %name, arn = %arn, "Dead-letter queue ready");

        Ok(ProvisionedQueue {
            url: created.url,
            arn,
        })
    }

    async fn create_main_queue(
        &self,
        plan: &ProvisioningPlan,
        dead_letter: &ProvisionedQueue,
        cancel: &CancellationToken,
    ) -> Result<ProvisionedQueue, ProvisioningError> {
        let backend = &*self.backend;
        let name = plan.queue.name.as_str();
        let attributes = plan
            .queue
            .attributes(plan.queue.redrive_policy(&dead_letter.arn));

        debug!(queue = %name, attributes = ?attributes, "Creating queue");

        let created = retry(
            &plan.retry,
            cancel,
            &ResourceRef::new(ResourceKind::Queue, name),
            || backend.create_queue(name, &attributes),
        )
        .await?;

        let arn = self.fetch_queue_arn(plan, &created.url, name, cancel).await?;
        info!(queue = %name, arn = %arn, "Queue ready");

        Ok(ProvisionedQueue {
            url: created.url,
            arn,
        })
    }

    /// Resolve a queue's ARN; a response without one counts as a failed attempt
    async fn fetch_queue_arn(
        &self,
        plan: &ProvisioningPlan,
        queue_url: &str,
        queue_name: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ProvisioningError> {
        let backend = &*self.backend;
        let arn_attribute = QueueAttributeName::QueueArn;

        retry(
            &plan.retry,
            cancel,
            &ResourceRef::new(ResourceKind::QueueAttributes, queue_name),
            || async move {
                let mut attributes = backend
                    .get_queue_attributes(queue_url, &[arn_attribute])
                    .await?;
                attributes
                    .remove(arn_attribute.as_str())
                    .ok_or_else(|| BackendError::MissingAttribute {
                        attribute: arn_attribute.as_str(),
                        queue_url: queue_url.to_string(),
                    })
            },
        )
        .await
    }
}
