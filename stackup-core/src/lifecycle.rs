//! Startup and shutdown hooks
//!
//! Provisioning is a gate: the application awaits `on_startup` before starting
//! anything that needs the emulator, and runs `on_shutdown` on the way out.

use crate::backend::BackendClient;
use crate::error::ProvisioningError;
use crate::model::ProvisionOutcome;
use crate::orchestrator::{CleanupReport, Orchestrator, ProvisioningPlan};
use crate::supervisor::ProcessSupervisor;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Profile that enables the embedded emulator
pub const EMBEDDED_AWS_PROFILE: &str = "embedded-aws";

pub struct Lifecycle<B, S> {
    orchestrator: Orchestrator<B, S>,
    plan: ProvisioningPlan,
    profiles: Vec<String>,
}

impl<B, S> Lifecycle<B, S>
where
    B: BackendClient,
    S: ProcessSupervisor,
{
    pub fn new(
        orchestrator: Orchestrator<B, S>,
        plan: ProvisioningPlan,
        profiles: Vec<String>,
    ) -> Self {
        Self {
            orchestrator,
            plan,
            profiles,
        }
    }

    /// Whether the embedded emulator is enabled for this run
    pub fn is_active(&self) -> bool {
        self.profiles.iter().any(|p| p == EMBEDDED_AWS_PROFILE)
    }

    pub fn orchestrator(&self) -> &Orchestrator<B, S> {
        &self.orchestrator
    }

    /// Provision when the embedded profile is active; `Ok(None)` otherwise
    pub async fn on_startup(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<ProvisionOutcome>, ProvisioningError> {
        if !self.is_active() {
            info!(
                profiles = ?self.profiles,
                "Profile '{}' not active, skipping emulator startup",
                EMBEDDED_AWS_PROFILE
            );
            return Ok(None);
        }

        self.orchestrator.provision(&self.plan, cancel).await.map(Some)
    }

    /// Best-effort teardown, whatever happened at startup
    ///
    /// Returns `None` when the embedded profile is not active, since nothing was
    /// ever started for this run.
    pub async fn on_shutdown(&self) -> Option<CleanupReport> {
        if !self.is_active() {
            return None;
        }

        let report = self.orchestrator.deprovision().await;
        info!(
            stopped = report.stopped,
            removed = report.removed.len(),
            failures = report.failures.len(),
            "Emulator shutdown complete"
        );
        Some(report)
    }
}
