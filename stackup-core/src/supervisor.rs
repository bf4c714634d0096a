//! Process supervisor boundary
//!
//! Controls the external emulator process. `stackup-docker` implements it with
//! the Docker CLI.

use crate::error::SupervisorError;
use crate::model::LaunchOptions;
use async_trait::async_trait;

/// Docker label put on every emulator container, matched by the default cleanup filter
pub const EMULATOR_LABEL: &str = "stackup.emulator=localstack";

/// Start, stop and clean up the emulator process
#[async_trait]
pub trait ProcessSupervisor: Send + Sync {
    /// Whether the process this supervisor started is alive
    async fn is_running(&self) -> bool;

    /// Apply launch settings for the next `start`
    async fn configure(&self, options: LaunchOptions);

    async fn start(&self) -> Result<(), SupervisorError>;

    async fn stop(&self) -> Result<(), SupervisorError>;

    /// Ids of every container matching `filter`, running or not
    async fn list_container_ids(&self, filter: &str) -> Result<Vec<String>, SupervisorError>;

    async fn force_remove(&self, container_id: &str) -> Result<(), SupervisorError>;
}
