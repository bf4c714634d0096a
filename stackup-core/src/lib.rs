//! Core types and orchestration for stackup
//!
//! This crate provisions a local AWS emulator: it starts the emulator process,
//! creates the configured buckets and queues, and blocks until each one answers.
//! The emulator process and the AWS calls sit behind the [`ProcessSupervisor`]
//! and [`BackendClient`] traits.

pub mod backend;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod orchestrator;
pub mod retry;
pub mod supervisor;

pub use backend::{BackendClient, CreatedQueue};
pub use config::{ConfigError, StackupConfig};
pub use error::{
    BackendError, CleanupFailure, ProvisioningError, ResourceKind, ResourceRef, SupervisorError,
};
pub use lifecycle::{Lifecycle, EMBEDDED_AWS_PROFILE};
pub use model::{
    BucketSpec, LaunchOptions, ProvisionOutcome, ProvisionedQueue, QueueAttributeName,
    QueueAttributes, QueueSpec, RetryPolicy, ServiceEndpoint, EDGE_PORT,
};
pub use orchestrator::{CleanupReport, Orchestrator, ProvisioningPlan, DEFAULT_CLEANUP_FILTER};
pub use retry::retry;
pub use supervisor::{ProcessSupervisor, EMULATOR_LABEL};

pub use tokio_util::sync::CancellationToken;
