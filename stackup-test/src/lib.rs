//! Test utilities for stackup
//!
//! Provides in-memory stand-ins for the emulator so orchestration can be tested
//! without Docker or network access:
//! - [`FakeBackend`] records every S3/SQS call and can be told to fail
//! - [`FakeSupervisor`] records process control calls and tracks "containers"
//! - [`LogCapture`] collects formatted log output for assertions
//!
//! ## Usage
//!
//! ```rust,no_run
//! use stackup_core::{CancellationToken, Orchestrator, ProvisioningPlan};
//! use stackup_test::{FakeBackend, FakeSupervisor};
//! use std::sync::Arc;
//!
//! #[tokio::test]
//! async fn test_provision() {
//!     let backend = Arc::new(FakeBackend::new());
//!     let orchestrator = Orchestrator::new(backend.clone(), Arc::new(FakeSupervisor::new()));
//!
//!     orchestrator
//!         .provision(&ProvisioningPlan::default(), &CancellationToken::new())
//!         .await
//!         .unwrap();
//!     assert_eq!(backend.buckets().len(), 2);
//! }
//! ```

pub mod backend;
pub mod logs;
pub mod supervisor;

pub use backend::{BackendCall, FakeBackend, Operation};
pub use logs::LogCapture;
pub use supervisor::{FakeSupervisor, SupervisorCall};

use stackup_core::{ProvisioningPlan, RetryPolicy};
use std::time::Duration;

/// Interval used by [`fast_plan`]
pub const TEST_RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Default plan with a small retry budget so failing tests finish quickly
pub fn fast_plan(max_attempts: u32) -> ProvisioningPlan {
    ProvisioningPlan {
        retry: RetryPolicy::new(max_attempts, TEST_RETRY_INTERVAL),
        ..ProvisioningPlan::default()
    }
}
