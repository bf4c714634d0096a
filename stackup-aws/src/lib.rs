//! AWS SDK backend for stackup
//!
//! Implements [`stackup_core::BackendClient`] with `aws-sdk-s3` and
//! `aws-sdk-sqs`, pointed at the emulator's per-service endpoints.

mod client;

pub use client::{AwsBackend, AwsBackendConfig, DEFAULT_REGION};
