//! Backend client boundary
//!
//! The orchestrator only needs three calls from the messaging/storage backend.
//! `stackup-aws` implements them over the AWS SDK; tests use a recording fake.

use crate::error::BackendError;
use crate::model::{QueueAttributeName, QueueAttributes};
use async_trait::async_trait;
use std::collections::HashMap;

/// Response to a create-queue call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedQueue {
    pub url: String,
}

/// Queue and bucket operations the orchestrator depends on
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Create a bucket. Creating a bucket that already exists must succeed.
    async fn create_bucket(&self, name: &str) -> Result<(), BackendError>;

    /// Create a queue with the given attributes
    async fn create_queue(
        &self,
        name: &str,
        attributes: &QueueAttributes,
    ) -> Result<CreatedQueue, BackendError>;

    /// Fetch attributes of an existing queue, keyed by attribute name
    async fn get_queue_attributes(
        &self,
        queue_url: &str,
        names: &[QueueAttributeName],
    ) -> Result<HashMap<String, String>, BackendError>;
}
