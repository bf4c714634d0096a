//! Recording in-memory backend

use async_trait::async_trait;
use parking_lot::Mutex;
use stackup_core::{
    BackendClient, BackendError, CreatedQueue, QueueAttributeName, QueueAttributes,
};
use std::collections::{BTreeSet, HashMap};

const ACCOUNT: &str = "000000000000";

/// Backend operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateBucket,
    CreateQueue,
    GetQueueAttributes,
    /// `GetQueueAttributes` succeeds but the response has no `QueueArn`
    OmitQueueArn,
}

/// One call made against the fake, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    CreateBucket(String),
    CreateQueue {
        name: String,
        attributes: QueueAttributes,
    },
    GetQueueAttributes {
        queue_url: String,
        names: Vec<QueueAttributeName>,
    },
}

/// Fake S3/SQS backend with per-resource failure injection
#[derive(Debug, Default)]
pub struct FakeBackend {
    calls: Mutex<Vec<BackendCall>>,
    buckets: Mutex<BTreeSet<String>>,
    queues: Mutex<HashMap<String, QueueAttributes>>,
    /// Remaining failures per (operation, bucket or queue name)
    failures: Mutex<HashMap<(Operation, String), u32>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` calls of `operation` on `name`
    pub fn fail(&self, operation: Operation, name: &str, times: u32) -> &Self {
        self.failures
            .lock()
            .insert((operation, name.to_string()), times);
        self
    }

    /// Fail every call of `operation` on `name`
    pub fn fail_always(&self, operation: Operation, name: &str) -> &Self {
        self.fail(operation, name, u32::MAX)
    }

    pub fn queue_url(name: &str) -> String {
        format!("http://localhost:4576/{}/{}", ACCOUNT, name)
    }

    pub fn queue_arn(name: &str) -> String {
        format!("arn:aws:sqs:us-east-1:{}:{}", ACCOUNT, name)
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().clone()
    }

    pub fn bucket_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BackendCall::CreateBucket(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    /// Create-queue calls as (name, attributes)
    pub fn queue_calls(&self) -> Vec<(String, QueueAttributes)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BackendCall::CreateQueue { name, attributes } => Some((name, attributes)),
                _ => None,
            })
            .collect()
    }

    /// Queue URLs passed to get-queue-attributes
    pub fn attribute_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BackendCall::GetQueueAttributes { queue_url, .. } => Some(queue_url),
                _ => None,
            })
            .collect()
    }

    /// Buckets that exist
    pub fn buckets(&self) -> Vec<String> {
        self.buckets.lock().iter().cloned().collect()
    }

    /// Attributes a queue was created with, if it exists
    pub fn queue(&self, name: &str) -> Option<QueueAttributes> {
        self.queues.lock().get(name).cloned()
    }

    fn record(&self, call: BackendCall) {
        self.calls.lock().push(call);
    }

    /// Consume one injected failure, if any remain
    fn should_fail(&self, operation: Operation, name: &str) -> bool {
        let mut failures = self.failures.lock();
        match failures.get_mut(&(operation, name.to_string())) {
            Some(0) | None => false,
            Some(remaining) => {
                if *remaining != u32::MAX {
                    *remaining -= 1;
                }
                true
            }
        }
    }

    fn queue_name_from_url(queue_url: &str) -> &str {
        queue_url.rsplit('/').next().unwrap_or(queue_url)
    }
}

#[async_trait]
impl BackendClient for FakeBackend {
    async fn create_bucket(&self, name: &str) -> Result<(), BackendError> {
        self.record(BackendCall::CreateBucket(name.to_string()));

        if self.should_fail(Operation::CreateBucket, name) {
            return Err(BackendError::Unavailable("connection refused".to_string()));
        }

        self.buckets.lock().insert(name.to_string());
        Ok(())
    }

    async fn create_queue(
        &self,
        name: &str,
        attributes: &QueueAttributes,
    ) -> Result<CreatedQueue, BackendError> {
        self.record(BackendCall::CreateQueue {
            name: name.to_string(),
            attributes: attributes.clone(),
        });

        if self.should_fail(Operation::CreateQueue, name) {
            return Err(BackendError::Request {
                operation: "CreateQueue",
                message: "service not ready".to_string(),
            });
        }

        self.queues
            .lock()
            .insert(name.to_string(), attributes.clone());

        Ok(CreatedQueue {
            url: Self::queue_url(name),
        })
    }

    async fn get_queue_attributes(
        &self,
        queue_url: &str,
        names: &[QueueAttributeName],
    ) -> Result<HashMap<String, String>, BackendError> {
        self.record(BackendCall::GetQueueAttributes {
            queue_url: queue_url.to_string(),
            names: names.to_vec(),
        });

        let name = Self::queue_name_from_url(queue_url);

        if self.should_fail(Operation::GetQueueAttributes, name) {
            return Err(BackendError::Unavailable("connection reset".to_string()));
        }

        let stored = self.queue(name).ok_or_else(|| BackendError::Request {
            operation: "GetQueueAttributes",
            message: format!("queue {} does not exist", name),
        })?;

        let omit_arn = self.should_fail(Operation::OmitQueueArn, name);
        let mut attributes = HashMap::new();
        for attribute in names {
            let value = match attribute {
                QueueAttributeName::QueueArn if omit_arn => None,
                QueueAttributeName::QueueArn => Some(Self::queue_arn(name)),
                other => stored.get(other).cloned(),
            };
            if let Some(value) = value {
                attributes.insert(attribute.as_str().to_string(), value);
            }
        }

        Ok(attributes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failures_are_consumed() {
        let backend = FakeBackend::new();
        backend.fail(Operation::CreateBucket, "src", 2);

        assert!(backend.create_bucket("src").await.is_err());
        assert!(backend.create_bucket("src").await.is_err());
        assert!(backend.create_bucket("src").await.is_ok());
        assert!(backend.create_bucket("other").await.is_ok());
        assert_eq!(backend.bucket_calls(), vec!["src", "src", "src", "other"]);
        assert_eq!(backend.buckets(), vec!["other", "src"]);
    }

    #[tokio::test]
    async fn test_queue_arn_lookup() {
        let backend = FakeBackend::new();
        let created = backend
            .create_queue("dlq", &QueueAttributes::new())
            .await
            .unwrap();

        let attributes = backend
            .get_queue_attributes(&created.url, &[QueueAttributeName::QueueArn])
            .await
            .unwrap();
        assert_eq!(
            attributes.get("QueueArn"),
            Some(&"arn:aws:sqs:us-east-1:000000000000:dlq".to_string())
        );

        backend.fail(Operation::OmitQueueArn, "dlq", 1);
        let attributes = backend
            .get_queue_attributes(&created.url, &[QueueAttributeName::QueueArn])
            .await
            .unwrap();
        assert!(attributes.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_queue_errors() {
        let backend = FakeBackend::new();
        let result = backend
            .get_queue_attributes(&FakeBackend::queue_url("missing"), &[QueueAttributeName::QueueArn])
            .await;
        assert!(result.is_err());
    }
}
