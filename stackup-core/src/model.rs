//! Provisioning data model

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Port the emulator serves every service on inside its container
pub const EDGE_PORT: u16 = 4566;

/// One emulated backend service and the port it listens on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    pub name: String,
    pub port: u16,
}

impl ServiceEndpoint {
    pub fn new(name: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            port,
        }
    }
}

impl fmt::Display for ServiceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.port)
    }
}

/// Build the emulator `SERVICES` value (`s3:4572,sqs:4576`)
///
/// Returns `None` for an empty endpoint list so callers leave the variable unset.
pub fn services_env(endpoints: &[ServiceEndpoint]) -> Option<String> {
    if endpoints.is_empty() {
        return None;
    }

    Some(
        endpoints
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(","),
    )
}

/// SQS queue attribute keys used during provisioning
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QueueAttributeName {
    DelaySeconds,
    MaximumMessageSize,
    MessageRetentionPeriod,
    ReceiveMessageWaitTimeSeconds,
    VisibilityTimeout,
    FifoQueue,
    ContentBasedDeduplication,
    RedrivePolicy,
    QueueArn,
}

impl QueueAttributeName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DelaySeconds => "DelaySeconds",
            Self::MaximumMessageSize => "MaximumMessageSize",
            Self::MessageRetentionPeriod => "MessageRetentionPeriod",
            Self::ReceiveMessageWaitTimeSeconds => "ReceiveMessageWaitTimeSeconds",
            Self::VisibilityTimeout => "VisibilityTimeout",
            Self::FifoQueue => "FifoQueue",
            Self::ContentBasedDeduplication => "ContentBasedDeduplication",
            Self::RedrivePolicy => "RedrivePolicy",
            Self::QueueArn => "QueueArn",
        }
    }
}

impl fmt::Display for QueueAttributeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attribute map sent with a create-queue call
pub type QueueAttributes = BTreeMap<QueueAttributeName, String>;

/// Everything needed to create the main queue and its dead-letter queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSpec {
    #[serde(default = "default_queue_name")]
    pub name: String,

    #[serde(default)]
    pub delay_seconds: u32,

    #[serde(default = "default_max_message_size")]
    pub max_message_size: u32,

    #[serde(default = "default_message_retention_period")]
    pub message_retention_period: u32,

    #[serde(default)]
    pub receive_wait_time_seconds: u32,

    #[serde(default = "default_visibility_timeout")]
    pub visibility_timeout: u32,

    #[serde(default)]
    pub fifo: bool,

    #[serde(default)]
    pub content_based_deduplication: bool,

    #[serde(default = "default_dead_letter_queue_name")]
    pub dead_letter_queue_name: String,

    #[serde(default = "default_max_receive_count")]
    pub max_receive_count: u32,
}

impl Default for QueueSpec {
    fn default() -> Self {
        Self {
            name: default_queue_name(),
            delay_seconds: 0,
            max_message_size: default_max_message_size(),
            message_retention_period: default_message_retention_period(),
            receive_wait_time_seconds: 0,
            visibility_timeout: default_visibility_timeout(),
            fifo: false,
            content_based_deduplication: false,
            dead_letter_queue_name: default_dead_letter_queue_name(),
            max_receive_count: default_max_receive_count(),
        }
    }
}

impl QueueSpec {
    /// Redrive policy document pointing at the dead-letter queue
    pub fn redrive_policy(&self, dead_letter_arn: &str) -> String {
        format!(
            r#"{{"maxReceiveCount":"{}", "deadLetterTargetArn":"{}"}}"#,
            self.max_receive_count, dead_letter_arn
        )
    }

    /// Full attribute map for the main queue
    pub fn attributes(&self, redrive_policy: String) -> QueueAttributes {
        use QueueAttributeName as A;

        QueueAttributes::from([
            (A::DelaySeconds, self.delay_seconds.to_string()),
            (A::MaximumMessageSize, self.max_message_size.to_string()),
            (
                A::MessageRetentionPeriod,
                self.message_retention_period.to_string(),
            ),
            (
                A::ReceiveMessageWaitTimeSeconds,
                self.receive_wait_time_seconds.to_string(),
            ),
            (A::VisibilityTimeout, self.visibility_timeout.to_string()),
            (A::FifoQueue, self.fifo.to_string()),
            (
                A::ContentBasedDeduplication,
                self.content_based_deduplication.to_string(),
            ),
            (A::RedrivePolicy, redrive_policy),
        ])
    }

    /// Attributes for the dead-letter queue, which must match the main queue's type
    pub fn dead_letter_attributes(&self) -> QueueAttributes {
        let mut attributes = QueueAttributes::new();
        if self.fifo {
            attributes.insert(QueueAttributeName::FifoQueue, "true".to_string());
        }
        attributes
    }
}

fn default_queue_name() -> String {
    "stackup-queue".to_string()
}

fn default_dead_letter_queue_name() -> String {
    "stackup-queue-dlq".to_string()
}

fn default_max_message_size() -> u32 {
    262_144 // 256KB
}

fn default_message_retention_period() -> u32 {
    345_600 // 4 days
}

fn default_visibility_timeout() -> u32 {
    30
}

fn default_max_receive_count() -> u32 {
    1
}

/// A queue the backend has created and resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionedQueue {
    pub url: String,
    pub arn: String,
}

/// A bucket to create
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BucketSpec {
    pub name: String,
}

impl BucketSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Bounded, fixed-interval retry applied to every backend round trip
///
/// The defaults (3000 attempts, 10s apart) wait up to roughly 8.3 hours.
/// `max_elapsed` caps the total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
    pub max_elapsed: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3000,
            interval: Duration::from_secs(10),
            max_elapsed: None,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
            max_elapsed: None,
        }
    }

    pub fn with_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = Some(max_elapsed);
        self
    }
}

/// Emulator process settings handed to the supervisor before start
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchOptions {
    pub host_name: String,
    pub pull_image: bool,
    pub randomize_ports: bool,
    pub environment: BTreeMap<String, String>,
    /// Host ports to publish when `randomize_ports` is off
    pub ports: Vec<u16>,
    /// Container port every published host port maps to; `None` maps each
    /// port onto itself, for images that bind one port per service
    pub container_port: Option<u16>,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            host_name: "localhost".to_string(),
            pull_image: true,
            randomize_ports: false,
            environment: BTreeMap::new(),
            ports: Vec::new(),
            container_port: Some(EDGE_PORT),
        }
    }
}

/// Result of a `provision` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ProvisionOutcome {
    /// Resources were created (or re-verified) in this call
    Provisioned {
        queue: ProvisionedQueue,
        dead_letter: ProvisionedQueue,
        buckets: Vec<String>,
    },
    /// The emulator was already running and resources were not touched
    Reused { queue: Option<ProvisionedQueue> },
}

impl ProvisionOutcome {
    pub fn queue(&self) -> Option<&ProvisionedQueue> {
        match self {
            Self::Provisioned { queue, .. } => Some(queue),
            Self::Reused { queue } => queue.as_ref(),
        }
    }

    pub fn is_reused(&self) -> bool {
        matches!(self, Self::Reused { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_services_env() {
        let endpoints = vec![
            ServiceEndpoint::new("s3", 4572),
            ServiceEndpoint::new("sqs", 4576),
        ];
        assert_eq!(services_env(&endpoints).as_deref(), Some("s3:4572,sqs:4576"));
        assert_eq!(services_env(&[]), None);
    }

    #[test]
    fn test_redrive_policy_format() {
        let spec = QueueSpec {
            max_receive_count: 5,
            ..QueueSpec::default()
        };
        assert_eq!(
            spec.redrive_policy("arn:aws:sqs:us-east-1:000000000000:dlq"),
            r#"{"maxReceiveCount":"5", "deadLetterTargetArn":"arn:aws:sqs:us-east-1:000000000000:dlq"}"#
        );
    }

    #[test]
    fn test_redrive_policy_is_valid_json() {
        let policy = QueueSpec::default().redrive_policy("arn:x");
        let value: serde_json::Value = serde_json::from_str(&policy).unwrap();
        assert_eq!(value["maxReceiveCount"], "1");
        assert_eq!(value["deadLetterTargetArn"], "arn:x");
    }

    #[test]
    fn test_queue_attributes() {
        let spec = QueueSpec {
            fifo: true,
            content_based_deduplication: true,
            ..QueueSpec::default()
        };
        let attrs = spec.attributes("policy".to_string());

        assert_eq!(attrs.len(), 8);
        assert_eq!(attrs[&QueueAttributeName::DelaySeconds], "0");
        assert_eq!(attrs[&QueueAttributeName::MaximumMessageSize], "262144");
        assert_eq!(attrs[&QueueAttributeName::MessageRetentionPeriod], "345600");
        assert_eq!(attrs[&QueueAttributeName::VisibilityTimeout], "30");
        assert_eq!(attrs[&QueueAttributeName::FifoQueue], "true");
        assert_eq!(attrs[&QueueAttributeName::ContentBasedDeduplication], "true");
        assert_eq!(attrs[&QueueAttributeName::RedrivePolicy], "policy");
        assert!(!attrs.contains_key(&QueueAttributeName::QueueArn));
    }

    #[test]
    fn test_dead_letter_attributes_follow_queue_type() {
        assert!(QueueSpec::default().dead_letter_attributes().is_empty());

        let fifo = QueueSpec {
            fifo: true,
            ..QueueSpec::default()
        };
        assert_eq!(
            fifo.dead_letter_attributes()[&QueueAttributeName::FifoQueue],
            "true"
        );
    }

    #[test]
    fn test_retry_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3000);
        assert_eq!(policy.interval, Duration::from_secs(10));
        assert_eq!(policy.max_elapsed, None);
    }

    #[test]
    fn test_outcome_queue() {
        let queue = ProvisionedQueue {
            url: "u".to_string(),
            arn: "a".to_string(),
        };
        let reused = ProvisionOutcome::Reused { queue: None };
        assert!(reused.is_reused());
        assert_eq!(reused.queue(), None);

        let provisioned = ProvisionOutcome::Provisioned {
            queue: queue.clone(),
            dead_letter: queue.clone(),
            buckets: vec![],
        };
        assert_eq!(provisioned.queue(), Some(&queue));
    }
}
