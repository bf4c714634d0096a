//! Provisioning error types

use std::fmt;
use thiserror::Error;

/// Kind of backend resource a retry loop is working on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Bucket,
    Queue,
    DeadLetterQueue,
    QueueAttributes,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bucket => "S3 bucket",
            Self::Queue => "SQS queue",
            Self::DeadLetterQueue => "SQS dead-letter queue",
            Self::QueueAttributes => "SQS queue attributes",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Names the resource a backend call acts on, for logs and errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub name: String,
}

impl ResourceRef {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.name)
    }
}

/// Fatal provisioning outcomes
#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error("{kind} {name} failed to initialize after {attempts} attempts: {last_error}")]
    ResourceProvisioningFailed {
        kind: ResourceKind,
        name: String,
        attempts: u32,
        last_error: String,
    },

    #[error("provisioning cancelled while working on {kind} {name}")]
    Cancelled { kind: ResourceKind, name: String },

    #[error("emulator process failed to start: {0}")]
    ProcessStart(#[source] SupervisorError),

    #[error("provisioning cancelled while starting the emulator")]
    StartCancelled,
}

impl ProvisioningError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. } | Self::StartCancelled)
    }

    /// Attempts made before giving up, if this is an exhausted retry loop
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::ResourceProvisioningFailed { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }
}

/// Errors from a backend client call
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("{operation} failed: {message}")]
    Request { operation: &'static str, message: String },

    #[error("attribute {attribute} missing for queue {queue_url}")]
    MissingAttribute {
        attribute: &'static str,
        queue_url: String,
    },

    #[error("create queue {0} returned no queue URL")]
    MissingQueueUrl(String),
}

/// Errors from the process supervisor
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Docker not available: {0}")]
    NotAvailable(String),

    #[error("Failed to start container: {0}")]
    StartFailed(String),

    #[error("{command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Image pull failed: {0}")]
    ImagePullFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Non-fatal problem hit while removing stale emulator processes
#[derive(Debug, Error)]
#[error("process cleanup failed{}: {source}", container_suffix(.container_id))]
pub struct CleanupFailure {
    /// `None` when the listing itself failed
    pub container_id: Option<String>,
    #[source]
    pub source: SupervisorError,
}

fn container_suffix(container_id: &Option<String>) -> String {
    container_id
        .as_ref()
        .map(|id| format!(" for {id}"))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_error_names_resource_and_attempts() {
        let error = ProvisioningError::ResourceProvisioningFailed {
            kind: ResourceKind::Bucket,
            name: "sourcebucket".to_string(),
            attempts: 3000,
            last_error: "connection refused".to_string(),
        };

        let message = error.to_string();
        assert!(message.contains("S3 bucket sourcebucket"));
        assert!(message.contains("3000 attempts"));
        assert!(message.contains("connection refused"));
        assert_eq!(error.attempts(), Some(3000));
        assert!(!error.is_cancelled());
    }

    #[test]
    fn test_cleanup_failure_message() {
        let failure = CleanupFailure {
            container_id: Some("abc123".to_string()),
            source: SupervisorError::CommandFailed {
                command: "docker rm -f abc123".to_string(),
                stderr: "no such container".to_string(),
            },
        };
        assert_eq!(
            failure.to_string(),
            "process cleanup failed for abc123: docker rm -f abc123 failed: no such container"
        );

        let listing = CleanupFailure {
            container_id: None,
            source: SupervisorError::NotAvailable("daemon down".to_string()),
        };
        assert_eq!(
            listing.to_string(),
            "process cleanup failed: Docker not available: daemon down"
        );
    }
}
