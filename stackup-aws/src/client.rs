//! S3 and SQS clients against the emulator

use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_sqs::error::{DisplayErrorContext, SdkError};
use aws_sdk_sqs::types::QueueAttributeName as SqsAttributeName;
use stackup_core::{
    BackendClient, BackendError, CreatedQueue, QueueAttributeName, QueueAttributes,
    ServiceEndpoint, EDGE_PORT,
};
use std::collections::HashMap;
use tracing::{debug, info};

pub const DEFAULT_REGION: &str = "us-east-1";

/// Where the emulator's S3 and SQS endpoints live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsBackendConfig {
    pub host_name: String,
    pub s3_port: u16,
    pub sqs_port: u16,
    pub region: String,
}

impl AwsBackendConfig {
    /// Resolve per-service ports from the declared endpoints
    pub fn from_endpoints(host_name: impl Into<String>, endpoints: &[ServiceEndpoint]) -> Self {
        let port_of = |service: &str| {
            endpoints
                .iter()
                .find(|e| e.name.eq_ignore_ascii_case(service))
                .map_or(EDGE_PORT, |e| e.port)
        };

        Self {
            host_name: host_name.into(),
            s3_port: port_of("s3"),
            sqs_port: port_of("sqs"),
            region: DEFAULT_REGION.to_string(),
        }
    }

    pub fn s3_endpoint(&self) -> String {
        format!("http://{}:{}", self.host_name, self.s3_port)
    }

    pub fn sqs_endpoint(&self) -> String {
        format!("http://{}:{}", self.host_name, self.sqs_port)
    }
}

/// Backend client over the AWS SDK
#[derive(Debug, Clone)]
pub struct AwsBackend {
    s3: aws_sdk_s3::Client,
    sqs: aws_sdk_sqs::Client,
}

impl AwsBackend {
    /// Build clients for the emulator endpoints in `config`
    pub async fn connect(config: &AwsBackendConfig) -> Self {
        let s3_config = sdk_config(&config.s3_endpoint(), &config.region).await;
        let s3 = aws_sdk_s3::Client::from_conf(
            aws_sdk_s3::config::Builder::from(&s3_config)
                .force_path_style(true)
                .build(),
        );

        let sqs_config = sdk_config(&config.sqs_endpoint(), &config.region).await;
        let sqs = aws_sdk_sqs::Client::new(&sqs_config);

        info!(
            s3 = %config.s3_endpoint(),
            sqs = %config.sqs_endpoint(),
            "Created AWS clients"
        );

        Self { s3, sqs }
    }
}

/// SDK config with static emulator credentials.
///
/// SDK-level retries are disabled; the orchestrator owns the retry budget.
async fn sdk_config(endpoint: &str, region: &str) -> SdkConfig {
    aws_config::defaults(BehaviorVersion::latest())
        .endpoint_url(endpoint)
        .credentials_provider(Credentials::new("test", "test", None, None, "stackup"))
        .region(Region::new(region.to_string()))
        .retry_config(RetryConfig::disabled())
        .load()
        .await
}

#[async_trait]
impl BackendClient for AwsBackend {
    async fn create_bucket(&self, name: &str) -> Result<(), BackendError> {
        match self.s3.create_bucket().bucket(name).send().await {
            Ok(_) => Ok(()),
            Err(err) => {
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_bucket_already_owned_by_you())
                {
                    debug!(bucket = %name, "Bucket already exists");
                    return Ok(());
                }
                Err(sdk_error("CreateBucket", &err))
            }
        }
    }

    async fn create_queue(
        &self,
        name: &str,
        attributes: &QueueAttributes,
    ) -> Result<CreatedQueue, BackendError> {
        let attributes: HashMap<SqsAttributeName, String> = attributes
            .iter()
            .map(|(key, value)| (SqsAttributeName::from(key.as_str()), value.clone()))
            .collect();

        let output = self
            .sqs
            .create_queue()
            .queue_name(name)
            .set_attributes((!attributes.is_empty()).then_some(attributes))
            .send()
            .await
            .map_err(|e| sdk_error("CreateQueue", &e))?;

        let url = output
            .queue_url()
            .ok_or_else(|| BackendError::MissingQueueUrl(name.to_string()))?;

        Ok(CreatedQueue {
            url: url.to_string(),
        })
    }

    async fn get_queue_attributes(
        &self,
        queue_url: &str,
        names: &[QueueAttributeName],
    ) -> Result<HashMap<String, String>, BackendError> {
        let names = names
            .iter()
            .map(|name| SqsAttributeName::from(name.as_str()))
            .collect();

        let output = self
            .sqs
            .get_queue_attributes()
            .queue_url(queue_url)
            .set_attribute_names(Some(names))
            .send()
            .await
            .map_err(|e| sdk_error("GetQueueAttributes", &e))?;

        Ok(output
            .attributes()
            .map(|attributes| {
                attributes
                    .iter()
                    .map(|(key, value)| (key.as_str().to_string(), value.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Connection-level failures mean the emulator is not up yet
fn sdk_error<E, R>(operation: &'static str, err: &SdkError<E, R>) -> BackendError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let message = DisplayErrorContext(err).to_string();
    match err {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => {
            BackendError::Unavailable(format!("{operation}: {message}"))
        }
        _ => BackendError::Request { operation, message },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ports_from_endpoints() {
        let endpoints = vec![
            ServiceEndpoint::new("s3", 4572),
            ServiceEndpoint::new("SQS", 4576),
        ];
        let config = AwsBackendConfig::from_endpoints("localhost", &endpoints);

        assert_eq!(config.s3_endpoint(), "http://localhost:4572");
        assert_eq!(config.sqs_endpoint(), "http://localhost:4576");
        assert_eq!(config.region, "us-east-1");
    }

    #[test]
    fn test_missing_service_uses_edge_port() {
        let endpoints = vec![ServiceEndpoint::new("sqs", 4576)];
        let config = AwsBackendConfig::from_endpoints("emulator", &endpoints);

        assert_eq!(config.s3_endpoint(), "http://emulator:4566");
        assert_eq!(config.sqs_endpoint(), "http://emulator:4576");
    }

    #[tokio::test]
    async fn test_unreachable_emulator_is_unavailable() {
        // Grab a free port and release it so nothing is listening there
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let config = AwsBackendConfig {
            host_name: "127.0.0.1".to_string(),
            s3_port: port,
            sqs_port: port,
            region: DEFAULT_REGION.to_string(),
        };
        let backend = AwsBackend::connect(&config).await;

        let result = backend.create_bucket("sourcebucket").await;
        assert!(matches!(result, Err(BackendError::Unavailable(_))));

        let result = backend
            .create_queue("stackup-queue", &QueueAttributes::new())
            .await;
        assert!(matches!(result, Err(BackendError::Unavailable(_))));
    }
}
