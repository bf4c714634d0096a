//! Configuration management
//!
//! Loaded from an optional `stackup.toml` (or an explicit file) and then from
//! `STACKUP__`-prefixed environment variables, e.g. `STACKUP__S3__BUCKET=src`.

use crate::lifecycle::EMBEDDED_AWS_PROFILE;
use crate::model::{
    BucketSpec, LaunchOptions, QueueSpec, RetryPolicy, ServiceEndpoint, EDGE_PORT,
};
use crate::orchestrator::{ProvisioningPlan, DEFAULT_CLEANUP_FILTER};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackupConfig {
    /// Active runtime profiles; provisioning only runs under `embedded-aws`
    #[serde(default = "default_profiles")]
    pub profiles: Vec<String>,

    #[serde(default)]
    pub localstack: LocalstackConfig,

    #[serde(default)]
    pub s3: S3Config,

    #[serde(default)]
    pub sqs: QueueSpec,

    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for StackupConfig {
    fn default() -> Self {
        Self {
            profiles: default_profiles(),
            localstack: LocalstackConfig::default(),
            s3: S3Config::default(),
            sqs: QueueSpec::default(),
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalstackConfig {
    #[serde(default = "default_services")]
    pub services: Vec<ServiceEndpoint>,

    #[serde(default = "default_host_name")]
    pub host_name: String,

    #[serde(default = "default_true")]
    pub pull_new_image: bool,

    #[serde(default)]
    pub randomize_ports: bool,

    /// Publish each service port on itself instead of onto the edge port,
    /// for old images that bind one port per service
    #[serde(default)]
    pub legacy_ports: bool,

    #[serde(default = "default_image")]
    pub image: String,

    #[serde(default = "default_cleanup_filter")]
    pub cleanup_filter: String,

    #[serde(default)]
    pub verify_resources_on_reuse: bool,

    /// Extra environment for the emulator container
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

impl Default for LocalstackConfig {
    fn default() -> Self {
        Self {
            services: default_services(),
            host_name: default_host_name(),
            pull_new_image: true,
            randomize_ports: false,
            legacy_ports: false,
            image: default_image(),
            cleanup_filter: default_cleanup_filter(),
            verify_resources_on_reuse: false,
            environment: BTreeMap::new(),
        }
    }
}

impl LocalstackConfig {
    /// Port a named service listens on, if declared
    pub fn service_port(&self, name: &str) -> Option<u16> {
        self.services
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
            .map(|s| s.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    #[serde(default = "default_source_bucket")]
    pub bucket: String,

    #[serde(default = "default_target_bucket")]
    pub target_bucket: String,

    #[serde(default)]
    pub additional_buckets: Vec<String>,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: default_source_bucket(),
            target_bucket: default_target_bucket(),
            additional_buckets: Vec::new(),
        }
    }
}

impl S3Config {
    pub fn buckets(&self) -> Vec<BucketSpec> {
        [&self.bucket, &self.target_bucket]
            .into_iter()
            .chain(&self.additional_buckets)
            .map(|name| BucketSpec::new(name.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    #[serde(default)]
    pub max_elapsed_secs: Option<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            interval_secs: default_interval_secs(),
            max_elapsed_secs: None,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            interval: Duration::from_secs(config.interval_secs),
            max_elapsed: config.max_elapsed_secs.map(Duration::from_secs),
        }
    }
}

fn default_profiles() -> Vec<String> {
    vec![EMBEDDED_AWS_PROFILE.to_string()]
}

fn default_services() -> Vec<ServiceEndpoint> {
    vec![
        ServiceEndpoint::new("s3", 4572),
        ServiceEndpoint::new("sqs", 4576),
    ]
}

fn default_host_name() -> String {
    "localhost".to_string()
}

fn default_image() -> String {
    "localstack/localstack:3".to_string()
}

fn default_cleanup_filter() -> String {
    DEFAULT_CLEANUP_FILTER.to_string()
}

fn default_source_bucket() -> String {
    "sourcebucket".to_string()
}

fn default_target_bucket() -> String {
    "targetbucket".to_string()
}

fn default_max_attempts() -> u32 {
    3000
}

fn default_interval_secs() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

impl StackupConfig {
    /// Load configuration from `stackup.toml` (if present) and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::build(
            config::File::with_name("stackup").required(false),
            environment(),
        )
    }

    /// Load configuration from an explicit file, then environment
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        Self::build(config::File::from(path).required(true), environment())
    }

    fn build<S>(file: S, environment: config::Environment) -> Result<Self, ConfigError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let config = config::Config::builder()
            .add_source(file)
            .add_source(environment)
            .build()?;

        let config = config.try_deserialize::<StackupConfig>()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the orchestrator cannot act on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts must be at least 1"));
        }

        let mut seen = HashSet::new();
        for service in &self.localstack.services {
            if !seen.insert(service.name.to_ascii_lowercase()) {
                return Err(invalid(format!(
                    "service '{}' is declared more than once",
                    service.name
                )));
            }
        }

        if self.s3.buckets().iter().any(|b| b.name.trim().is_empty()) {
            return Err(invalid("bucket names must not be empty"));
        }

        let sqs = &self.sqs;
        if sqs.name.trim().is_empty() || sqs.dead_letter_queue_name.trim().is_empty() {
            return Err(invalid("queue names must not be empty"));
        }
        if sqs.fifo {
            for name in [&sqs.name, &sqs.dead_letter_queue_name] {
                if !name.ends_with(".fifo") {
                    return Err(invalid(format!(
                        "FIFO queue name '{name}' must end with .fifo"
                    )));
                }
            }
        }
        if sqs.max_receive_count == 0 {
            return Err(invalid("sqs.max_receive_count must be at least 1"));
        }

        Ok(())
    }

    /// Build the provisioning plan this configuration describes
    pub fn plan(&self) -> ProvisioningPlan {
        let localstack = &self.localstack;

        ProvisioningPlan {
            endpoints: localstack.services.clone(),
            queue: self.sqs.clone(),
            buckets: self.s3.buckets(),
            retry: RetryPolicy::from(&self.retry),
            launch: LaunchOptions {
                host_name: localstack.host_name.clone(),
                pull_image: localstack.pull_new_image,
                randomize_ports: localstack.randomize_ports,
                environment: localstack.environment.clone(),
                ports: Vec::new(),
                container_port: (!localstack.legacy_ports).then_some(EDGE_PORT),
            },
            verify_resources_on_reuse: localstack.verify_resources_on_reuse,
        }
    }
}

/// `STACKUP__SECTION__KEY` overrides; `STACKUP__PROFILES` takes a comma list
fn environment() -> config::Environment {
    config::Environment::with_prefix("STACKUP")
        .prefix_separator("__")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("profiles")
        .try_parsing(true)
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn from_toml(source: &str) -> StackupConfig {
        config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = from_toml("");

        assert_eq!(config.profiles, vec!["embedded-aws".to_string()]);
        assert_eq!(
            config.localstack.services,
            vec![
                ServiceEndpoint::new("s3", 4572),
                ServiceEndpoint::new("sqs", 4576)
            ]
        );
        assert_eq!(config.localstack.host_name, "localhost");
        assert!(config.localstack.pull_new_image);
        assert!(!config.localstack.randomize_ports);
        assert_eq!(config.localstack.image, "localstack/localstack:3");
        assert_eq!(config.localstack.cleanup_filter, DEFAULT_CLEANUP_FILTER);
        assert_eq!(config.plan().launch.container_port, Some(EDGE_PORT));
        assert!(!config.localstack.verify_resources_on_reuse);
        assert_eq!(config.s3.bucket, "sourcebucket");
        assert_eq!(config.s3.target_bucket, "targetbucket");
        assert_eq!(config.sqs, QueueSpec::default());
        assert_eq!(RetryPolicy::from(&config.retry), RetryPolicy::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_overrides() {
        let config = from_toml(
            r#"
            profiles = ["dev"]

            [localstack]
            host_name = "docker.local"
            verify_resources_on_reuse = true
            legacy_ports = true
            services = [{ name = "sqs", port = 4566 }]

            [s3]
            bucket = "src"
            target_bucket = "tgt"
            additional_buckets = ["archive"]

            [sqs]
            name = "main"
            dead_letter_queue_name = "main-dlq"
            max_receive_count = 4

            [retry]
            max_attempts = 5
            interval_secs = 1
            max_elapsed_secs = 30
            "#,
        );

        assert_eq!(config.profiles, vec!["dev"]);
        assert_eq!(config.localstack.service_port("SQS"), Some(4566));
        assert_eq!(config.localstack.service_port("s3"), None);

        let plan = config.plan();
        let buckets: Vec<_> = plan.buckets.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(buckets, ["src", "tgt", "archive"]);
        assert_eq!(plan.queue.name, "main");
        assert_eq!(plan.queue.max_receive_count, 4);
        // Unset queue fields keep their defaults
        assert_eq!(plan.queue.visibility_timeout, 30);
        assert_eq!(plan.retry.max_attempts, 5);
        assert_eq!(plan.retry.interval, Duration::from_secs(1));
        assert_eq!(plan.retry.max_elapsed, Some(Duration::from_secs(30)));
        assert_eq!(plan.launch.host_name, "docker.local");
        assert_eq!(plan.launch.container_port, None);
        assert!(plan.verify_resources_on_reuse);
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let mut config = StackupConfig::default();
        config.retry.max_attempts = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_duplicate_services() {
        let mut config = StackupConfig::default();
        config
            .localstack
            .services
            .push(ServiceEndpoint::new("S3", 4600));
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_fifo_names() {
        let mut config = StackupConfig::default();
        config.sqs.fifo = true;
        assert!(config.validate().is_err());

        config.sqs.name = "orders.fifo".to_string();
        config.sqs.dead_letter_queue_name = "orders-dlq.fifo".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_names() {
        let mut config = StackupConfig::default();
        config.s3.target_bucket = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = StackupConfig::default();
        config.sqs.dead_letter_queue_name.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[s3]\nbucket = \"from-file\"").unwrap();

        let config = StackupConfig::load_from(file.path()).unwrap();
        assert_eq!(config.s3.bucket, "from-file");
        assert_eq!(config.s3.target_bucket, "targetbucket");
    }

    #[test]
    fn test_environment_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[localstack]\nhost_name = \"from-file\"").unwrap();

        let variables = config::Map::from([
            (
                "STACKUP__LOCALSTACK__HOST_NAME".to_string(),
                "emulator.test".to_string(),
            ),
            ("STACKUP__PROFILES".to_string(), "embedded-aws,dev".to_string()),
        ]);
        let config = StackupConfig::build(
            config::File::from(file.path()),
            environment().source(Some(variables)),
        )
        .unwrap();
        assert_eq!(config.localstack.host_name, "emulator.test");
        assert_eq!(config.profiles, vec!["embedded-aws", "dev"]);
    }

    #[test]
    fn test_load_from_file_validates() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[retry]\nmax_attempts = 0").unwrap();

        assert!(matches!(
            StackupConfig::load_from(file.path()),
            Err(ConfigError::Invalid(_))
        ));
    }
}
