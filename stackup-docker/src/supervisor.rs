//! `ProcessSupervisor` over the Docker CLI

use async_trait::async_trait;
use parking_lot::Mutex;
use stackup_core::{LaunchOptions, ProcessSupervisor, SupervisorError, EMULATOR_LABEL};
use tokio::process::Command;
use tracing::{debug, error, info, warn};

/// Supervises a single localstack container
pub struct DockerSupervisor {
    image: String,
    options: Mutex<LaunchOptions>,
    container_id: Mutex<Option<String>>,
}

impl DockerSupervisor {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            options: Mutex::new(LaunchOptions::default()),
            container_id: Mutex::new(None),
        }
    }

    /// Id of the container started by this supervisor, if any
    pub fn container_id(&self) -> Option<String> {
        self.container_id.lock().clone()
    }

    /// Check if Docker is available
    pub async fn check_docker() -> bool {
        match Command::new("docker").arg("info").output().await {
            Ok(output) => output.status.success(),
            Err(_) => false,
        }
    }

    /// Arguments for `docker` that create and start the emulator container
    pub fn run_args(&self, options: &LaunchOptions, container_name: &str) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            container_name.to_string(),
            "--label".to_string(),
            EMULATOR_LABEL.to_string(),
            "-e".to_string(),
            format!("HOSTNAME_EXTERNAL={}", options.host_name),
        ];

        for (key, value) in &options.environment {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }

        if options.randomize_ports {
            args.push("-P".to_string());
        } else {
            for port in &options.ports {
                let container_port = options.container_port.unwrap_or(*port);
                args.push("-p".to_string());
                args.push(format!("{}:{}", port, container_port));
            }
        }

        args.push(self.image.clone());
        args
    }

    /// Pull the image when asked to, otherwise only when it is missing locally
    async fn ensure_image(&self, pull: bool) -> Result<(), SupervisorError> {
        if !pull && docker(&["image", "inspect", &self.image]).await.is_ok() {
            return Ok(());
        }

        info!(image = %self.image, "Pulling emulator image");

        docker(&["pull", &self.image])
            .await
            .map(|_| ())
            .map_err(|e| SupervisorError::ImagePullFailed(format!("{}: {}", self.image, e)))
    }
}

#[async_trait]
impl ProcessSupervisor for DockerSupervisor {
    async fn is_running(&self) -> bool {
        let Some(container_id) = self.container_id() else {
            return false;
        };

        match docker(&["inspect", "-f", "{{.State.Running}}", &container_id]).await {
            Ok(state) => state.trim() == "true",
            Err(e) => {
                debug!(container_id = %container_id, error = %e, "Container inspect failed");
                false
            }
        }
    }

    async fn configure(&self, options: LaunchOptions) {
        *self.options.lock() = options;
    }

    async fn start(&self) -> Result<(), SupervisorError> {
        if !Self::check_docker().await {
            return Err(SupervisorError::NotAvailable(
                "Docker daemon is not running".to_string(),
            ));
        }

        let options = self.options.lock().clone();
        self.ensure_image(options.pull_image).await?;

        let container_name = format!(
            "stackup-localstack-{}",
            &uuid::Uuid::new_v4().to_string()[..8]
        );
        let args = self.run_args(&options, &container_name);
        debug!(args = ?args, "Starting emulator container");

        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let container_id = docker(&args).await.map_err(|e| {
            error!(error = %e, "Failed to start emulator container");
            SupervisorError::StartFailed(e.to_string())
        })?;
        let container_id = container_id.trim().to_string();

        info!(
            container_id = %container_id,
            name = %container_name,
            image = %self.image,
            "Started emulator container"
        );

        *self.container_id.lock() = Some(container_id);
        Ok(())
    }

    async fn stop(&self) -> Result<(), SupervisorError> {
        let Some(container_id) = self.container_id() else {
            return Ok(());
        };

        docker(&["stop", &container_id]).await?;
        self.container_id.lock().take();
        Ok(())
    }

    async fn list_container_ids(&self, filter: &str) -> Result<Vec<String>, SupervisorError> {
        let output = docker(&["ps", "--no-trunc", "-aq", "--filter", filter]).await?;
        Ok(parse_container_ids(&output))
    }

    async fn force_remove(&self, container_id: &str) -> Result<(), SupervisorError> {
        let output = docker(&["rm", "-f", container_id]).await?;
        debug!(output = %output.trim(), "docker rm");

        let mut current = self.container_id.lock();
        if current.as_deref() == Some(container_id) {
            warn!(container_id = %container_id, "Removed the supervised container");
            *current = None;
        }
        Ok(())
    }
}

/// Split `docker ps -q` output into container ids
pub fn parse_container_ids(output: &str) -> Vec<String> {
    output.split_whitespace().map(str::to_string).collect()
}

/// Run a docker command, returning stdout on success
async fn docker(args: &[&str]) -> Result<String, SupervisorError> {
    let output = Command::new("docker").args(args).output().await?;

    if !output.status.success() {
        return Err(SupervisorError::CommandFailed {
            command: format!("docker {}", args.join(" ")),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
