//! Recording process supervisor

use async_trait::async_trait;
use parking_lot::Mutex;
use stackup_core::{LaunchOptions, ProcessSupervisor, SupervisorError};
use std::collections::HashSet;
use std::time::Duration;

/// One call made against the fake, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorCall {
    IsRunning,
    Configure(LaunchOptions),
    Start,
    Stop,
    ListContainerIds(String),
    ForceRemove(String),
}

#[derive(Debug, Default)]
struct State {
    /// Container started by this supervisor, if it is alive
    current: Option<String>,
    /// Every container the fake "docker ps -a" would list
    containers: Vec<String>,
    started: u32,
}

/// Fake supervisor that tracks containers in memory
#[derive(Debug, Default)]
pub struct FakeSupervisor {
    calls: Mutex<Vec<SupervisorCall>>,
    state: Mutex<State>,
    fail_start: Mutex<Option<String>>,
    fail_listing: Mutex<bool>,
    fail_remove: Mutex<HashSet<String>>,
    start_delay: Mutex<Option<Duration>>,
}

impl FakeSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// A supervisor whose emulator is already up
    pub fn running() -> Self {
        let supervisor = Self::new();
        {
            let mut state = supervisor.state.lock();
            state.current = Some("warm-emulator".to_string());
            state.containers.push("warm-emulator".to_string());
        }
        supervisor
    }

    /// Leftover containers from earlier runs
    pub fn with_stale(self, ids: &[&str]) -> Self {
        self.state
            .lock()
            .containers
            .extend(ids.iter().map(|id| id.to_string()));
        self
    }

    pub fn fail_start(self, message: &str) -> Self {
        *self.fail_start.lock() = Some(message.to_string());
        self
    }

    pub fn fail_listing(self) -> Self {
        *self.fail_listing.lock() = true;
        self
    }

    pub fn fail_remove(self, id: &str) -> Self {
        self.fail_remove.lock().insert(id.to_string());
        self
    }

    /// Make `start` take this long, e.g. to simulate an image pull
    pub fn start_delay(self, delay: Duration) -> Self {
        *self.start_delay.lock() = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<SupervisorCall> {
        self.calls.lock().clone()
    }

    /// Calls other than `IsRunning` probes
    pub fn actions(&self) -> Vec<SupervisorCall> {
        self.calls()
            .into_iter()
            .filter(|call| *call != SupervisorCall::IsRunning)
            .collect()
    }

    pub fn start_count(&self) -> u32 {
        self.state.lock().started
    }

    pub fn containers(&self) -> Vec<String> {
        self.state.lock().containers.clone()
    }

    /// Options passed to the most recent `configure`
    pub fn launch_options(&self) -> Option<LaunchOptions> {
        self.calls().into_iter().rev().find_map(|call| match call {
            SupervisorCall::Configure(options) => Some(options),
            _ => None,
        })
    }

    fn record(&self, call: SupervisorCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl ProcessSupervisor for FakeSupervisor {
    async fn is_running(&self) -> bool {
        self.record(SupervisorCall::IsRunning);
        self.state.lock().current.is_some()
    }

    async fn configure(&self, options: LaunchOptions) {
        self.record(SupervisorCall::Configure(options));
    }

    async fn start(&self) -> Result<(), SupervisorError> {
        self.record(SupervisorCall::Start);

        let delay = *self.start_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = self.fail_start.lock().clone() {
            return Err(SupervisorError::StartFailed(message));
        }

        let mut state = self.state.lock();
        state.started += 1;
        let id = format!("fake-emulator-{}", state.started);
        state.containers.push(id.clone());
        state.current = Some(id);
        Ok(())
    }

    async fn stop(&self) -> Result<(), SupervisorError> {
        self.record(SupervisorCall::Stop);
        // Stopped containers still show up in `ps -a`
        self.state.lock().current = None;
        Ok(())
    }

    async fn list_container_ids(&self, filter: &str) -> Result<Vec<String>, SupervisorError> {
        self.record(SupervisorCall::ListContainerIds(filter.to_string()));

        if *self.fail_listing.lock() {
            return Err(SupervisorError::NotAvailable(
                "Cannot connect to the Docker daemon".to_string(),
            ));
        }

        Ok(self.state.lock().containers.clone())
    }

    async fn force_remove(&self, container_id: &str) -> Result<(), SupervisorError> {
        self.record(SupervisorCall::ForceRemove(container_id.to_string()));

        if self.fail_remove.lock().contains(container_id) {
            return Err(SupervisorError::CommandFailed {
                command: format!("docker rm -f {}", container_id),
                stderr: "removal already in progress".to_string(),
            });
        }

        let mut state = self.state.lock();
        state.containers.retain(|id| id != container_id);
        if state.current.as_deref() == Some(container_id) {
            state.current = None;
        }
        Ok(())
    }
}
