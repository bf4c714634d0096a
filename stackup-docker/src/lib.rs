//! Docker-based emulator supervision for stackup
//!
//! Runs localstack as a detached Docker container through the `docker` CLI and
//! keeps its container id as the process handle.

mod supervisor;

pub use supervisor::{parse_container_ids, DockerSupervisor};
