//! Runtime module - service lifecycle providers.
//!
//! This module defines the `ServiceRuntime` trait that all runtime
//! providers (docker, process) must implement, along with the observed
//! service state type and a factory for building the configured runtime.

pub mod command;
pub mod docker;
pub mod process;


use crate::config::{Config, RuntimeKind};
use crate::error::{Result, StagehandError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use command::{CommandOutput, CommandRunner};
pub use docker::DockerRuntime;
pub use process::ProcessRuntime;

/// Service state as observed by a runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    /// Service is running.
    Running,
    /// Service is stopped or absent.
    Stopped,
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceState::Running => write!(f, "running"),
            ServiceState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Trait for service runtime providers.
///
/// Runtimes are responsible for starting, stopping, building, and
/// observing the state of managed services. All operations are
/// idempotent: starting a running service or stopping a stopped one
/// succeeds without issuing the underlying action.
#[async_trait]
pub trait ServiceRuntime: Send + Sync {
    /// Returns the name of this runtime.
    fn name(&self) -> &'static str;

    /// Observes the current state of a service.
    async fn state(&self, service: &str) -> Result<ServiceState>;

    /// Starts a service. Fails with `StartFailure` if the start action
    /// does not leave the service running.
    async fn start(&self, service: &str) -> Result<()>;

    /// Stops a service. A no-op when the service is already stopped.
    async fn stop(&self, service: &str) -> Result<()>;

    /// Runs a service's build action. A no-op when no build command is
    /// configured.
    async fn build(&self, service: &str) -> Result<()>;
}

/// Creates the runtime provider selected by the configuration.
pub fn create_runtime(config: &Config) -> Result<Arc<dyn ServiceRuntime>> {
    if config.services.is_empty() {
        return Err(StagehandError::config(
            "at least one service definition is required",
        ));
    }

    let runtime: Arc<dyn ServiceRuntime> = match config.runtime.kind {
        RuntimeKind::Docker => Arc::new(DockerRuntime::new(
            config.services.clone(),
            config.runtime.docker_bin.clone(),
            config.runtime.command_timeout_seconds,
        )),
        RuntimeKind::Process => Arc::new(ProcessRuntime::new(
            config.services.clone(),
            config.runtime.command_timeout_seconds,
        )),
    };

    Ok(runtime)
}
