//! Process runtime implementation.
//!
//! This runtime executes user-defined commands for service operations.
//! It targets environments where services run as plain host processes,
//! typically daemonizing start scripts paired with pgrep-style status
//! checks.

use std::collections::HashMap;
use tracing::{debug, error, info};

use crate::config::ServiceSpec;
use crate::error::{Result, StagehandError};
use crate::runtime::command::CommandRunner;
use crate::runtime::{ServiceRuntime, ServiceState};
use async_trait::async_trait;

/// Process runtime for service operations.
///
/// Each service must define start, stop and status commands. The status
/// command's exit code is the source of truth: 0 means running,
/// anything else means stopped.
pub struct ProcessRuntime {
    /// Service definitions from the manifest.
    services: HashMap<String, ServiceSpec>,
    /// Shared command executor.
    runner: CommandRunner,
}

impl ProcessRuntime {
    /// Creates a new process runtime.
    pub fn new(services: HashMap<String, ServiceSpec>, default_timeout_seconds: u64) -> Self {
        Self {
            services,
            runner: CommandRunner::new(default_timeout_seconds),
        }
    }

    fn spec(&self, service: &str) -> Result<&ServiceSpec> {
        self.services
            .get(service)
            .ok_or_else(|| StagehandError::runtime(format!("Unknown service: {}", service)))
    }

    async fn run_action(&self, spec: &ServiceSpec, command: &str) -> Result<crate::runtime::CommandOutput> {
        self.runner
            .run_shell(
                command,
                spec.working_dir.as_deref(),
                &spec.env,
                spec.timeout,
            )
            .await
    }

    async fn observe(&self, service: &str, spec: &ServiceSpec) -> Result<ServiceState> {
        let status = spec
            .status
            .as_deref()
            .ok_or_else(|| {
                StagehandError::runtime(format!("services.{}.status is not configured", service))
            })?;
        let out = self.run_action(spec, status).await?;

        if out.success {
            Ok(ServiceState::Running)
        } else {
            Ok(ServiceState::Stopped)
        }
    }
}

#[async_trait]
impl ServiceRuntime for ProcessRuntime {
    fn name(&self) -> &'static str {
        "process"
    }

    async fn state(&self, service: &str) -> Result<ServiceState> {
        let spec = self.spec(service)?;
        self.observe(service, spec).await
    }

    async fn start(&self, service: &str) -> Result<()> {
        let spec = self.spec(service)?;

        if self.observe(service, spec).await? == ServiceState::Running {
            info!(service = %service, "Service is already running");
            return Ok(());
        }

        let command = spec.start.as_deref().ok_or_else(|| {
            StagehandError::runtime(format!("services.{}.start is not configured", service))
        })?;

        info!(service = %service, "Starting service");
        let out = self
            .run_action(spec, command)
            .await
            .map_err(|e| StagehandError::start_failure_with_source(service, "start command failed", e))?;

        if !out.success {
            error!(service = %service, output = %out.output, "Start command failed");
            return Err(StagehandError::start_failure(
                service,
                format!("start command {}", out.failure_summary()),
            ));
        }

        if self.observe(service, spec).await? != ServiceState::Running {
            return Err(StagehandError::start_failure(
                service,
                "service did not reach running state after start",
            ));
        }

        Ok(())
    }

    async fn stop(&self, service: &str) -> Result<()> {
        let spec = self.spec(service)?;

        if self.observe(service, spec).await? == ServiceState::Stopped {
            info!(service = %service, "Service is already stopped");
            return Ok(());
        }

        let command = spec.stop.as_deref().ok_or_else(|| {
            StagehandError::runtime(format!("services.{}.stop is not configured", service))
        })?;

        info!(service = %service, "Stopping service");
        let out = self.run_action(spec, command).await?;

        if !out.success {
            error!(service = %service, output = %out.output, "Stop command failed");
            return Err(StagehandError::runtime(format!(
                "Failed to stop \"{}\": stop command {}",
                service,
                out.failure_summary()
            )));
        }

        if self.observe(service, spec).await? != ServiceState::Stopped {
            return Err(StagehandError::runtime(format!(
                "Failed to stop \"{}\": service is still running",
                service
            )));
        }

        Ok(())
    }

    async fn build(&self, service: &str) -> Result<()> {
        let spec = self.spec(service)?;

        let Some(command) = spec.build.as_deref() else {
            debug!(service = %service, "No build command configured");
            return Ok(());
        };

        info!(service = %service, "Building service");
        let out = self
            .run_action(spec, command)
            .await
            .map_err(|e| StagehandError::build_failure(service, e.to_string()))?;

        if !out.success {
            error!(service = %service, output = %out.output, "Build command failed");
            return Err(StagehandError::build_failure(
                service,
                format!("build command {}", out.failure_summary()),
            ));
        }

        Ok(())
    }
}
