//! Docker runtime implementation.
//!
//! This runtime shells out to the docker CLI to manage services as
//! containers. Each service maps to one named container derived from
//! its manifest entry.

use std::collections::HashMap;
use tracing::{debug, error, info};

use crate::config::ServiceSpec;
use crate::error::{Result, StagehandError};
use crate::runtime::command::CommandRunner;
use crate::runtime::{ServiceRuntime, ServiceState};
use async_trait::async_trait;

/// Container existence and run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContainerState {
    /// No container with this name exists.
    Absent,
    /// Container exists and is running.
    Running,
    /// Container exists but is not running.
    Stopped,
}

/// Docker runtime for service operations.
///
/// Starting an absent container issues `docker run -d` with the
/// manifest's ports, volumes and environment; starting a stopped
/// container reuses it via `docker start`. Stopping removes the
/// container so the next start recreates it from the manifest.
pub struct DockerRuntime {
    /// Service definitions from the manifest.
    services: HashMap<String, ServiceSpec>,
    /// Docker binary to invoke.
    docker_bin: String,
    /// Shared command executor.
    runner: CommandRunner,
}

impl DockerRuntime {
    /// Creates a new docker runtime.
    pub fn new(
        services: HashMap<String, ServiceSpec>,
        docker_bin: String,
        default_timeout_seconds: u64,
    ) -> Self {
        Self {
            services,
            docker_bin,
            runner: CommandRunner::new(default_timeout_seconds),
        }
    }

    fn spec(&self, service: &str) -> Result<&ServiceSpec> {
        self.services
            .get(service)
            .ok_or_else(|| StagehandError::runtime(format!("Unknown service: {}", service)))
    }

    async fn docker(&self, args: &[String]) -> Result<crate::runtime::CommandOutput> {
        self.runner.run_program(&self.docker_bin, args).await
    }

    /// Observes a container through `docker inspect`.
    async fn container_state(&self, container: &str) -> Result<ContainerState> {
        let args = vec![
            "inspect".to_string(),
            "-f".to_string(),
            "{{.State.Running}}".to_string(),
            container.to_string(),
        ];
        let out = self.docker(&args).await?;

        if !out.success {
            // inspect fails when no such container exists
            return Ok(ContainerState::Absent);
        }

        match out.output.trim() {
            "true" => Ok(ContainerState::Running),
            _ => Ok(ContainerState::Stopped),
        }
    }

    /// Assembles the `docker run` argument list for a service.
    fn run_args(&self, service: &str, spec: &ServiceSpec) -> Result<Vec<String>> {
        let image = spec.image.as_deref().ok_or_else(|| {
            StagehandError::runtime(format!("services.{}.image is not configured", service))
        })?;

        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            spec.container_name_or(service),
        ];
        for port in &spec.ports {
            args.push("-p".to_string());
            args.push(port.clone());
        }
        for volume in &spec.volumes {
            args.push("-v".to_string());
            args.push(volume.clone());
        }
        for env in &spec.env {
            args.push("-e".to_string());
            args.push(env.clone());
        }
        args.push(image.to_string());

        Ok(args)
    }
}

#[async_trait]
impl ServiceRuntime for DockerRuntime {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn state(&self, service: &str) -> Result<ServiceState> {
        let spec = self.spec(service)?;
        let container = spec.container_name_or(service);

        match self.container_state(&container).await? {
            ContainerState::Running => Ok(ServiceState::Running),
            ContainerState::Absent | ContainerState::Stopped => Ok(ServiceState::Stopped),
        }
    }

    async fn start(&self, service: &str) -> Result<()> {
        let spec = self.spec(service)?;
        let container = spec.container_name_or(service);

        let out = match self.container_state(&container).await? {
            ContainerState::Running => {
                info!(service = %service, container = %container, "Container is already running");
                return Ok(());
            }
            ContainerState::Stopped => {
                info!(service = %service, container = %container, "Starting existing container");
                let args = vec!["start".to_string(), container.clone()];
                self.docker(&args).await
            }
            ContainerState::Absent => {
                info!(service = %service, container = %container, "Creating container");
                let args = self.run_args(service, spec)?;
                self.docker(&args).await
            }
        }
        .map_err(|e| StagehandError::start_failure_with_source(service, "docker command failed", e))?;

        if !out.success {
            error!(service = %service, output = %out.output, "Failed to start container");
            return Err(StagehandError::start_failure(
                service,
                format!("docker {}", out.failure_summary()),
            ));
        }

        if self.container_state(&container).await? != ContainerState::Running {
            return Err(StagehandError::start_failure(
                service,
                "container did not reach running state after start",
            ));
        }

        Ok(())
    }

    async fn stop(&self, service: &str) -> Result<()> {
        let spec = self.spec(service)?;
        let container = spec.container_name_or(service);

        let state = self.container_state(&container).await?;
        if state == ContainerState::Absent {
            info!(service = %service, container = %container, "Container is already gone");
            return Ok(());
        }

        if state == ContainerState::Running {
            info!(service = %service, container = %container, "Stopping container");
            let args = vec!["stop".to_string(), container.clone()];
            let out = self.docker(&args).await?;
            if !out.success {
                error!(service = %service, output = %out.output, "Failed to stop container");
                return Err(StagehandError::runtime(format!(
                    "Failed to stop \"{}\": docker stop {}",
                    service,
                    out.failure_summary()
                )));
            }
        }

        debug!(service = %service, container = %container, "Removing container");
        let args = vec!["rm".to_string(), container.clone()];
        let out = self.docker(&args).await?;
        if !out.success {
            error!(service = %service, output = %out.output, "Failed to remove container");
            return Err(StagehandError::runtime(format!(
                "Failed to stop \"{}\": docker rm {}",
                service,
                out.failure_summary()
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
            .runner
            .run_shell(
                command,
                spec.working_dir.as_deref(),
                &spec.env,
                spec.timeout,
            )
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
