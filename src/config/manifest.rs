//! Service manifest types.

use serde::{Deserialize, Serialize};

use crate::config::RuntimeKind;
use crate::error::{Result, StagehandError};

/// A managed service descriptor.
///
/// Which fields are required depends on the configured runtime kind:
/// the docker runtime needs `image`, the process runtime needs
/// `start`, `stop` and `status` commands.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSpec {
    /// Container image (docker runtime).
    pub image: Option<String>,

    /// Container name (docker runtime, defaults to the service name).
    pub container_name: Option<String>,

    /// Start command (process runtime).
    pub start: Option<String>,

    /// Stop command (process runtime).
    pub stop: Option<String>,

    /// Status check command (process runtime).
    pub status: Option<String>,

    /// Build command, run before starting when requested.
    pub build: Option<String>,

    /// Port mappings, passed to the runtime verbatim (e.g. "3000:3000").
    pub ports: Vec<String>,

    /// Volume mappings, passed to the runtime verbatim.
    pub volumes: Vec<String>,

    /// Environment variables as KEY=VALUE strings, passed verbatim.
    pub env: Vec<String>,

    /// Working directory for commands.
    pub working_dir: Option<String>,

    /// Names of services that must be healthy before this one starts.
    pub depends_on: Vec<String>,

    /// Health check. Without one, a successful start counts as healthy.
    pub health: Option<HealthCheckSpec>,

    /// Command timeout in seconds (overrides the runtime default).
    pub timeout: Option<u64>,
}

impl ServiceSpec {
    /// Validates the spec for the given runtime kind.
    pub fn validate(&self, name: &str, kind: RuntimeKind) -> Result<()> {
        if name.is_empty() {
            return Err(StagehandError::config("service names must be non-empty"));
        }

        match kind {
            RuntimeKind::Docker => {
                if self.image.as_deref().unwrap_or("").is_empty() {
                    return Err(StagehandError::config(format!(
                        "services.{}.image is required with the docker runtime",
                        name
                    )));
                }
            }
            RuntimeKind::Process => {
                for (field, value) in [
                    ("start", &self.start),
                    ("stop", &self.stop),
                    ("status", &self.status),
                ] {
                    if value.as_deref().unwrap_or("").is_empty() {
                        return Err(StagehandError::config(format!(
                            "services.{}.{} is required with the process runtime",
                            name, field
                        )));
                    }
                }
            }
        }

        for entry in &self.env {
            if !entry.contains('=') {
                return Err(StagehandError::config(format!(
                    "services.{}.env entries must be KEY=VALUE, got \"{}\"",
                    name, entry
                )));
            }
        }

        for (field, entries) in [("ports", &self.ports), ("volumes", &self.volumes)] {
            if entries.iter().any(|e| e.is_empty()) {
                return Err(StagehandError::config(format!(
                    "services.{}.{} entries must be non-empty",
                    name, field
                )));
            }
        }

        let mut seen = std::collections::HashSet::new();
        for dep in &self.depends_on {
            if dep.is_empty() {
                return Err(StagehandError::config(format!(
                    "services.{}.depends_on entries must be non-empty",
                    name
                )));
            }
            if !seen.insert(dep.as_str()) {
                return Err(StagehandError::config(format!(
                    "services.{}.depends_on lists \"{}\" more than once",
                    name, dep
                )));
            }
        }

        if let Some(health) = &self.health {
            health.validate(name)?;
        }

        Ok(())
    }

    /// Returns the container name for the docker runtime.
    pub fn container_name_or(&self, service: &str) -> String {
        self.container_name
            .clone()
            .unwrap_or_else(|| service.to_string())
    }
}

/// Health check description for a service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheckSpec {
    /// URL probed with HTTP GET; any 2xx response is healthy.
    pub http: Option<String>,

    /// Command probed by execution; exit status 0 is healthy.
    pub command: Option<String>,

    /// Seconds between probe attempts (defaults to probe.interval_seconds).
    pub interval_seconds: Option<u64>,

    /// Total seconds before the check times out (defaults to probe.timeout_seconds).
    pub timeout_seconds: Option<u64>,

    /// Failed attempts tolerated before the service is unhealthy
    /// (defaults to probe.retries).
    pub retries: Option<u32>,
}

impl HealthCheckSpec {
    /// Validates the health check fields.
    pub fn validate(&self, service: &str) -> Result<()> {
        match (&self.http, &self.command) {
            (Some(_), Some(_)) | (None, None) => {
                return Err(StagehandError::config(format!(
                    "services.{}.health must specify exactly one of http or command",
                    service
                )));
            }
            _ => {}
        }

        if self.http.as_deref() == Some("") {
            return Err(StagehandError::config(format!(
                "services.{}.health.http must be non-empty",
                service
            )));
        }
        if self.command.as_deref() == Some("") {
            return Err(StagehandError::config(format!(
                "services.{}.health.command must be non-empty",
                service
            )));
        }

        if self.interval_seconds == Some(0) {
            return Err(StagehandError::config(format!(
                "services.{}.health.interval_seconds must be > 0",
                service
            )));
        }
        if self.timeout_seconds == Some(0) {
            return Err(StagehandError::config(format!(
                "services.{}.health.timeout_seconds must be > 0",
                service
            )));
        }
        if self.retries == Some(0) {
            return Err(StagehandError::config(format!(
                "services.{}.health.retries must be > 0",
                service
            )));
        }

        Ok(())
    }
}
