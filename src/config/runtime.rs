//! Runtime provider configuration types.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::StagehandError;

/// Runtime provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Which runtime executes service lifecycle actions.
    pub kind: RuntimeKind,

    /// Docker binary invoked by the docker runtime.
    pub docker_bin: String,

    /// Default timeout for lifecycle commands in seconds.
    pub command_timeout_seconds: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            kind: RuntimeKind::Docker,
            docker_bin: "docker".to_string(),
            command_timeout_seconds: 60,
        }
    }
}

/// Service runtime provider type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    /// Docker CLI runtime.
    #[default]
    Docker,

    /// Command execution runtime.
    Process,
}

impl FromStr for RuntimeKind {
    type Err = StagehandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "docker" => Ok(RuntimeKind::Docker),
            "process" => Ok(RuntimeKind::Process),
            _ => Err(StagehandError::config(format!("Unknown runtime kind: {}", s))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_config_default() {
        let config = RuntimeConfig::default();
        assert_eq!(config.kind, RuntimeKind::Docker);
        assert_eq!(config.docker_bin, "docker");
        assert_eq!(config.command_timeout_seconds, 60);
    }

    #[test]
    fn test_runtime_kind_parse() {
        assert_eq!("docker".parse::<RuntimeKind>().unwrap(), RuntimeKind::Docker);
        assert_eq!("PROCESS".parse::<RuntimeKind>().unwrap(), RuntimeKind::Process);
        assert!("podman".parse::<RuntimeKind>().is_err());
    }
}
