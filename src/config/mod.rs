//! Configuration module for stagehand.
//!
//! This module provides all configuration types and loading functionality.
//! Configuration is loaded from a YAML manifest and can be overridden by
//! environment variables.

mod logging;
mod manifest;
mod probe;
mod runtime;

pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use manifest::{HealthCheckSpec, ServiceSpec};
pub use probe::ProbeConfig;
pub use runtime::{RuntimeConfig, RuntimeKind};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Result, StagehandError};

/// Environment variable for the manifest path.
pub const ENV_CONFIG_PATH: &str = "STAGEHAND_CONFIG";

/// Manifest file names searched in the working directory.
pub const DEFAULT_CONFIG_NAMES: [&str; 2] = ["stagehand.yaml", "stagehand.yml"];

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Runtime provider configuration.
    pub runtime: RuntimeConfig,

    /// Health probe defaults.
    pub probe: ProbeConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,

    /// Managed service definitions.
    #[serde(default)]
    pub services: HashMap<String, ServiceSpec>,
}

impl Config {
    /// Loads configuration with the following priority:
    /// 1. Explicit path (if provided)
    /// 2. STAGEHAND_CONFIG environment variable
    /// 3. stagehand.yaml / stagehand.yml in the working directory
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_config_path(explicit_path).ok_or_else(|| {
            StagehandError::config(format!(
                "No manifest found (searched {}); use --config or {}",
                DEFAULT_CONFIG_NAMES.join(", "),
                ENV_CONFIG_PATH
            ))
        })?;

        if !path.exists() {
            return Err(StagehandError::config(format!(
                "Manifest not found: {}",
                path.display()
            )));
        }

        let mut config = Self::load_from_path(&path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            StagehandError::config_with_source(
                format!("Failed to read manifest: {}", path.as_ref().display()),
                e,
            )
        })?;

        Self::load_from_str(&content)
    }

    /// Loads configuration from a YAML string.
    pub fn load_from_str(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content)
            .map_err(|e| StagehandError::config_with_source("Failed to parse manifest", e))?;

        config.validate()?;
        Ok(config)
    }

    /// Resolves the manifest path based on priority.
    fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit_path {
            return Some(path.to_path_buf());
        }

        if let Ok(env_path) = env::var(ENV_CONFIG_PATH) {
            return Some(PathBuf::from(env_path));
        }

        DEFAULT_CONFIG_NAMES
            .iter()
            .map(PathBuf::from)
            .find(|p| p.exists())
    }

    /// Applies environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(kind) = env::var("STAGEHAND_RUNTIME") {
            if let Ok(kind) = kind.parse() {
                self.runtime.kind = kind;
            }
        }
        if let Ok(bin) = env::var("STAGEHAND_DOCKER_BIN") {
            self.runtime.docker_bin = bin;
        }

        self.logging.apply_env_overrides();
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.services.is_empty() {
            return Err(StagehandError::config(
                "services section must define at least one service",
            ));
        }

        if self.runtime.command_timeout_seconds == 0 {
            return Err(StagehandError::config(
                "runtime.command_timeout_seconds must be > 0",
            ));
        }
        if self.runtime.kind == RuntimeKind::Docker && self.runtime.docker_bin.is_empty() {
            return Err(StagehandError::config("runtime.docker_bin must be non-empty"));
        }

        self.probe.validate()?;

        for (name, spec) in &self.services {
            spec.validate(name, self.runtime.kind)?;
        }

        Ok(())
    }

    /// Returns service names sorted for deterministic output.
    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.keys().cloned().collect();
        names.sort();
        names
    }
}
