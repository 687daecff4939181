//! Error types and error handling for stagehand.
//!
//! This module defines all error types used throughout the application,
//! including the CLI exit codes each error maps to.

use thiserror::Error;

/// CLI exit codes.
pub mod exit_code {
    /// Success
    pub const SUCCESS: i32 = 0;
    /// General error
    pub const GENERAL_ERROR: i32 = 1;
    /// Configuration or dependency graph error
    pub const CONFIG_ERROR: i32 = 2;
    /// Runtime operation (start/stop/build) error
    pub const RUNTIME_ERROR: i32 = 3;
    /// Health check error
    pub const HEALTH_ERROR: i32 = 4;
    /// Command line argument error
    pub const CLI_ERROR: i32 = 64;
    /// Interrupted by signal
    pub const INTERRUPTED: i32 = 130;
}

/// The main error type for stagehand.
#[derive(Debug, Error)]
pub enum StagehandError {
    /// Configuration file is invalid or cannot be loaded.
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A service names a dependency that is not defined.
    #[error("Unknown dependency: \"{service}\" depends on \"{dependency}\", which is not defined")]
    UnknownDependency { service: String, dependency: String },

    /// The dependency relation contains a cycle.
    #[error("Dependency cycle detected involving: {}", .services.join(", "))]
    CycleDetected { services: Vec<String> },

    /// A start action failed.
    #[error("Failed to start \"{service}\": {message}")]
    StartFailure {
        service: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A build action failed.
    #[error("Failed to build \"{service}\": {message}")]
    BuildFailure { service: String, message: String },

    /// A health check did not pass within its total timeout.
    #[error("Health check for \"{service}\" timed out after {seconds}s")]
    HealthTimeout { service: String, seconds: u64 },

    /// A health check exhausted its retry budget with definitive failures.
    #[error("Health check for \"{service}\" failed: {message}")]
    HealthUnhealthy { service: String, message: String },

    /// One or more services could not be stopped during teardown.
    #[error("Teardown failed for: {}", .services.join(", "))]
    Teardown { services: Vec<String> },

    /// A runtime operation failed outside of a specific service action.
    #[error("Runtime error: {message}")]
    Runtime {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The run was interrupted by a signal.
    #[error("Interrupted")]
    Interrupted,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StagehandError {
    /// Returns the CLI exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            StagehandError::Config { .. }
            | StagehandError::UnknownDependency { .. }
            | StagehandError::CycleDetected { .. }
            | StagehandError::Yaml(_) => exit_code::CONFIG_ERROR,
            StagehandError::StartFailure { .. }
            | StagehandError::BuildFailure { .. }
            | StagehandError::Teardown { .. }
            | StagehandError::Runtime { .. }
            | StagehandError::Io(_) => exit_code::RUNTIME_ERROR,
            StagehandError::HealthTimeout { .. } | StagehandError::HealthUnhealthy { .. } => {
                exit_code::HEALTH_ERROR
            }
            StagehandError::Interrupted => exit_code::INTERRUPTED,
            StagehandError::Json(_) => exit_code::GENERAL_ERROR,
        }
    }

    /// Returns the name of the service this error is about, if any.
    pub fn service(&self) -> Option<&str> {
        match self {
            StagehandError::UnknownDependency { service, .. }
            | StagehandError::StartFailure { service, .. }
            | StagehandError::BuildFailure { service, .. }
            | StagehandError::HealthTimeout { service, .. }
            | StagehandError::HealthUnhealthy { service, .. } => Some(service),
            _ => None,
        }
    }

    /// Creates a configuration error with a message.
    pub fn config(message: impl Into<String>) -> Self {
        StagehandError::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a configuration error with a message and source.
    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        StagehandError::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a start failure for a service.
    pub fn start_failure(service: impl Into<String>, message: impl Into<String>) -> Self {
        StagehandError::StartFailure {
            service: service.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Creates a start failure with a source.
    pub fn start_failure_with_source(
        service: impl Into<String>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        StagehandError::StartFailure {
            service: service.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a build failure for a service.
    pub fn build_failure(service: impl Into<String>, message: impl Into<String>) -> Self {
        StagehandError::BuildFailure {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Creates a runtime error with a message.
    pub fn runtime(message: impl Into<String>) -> Self {
        StagehandError::Runtime {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a runtime error with a message and source.
    pub fn runtime_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        StagehandError::Runtime {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Renders an error and its source chain for terminal output.
pub fn render_chain(error: &StagehandError) -> String {
    let mut out = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        out.push_str(&format!("\n  caused by: {cause}"));
        source = cause.source();
    }
    out
}

/// Result type alias for stagehand operations.
pub type Result<T> = std::result::Result<T, StagehandError>;
