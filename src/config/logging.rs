//! Logging configuration types.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::StagehandError;

/// Logging configuration.
///
/// Logs always go to stderr; stdout is reserved for command output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level.
    pub level: LogLevel,

    /// Log format.
    pub format: LogFormat,
}

impl LoggingConfig {
    /// Applies STAGEHAND_LOG_LEVEL / STAGEHAND_LOG_FORMAT overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("STAGEHAND_LOG_LEVEL") {
            if let Ok(level) = level.parse() {
                self.level = level;
            }
        }
        if let Ok(format) = std::env::var("STAGEHAND_LOG_FORMAT") {
            if let Ok(format) = format.parse() {
                self.format = format;
            }
        }
    }
}

/// Log level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warn level.
    Warn,
    /// Error level.
    Error,
}

impl FromStr for LogLevel {
    type Err = StagehandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(StagehandError::config(format!("Unknown log level: {}", s))),
        }
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format.
    #[default]
    Text,
    /// JSON format.
    Json,
}

impl FromStr for LogFormat {
    type Err = StagehandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(StagehandError::config(format!("Unknown log format: {}", s))),
        }
    }
}
