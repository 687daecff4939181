//! Run reports.
//!
//! A run produces one report: the final phase of every service it
//! touched, in start order, plus the first failure when the run did not
//! succeed. Reports render as text for the terminal or as JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{exit_code, Result, StagehandError};

/// Per-service progression within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServicePhase {
    /// Not yet acted on.
    Pending,
    /// Start issued, not yet healthy.
    Starting,
    /// Started and passed its health check.
    Healthy,
    /// Start or health check failed.
    Failed,
    /// Stopped by this run.
    Stopped,
}

impl std::fmt::Display for ServicePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServicePhase::Pending => write!(f, "pending"),
            ServicePhase::Starting => write!(f, "starting"),
            ServicePhase::Healthy => write!(f, "healthy"),
            ServicePhase::Failed => write!(f, "failed"),
            ServicePhase::Stopped => write!(f, "stopped"),
        }
    }
}

/// Which lifecycle operation a run performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Ordered start with health gating.
    Up,
    /// Ordered stop, reverse of start order.
    Down,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Up => write!(f, "up"),
            Operation::Down => write!(f, "down"),
        }
    }
}

/// Overall result of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    /// Every service reached its target phase.
    Success,
    /// A service failed; the run aborted and rolled back.
    Failed,
    /// The run was interrupted and rolled back.
    Cancelled,
}

/// The failure that ended a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunFailure {
    /// Service the failure is about, if any.
    pub service: Option<String>,
    /// Human-readable cause.
    pub message: String,
    /// CLI exit code the failure maps to.
    pub exit_code: i32,
}

impl RunFailure {
    /// Records an error as a run failure.
    pub fn from_error(error: &StagehandError) -> Self {
        Self {
            service: error.service().map(|s| s.to_string()),
            message: error.to_string(),
            exit_code: error.exit_code(),
        }
    }
}

/// Final state of one service after a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceReport {
    /// Service name.
    pub name: String,
    /// Final phase.
    pub phase: ServicePhase,
    /// Anomaly note (failure cause, skipped start, teardown problem).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Report for one orchestrator run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Run id.
    pub id: Uuid,
    /// Operation performed.
    pub operation: Operation,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
    /// Overall result.
    pub outcome: RunOutcome,
    /// Per-service final phases, in start order.
    pub services: Vec<ServiceReport>,
    /// First failure, when the run did not succeed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<RunFailure>,
}

impl RunReport {
    /// Returns the CLI exit code for this run.
    pub fn exit_code(&self) -> i32 {
        match self.outcome {
            RunOutcome::Success => exit_code::SUCCESS,
            RunOutcome::Failed | RunOutcome::Cancelled => self
                .failure
                .as_ref()
                .map(|f| f.exit_code)
                .unwrap_or(exit_code::GENERAL_ERROR),
        }
    }

    /// Run duration in seconds.
    pub fn duration_seconds(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }

    /// Renders the report for the terminal.
    pub fn render_text(&self) -> String {
        let mut out = String::new();

        for service in &self.services {
            match &service.detail {
                Some(detail) => out.push_str(&format!(
                    "  {:<20} {:<9} {}\n",
                    service.name, service.phase, detail
                )),
                None => out.push_str(&format!("  {:<20} {}\n", service.name, service.phase)),
            }
        }

        match self.outcome {
            RunOutcome::Success => out.push_str(&format!(
                "{} succeeded in {:.1}s ({} services)\n",
                self.operation,
                self.duration_seconds(),
                self.services.len()
            )),
            RunOutcome::Failed => {
                let cause = self
                    .failure
                    .as_ref()
                    .map(|f| f.message.as_str())
                    .unwrap_or("unknown failure");
                out.push_str(&format!("{} failed: {}\n", self.operation, cause));
            }
            RunOutcome::Cancelled => out.push_str(&format!(
                "{} interrupted after {:.1}s\n",
                self.operation,
                self.duration_seconds()
            )),
        }

        out
    }

    /// Renders the report as pretty JSON.
    pub fn render_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
