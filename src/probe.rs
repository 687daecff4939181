//! Health probing.
//!
//! A probe polls a service's health target at a fixed interval until it
//! passes, the retry budget is spent, or the total timeout elapses.
//! Probes only observe; they never change service state.

use std::time::Duration;
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, info};

use crate::config::{HealthCheckSpec, ProbeConfig};
use crate::error::{Result, StagehandError};
use crate::runtime::CommandRunner;
use async_trait::async_trait;

/// Final verdict of a health check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeVerdict {
    /// An attempt passed within the budget.
    Healthy,
    /// The retry budget was spent on failed attempts.
    Unhealthy { reason: String },
    /// The total timeout elapsed without a passing attempt.
    Timeout,
}

impl std::fmt::Display for ProbeVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeVerdict::Healthy => write!(f, "healthy"),
            ProbeVerdict::Unhealthy { .. } => write!(f, "unhealthy"),
            ProbeVerdict::Timeout => write!(f, "timeout"),
        }
    }
}

/// What a probe attempt checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeTarget {
    /// HTTP GET; any 2xx response passes.
    Http(String),
    /// Command execution; exit status 0 passes.
    Command(String),
}

/// A health check resolved against the configured defaults.
#[derive(Debug, Clone)]
pub struct ProbePlan {
    /// What each attempt checks.
    pub target: ProbeTarget,
    /// Delay between attempts.
    pub interval: Duration,
    /// Total budget for the whole check.
    pub timeout: Duration,
    /// Attempts allowed before the verdict is unhealthy.
    pub retries: u32,
}

impl ProbePlan {
    /// Resolves a manifest health check against the probe defaults.
    pub fn from_spec(health: &HealthCheckSpec, defaults: &ProbeConfig) -> Result<Self> {
        let target = if let Some(url) = &health.http {
            ProbeTarget::Http(url.clone())
        } else if let Some(command) = &health.command {
            ProbeTarget::Command(command.clone())
        } else {
            return Err(StagehandError::config(
                "health check must specify exactly one of http or command",
            ));
        };

        Ok(Self {
            target,
            interval: Duration::from_secs(
                health.interval_seconds.unwrap_or(defaults.interval_seconds),
            ),
            timeout: Duration::from_secs(
                health.timeout_seconds.unwrap_or(defaults.timeout_seconds),
            ),
            retries: health.retries.unwrap_or(defaults.retries),
        })
    }
}

/// Trait for health probers.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Runs the check to completion and returns the verdict.
    async fn probe(&self, service: &str, plan: &ProbePlan) -> ProbeVerdict;
}

/// Prober backed by a real HTTP client and command execution.
pub struct HealthProber {
    /// HTTP client with the per-attempt timeout applied.
    client: reqwest::Client,
    /// Executor for command targets.
    runner: CommandRunner,
}

impl HealthProber {
    /// Creates a prober from the probe defaults.
    ///
    /// `command_timeout_seconds` bounds a single command attempt the
    /// same way `probe.http_seconds` bounds a single HTTP attempt.
    pub fn new(probe: &ProbeConfig, command_timeout_seconds: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(probe.http_seconds))
            .build()
            .map_err(|e| StagehandError::runtime_with_source("Failed to create HTTP client", e))?;

        Ok(Self {
            client,
            runner: CommandRunner::new(command_timeout_seconds),
        })
    }

    /// Runs one attempt; `Err` carries the failure reason.
    async fn attempt(&self, target: &ProbeTarget) -> std::result::Result<(), String> {
        match target {
            ProbeTarget::Http(url) => match self.client.get(url).send().await {
                Ok(response) if response.status().is_success() => Ok(()),
                Ok(response) => Err(format!("HTTP {}", response.status().as_u16())),
                Err(e) => Err(e.to_string()),
            },
            ProbeTarget::Command(command) => {
                match self.runner.run_shell(command, None, &[], None).await {
                    Ok(out) if out.success => Ok(()),
                    Ok(out) => Err(format!("command {}", out.failure_summary())),
                    Err(e) => Err(e.to_string()),
                }
            }
        }
    }
}

#[async_trait]
impl Prober for HealthProber {
    async fn probe(&self, service: &str, plan: &ProbePlan) -> ProbeVerdict {
        let deadline = Instant::now() + plan.timeout;
        let mut failures = 0u32;

        info!(
            service = %service,
            timeout_secs = plan.timeout.as_secs(),
            retries = plan.retries,
            "Waiting for service to become healthy"
        );

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return ProbeVerdict::Timeout;
            }

            let outcome = match timeout(remaining, self.attempt(&plan.target)).await {
                Ok(outcome) => outcome,
                Err(_) => return ProbeVerdict::Timeout,
            };

            match outcome {
                Ok(()) => {
                    info!(service = %service, "Service is healthy");
                    return ProbeVerdict::Healthy;
                }
                Err(reason) => {
                    failures += 1;
                    debug!(
                        service = %service,
                        attempt = failures,
                        reason = %reason,
                        "Probe attempt failed"
                    );
                    if failures >= plan.retries {
                        return ProbeVerdict::Unhealthy { reason };
                    }
                }
            }

            let next = Instant::now() + plan.interval;
            if next >= deadline {
                sleep_until(deadline).await;
                return ProbeVerdict::Timeout;
            }
            sleep_until(next).await;
        }
    }
}
