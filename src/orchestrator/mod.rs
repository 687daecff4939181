//! Lifecycle orchestration.
//!
//! The orchestrator drives one `up` or `down` invocation over a run
//! session. Within a batch, members start and are probed concurrently;
//! batches execute strictly in dependency order. The session state map
//! is mutated only by the run loop; concurrent start/probe futures
//! report their outcomes back through the polled stream, never by
//! touching shared state.

pub mod report;

#[cfg(test)]
mod engine_tests;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{Result, StagehandError};
use crate::graph;
use crate::probe::{HealthProber, ProbePlan, ProbeVerdict, Prober};
use crate::runtime::{self, ServiceRuntime};

pub use report::{
    Operation, RunFailure, RunOutcome, RunReport, ServicePhase, ServiceReport,
};

/// Options for an `up` run.
#[derive(Debug, Clone, Default)]
pub struct UpOptions {
    /// Run each service's build action before starting anything.
    pub build: bool,
    /// Glob patterns selecting a subset of services. The selection is
    /// closed over dependencies so health gating still holds.
    pub only: Vec<String>,
}

/// Options for a `down` run.
#[derive(Debug, Clone, Default)]
pub struct DownOptions {
    /// Glob patterns selecting a subset of services. The selection is
    /// closed over dependents so nothing is stopped under a running
    /// dependent.
    pub only: Vec<String>,
}

/// Outcome of one service's start-and-probe future.
enum ServiceOutcome {
    /// Started and passed its health gate.
    Healthy,
    /// Never started; an earlier member of the batch failed first.
    Skipped,
    /// Start action or health check failed.
    Failed(StagehandError),
}

/// Mutable state for one orchestration invocation.
///
/// Created when a run begins and consumed into a [`RunReport`] when it
/// completes. Only the orchestrator run loop writes to it.
struct RunSession {
    id: Uuid,
    operation: Operation,
    started_at: DateTime<Utc>,
    /// Service names in action order.
    order: Vec<String>,
    phases: HashMap<String, ServicePhase>,
    details: HashMap<String, String>,
}

impl RunSession {
    fn new(operation: Operation, batches: &[Vec<String>]) -> Self {
        let order: Vec<String> = batches.iter().flatten().cloned().collect();
        let phases = order
            .iter()
            .map(|name| (name.clone(), ServicePhase::Pending))
            .collect();

        let id = Uuid::new_v4();
        info!(run_id = %id, operation = %operation, services = order.len(), "Run started");

        Self {
            id,
            operation,
            started_at: Utc::now(),
            order,
            phases,
            details: HashMap::new(),
        }
    }

    fn set_phase(&mut self, service: &str, phase: ServicePhase) {
        debug!(service = %service, phase = %phase, "Service phase changed");
        self.phases.insert(service.to_string(), phase);
    }

    fn note(&mut self, service: &str, detail: impl Into<String>) {
        self.details.insert(service.to_string(), detail.into());
    }

    fn into_report(mut self, outcome: RunOutcome, failure: Option<RunFailure>) -> RunReport {
        let order = std::mem::take(&mut self.order);
        let services = order
            .into_iter()
            .map(|name| ServiceReport {
                phase: self.phases[&name],
                detail: self.details.remove(&name),
                name,
            })
            .collect();

        RunReport {
            id: self.id,
            operation: self.operation,
            started_at: self.started_at,
            finished_at: Utc::now(),
            outcome,
            services,
            failure,
        }
    }
}

/// Drives service lifecycles in dependency order.
pub struct Orchestrator {
    config: Config,
    runtime: Arc<dyn ServiceRuntime>,
    prober: Arc<dyn Prober>,
    cancel: watch::Receiver<bool>,
}

impl Orchestrator {
    /// Creates an orchestrator with explicit runtime and prober.
    pub fn new(
        config: Config,
        runtime: Arc<dyn ServiceRuntime>,
        prober: Arc<dyn Prober>,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            runtime,
            prober,
            cancel,
        }
    }

    /// Creates an orchestrator with the configured runtime provider and
    /// the real health prober.
    pub fn from_config(config: Config, cancel: watch::Receiver<bool>) -> Result<Self> {
        let runtime = runtime::create_runtime(&config)?;
        let prober = Arc::new(HealthProber::new(
            &config.probe,
            config.runtime.command_timeout_seconds,
        )?);
        Ok(Self::new(config, runtime, prober, cancel))
    }

    /// Starts services batch by batch, gating each batch on health.
    ///
    /// Resolver and selection errors abort before any side effect. Once
    /// actions are issued, failures are captured in the returned report:
    /// the first failed service ends the run and every service that
    /// reached `Healthy` is torn down in reverse order. Failed services
    /// are left in place for inspection.
    pub async fn up(&self, options: UpOptions) -> Result<RunReport> {
        let batches = self.plan(&options.only, Operation::Up)?;
        let mut session = RunSession::new(Operation::Up, &batches);
        let mut cancel = self.cancel.clone();

        if options.build {
            for name in batches.iter().flatten() {
                if *cancel.borrow() {
                    return Ok(self.interrupted(session));
                }
                if let Err(error) = self.runtime.build(name).await {
                    session.set_phase(name, ServicePhase::Failed);
                    session.note(name, error.to_string());
                    let failure = RunFailure::from_error(&error);
                    return Ok(session.into_report(RunOutcome::Failed, Some(failure)));
                }
            }
        }

        // Healthy services per completed batch, kept for rollback.
        let mut healthy_batches: Vec<Vec<String>> = Vec::new();
        let mut failure: Option<StagehandError> = None;
        let mut cancelled = *cancel.borrow();
        // Stop watching once the signal fires or the sender is gone.
        let mut watching = !cancelled;

        for batch in &batches {
            if cancelled || failure.is_some() {
                break;
            }

            let (abort_tx, abort_rx) = watch::channel(false);
            let mut futures = FuturesUnordered::new();
            for name in batch {
                session.set_phase(name, ServicePhase::Starting);
                futures.push(self.run_service(name.clone(), abort_rx.clone()));
            }

            let mut healthy: Vec<String> = Vec::new();
            while !futures.is_empty() {
                tokio::select! {
                    biased;
                    changed = cancel.changed(), if watching => {
                        match changed {
                            Ok(()) if *cancel.borrow_and_update() => {
                                warn!("Interrupt received, draining in-flight work");
                                watching = false;
                                cancelled = true;
                                let _ = abort_tx.send(true);
                            }
                            Ok(()) => {}
                            Err(_) => watching = false,
                        }
                    }
                    Some((name, outcome)) = futures.next() => {
                        match outcome {
                            ServiceOutcome::Healthy => {
                                session.set_phase(&name, ServicePhase::Healthy);
                                healthy.push(name);
                            }
                            ServiceOutcome::Skipped => {
                                session.set_phase(&name, ServicePhase::Pending);
                                session.note(&name, "start skipped after earlier failure");
                            }
                            ServiceOutcome::Failed(error) => {
                                session.set_phase(&name, ServicePhase::Failed);
                                session.note(&name, error.to_string());
                                if failure.is_none() {
                                    warn!(service = %name, error = %error, "Service failed, aborting run");
                                    failure = Some(error);
                                    let _ = abort_tx.send(true);
                                }
                            }
                        }
                    }
                }
            }

            healthy.sort();
            healthy_batches.push(healthy);
        }

        if failure.is_none() && !cancelled {
            let count: usize = healthy_batches.iter().map(|b| b.len()).sum();
            info!(run_id = %session.id, services = count, "All services healthy");
            return Ok(session.into_report(RunOutcome::Success, None));
        }

        self.rollback(&mut session, &healthy_batches).await;

        match failure {
            Some(error) => {
                let failure = RunFailure::from_error(&error);
                Ok(session.into_report(RunOutcome::Failed, Some(failure)))
            }
            None => Ok(self.interrupted(session)),
        }
    }

    /// Stops services in reverse dependency order.
    ///
    /// Stop errors are best-effort: the failing service is recorded and
    /// teardown continues. Stopping an already-quiescent stack is a
    /// no-op success.
    pub async fn down(&self, options: DownOptions) -> Result<RunReport> {
        let mut batches = self.plan(&options.only, Operation::Down)?;
        batches.reverse();
        let mut session = RunSession::new(Operation::Down, &batches);

        let mut failed: Vec<String> = Vec::new();
        for batch in &batches {
            let mut futures = FuturesUnordered::new();
            for name in batch {
                futures.push(self.stop_service(name.clone()));
            }

            while let Some((name, result)) = futures.next().await {
                match result {
                    Ok(()) => session.set_phase(&name, ServicePhase::Stopped),
                    Err(error) => {
                        warn!(service = %name, error = %error, "Stop failed, continuing teardown");
                        session.set_phase(&name, ServicePhase::Failed);
                        session.note(&name, error.to_string());
                        failed.push(name);
                    }
                }
            }
        }

        if failed.is_empty() {
            return Ok(session.into_report(RunOutcome::Success, None));
        }

        failed.sort();
        let error = StagehandError::Teardown { services: failed };
        let failure = RunFailure::from_error(&error);
        Ok(session.into_report(RunOutcome::Failed, Some(failure)))
    }

    /// Observes the runtime state of every service, in name order.
    pub async fn status(&self) -> Result<Vec<(String, runtime::ServiceState)>> {
        let mut states = Vec::new();
        for name in self.config.service_names() {
            let state = self.runtime.state(&name).await?;
            states.push((name, state));
        }
        Ok(states)
    }

    /// Resolves batches and applies the `--only` selection.
    ///
    /// Batches are computed on the full spec set and filtered, so the
    /// relative order of selected services is unchanged.
    fn plan(&self, only: &[String], operation: Operation) -> Result<Vec<Vec<String>>> {
        let batches = graph::resolve_batches(&self.config.services)?;
        if only.is_empty() {
            return Ok(batches);
        }

        let roots = self.match_patterns(only)?;
        let selected = match operation {
            Operation::Up => graph::dependency_closure(&self.config.services, &roots),
            Operation::Down => graph::dependent_closure(&self.config.services, &roots),
        };

        let filtered: Vec<Vec<String>> = batches
            .into_iter()
            .map(|batch| {
                batch
                    .into_iter()
                    .filter(|name| selected.contains(name))
                    .collect::<Vec<String>>()
            })
            .filter(|batch| !batch.is_empty())
            .collect();

        Ok(filtered)
    }

    /// Expands glob patterns against the service names.
    fn match_patterns(&self, patterns: &[String]) -> Result<Vec<String>> {
        let names = self.config.service_names();
        let mut matched: Vec<String> = Vec::new();

        for pattern in patterns {
            let mut any = false;
            for name in &names {
                if glob_match::glob_match(pattern, name) {
                    any = true;
                    if !matched.contains(name) {
                        matched.push(name.clone());
                    }
                }
            }
            if !any {
                return Err(StagehandError::config(format!(
                    "No service matches pattern \"{}\"",
                    pattern
                )));
            }
        }

        Ok(matched)
    }

    /// Starts one service and runs its health gate.
    ///
    /// The abort flag is consulted once, before the start action is
    /// issued: a batch member whose turn comes after a failure is
    /// skipped, while in-flight members drain normally.
    async fn run_service(
        &self,
        name: String,
        abort: watch::Receiver<bool>,
    ) -> (String, ServiceOutcome) {
        if *abort.borrow() {
            return (name, ServiceOutcome::Skipped);
        }

        if let Err(error) = self.runtime.start(&name).await {
            return (name, ServiceOutcome::Failed(error));
        }

        let Some(health) = self.config.services[&name].health.as_ref() else {
            // No health check configured: a successful start is enough.
            debug!(service = %name, "No health check, start counts as healthy");
            return (name, ServiceOutcome::Healthy);
        };

        let plan = match ProbePlan::from_spec(health, &self.config.probe) {
            Ok(plan) => plan,
            Err(error) => return (name, ServiceOutcome::Failed(error)),
        };

        match self.prober.probe(&name, &plan).await {
            ProbeVerdict::Healthy => (name, ServiceOutcome::Healthy),
            ProbeVerdict::Timeout => {
                let error = StagehandError::HealthTimeout {
                    service: name.clone(),
                    seconds: plan.timeout.as_secs(),
                };
                (name, ServiceOutcome::Failed(error))
            }
            ProbeVerdict::Unhealthy { reason } => {
                let error = StagehandError::HealthUnhealthy {
                    service: name.clone(),
                    message: reason,
                };
                (name, ServiceOutcome::Failed(error))
            }
        }
    }

    async fn stop_service(&self, name: String) -> (String, Result<()>) {
        let result = self.runtime.stop(&name).await;
        (name, result)
    }

    /// Tears down every service that reached `Healthy`, in reverse
    /// batch order. Errors are recorded on the session but never mask
    /// the failure that triggered the rollback.
    async fn rollback(&self, session: &mut RunSession, healthy_batches: &[Vec<String>]) {
        let count: usize = healthy_batches.iter().map(|b| b.len()).sum();
        if count == 0 {
            return;
        }

        info!(services = count, "Rolling back healthy services in reverse order");
        for batch in healthy_batches.iter().rev() {
            let mut futures = FuturesUnordered::new();
            for name in batch {
                futures.push(self.stop_service(name.clone()));
            }

            while let Some((name, result)) = futures.next().await {
                match result {
                    Ok(()) => session.set_phase(&name, ServicePhase::Stopped),
                    Err(error) => {
                        warn!(service = %name, error = %error, "Rollback stop failed");
                        session.note(&name, format!("teardown failed: {}", error));
                    }
                }
            }
        }
    }

    fn interrupted(&self, session: RunSession) -> RunReport {
        let failure = RunFailure::from_error(&StagehandError::Interrupted);
        session.into_report(RunOutcome::Cancelled, Some(failure))
    }
}
