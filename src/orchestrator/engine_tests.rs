//! Orchestration engine tests.
//!
//! These use a fake runtime and a fake prober sharing one event log,
//! so ordering between start, probe and stop actions can be asserted
//! across components.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{watch, Notify};

use super::*;
use crate::config::{Config, HealthCheckSpec, ServiceSpec};
use crate::error::exit_code;
use crate::probe::{ProbePlan, ProbeVerdict, Prober};
use crate::runtime::{ServiceRuntime, ServiceState};

type EventLog = Arc<Mutex<Vec<String>>>;

struct FakeRuntime {
    log: EventLog,
    fail_start: HashSet<String>,
    fail_stop: HashSet<String>,
    fail_build: HashSet<String>,
}

impl FakeRuntime {
    fn new(log: EventLog) -> Self {
        Self {
            log,
            fail_start: HashSet::new(),
            fail_stop: HashSet::new(),
            fail_build: HashSet::new(),
        }
    }
}

#[async_trait]
impl ServiceRuntime for FakeRuntime {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn state(&self, _service: &str) -> crate::error::Result<ServiceState> {
        Ok(ServiceState::Stopped)
    }

    async fn start(&self, service: &str) -> crate::error::Result<()> {
        self.log.lock().unwrap().push(format!("start {}", service));
        if self.fail_start.contains(service) {
            return Err(StagehandError::start_failure(
                service,
                "simulated start failure",
            ));
        }
        Ok(())
    }

    async fn stop(&self, service: &str) -> crate::error::Result<()> {
        self.log.lock().unwrap().push(format!("stop {}", service));
        if self.fail_stop.contains(service) {
            return Err(StagehandError::runtime(format!(
                "Failed to stop \"{}\": simulated stop failure",
                service
            )));
        }
        Ok(())
    }

    async fn build(&self, service: &str) -> crate::error::Result<()> {
        self.log.lock().unwrap().push(format!("build {}", service));
        if self.fail_build.contains(service) {
            return Err(StagehandError::build_failure(
                service,
                "simulated build failure",
            ));
        }
        Ok(())
    }
}

struct FakeProber {
    log: EventLog,
    verdicts: HashMap<String, ProbeVerdict>,
}

impl FakeProber {
    fn new(log: EventLog) -> Self {
        Self {
            log,
            verdicts: HashMap::new(),
        }
    }

    fn with_verdict(mut self, service: &str, verdict: ProbeVerdict) -> Self {
        self.verdicts.insert(service.to_string(), verdict);
        self
    }
}

#[async_trait]
impl Prober for FakeProber {
    async fn probe(&self, service: &str, _plan: &ProbePlan) -> ProbeVerdict {
        self.log.lock().unwrap().push(format!("probe {}", service));
        self.verdicts
            .get(service)
            .cloned()
            .unwrap_or(ProbeVerdict::Healthy)
    }
}

/// Prober that parks on one service's health check until released,
/// so a test can act while that probe is in flight.
struct GatedProber {
    log: EventLog,
    gated: String,
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl Prober for GatedProber {
    async fn probe(&self, service: &str, _plan: &ProbePlan) -> ProbeVerdict {
        self.log.lock().unwrap().push(format!("probe {}", service));
        if service == self.gated {
            self.entered.notify_one();
            self.release.notified().await;
        }
        ProbeVerdict::Healthy
    }
}

fn spec(deps: &[&str]) -> ServiceSpec {
    ServiceSpec {
        image: Some("test:latest".to_string()),
        depends_on: deps.iter().map(|d| d.to_string()).collect(),
        health: Some(HealthCheckSpec {
            http: Some("http://127.0.0.1:1/healthz".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn config(entries: &[(&str, &[&str])]) -> Config {
    let services = entries
        .iter()
        .map(|(name, deps)| (name.to_string(), spec(deps)))
        .collect();
    Config {
        services,
        ..Default::default()
    }
}

struct Harness {
    orchestrator: Orchestrator,
    log: EventLog,
    cancel: watch::Sender<bool>,
}

fn harness(config: Config) -> Harness {
    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    harness_with(
        config,
        FakeRuntime::new(log.clone()),
        FakeProber::new(log.clone()),
        log,
    )
}

fn harness_with(
    config: Config,
    runtime: FakeRuntime,
    prober: FakeProber,
    log: EventLog,
) -> Harness {
    let (cancel, rx) = watch::channel(false);
    let orchestrator = Orchestrator::new(config, Arc::new(runtime), Arc::new(prober), rx);
    Harness {
        orchestrator,
        log,
        cancel,
    }
}

fn events(log: &EventLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

fn index_of(events: &[String], entry: &str) -> usize {
    events
        .iter()
        .position(|e| e == entry)
        .unwrap_or_else(|| panic!("event '{}' not found in {:?}", entry, events))
}

fn phase_of(report: &RunReport, service: &str) -> ServicePhase {
    report
        .services
        .iter()
        .find(|s| s.name == service)
        .unwrap_or_else(|| panic!("service '{}' not in report", service))
        .phase
}

#[tokio::test]
async fn test_up_all_healthy() {
    let h = harness(config(&[("a", &[]), ("b", &["a"]), ("c", &["a"])]));

    let report = h.orchestrator.up(UpOptions::default()).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Success);
    assert_eq!(report.exit_code(), exit_code::SUCCESS);
    for service in ["a", "b", "c"] {
        assert_eq!(phase_of(&report, service), ServicePhase::Healthy);
    }

    // Dependencies must be healthy before dependents start.
    let events = events(&h.log);
    assert!(index_of(&events, "probe a") < index_of(&events, "start b"));
    assert!(index_of(&events, "probe a") < index_of(&events, "start c"));
}

#[tokio::test]
async fn test_up_health_timeout_rolls_back_healthy_only() {
    // A healthy, B times out: A is torn down, C (same batch as B) is
    // skipped before its start action is ever issued.
    let cfg = config(&[("a", &[]), ("b", &["a"]), ("c", &["a"])]);
    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    let prober = FakeProber::new(log.clone()).with_verdict("b", ProbeVerdict::Timeout);
    let h = harness_with(cfg, FakeRuntime::new(log.clone()), prober, log);

    let report = h.orchestrator.up(UpOptions::default()).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Failed);
    assert_eq!(report.exit_code(), exit_code::HEALTH_ERROR);

    let failure = report.failure.as_ref().unwrap();
    assert_eq!(failure.service, Some("b".to_string()));
    assert!(failure.message.contains("timed out"));

    assert_eq!(phase_of(&report, "a"), ServicePhase::Stopped);
    assert_eq!(phase_of(&report, "b"), ServicePhase::Failed);
    assert_eq!(phase_of(&report, "c"), ServicePhase::Pending);

    let events = events(&h.log);
    assert!(events.contains(&"stop a".to_string()));
    assert!(!events.contains(&"start c".to_string()));
    assert!(!events.contains(&"stop b".to_string()));
    assert!(!events.contains(&"stop c".to_string()));
}

#[tokio::test]
async fn test_up_start_failure_rolls_back() {
    let cfg = config(&[("a", &[]), ("b", &["a"])]);
    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    let mut runtime = FakeRuntime::new(log.clone());
    runtime.fail_start.insert("b".to_string());
    let h = harness_with(cfg, runtime, FakeProber::new(log.clone()), log);

    let report = h.orchestrator.up(UpOptions::default()).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Failed);
    assert_eq!(report.exit_code(), exit_code::RUNTIME_ERROR);
    assert_eq!(
        report.failure.as_ref().unwrap().service,
        Some("b".to_string())
    );
    assert_eq!(phase_of(&report, "a"), ServicePhase::Stopped);
    assert_eq!(phase_of(&report, "b"), ServicePhase::Failed);

    let events = events(&h.log);
    assert!(events.contains(&"stop a".to_string()));
}

#[tokio::test]
async fn test_up_dependent_never_started_after_dependency_failure() {
    let cfg = config(&[("a", &[]), ("b", &["a"])]);
    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    let prober = FakeProber::new(log.clone()).with_verdict(
        "a",
        ProbeVerdict::Unhealthy {
            reason: "HTTP 500".to_string(),
        },
    );
    let h = harness_with(cfg, FakeRuntime::new(log.clone()), prober, log);

    let report = h.orchestrator.up(UpOptions::default()).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Failed);
    assert_eq!(report.exit_code(), exit_code::HEALTH_ERROR);
    assert!(report.failure.as_ref().unwrap().message.contains("HTTP 500"));
    assert_eq!(phase_of(&report, "b"), ServicePhase::Pending);

    let events = events(&h.log);
    assert!(!events.contains(&"start b".to_string()));
}

#[tokio::test]
async fn test_up_without_health_check_start_is_enough() {
    let mut cfg = config(&[("a", &[])]);
    cfg.services.get_mut("a").unwrap().health = None;
    let h = harness(cfg);

    let report = h.orchestrator.up(UpOptions::default()).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Success);
    assert_eq!(phase_of(&report, "a"), ServicePhase::Healthy);
    assert!(!events(&h.log).contains(&"probe a".to_string()));
}

#[tokio::test]
async fn test_up_build_phase_precedes_starts() {
    let h = harness(config(&[("a", &[]), ("b", &["a"])]));

    let options = UpOptions {
        build: true,
        ..Default::default()
    };
    let report = h.orchestrator.up(options).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Success);
    let events = events(&h.log);
    assert!(index_of(&events, "build a") < index_of(&events, "start a"));
    assert!(index_of(&events, "build b") < index_of(&events, "start a"));
}

#[tokio::test]
async fn test_up_build_failure_aborts_before_any_start() {
    let cfg = config(&[("a", &[]), ("b", &["a"])]);
    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    let mut runtime = FakeRuntime::new(log.clone());
    runtime.fail_build.insert("b".to_string());
    let h = harness_with(cfg, runtime, FakeProber::new(log.clone()), log);

    let options = UpOptions {
        build: true,
        ..Default::default()
    };
    let report = h.orchestrator.up(options).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Failed);
    assert_eq!(report.exit_code(), exit_code::RUNTIME_ERROR);
    assert_eq!(
        report.failure.as_ref().unwrap().service,
        Some("b".to_string())
    );

    let events = events(&h.log);
    assert!(!events.iter().any(|e| e.starts_with("start ")));
    assert!(!events.iter().any(|e| e.starts_with("stop ")));
}

#[tokio::test]
async fn test_up_resolver_error_has_no_side_effects() {
    let h = harness(config(&[("a", &["b"]), ("b", &["a"])]));

    let result = h.orchestrator.up(UpOptions::default()).await;

    assert!(matches!(
        result.unwrap_err(),
        StagehandError::CycleDetected { .. }
    ));
    assert!(events(&h.log).is_empty());
}

#[tokio::test]
async fn test_up_only_closes_over_dependencies() {
    let h = harness(config(&[("a", &[]), ("b", &["a"]), ("c", &["a"])]));

    let options = UpOptions {
        only: vec!["b".to_string()],
        ..Default::default()
    };
    let report = h.orchestrator.up(options).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Success);
    assert_eq!(report.services.len(), 2);

    let events = events(&h.log);
    assert!(events.contains(&"start a".to_string()));
    assert!(events.contains(&"start b".to_string()));
    assert!(!events.contains(&"start c".to_string()));
}

#[tokio::test]
async fn test_up_unknown_pattern_is_an_error() {
    let h = harness(config(&[("a", &[])]));

    let options = UpOptions {
        only: vec!["nope*".to_string()],
        ..Default::default()
    };
    let result = h.orchestrator.up(options).await;

    let err = result.unwrap_err();
    assert!(err.to_string().contains("nope*"));
    assert!(events(&h.log).is_empty());
}

#[tokio::test]
async fn test_up_cancelled_before_start() {
    let h = harness(config(&[("a", &[]), ("b", &["a"])]));
    h.cancel.send(true).unwrap();

    let report = h.orchestrator.up(UpOptions::default()).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Cancelled);
    assert_eq!(report.exit_code(), exit_code::INTERRUPTED);
    assert!(events(&h.log).is_empty());
    assert_eq!(phase_of(&report, "a"), ServicePhase::Pending);
}

#[tokio::test]
async fn test_up_cancelled_mid_batch_drains_and_rolls_back() {
    // Cancel arrives while b's health check is in flight: the probe
    // drains, c is never started, and the healthy services (a and b)
    // are torn down in reverse order.
    let cfg = config(&[("a", &[]), ("b", &["a"]), ("c", &["b"])]);
    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let prober = GatedProber {
        log: log.clone(),
        gated: "b".to_string(),
        entered: entered.clone(),
        release: release.clone(),
    };
    let (cancel, rx) = watch::channel(false);
    let orchestrator = Arc::new(Orchestrator::new(
        cfg,
        Arc::new(FakeRuntime::new(log.clone())),
        Arc::new(prober),
        rx,
    ));

    let run = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.up(UpOptions::default()).await }
    });

    entered.notified().await;
    cancel.send(true).unwrap();
    release.notify_one();

    let report = run.await.unwrap().unwrap();

    assert_eq!(report.outcome, RunOutcome::Cancelled);
    assert_eq!(report.exit_code(), exit_code::INTERRUPTED);
    assert_eq!(phase_of(&report, "a"), ServicePhase::Stopped);
    assert_eq!(phase_of(&report, "b"), ServicePhase::Stopped);
    assert_eq!(phase_of(&report, "c"), ServicePhase::Pending);

    let events = events(&log);
    assert!(!events.contains(&"start c".to_string()));
    // The in-flight health check completed before teardown began.
    assert!(index_of(&events, "probe b") < index_of(&events, "stop b"));
    assert!(index_of(&events, "stop b") < index_of(&events, "stop a"));
}

#[tokio::test]
async fn test_down_stops_dependents_first() {
    let h = harness(config(&[("a", &[]), ("b", &["a"]), ("c", &["a"])]));

    let report = h.orchestrator.down(DownOptions::default()).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Success);
    assert_eq!(report.exit_code(), exit_code::SUCCESS);
    for service in ["a", "b", "c"] {
        assert_eq!(phase_of(&report, service), ServicePhase::Stopped);
    }

    let events = events(&h.log);
    assert!(index_of(&events, "stop b") < index_of(&events, "stop a"));
    assert!(index_of(&events, "stop c") < index_of(&events, "stop a"));
}

#[tokio::test]
async fn test_down_order_is_reverse_of_up_order() {
    let cfg = config(&[("a", &[]), ("b", &["a"]), ("c", &["b"])]);

    let h = harness(cfg.clone());
    let up = h.orchestrator.up(UpOptions::default()).await.unwrap();
    let down = h.orchestrator.down(DownOptions::default()).await.unwrap();

    let up_order: Vec<&str> = up.services.iter().map(|s| s.name.as_str()).collect();
    let mut down_order: Vec<&str> = down.services.iter().map(|s| s.name.as_str()).collect();
    down_order.reverse();

    assert_eq!(up_order, down_order);
}

#[tokio::test]
async fn test_down_twice_is_idempotent() {
    let h = harness(config(&[("a", &[]), ("b", &["a"])]));

    let first = h.orchestrator.down(DownOptions::default()).await.unwrap();
    let second = h.orchestrator.down(DownOptions::default()).await.unwrap();

    assert_eq!(first.outcome, RunOutcome::Success);
    assert_eq!(second.outcome, RunOutcome::Success);
    assert_eq!(second.exit_code(), exit_code::SUCCESS);
}

#[tokio::test]
async fn test_down_stop_errors_are_best_effort() {
    let cfg = config(&[("a", &[]), ("b", &["a"]), ("c", &["a"])]);
    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    let mut runtime = FakeRuntime::new(log.clone());
    runtime.fail_stop.insert("b".to_string());
    let h = harness_with(cfg, runtime, FakeProber::new(log.clone()), log);

    let report = h.orchestrator.down(DownOptions::default()).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Failed);
    assert_eq!(report.exit_code(), exit_code::RUNTIME_ERROR);
    assert!(report.failure.as_ref().unwrap().message.contains("b"));

    // The failing stop does not block the rest of the teardown.
    let events = events(&h.log);
    assert!(events.contains(&"stop a".to_string()));
    assert!(events.contains(&"stop c".to_string()));
    assert_eq!(phase_of(&report, "b"), ServicePhase::Failed);
    assert_eq!(phase_of(&report, "a"), ServicePhase::Stopped);
}

#[tokio::test]
async fn test_down_only_closes_over_dependents() {
    let h = harness(config(&[("a", &[]), ("b", &["a"]), ("c", &["a"])]));

    let options = DownOptions {
        only: vec!["a".to_string()],
    };
    let report = h.orchestrator.down(options).await.unwrap();
    assert_eq!(report.services.len(), 3);

    let h = harness(config(&[("a", &[]), ("b", &["a"]), ("c", &["a"])]));
    let options = DownOptions {
        only: vec!["b".to_string()],
    };
    let report = h.orchestrator.down(options).await.unwrap();
    assert_eq!(report.services.len(), 1);
    assert_eq!(report.services[0].name, "b");

    let events = events(&h.log);
    assert!(!events.contains(&"stop a".to_string()));
}

#[tokio::test]
async fn test_status_reports_every_service() {
    let h = harness(config(&[("b", &[]), ("a", &["b"])]));

    let states = h.orchestrator.status().await.unwrap();

    assert_eq!(states.len(), 2);
    assert_eq!(states[0].0, "a");
    assert_eq!(states[1].0, "b");
    assert!(states.iter().all(|(_, s)| *s == ServiceState::Stopped));
}
