//! stagehand - Dependency-aware service lifecycle orchestrator
//!
//! This crate starts and stops a stack of services in dependency order,
//! gating each step on health checks.
//!
//! # Overview
//!
//! stagehand replaces compose files plus ad hoc rebuild scripts with an
//! explicit, testable controller: a manifest declares services, their
//! dependencies and health checks; the orchestrator resolves the
//! dependency graph into batches, starts each batch concurrently, and
//! only advances once every member is healthy. On failure, everything
//! that came up is torn down again in reverse order.
//!
//! # Modules
//!
//! - [`cli`] - Command-line interface definitions
//! - [`config`] - Manifest parsing and validation
//! - [`error`] - Error types and exit codes
//! - [`graph`] - Dependency graph resolution into start batches
//! - [`orchestrator`] - Lifecycle runs: up, down, rollback
//! - [`probe`] - Health checking
//! - [`runtime`] - Service lifecycle providers (docker, process)

pub mod cli;
pub mod config;
pub mod error;
pub mod graph;
pub mod orchestrator;
pub mod probe;
pub mod runtime;

// Re-exports for convenience
pub use cli::Cli;
pub use config::Config;
pub use error::{Result, StagehandError};
pub use orchestrator::{Orchestrator, RunReport};
