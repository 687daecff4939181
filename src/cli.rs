//! Command-line interface definition for stagehand.
//!
//! This module defines the CLI structure using clap derive macros,
//! including all subcommands and their arguments.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::LogLevel;

/// stagehand - Dependency-aware service lifecycle orchestrator
///
/// A tool for starting and stopping a stack of services in dependency
/// order, gating each step on health checks.
#[derive(Debug, Parser)]
#[command(name = "stagehand")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the service manifest
    #[arg(short, long, global = true, env = "STAGEHAND_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Returns the log level requested on the command line, or `None`
    /// when neither `-v` nor `-q` was given and the manifest's
    /// `logging:` section should decide.
    pub fn log_level(&self) -> Option<LogLevel> {
        if self.quiet {
            return Some(LogLevel::Error);
        }

        match self.verbose {
            0 => None,
            1 => Some(LogLevel::Debug),
            _ => Some(LogLevel::Trace),
        }
    }
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start all services in dependency order, gated on health checks
    Up(UpArgs),

    /// Stop all services in reverse dependency order
    Down(DownArgs),

    /// Stop, rebuild and start all services
    Rebuild(RebuildArgs),

    /// Show the observed state of each service
    Status(StatusArgs),

    /// Configuration file operations
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Arguments for the `up` subcommand.
#[derive(Debug, Args)]
pub struct UpArgs {
    /// Run each service's build action before starting
    #[arg(long)]
    pub build: bool,

    /// Only act on services matching these glob patterns
    /// (dependencies are included automatically)
    #[arg(long = "only", value_name = "PATTERN")]
    pub only: Vec<String>,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `down` subcommand.
#[derive(Debug, Args)]
pub struct DownArgs {
    /// Only act on services matching these glob patterns
    /// (dependents are included automatically)
    #[arg(long = "only", value_name = "PATTERN")]
    pub only: Vec<String>,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `rebuild` subcommand.
#[derive(Debug, Args)]
pub struct RebuildArgs {
    /// Only act on services matching these glob patterns
    #[arg(long = "only", value_name = "PATTERN")]
    pub only: Vec<String>,

    /// Print the run reports as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `status` subcommand.
#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Print the states as JSON
    #[arg(long)]
    pub json: bool,
}

/// Configuration subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Validate the service manifest
    Validate,

    /// Show the effective configuration
    Show,
}
