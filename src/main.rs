//! stagehand - Dependency-aware service lifecycle orchestrator
//!
//! Entry point for the stagehand application.

use clap::Parser;
use stagehand::cli::{Cli, Commands, ConfigCommands, DownArgs, RebuildArgs, StatusArgs, UpArgs};
use stagehand::config::{Config, LogFormat, LogLevel, LoggingConfig};
use stagehand::error::{exit_code, render_chain};
use stagehand::orchestrator::{DownOptions, Orchestrator, RunReport, UpOptions};
use std::process::ExitCode;
use tokio::sync::watch;
use tracing::Level;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // The manifest's logging section feeds the subscriber, so the
    // manifest is loaded before logging comes up. A load failure falls
    // back to defaults (plus env overrides) and is reported after init.
    let config = Config::load(cli.config.as_deref());
    let logging = match &config {
        Ok(config) => config.logging.clone(),
        Err(_) => {
            let mut logging = LoggingConfig::default();
            logging.apply_env_overrides();
            logging
        }
    };

    if let Err(e) = init_logging(&cli, &logging) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::from(exit_code::GENERAL_ERROR as u8);
    }

    // Execute the command
    match run(cli, config) {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            tracing::error!("{}", render_chain(&e));
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

/// Initialize the tracing subscriber.
///
/// Logs go to stderr; stdout is reserved for run reports. `-v`/`-q`
/// flags win over the manifest's `logging.level`; the manifest values
/// already carry the STAGEHAND_LOG_LEVEL / STAGEHAND_LOG_FORMAT
/// overrides.
fn init_logging(cli: &Cli, logging: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let level: Level = resolve_log_level(cli, logging).into();

    let builder = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr);

    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }

    Ok(())
}

/// Effective log level: CLI flags first, manifest value otherwise.
fn resolve_log_level(cli: &Cli, logging: &LoggingConfig) -> LogLevel {
    cli.log_level().unwrap_or(logging.level)
}

/// Main application logic. Returns the process exit code.
fn run(cli: Cli, config: stagehand::Result<Config>) -> stagehand::Result<i32> {
    match &cli.command {
        Commands::Up(args) => cmd_up(args, config?),
        Commands::Down(args) => cmd_down(args, config?),
        Commands::Rebuild(args) => cmd_rebuild(args, config?),
        Commands::Status(args) => cmd_status(args, config?),
        Commands::Config(subcmd) => cmd_config(subcmd, config).map(|()| exit_code::SUCCESS),
    }
}

/// Handle the `up` command.
fn cmd_up(args: &UpArgs, config: Config) -> stagehand::Result<i32> {
    tracing::info!(
        runtime = ?config.runtime.kind,
        services = config.services.len(),
        build = args.build,
        "Bringing stack up"
    );

    build_async_runtime()?.block_on(async {
        let orchestrator = Orchestrator::from_config(config, interrupt_watch())?;
        let report = orchestrator
            .up(UpOptions {
                build: args.build,
                only: args.only.clone(),
            })
            .await?;

        print_report(&report, args.json)?;
        Ok(report.exit_code())
    })
}

/// Handle the `down` command.
fn cmd_down(args: &DownArgs, config: Config) -> stagehand::Result<i32> {
    tracing::info!(
        runtime = ?config.runtime.kind,
        services = config.services.len(),
        "Taking stack down"
    );

    build_async_runtime()?.block_on(async {
        let orchestrator = Orchestrator::from_config(config, interrupt_watch())?;
        let report = orchestrator
            .down(DownOptions {
                only: args.only.clone(),
            })
            .await?;

        print_report(&report, args.json)?;
        Ok(report.exit_code())
    })
}

/// Handle the `rebuild` command: down, then up with the build phase.
fn cmd_rebuild(args: &RebuildArgs, config: Config) -> stagehand::Result<i32> {
    tracing::info!(services = config.services.len(), "Rebuilding stack");

    build_async_runtime()?.block_on(async {
        let orchestrator = Orchestrator::from_config(config, interrupt_watch())?;

        let down = orchestrator
            .down(DownOptions {
                only: args.only.clone(),
            })
            .await?;
        print_report(&down, args.json)?;
        if down.exit_code() != exit_code::SUCCESS {
            return Ok(down.exit_code());
        }

        let up = orchestrator
            .up(UpOptions {
                build: true,
                only: args.only.clone(),
            })
            .await?;
        print_report(&up, args.json)?;
        Ok(up.exit_code())
    })
}

/// Handle the `status` command.
fn cmd_status(args: &StatusArgs, config: Config) -> stagehand::Result<i32> {
    build_async_runtime()?.block_on(async {
        let orchestrator = Orchestrator::from_config(config, interrupt_watch())?;
        let states = orchestrator.status().await?;

        if args.json {
            let value: serde_json::Map<String, serde_json::Value> = states
                .iter()
                .map(|(name, state)| (name.clone(), serde_json::json!(state)))
                .collect();
            println!("{}", serde_json::to_string_pretty(&value)?);
        } else {
            for (name, state) in &states {
                println!("{:<20} {}", name, state);
            }
        }

        Ok(exit_code::SUCCESS)
    })
}

/// Handle the `config` subcommand.
fn cmd_config(subcmd: &ConfigCommands, config: stagehand::Result<Config>) -> stagehand::Result<()> {
    match subcmd {
        ConfigCommands::Validate => match config {
            Ok(config) => {
                println!("✓ Manifest is valid ({} services)", config.services.len());
                tracing::debug!(?config, "Validated configuration");
                Ok(())
            }
            Err(e) => {
                println!("✗ Manifest is invalid: {}", e);
                Err(e)
            }
        },
        ConfigCommands::Show => {
            let config = config?;
            let yaml = serde_yaml::to_string(&config).map_err(|e| {
                stagehand::StagehandError::config_with_source("Failed to serialize configuration", e)
            })?;
            println!("{}", yaml);
            Ok(())
        }
    }
}

/// Create the tokio runtime for a command.
fn build_async_runtime() -> stagehand::Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| {
        stagehand::StagehandError::runtime_with_source("Failed to create async runtime", e)
    })
}

/// Watches for ctrl-c and flips the cancellation flag.
///
/// Must be called from within a tokio runtime context.
fn interrupt_watch() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(true);
        }
    });
    rx
}

/// Prints a run report to stdout.
fn print_report(report: &RunReport, json: bool) -> stagehand::Result<()> {
    if json {
        println!("{}", report.render_json()?);
    } else {
        print!("{}", report.render_text());
    }
    Ok(())
}
