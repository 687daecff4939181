//! Shared command execution for runtime providers.
//!
//! Lifecycle actions, build commands and command health checks all
//! shell out; this module holds the common plumbing: shell-style
//! parsing, environment handling, output capture and timeouts.

use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{Result, StagehandError};

/// Captured result of an executed command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Whether the command exited with status 0.
    pub success: bool,
    /// Exit code, if the command ran to completion.
    pub exit_code: Option<i32>,
    /// Combined stdout and stderr.
    pub output: String,
}

impl CommandOutput {
    /// Summarizes a failed command for error messages.
    pub fn failure_summary(&self) -> String {
        let detail = self.output.trim();
        match (self.exit_code, detail.is_empty()) {
            (Some(code), true) => format!("exited with status {}", code),
            (Some(code), false) => format!("exited with status {}: {}", code, detail),
            (None, true) => "terminated by signal".to_string(),
            (None, false) => format!("terminated by signal: {}", detail),
        }
    }
}

/// Executes commands with a default timeout.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    /// Applied when no per-command timeout is given.
    default_timeout: Duration,
}

impl CommandRunner {
    /// Creates a runner with the given default timeout in seconds.
    pub fn new(default_timeout_seconds: u64) -> Self {
        Self {
            default_timeout: Duration::from_secs(default_timeout_seconds),
        }
    }

    /// Runs a shell-style command string.
    ///
    /// The command is split with shell-style word rules (no shell is
    /// involved), run from `working_dir` when given, with `env` entries
    /// (KEY=VALUE) added to the environment.
    pub async fn run_shell(
        &self,
        command: &str,
        working_dir: Option<&str>,
        env: &[String],
        timeout_seconds: Option<u64>,
    ) -> Result<CommandOutput> {
        let parts = shell_words::split(command).map_err(|e| {
            StagehandError::runtime(format!("Failed to parse command '{}': {}", command, e))
        })?;
        if parts.is_empty() {
            return Err(StagehandError::runtime("Empty command"));
        }

        let mut cmd = Command::new(&parts[0]);
        cmd.args(&parts[1..]);

        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }

        for entry in env {
            if let Some((key, value)) = entry.split_once('=') {
                cmd.env(key, value);
            }
        }

        self.execute(cmd, command, timeout_seconds).await
    }

    /// Runs a program with explicit arguments, bypassing word splitting.
    pub async fn run_program(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        let mut cmd = Command::new(program);
        cmd.args(args);

        let display_cmd = format!("{} {}", program, args.join(" "));
        self.execute(cmd, &display_cmd, None).await
    }

    async fn execute(
        &self,
        mut cmd: Command,
        display_cmd: &str,
        timeout_seconds: Option<u64>,
    ) -> Result<CommandOutput> {
        debug!(command = %display_cmd, "Executing command");

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let timeout_duration = timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout);

        let output = timeout(timeout_duration, cmd.output())
            .await
            .map_err(|_| {
                StagehandError::runtime(format!(
                    "Command timed out after {}s: {}",
                    timeout_duration.as_secs(),
                    display_cmd
                ))
            })?
            .map_err(|e| {
                StagehandError::runtime_with_source(
                    format!("Failed to execute command '{}'", display_cmd),
                    e,
                )
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let combined_output = if stderr.is_empty() {
            stdout.to_string()
        } else {
            format!("{}\n{}", stdout, stderr)
        };

        debug!(
            command = %display_cmd,
            exit_code = output.status.code(),
            "Command completed"
        );

        Ok(CommandOutput {
            success: output.status.success(),
            exit_code: output.status.code(),
            output: combined_output,
        })
    }
}
