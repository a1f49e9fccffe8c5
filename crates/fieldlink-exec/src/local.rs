//! Local command execution using `tokio::process`

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, error, instrument};

use crate::error::ExecError;
use crate::result::CommandResult;
use crate::traits::CommandExecutor;

/// How command text is turned into a process
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecMode {
    /// Hand the text to `sh -c`. Pipes, redirections and expansion apply.
    #[default]
    Shell,
    /// Split on whitespace and exec the first word directly. No quoting.
    Argv,
}

/// Local command executor
///
/// Whoever can deliver a command to this executor can run arbitrary
/// processes with the agent's privileges.
#[derive(Debug, Clone, Default)]
pub struct LocalExecutor {
    mode: ExecMode,
}

impl LocalExecutor {
    /// Create a new shell-mode executor
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an executor with an explicit mode
    #[must_use]
    pub fn with_mode(mode: ExecMode) -> Self {
        Self { mode }
    }

    #[must_use]
    pub fn mode(&self) -> ExecMode {
        self.mode
    }

    fn build_command(&self, cmd: &str) -> Result<Command, ExecError> {
        match self.mode {
            ExecMode::Shell => {
                let mut command = Command::new("sh");
                command.arg("-c").arg(cmd);
                Ok(command)
            }
            ExecMode::Argv => {
                let mut words = cmd.split_whitespace();
                let program = words.next().ok_or(ExecError::EmptyCommand)?;
                let mut command = Command::new(program);
                command.args(words);
                Ok(command)
            }
        }
    }

    #[instrument(skip(self), level = "debug")]
    async fn execute(&self, cmd: &str) -> Result<CommandResult, ExecError> {
        let start = Instant::now();

        debug!(command = %cmd, mode = ?self.mode, "executing local command");

        let child = self
            .build_command(cmd)?
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecError::SpawnError(e.to_string()))?;

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ExecError::IoError(e.to_string()))?;

        let result = CommandResult::from_output(&output, start.elapsed());

        debug!(
            command = %cmd,
            status = result.status,
            duration = ?result.duration,
            "command completed"
        );

        Ok(result)
    }
}

#[async_trait]
impl CommandExecutor for LocalExecutor {
    #[instrument(skip(self), level = "debug")]
    async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError> {
        self.execute(cmd).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn run_with_timeout(
        &self,
        cmd: &str,
        timeout_duration: Duration,
    ) -> Result<CommandResult, ExecError> {
        let start = Instant::now();

        debug!(command = %cmd, timeout = ?timeout_duration, "executing with timeout");

        // Dropping the in-flight future kills the child.
        match timeout(timeout_duration, self.execute(cmd)).await {
            Ok(result) => result,
            Err(_) => {
                error!(
                    command = %cmd,
                    timeout = ?timeout_duration,
                    elapsed = ?start.elapsed(),
                    "command timed out"
                );
                Err(ExecError::Timeout {
                    timeout: timeout_duration,
                })
            }
        }
    }

    fn executor_type(&self) -> &'static str {
        match self.mode {
            ExecMode::Shell => "shell",
            ExecMode::Argv => "argv",
        }
    }
}
