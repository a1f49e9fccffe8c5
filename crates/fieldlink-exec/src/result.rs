//! Result types for command execution

use std::process::Output;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exit status reported when a process was ended by a signal
pub const SIGNALED_STATUS: i32 = -1;

/// Captured outcome of one finished process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    /// Exit status code, [`SIGNALED_STATUS`] when killed by a signal
    pub status: i32,
    /// stdout, lossily decoded as UTF-8
    pub stdout: String,
    /// stderr, lossily decoded as UTF-8
    pub stderr: String,
    /// Wall-clock time from spawn to exit
    pub duration: Duration,
}

impl CommandResult {
    /// Build from a finished process' captured output
    #[must_use]
    pub fn from_output(output: &Output, duration: Duration) -> Self {
        Self {
            status: output.status.code().unwrap_or(SIGNALED_STATUS),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration,
        }
    }

    #[must_use]
    pub fn success(&self) -> bool {
        self.status == 0
    }

    #[must_use]
    pub fn signaled(&self) -> bool {
        self.status == SIGNALED_STATUS
    }
}
