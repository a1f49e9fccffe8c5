//! Error types for fieldlink-exec

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while executing a command
#[derive(Error, Debug, Clone)]
pub enum ExecError {
    /// Nothing to execute
    #[error("empty command")]
    EmptyCommand,

    /// Command timed out
    #[error("command timed out after {timeout:?}")]
    Timeout {
        /// Timeout duration that was exceeded
        timeout: Duration,
    },

    /// Process spawn error
    #[error("failed to spawn process: {0}")]
    SpawnError(String),

    /// I/O error during execution
    #[error("I/O error: {0}")]
    IoError(String),
}
