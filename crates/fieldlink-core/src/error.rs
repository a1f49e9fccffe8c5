//! Core error types for fieldlink-core

use std::path::PathBuf;

use thiserror::Error;

use crate::state::ConnectionState;

/// Errors raised while reading or writing the persisted device record
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    /// Record file does not exist
    #[error("device record not found at {}", .0.display())]
    NotFound(PathBuf),

    /// Record could not be read or written
    #[error("device record I/O error: {0}")]
    Io(String),

    /// Record is not valid JSON or has the wrong shape
    #[error("failed to parse device record: {0}")]
    Parse(String),

    /// Required fields are absent or empty
    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    /// Advisory lock could not be taken
    #[error("failed to lock device record: {0}")]
    Lock(String),
}

/// Credential derivation errors
#[derive(Error, Debug, Clone)]
pub enum CredentialError {
    /// Key material is not valid base64
    #[error("invalid base64 key: {0}")]
    InvalidKey(String),
}

/// Errors that can occur in the connection life-cycle
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    /// Device record problem; fatal at startup
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Key material problem
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// Provisioning service did not assign the device
    #[error("provisioning failed with status: {status}")]
    ProvisioningFailure {
        /// Final status reported by the service
        status: String,
    },

    /// Hub session could not be established
    #[error("connection failed: {0}")]
    ConnectionFailure(String),

    /// Message could not be delivered over the session
    #[error("send failed: {0}")]
    SendFailed(String),

    /// No session is established
    #[error("not connected")]
    NotConnected,

    /// Invalid state transition attempted
    #[error("invalid state transition from {from} to {to}")]
    InvalidTransition {
        /// Current state
        from: ConnectionState,
        /// Attempted target state
        to: ConnectionState,
    },

    /// Provisioning transport failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Actor communication error
    #[error("actor communication error: {0}")]
    ActorError(String),
}

impl CoreError {
    /// Whether the next loop tick may succeed where this attempt failed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::ConnectionFailure(_) | CoreError::SendFailed(_) | CoreError::NotConnected
        )
    }
}

/// Reply error of messages whose handler cannot fail
impl From<kameo::error::Infallible> for CoreError {
    fn from(never: kameo::error::Infallible) -> Self {
        match never {}
    }
}
