//! Error types for fieldlink-update

use thiserror::Error;

use fieldlink_core::ConfigError;

/// Errors reported by artifact store implementations
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// Request could not be sent or the body could not be read
    #[error("request failed: {0}")]
    Request(String),

    /// Store answered with a non-success status
    #[error("unexpected status {status} for {path}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Object or prefix requested
        path: String,
    },

    /// Listing could not be understood
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Local file error while receiving bytes
    #[error("I/O error: {0}")]
    Io(String),
}

/// Updater failures, each mapped to a process exit code
#[derive(Error, Debug, Clone)]
pub enum UpdateError {
    /// Device record missing, malformed or incomplete
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Store client could not be constructed
    #[error("failed to create store client: {0}")]
    Client(String),

    /// Build listing failed
    #[error("failed to list builds: {0}")]
    Listing(StoreError),

    /// Artifact transfer failed; the device record is untouched
    #[error("failed to download '{path}': {source}")]
    Download {
        /// Remote object path
        path: String,
        /// Underlying store error
        source: StoreError,
    },
}

impl UpdateError {
    /// Process exit code for this failure
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            UpdateError::Config(_) => 2,
            UpdateError::Client(_) => 3,
            UpdateError::Listing(_) => 4,
            UpdateError::Download { .. } => 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            UpdateError::Config(ConfigError::Parse("x".to_string())).exit_code(),
            2
        );
        assert_eq!(UpdateError::Client("x".to_string()).exit_code(), 3);
        assert_eq!(
            UpdateError::Listing(StoreError::Request("x".to_string())).exit_code(),
            4
        );
        assert_eq!(
            UpdateError::Download {
                path: "a".to_string(),
                source: StoreError::Io("x".to_string()),
            }
            .exit_code(),
            5
        );
    }
}
