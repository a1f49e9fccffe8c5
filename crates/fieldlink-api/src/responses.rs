//! Response types

use serde::{Deserialize, Serialize};

/// Transport status for a handled command
pub const STATUS_OK: u16 = 200;
/// Transport status for a request without a command
pub const STATUS_BAD_REQUEST: u16 = 400;
/// Transport status for a command that could not be executed
pub const STATUS_INTERNAL_ERROR: u16 = 500;

/// Remote command response document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CommandResponse {
    Success {
        return_code: i32,
        stdout: String,
        stderr: String,
    },
    Error {
        message: String,
    },
}

impl CommandResponse {
    /// Create an error response
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// Provisioning operation document returned by the registration endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationOperation {
    #[serde(default)]
    pub operation_id: Option<String>,
    pub status: String,
    #[serde(default)]
    pub registration_state: Option<RegistrationState>,
}

/// Device registration details
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationState {
    #[serde(default)]
    pub assigned_hub: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}
