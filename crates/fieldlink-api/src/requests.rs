//! Request types

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Remote command invocation payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl CommandRequest {
    /// Extract a command request from an arbitrary method payload
    ///
    /// Payloads that are not objects, or whose `command` is not a string,
    /// yield a request without a command.
    #[must_use]
    pub fn from_payload(payload: &Value) -> Self {
        let command = payload
            .get("command")
            .and_then(Value::as_str)
            .map(str::to_string);
        Self { command }
    }

    /// The command text, if present and non-blank
    ///
    /// Whitespace-only and non-string commands count as missing, so they are
    /// answered as bad requests instead of being run.
    #[must_use]
    pub fn command(&self) -> Option<&str> {
        self.command.as_deref().filter(|c| !c.trim().is_empty())
    }
}

/// Body of a provisioning service registration call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    pub registration_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}
