//! Hub session messages

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::responses::CommandResponse;

/// Telemetry body sent right before a session is closed
pub const DISCONNECT_NOTICE: &str = "Device disconnecting";

/// Periodic liveness message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    #[serde(rename = "deviceId")]
    pub device_id: String,
    /// Unix seconds
    pub timestamp: i64,
    pub status: String,
}

impl Heartbeat {
    /// Build an `alive` heartbeat stamped with the current time
    pub fn alive(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            timestamp: Utc::now().timestamp(),
            status: "alive".to_string(),
        }
    }
}

/// Inbound method invocation delivered over the hub session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodRequest {
    pub request_id: String,
    pub method_name: String,
    #[serde(default)]
    pub payload: Value,
}

/// Frames exchanged over the hub session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HubFrame {
    Telemetry {
        body: Value,
    },
    MethodRequest(MethodRequest),
    MethodResponse {
        request_id: String,
        status: u16,
        payload: CommandResponse,
    },
}
