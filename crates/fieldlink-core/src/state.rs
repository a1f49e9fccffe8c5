//! Connection state machine types

use std::fmt;

use chrono::{DateTime, Utc};
use kameo_macros::Reply;
use serde::{Deserialize, Serialize};

/// States of the hub connection life-cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Reply)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Unprovisioned,
    Provisioning,
    Provisioned,
    Connecting,
    Connected,
    Disconnected,
    ShuttingDown,
}

impl ConnectionState {
    /// Whether the state machine allows moving from `self` to `next`
    #[must_use]
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::{
            Connected, Connecting, Disconnected, Provisioned, Provisioning, ShuttingDown,
            Unprovisioned,
        };

        match (self, next) {
            (ShuttingDown, _) => false,
            (_, ShuttingDown) => true,
            (Unprovisioned, Provisioning)
            | (Provisioning, Provisioned | Unprovisioned)
            | (Provisioned | Disconnected, Connecting)
            | (Connecting, Connected | Disconnected)
            | (Connected, Disconnected) => true,
            _ => false,
        }
    }

    /// Whether `connect()` may be attempted from this state
    #[must_use]
    pub fn can_connect(self) -> bool {
        self.can_transition_to(ConnectionState::Connecting)
    }

    /// Whether a device assignment exists in this state
    #[must_use]
    pub fn is_provisioned(self) -> bool {
        matches!(
            self,
            ConnectionState::Provisioned
                | ConnectionState::Connecting
                | ConnectionState::Connected
                | ConnectionState::Disconnected
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Unprovisioned => "unprovisioned",
            ConnectionState::Provisioning => "provisioning",
            ConnectionState::Provisioned => "provisioned",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::ShuttingDown => "shutting_down",
        };
        f.write_str(name)
    }
}

/// Hub assignment returned by the provisioning service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Reply)]
pub struct DeviceAssignment {
    /// Host name of the assigned hub
    pub assigned_hub: String,
    /// Device id registered at the hub
    pub device_id: String,
}

/// Bookkeeping for the most recent session loss
#[derive(Debug, Clone)]
pub struct DisconnectContext {
    pub reason: String,
    pub disconnected_at: DateTime<Utc>,
    /// Consecutive failed connection attempts since the last success
    pub failed_attempts: u32,
}

impl DisconnectContext {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            disconnected_at: Utc::now(),
            failed_attempts: 0,
        }
    }
}
