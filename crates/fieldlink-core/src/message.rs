//! Message types for actor communication
//!
//! Message handlers are implemented in their respective actor modules.

use chrono::{DateTime, Utc};
use kameo_macros::Reply;

use crate::dispatcher::MethodOutcome;
use crate::state::ConnectionState;

// ============================================================================
// SessionActor Messages
// ============================================================================

/// Run the provisioning handshake (`Unprovisioned` -> `Provisioned`)
#[derive(Debug)]
pub struct Provision;

/// Open a hub session (`Provisioned`/`Disconnected` -> `Connected`)
///
/// Replies with the inbound method request stream of the new session.
#[derive(Debug)]
pub struct Connect;

/// Send one liveness message over the current session
#[derive(Debug)]
pub struct SendHeartbeat;

/// Deliver the result of a remote command back to the hub
#[derive(Debug)]
pub struct RespondToMethod {
    /// Request being answered
    pub request_id: String,
    /// Response document and status
    pub outcome: MethodOutcome,
}

/// Drop the current session so the next tick reconnects
#[derive(Debug)]
pub struct Invalidate {
    /// Why the session is considered lost
    pub reason: String,
}

/// Send the final status message and close the session
///
/// Replies `true` the first time, `false` once already shut down.
#[derive(Debug)]
pub struct Disconnect;

/// Get current connection state
#[derive(Debug)]
pub struct GetState;

/// Get full session status
#[derive(Debug)]
pub struct GetStatus;

/// Session status response
#[derive(Debug, Clone, Reply)]
pub struct SessionStatus {
    /// Current state
    pub state: ConnectionState,
    /// Device id assigned by the provisioning service
    pub device_id: Option<String>,
    /// Hub host assigned by the provisioning service
    pub assigned_hub: Option<String>,
    /// Last successfully delivered heartbeat
    pub last_heartbeat: Option<DateTime<Utc>>,
    /// Reason for the most recent session loss
    pub last_disconnect: Option<String>,
    /// Consecutive failed connection attempts
    pub failed_attempts: u32,
}
