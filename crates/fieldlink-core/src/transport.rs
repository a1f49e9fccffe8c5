//! Seams to the provisioning service and the message hub
//!
//! Network implementations live in `fieldlink-client`; tests plug in mocks.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

use fieldlink_api::events::MethodRequest;
use fieldlink_api::responses::{CommandResponse, RegistrationOperation};

use crate::config::IdentityRecord;
use crate::error::CredentialError;
use crate::state::DeviceAssignment;

/// Errors reported by transport implementations
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// Request could not be sent or no answer arrived
    #[error("request failed: {0}")]
    Request(String),

    /// Remote side answered with an error status
    #[error("rejected ({status}): {message}")]
    Rejected {
        /// Status code returned by the remote side
        status: u16,
        /// Error body
        message: String,
    },

    /// Session is closed
    #[error("session closed: {0}")]
    Closed(String),

    /// Token could not be generated
    #[error(transparent)]
    Credential(#[from] CredentialError),
}

/// Client for the provisioning service
#[async_trait]
pub trait ProvisioningClient: Send + Sync {
    /// Run one registration to completion and return the final operation
    async fn register(
        &self,
        identity: &IdentityRecord,
    ) -> Result<RegistrationOperation, TransportError>;
}

/// Opens sessions to an assigned hub
#[async_trait]
pub trait HubConnector: Send + Sync {
    async fn connect(
        &self,
        assignment: &DeviceAssignment,
        symmetric_key: &str,
    ) -> Result<HubConnection, TransportError>;
}

/// An established session plus its inbound method request stream
pub struct HubConnection {
    pub session: Box<dyn HubSession>,
    pub inbound: mpsc::Receiver<MethodRequest>,
}

impl std::fmt::Debug for HubConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubConnection").finish_non_exhaustive()
    }
}

/// Outbound half of a hub session
#[async_trait]
pub trait HubSession: Send + Sync {
    async fn send_message(&self, body: Value) -> Result<(), TransportError>;
    async fn send_method_response(
        &self,
        request_id: &str,
        status: u16,
        payload: &CommandResponse,
    ) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}
