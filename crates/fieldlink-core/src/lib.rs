//! fieldlink-core: Connection life-cycle and device record
//!
//! Implements the `SessionActor` state machine (provision, connect,
//! heartbeat, reconnect, disconnect) using the kameo framework, the remote
//! command dispatcher, the agent run loop, and the persisted device record
//! shared with the updater.

pub mod actor;
pub mod agent;
pub mod config;
pub mod credential;
pub mod dispatcher;
pub mod error;
pub mod heartbeat;
pub mod message;
pub mod provisioning;
pub mod state;
pub mod transport;

pub use actor::session::{SessionActor, SessionActorArgs};
pub use agent::Agent;
pub use config::{ConfigStore, DEFAULT_RECORD_PATH, DeviceRecord, IdentityRecord, UpdateRecord};
pub use credential::{derive_device_key, sas_token, sas_token_from_now};
pub use dispatcher::{CommandDispatcher, DEFAULT_COMMAND_TIMEOUT, MethodOutcome};
pub use error::{ConfigError, CoreError, CredentialError};
pub use heartbeat::HeartbeatConfig;
pub use message::{
    Connect, Disconnect, GetState, GetStatus, Invalidate, Provision, RespondToMethod,
    SendHeartbeat, SessionStatus,
};
pub use provisioning::Provisioner;
pub use state::{ConnectionState, DeviceAssignment};
pub use transport::{HubConnection, HubConnector, HubSession, ProvisioningClient, TransportError};
