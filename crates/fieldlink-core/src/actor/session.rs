//! `SessionActor`: Hub connection life-cycle
//!
//! Owns the device assignment and the hub session. Every state transition
//! happens here; callers drive it through messages.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use kameo::actor::{ActorRef, WeakActorRef};
use kameo::error::ActorStopReason;
use kameo::message::{Context, Message};
use kameo::prelude::*;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use fieldlink_api::events::{DISCONNECT_NOTICE, Heartbeat, MethodRequest};

use crate::config::IdentityRecord;
use crate::error::CoreError;
use crate::message::{
    Connect, Disconnect, GetState, GetStatus, Invalidate, Provision, RespondToMethod,
    SendHeartbeat, SessionStatus,
};
use crate::provisioning::Provisioner;
use crate::state::{ConnectionState, DeviceAssignment, DisconnectContext};
use crate::transport::{HubConnector, HubSession};

/// Arguments for spawning a `SessionActor`
pub struct SessionActorArgs {
    /// Validated identity from the device record
    pub identity: IdentityRecord,
    /// Provisioning handshake
    pub provisioner: Provisioner,
    /// Hub session factory
    pub connector: Arc<dyn HubConnector>,
}

/// Connection manager actor
pub struct SessionActor {
    identity: IdentityRecord,
    state: ConnectionState,
    assignment: Option<DeviceAssignment>,
    session: Option<Box<dyn HubSession>>,
    disconnect_context: Option<DisconnectContext>,
    last_heartbeat: Option<DateTime<Utc>>,
    provisioner: Provisioner,
    connector: Arc<dyn HubConnector>,
}

impl SessionActor {
    /// Get current state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Transition to a new state with validation
    fn transition_to(&mut self, new_state: ConnectionState) -> Result<(), CoreError> {
        if !self.state.can_transition_to(new_state) {
            return Err(CoreError::InvalidTransition {
                from: self.state,
                to: new_state,
            });
        }

        let old_state = self.state;
        self.state = new_state;

        info!(
            registration_id = %self.identity.registration_id,
            from = %old_state,
            to = %new_state,
            "state transition"
        );

        Ok(())
    }

    /// Forget the current session without closing it
    fn invalidate(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        self.session = None;

        if self.state == ConnectionState::Connected {
            // Connected -> Disconnected is always valid.
            let _ = self.transition_to(ConnectionState::Disconnected);
        }

        warn!(reason = %reason, "session invalidated");

        let failed_attempts = self
            .disconnect_context
            .as_ref()
            .map_or(0, |c| c.failed_attempts);
        let mut context = DisconnectContext::new(reason);
        context.failed_attempts = failed_attempts;
        self.disconnect_context = Some(context);
    }

    fn record_failed_attempt(&mut self, reason: String) {
        let context = self
            .disconnect_context
            .get_or_insert_with(|| DisconnectContext::new(reason.clone()));
        context.reason = reason;
        context.disconnected_at = Utc::now();
        context.failed_attempts += 1;
    }

    /// Final status message then close; errors are logged and dropped
    async fn close_session(&mut self) -> bool {
        if self.state == ConnectionState::ShuttingDown {
            return false;
        }

        if let Some(session) = self.session.take() {
            if let Err(e) = session
                .send_message(Value::String(DISCONNECT_NOTICE.to_string()))
                .await
            {
                debug!(error = %e, "final status message not delivered");
            }
            if let Err(e) = session.disconnect().await {
                debug!(error = %e, "error during disconnect");
            }
            info!("disconnected from hub");
        }

        // Every state except ShuttingDown may move to ShuttingDown.
        let _ = self.transition_to(ConnectionState::ShuttingDown);
        true
    }
}

impl Actor for SessionActor {
    type Args = SessionActorArgs;
    type Error = CoreError;

    async fn on_start(args: Self::Args, actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        info!(
            registration_id = %args.identity.registration_id,
            id = %actor_ref.id(),
            "SessionActor starting"
        );

        Ok(Self {
            identity: args.identity,
            state: ConnectionState::Unprovisioned,
            assignment: None,
            session: None,
            disconnect_context: None,
            last_heartbeat: None,
            provisioner: args.provisioner,
            connector: args.connector,
        })
    }

    async fn on_stop(
        &mut self,
        _actor_ref: WeakActorRef<Self>,
        reason: ActorStopReason,
    ) -> Result<(), Self::Error> {
        info!(
            registration_id = %self.identity.registration_id,
            reason = ?reason,
            "SessionActor stopping"
        );

        self.close_session().await;
        Ok(())
    }
}

// ============================================================================
// Message Handlers
// ============================================================================

impl Message<Provision> for SessionActor {
    type Reply = Result<DeviceAssignment, CoreError>;

    async fn handle(
        &mut self,
        _msg: Provision,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.transition_to(ConnectionState::Provisioning)?;

        let result = self.provisioner.register(&self.identity).await;
        match result {
            Ok(assignment) => {
                self.assignment = Some(assignment.clone());
                self.transition_to(ConnectionState::Provisioned)?;
                Ok(assignment)
            }
            Err(e) => {
                self.transition_to(ConnectionState::Unprovisioned)?;
                Err(e)
            }
        }
    }
}

impl Message<Connect> for SessionActor {
    type Reply = Result<mpsc::Receiver<MethodRequest>, CoreError>;

    async fn handle(
        &mut self,
        _msg: Connect,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if !self.state.can_connect() {
            return Err(CoreError::InvalidTransition {
                from: self.state,
                to: ConnectionState::Connecting,
            });
        }

        let Some(assignment) = self.assignment.clone() else {
            return Err(CoreError::NotConnected);
        };

        self.transition_to(ConnectionState::Connecting)?;

        if let Some(stale) = self.session.take()
            && let Err(e) = stale.disconnect().await
        {
            debug!(error = %e, "error closing stale session");
        }

        let result = self
            .connector
            .connect(&assignment, &self.identity.symmetric_key)
            .await;

        match result {
            Ok(connection) => {
                self.session = Some(connection.session);
                self.disconnect_context = None;
                self.transition_to(ConnectionState::Connected)?;
                info!(hub = %assignment.assigned_hub, "connected to hub");
                Ok(connection.inbound)
            }
            Err(e) => {
                error!(hub = %assignment.assigned_hub, error = %e, "connection to hub failed");
                self.record_failed_attempt(e.to_string());
                self.transition_to(ConnectionState::Disconnected)?;
                Err(CoreError::ConnectionFailure(e.to_string()))
            }
        }
    }
}

impl Message<SendHeartbeat> for SessionActor {
    type Reply = Result<Heartbeat, CoreError>;

    async fn handle(
        &mut self,
        _msg: SendHeartbeat,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let (Some(session), Some(assignment)) = (self.session.as_ref(), self.assignment.as_ref())
        else {
            return Err(CoreError::NotConnected);
        };

        let heartbeat = Heartbeat::alive(assignment.device_id.clone());
        let body =
            serde_json::to_value(&heartbeat).map_err(|e| CoreError::SendFailed(e.to_string()))?;

        let result = session.send_message(body).await;
        match result {
            Ok(()) => {
                self.last_heartbeat = Some(Utc::now());
                debug!(timestamp = heartbeat.timestamp, "sent heartbeat");
                Ok(heartbeat)
            }
            Err(e) => {
                self.invalidate(format!("heartbeat failed: {e}"));
                Err(CoreError::SendFailed(e.to_string()))
            }
        }
    }
}

impl Message<RespondToMethod> for SessionActor {
    type Reply = Result<(), CoreError>;

    async fn handle(
        &mut self,
        msg: RespondToMethod,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let Some(session) = self.session.as_ref() else {
            return Err(CoreError::NotConnected);
        };

        let result = session
            .send_method_response(&msg.request_id, msg.outcome.status, &msg.outcome.response)
            .await;

        if let Err(e) = result {
            self.invalidate(format!("method response failed: {e}"));
            return Err(CoreError::SendFailed(e.to_string()));
        }

        Ok(())
    }
}

impl Message<Invalidate> for SessionActor {
    type Reply = ();

    async fn handle(
        &mut self,
        msg: Invalidate,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if self.session.is_some() {
            self.invalidate(msg.reason);
        }
    }
}

impl Message<Disconnect> for SessionActor {
    type Reply = bool;

    async fn handle(
        &mut self,
        _msg: Disconnect,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.close_session().await
    }
}

impl Message<GetState> for SessionActor {
    type Reply = ConnectionState;

    async fn handle(
        &mut self,
        _msg: GetState,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.state
    }
}

impl Message<GetStatus> for SessionActor {
    type Reply = SessionStatus;

    async fn handle(
        &mut self,
        _msg: GetStatus,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        SessionStatus {
            state: self.state,
            device_id: self.assignment.as_ref().map(|a| a.device_id.clone()),
            assigned_hub: self.assignment.as_ref().map(|a| a.assigned_hub.clone()),
            last_heartbeat: self.last_heartbeat,
            last_disconnect: self.disconnect_context.as_ref().map(|c| c.reason.clone()),
            failed_attempts: self
                .disconnect_context
                .as_ref()
                .map_or(0, |c| c.failed_attempts),
        }
    }
}
