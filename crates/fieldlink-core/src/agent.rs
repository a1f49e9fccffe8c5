//! Agent run loop
//!
//! Provision once, then alternate heartbeat and cooperative wait until
//! shutdown. Inbound commands are handled one at a time during the wait.
//! Reconnects happen on the next heartbeat tick, with no backoff.

use kameo::actor::ActorRef;
use kameo::error::SendError;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use fieldlink_api::events::MethodRequest;

use crate::actor::SessionActor;
use crate::dispatcher::CommandDispatcher;
use crate::error::CoreError;
use crate::heartbeat::{HeartbeatConfig, Wake, next_wake};
use crate::message::{Connect, Disconnect, Invalidate, Provision, RespondToMethod, SendHeartbeat};

type Inbound = Option<mpsc::Receiver<MethodRequest>>;

fn session_error<M, E: Into<CoreError>>(err: SendError<M, E>) -> CoreError {
    match err {
        SendError::HandlerError(e) => e.into(),
        _ => CoreError::ActorError("session actor unavailable".to_string()),
    }
}

/// Drives a `SessionActor` through its life-cycle
pub struct Agent {
    session: ActorRef<SessionActor>,
    dispatcher: CommandDispatcher,
    heartbeat: HeartbeatConfig,
}

impl Agent {
    pub fn new(
        session: ActorRef<SessionActor>,
        dispatcher: CommandDispatcher,
        heartbeat: HeartbeatConfig,
    ) -> Self {
        Self {
            session,
            dispatcher,
            heartbeat,
        }
    }

    /// Run until `cancel` fires
    ///
    /// # Errors
    /// Provisioning failures and a session that can no longer connect are
    /// fatal and returned after the session has been shut down. Connection
    /// and send failures are retried on the next tick and never returned.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), CoreError> {
        let result = self.session.ask(Provision).await.map_err(session_error);
        if let Err(e) = result {
            error!(error = %e, "provisioning failed, agent stopping");
            self.shutdown().await;
            return Err(e);
        }

        let mut inbound: Inbound = None;

        while !cancel.is_cancelled() {
            if inbound.is_none() {
                inbound = match self.connect().await {
                    Ok(inbound) => inbound,
                    Err(e) => {
                        error!(error = %e, "session unusable, agent stopping");
                        self.shutdown().await;
                        return Err(e);
                    }
                };
            }

            if inbound.is_some() && !self.send_heartbeat().await {
                inbound = None;
            }

            if !self.wait(&cancel, &mut inbound).await {
                break;
            }
        }

        info!("shutdown requested");
        self.shutdown().await;
        Ok(())
    }

    /// `Ok(None)` when the attempt failed but may be retried
    async fn connect(&self) -> Result<Inbound, CoreError> {
        match self.session.ask(Connect).await.map_err(session_error) {
            Ok(rx) => Ok(Some(rx)),
            Err(e) if e.is_retryable() => {
                warn!(
                    error = %e,
                    retry_in = ?self.heartbeat.interval,
                    "connect failed, will retry"
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Returns `false` if the session was lost
    async fn send_heartbeat(&self) -> bool {
        match self.session.ask(SendHeartbeat).await.map_err(session_error) {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "heartbeat failed");
                false
            }
        }
    }

    /// Wait one heartbeat interval in ticks; `false` once cancelled
    ///
    /// The interval is measured from a fixed deadline, so time spent on
    /// inbound requests counts towards it.
    async fn wait(&self, cancel: &CancellationToken, inbound: &mut Inbound) -> bool {
        let start = Instant::now();
        let deadline = start + self.heartbeat.interval;
        let mut wake_at = (start + self.heartbeat.tick).min(deadline);

        loop {
            match next_wake(wake_at, cancel, inbound).await {
                Wake::Tick => {
                    if wake_at >= deadline {
                        return true;
                    }
                    wake_at = (wake_at + self.heartbeat.tick).min(deadline);
                }
                Wake::Cancelled => return false,
                Wake::Inbound(request) => {
                    if !self.handle_request(request).await {
                        *inbound = None;
                    }
                }
                Wake::InboundClosed => {
                    *inbound = None;
                    let invalidate = Invalidate {
                        reason: "inbound stream closed".to_string(),
                    };
                    if let Err(e) = self.session.ask(invalidate).await.map_err(session_error) {
                        debug!(error = %e, "invalidate not delivered");
                    }
                }
            }
        }
    }

    /// Returns `false` if the response could not be delivered
    async fn handle_request(&self, request: MethodRequest) -> bool {
        info!(
            request_id = %request.request_id,
            method = %request.method_name,
            "method request received"
        );

        let outcome = self.dispatcher.dispatch(&request.payload).await;
        let respond = RespondToMethod {
            request_id: request.request_id,
            outcome,
        };

        match self.session.ask(respond).await.map_err(session_error) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "method response not delivered");
                false
            }
        }
    }

    async fn shutdown(&self) {
        match self.session.ask(Disconnect).await.map_err(session_error) {
            Ok(true) => debug!("session shut down"),
            Ok(false) => debug!("session already shut down"),
            Err(e) => warn!(error = %e, "shutdown not delivered"),
        }
    }
}
