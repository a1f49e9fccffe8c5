//! WebSocket hub session
//!
//! Frames are JSON text messages tagged by `type`. A writer task owns the
//! sink and acknowledges every frame so send failures surface to the
//! caller. A reader task forwards `method_request` frames to the agent and
//! drops its sender when the stream ends.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tracing::{debug, info, instrument, warn};
use url::Url;

use fieldlink_api::events::{HubFrame, MethodRequest};
use fieldlink_api::responses::CommandResponse;
use fieldlink_core::credential::sas_token_from_now;
use fieldlink_core::{DeviceAssignment, HubConnection, HubConnector, HubSession, TransportError};

use crate::error::{ClientError, Result, endpoint_url};

const OUTBOUND_CAPACITY: usize = 32;
const INBOUND_CAPACITY: usize = 8;

type Ack = oneshot::Sender<std::result::Result<(), String>>;

/// Opens WebSocket sessions to the assigned hub
#[derive(Debug, Clone, Default)]
pub struct WsHubConnector;

impl WsHubConnector {
    pub fn new() -> Self {
        Self
    }

    /// Session URL and the resource string the token is signed for
    fn session_target(assignment: &DeviceAssignment) -> Result<(Url, String)> {
        let mut url = endpoint_url(&assignment.assigned_hub, "wss")?;
        url.path_segments_mut()
            .map_err(|()| ClientError::InvalidResponse("hub address cannot be a base".into()))?
            .pop_if_empty()
            .extend(["devices", assignment.device_id.as_str(), "session"]);

        let host = url
            .host_str()
            .ok_or_else(|| ClientError::InvalidResponse("hub address has no host".into()))?;
        let resource = format!("{host}/devices/{}", assignment.device_id);
        Ok((url, resource))
    }

    /// Open a session for `assignment`
    ///
    /// # Errors
    /// Returns an error if the token cannot be signed or the handshake fails.
    #[instrument(skip(self, assignment, symmetric_key), fields(hub = %assignment.assigned_hub))]
    pub async fn open(
        &self,
        assignment: &DeviceAssignment,
        symmetric_key: &str,
    ) -> Result<(WsHubSession, mpsc::Receiver<MethodRequest>)> {
        let (url, resource) = Self::session_target(assignment)?;
        let token = sas_token_from_now(&resource, symmetric_key, None)?;

        let mut request = url.as_str().into_client_request()?;
        let auth = HeaderValue::from_str(&token)
            .map_err(|e| ClientError::WebSocket(format!("invalid authorization header: {e}")))?;
        request.headers_mut().insert(AUTHORIZATION, auth);

        let (stream, _) = connect_async(request).await?;
        info!(url = %url, "hub session opened");

        let (mut write, mut read) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<(Message, Ack)>(OUTBOUND_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);

        let writer = tokio::spawn(async move {
            while let Some((message, ack)) = outbound_rx.recv().await {
                let closing = matches!(message, Message::Close(_));
                let result = write.send(message).await.map_err(|e| e.to_string());
                let failed = result.is_err();
                let _ = ack.send(result);
                if closing || failed {
                    break;
                }
            }
            let _ = write.close().await;
        });

        let reader = tokio::spawn(async move {
            while let Some(message) = read.next().await {
                let text = match message {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) => {
                        debug!("hub closed the session");
                        break;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        warn!(error = %e, "hub session read failed");
                        break;
                    }
                };

                match serde_json::from_str::<HubFrame>(&text) {
                    Ok(HubFrame::MethodRequest(request)) => {
                        if inbound_tx.send(request).await.is_err() {
                            break;
                        }
                    }
                    Ok(other) => debug!(frame = ?other, "ignoring frame"),
                    Err(e) => warn!(error = %e, "failed to parse hub frame"),
                }
            }
        });

        let session = WsHubSession {
            outbound: outbound_tx,
            reader,
            _writer: writer,
        };
        Ok((session, inbound_rx))
    }
}

#[async_trait]
impl HubConnector for WsHubConnector {
    async fn connect(
        &self,
        assignment: &DeviceAssignment,
        symmetric_key: &str,
    ) -> std::result::Result<HubConnection, TransportError> {
        let (session, inbound) = self.open(assignment, symmetric_key).await?;
        Ok(HubConnection {
            session: Box::new(session),
            inbound,
        })
    }
}

/// Outbound half of an open hub session
#[derive(Debug)]
pub struct WsHubSession {
    outbound: mpsc::Sender<(Message, Ack)>,
    reader: JoinHandle<()>,
    _writer: JoinHandle<()>,
}

impl WsHubSession {
    async fn send_raw(&self, message: Message) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.outbound
            .send((message, ack_tx))
            .await
            .map_err(|_| ClientError::ConnectionClosed("writer stopped".into()))?;

        match ack_rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ClientError::WebSocket(e)),
            Err(_) => Err(ClientError::ConnectionClosed("writer stopped".into())),
        }
    }

    async fn send_frame(&self, frame: &HubFrame) -> Result<()> {
        let text = serde_json::to_string(frame)?;
        self.send_raw(Message::text(text)).await
    }
}

impl Drop for WsHubSession {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[async_trait]
impl HubSession for WsHubSession {
    async fn send_message(&self, body: Value) -> std::result::Result<(), TransportError> {
        Ok(self.send_frame(&HubFrame::Telemetry { body }).await?)
    }

    async fn send_method_response(
        &self,
        request_id: &str,
        status: u16,
        payload: &CommandResponse,
    ) -> std::result::Result<(), TransportError> {
        let frame = HubFrame::MethodResponse {
            request_id: request_id.to_string(),
            status,
            payload: payload.clone(),
        };
        Ok(self.send_frame(&frame).await?)
    }

    async fn disconnect(&self) -> std::result::Result<(), TransportError> {
        let result = self.send_raw(Message::Close(None)).await;
        self.reader.abort();
        Ok(result?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assignment(hub: &str) -> DeviceAssignment {
        DeviceAssignment {
            assigned_hub: hub.to_string(),
            device_id: "nexus-1234".to_string(),
        }
    }

    #[test]
    fn test_session_target_defaults_to_wss() {
        let (url, resource) =
            WsHubConnector::session_target(&assignment("myhub.azure-devices.net")).unwrap();
        assert_eq!(
            url.as_str(),
            "wss://myhub.azure-devices.net/devices/nexus-1234/session"
        );
        assert_eq!(resource, "myhub.azure-devices.net/devices/nexus-1234");
    }

    #[test]
    fn test_session_target_keeps_explicit_scheme() {
        let (url, resource) =
            WsHubConnector::session_target(&assignment("ws://127.0.0.1:9000")).unwrap();
        assert_eq!(url.as_str(), "ws://127.0.0.1:9000/devices/nexus-1234/session");
        assert_eq!(resource, "127.0.0.1/devices/nexus-1234");
    }
}
