use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use kameo::actor::Spawn;
use serde_json::{Map, Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use fieldlink_api::events::{DISCONNECT_NOTICE, MethodRequest};
use fieldlink_api::responses::{CommandResponse, RegistrationOperation, RegistrationState};
use fieldlink_core::*;
use fieldlink_exec::LocalExecutor;

// Mock implementations
struct MockProvisioningClient {
    status: String,
}

#[async_trait]
impl ProvisioningClient for MockProvisioningClient {
    async fn register(
        &self,
        identity: &IdentityRecord,
    ) -> Result<RegistrationOperation, TransportError> {
        Ok(RegistrationOperation {
            operation_id: Some("op-1".to_string()),
            status: self.status.clone(),
            registration_state: Some(RegistrationState {
                assigned_hub: Some("hub.example.net".to_string()),
                device_id: Some(identity.registration_id.clone()),
                status: Some(self.status.clone()),
                error_message: None,
            }),
        })
    }
}

#[derive(Default)]
struct Recorded {
    messages: Vec<Value>,
    responses: Vec<(String, u16, CommandResponse)>,
    disconnects: usize,
}

struct MockSession {
    recorded: Arc<Mutex<Recorded>>,
    fail_sends: bool,
}

#[async_trait]
impl HubSession for MockSession {
    async fn send_message(&self, body: Value) -> Result<(), TransportError> {
        if self.fail_sends {
            return Err(TransportError::Closed("broken pipe".to_string()));
        }
        self.recorded.lock().unwrap().messages.push(body);
        Ok(())
    }

    async fn send_method_response(
        &self,
        request_id: &str,
        status: u16,
        payload: &CommandResponse,
    ) -> Result<(), TransportError> {
        self.recorded
            .lock()
            .unwrap()
            .responses
            .push((request_id.to_string(), status, payload.clone()));
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.recorded.lock().unwrap().disconnects += 1;
        Ok(())
    }
}

/// Fails the first `fail_first` connects, breaks sends on the first
/// `broken_sessions` sessions, and exposes the latest inbound sender.
#[derive(Default)]
struct MockConnector {
    recorded: Arc<Mutex<Recorded>>,
    attempts: AtomicUsize,
    fail_first: usize,
    broken_sessions: usize,
    inbound_tx: Mutex<Option<mpsc::Sender<MethodRequest>>>,
}

#[async_trait]
impl HubConnector for MockConnector {
    async fn connect(
        &self,
        assignment: &DeviceAssignment,
        _symmetric_key: &str,
    ) -> Result<HubConnection, TransportError> {
        assert_eq!(assignment.assigned_hub, "hub.example.net");

        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.fail_first {
            return Err(TransportError::Request("hub unreachable".to_string()));
        }

        let (tx, rx) = mpsc::channel(8);
        *self.inbound_tx.lock().unwrap() = Some(tx);

        Ok(HubConnection {
            session: Box::new(MockSession {
                recorded: self.recorded.clone(),
                fail_sends: attempt < self.fail_first + self.broken_sessions,
            }),
            inbound: rx,
        })
    }
}

fn identity() -> IdentityRecord {
    IdentityRecord {
        global_endpoint: "global.example.net".to_string(),
        id_scope: "0ne000ABCDE".to_string(),
        registration_id: "nexus-1234".to_string(),
        symmetric_key: "a2V5".to_string(),
        tags: Map::new(),
    }
}

fn spawn_session(status: &str, connector: Arc<MockConnector>) -> kameo::actor::ActorRef<SessionActor> {
    SessionActor::spawn(SessionActorArgs {
        identity: identity(),
        provisioner: Provisioner::new(Arc::new(MockProvisioningClient {
            status: status.to_string(),
        })),
        connector,
    })
}

fn fast_heartbeat() -> HeartbeatConfig {
    HeartbeatConfig {
        interval: Duration::from_millis(50),
        tick: Duration::from_millis(10),
    }
}

fn agent(session: kameo::actor::ActorRef<SessionActor>, heartbeat: HeartbeatConfig) -> Agent {
    Agent::new(
        session,
        CommandDispatcher::new(Arc::new(LocalExecutor::new())),
        heartbeat,
    )
}

fn heartbeats(recorded: &Mutex<Recorded>) -> usize {
    recorded
        .lock()
        .unwrap()
        .messages
        .iter()
        .filter(|m| m.get("status") == Some(&json!("alive")))
        .count()
}

#[tokio::test]
async fn test_session_actor_life_cycle() {
    let connector = Arc::new(MockConnector::default());
    let session = spawn_session("assigned", connector.clone());

    assert_eq!(session.ask(GetState).await.unwrap(), ConnectionState::Unprovisioned);

    let assignment = session.ask(Provision).await.unwrap();
    assert_eq!(assignment.device_id, "nexus-1234");
    assert_eq!(session.ask(GetState).await.unwrap(), ConnectionState::Provisioned);

    session.ask(Connect).await.unwrap();
    assert_eq!(session.ask(GetState).await.unwrap(), ConnectionState::Connected);

    let heartbeat = session.ask(SendHeartbeat).await.unwrap();
    assert_eq!(heartbeat.device_id, "nexus-1234");
    assert_eq!(heartbeat.status, "alive");

    let status = session.ask(GetStatus).await.unwrap();
    assert_eq!(status.assigned_hub.as_deref(), Some("hub.example.net"));
    assert!(status.last_heartbeat.is_some());

    assert!(session.ask(Disconnect).await.unwrap());
    assert!(!session.ask(Disconnect).await.unwrap());
    assert_eq!(session.ask(GetState).await.unwrap(), ConnectionState::ShuttingDown);

    let recorded = connector.recorded.lock().unwrap();
    assert_eq!(recorded.disconnects, 1);
    assert_eq!(
        recorded.messages.last(),
        Some(&Value::String(DISCONNECT_NOTICE.to_string()))
    );
    drop(recorded);

    session.stop_gracefully().await.unwrap();
}

#[tokio::test]
async fn test_connect_before_provision_is_rejected() {
    let session = spawn_session("assigned", Arc::new(MockConnector::default()));

    let result = session.ask(Connect).await;
    assert!(result.is_err());
    assert_eq!(session.ask(GetState).await.unwrap(), ConnectionState::Unprovisioned);

    session.stop_gracefully().await.unwrap();
}

#[tokio::test]
async fn test_connect_failure_leaves_disconnected() {
    let connector = Arc::new(MockConnector {
        fail_first: 1,
        ..MockConnector::default()
    });
    let session = spawn_session("assigned", connector);

    session.ask(Provision).await.unwrap();
    assert!(session.ask(Connect).await.is_err());
    assert_eq!(session.ask(GetState).await.unwrap(), ConnectionState::Disconnected);
    assert_eq!(session.ask(GetStatus).await.unwrap().failed_attempts, 1);

    session.ask(Connect).await.unwrap();
    assert_eq!(session.ask(GetState).await.unwrap(), ConnectionState::Connected);
    assert_eq!(session.ask(GetStatus).await.unwrap().failed_attempts, 0);

    session.stop_gracefully().await.unwrap();
}

#[tokio::test]
async fn test_heartbeat_failure_invalidates_session() {
    let connector = Arc::new(MockConnector {
        broken_sessions: 1,
        ..MockConnector::default()
    });
    let session = spawn_session("assigned", connector);

    session.ask(Provision).await.unwrap();
    session.ask(Connect).await.unwrap();

    assert!(session.ask(SendHeartbeat).await.is_err());
    assert_eq!(session.ask(GetState).await.unwrap(), ConnectionState::Disconnected);

    session.ask(Connect).await.unwrap();
    session.ask(SendHeartbeat).await.unwrap();

    session.stop_gracefully().await.unwrap();
}

#[tokio::test]
async fn test_agent_heartbeats_and_disconnects_once() {
    let connector = Arc::new(MockConnector::default());
    let session = spawn_session("assigned", connector.clone());
    let agent = agent(session.clone(), fast_heartbeat());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    agent.run(cancel).await.unwrap();

    assert!(heartbeats(&connector.recorded) >= 2);
    assert_eq!(connector.recorded.lock().unwrap().disconnects, 1);
    assert_eq!(session.ask(GetState).await.unwrap(), ConnectionState::ShuttingDown);

    session.stop_gracefully().await.unwrap();
    assert_eq!(connector.recorded.lock().unwrap().disconnects, 1);
}

#[tokio::test]
async fn test_shutdown_observed_within_a_tick() {
    let connector = Arc::new(MockConnector::default());
    let session = spawn_session("assigned", connector.clone());
    let agent = agent(session.clone(), HeartbeatConfig::default());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let start = Instant::now();
    tokio::time::timeout(Duration::from_secs(2), agent.run(cancel))
        .await
        .expect("agent did not stop within a tick")
        .unwrap();

    assert!(start.elapsed() < Duration::from_millis(1100));
    assert_eq!(heartbeats(&connector.recorded), 1);
    assert_eq!(connector.recorded.lock().unwrap().disconnects, 1);

    session.stop_gracefully().await.unwrap();
}

#[tokio::test]
async fn test_agent_stops_on_provisioning_failure() {
    let connector = Arc::new(MockConnector::default());
    let session = spawn_session("failed", connector.clone());
    let agent = agent(session.clone(), fast_heartbeat());

    let err = agent.run(CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err, CoreError::ProvisioningFailure { ref status } if status == "failed"));
    assert_eq!(connector.attempts.load(Ordering::SeqCst), 0);
    assert_eq!(session.ask(GetState).await.unwrap(), ConnectionState::ShuttingDown);

    session.stop_gracefully().await.unwrap();
}

#[tokio::test]
async fn test_agent_retries_connect_on_next_tick() {
    let connector = Arc::new(MockConnector {
        fail_first: 2,
        ..MockConnector::default()
    });
    let session = spawn_session("assigned", connector.clone());
    let agent = agent(session.clone(), fast_heartbeat());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    agent.run(cancel).await.unwrap();

    assert!(connector.attempts.load(Ordering::SeqCst) >= 3);
    assert!(heartbeats(&connector.recorded) >= 1);

    session.stop_gracefully().await.unwrap();
}

#[tokio::test]
async fn test_agent_reconnects_after_heartbeat_failure() {
    let connector = Arc::new(MockConnector {
        broken_sessions: 1,
        ..MockConnector::default()
    });
    let session = spawn_session("assigned", connector.clone());
    let agent = agent(session.clone(), fast_heartbeat());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    agent.run(cancel).await.unwrap();

    assert!(connector.attempts.load(Ordering::SeqCst) >= 2);
    assert!(heartbeats(&connector.recorded) >= 1);

    session.stop_gracefully().await.unwrap();
}

#[tokio::test]
async fn test_agent_dispatches_inbound_commands() {
    let connector = Arc::new(MockConnector::default());
    let session = spawn_session("assigned", connector.clone());
    let agent = agent(session.clone(), fast_heartbeat());

    let cancel = CancellationToken::new();
    let run = {
        let cancel = cancel.clone();
        tokio::spawn(async move { agent.run(cancel).await })
    };

    let tx = loop {
        if let Some(tx) = connector.inbound_tx.lock().unwrap().clone() {
            break tx;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    };

    tx.send(MethodRequest {
        request_id: "r1".to_string(),
        method_name: "runCommand".to_string(),
        payload: json!({"command": "echo hi"}),
    })
    .await
    .unwrap();
    tx.send(MethodRequest {
        request_id: "r2".to_string(),
        method_name: "runCommand".to_string(),
        payload: json!({}),
    })
    .await
    .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    cancel.cancel();
    run.await.unwrap().unwrap();

    let recorded = connector.recorded.lock().unwrap();
    assert_eq!(recorded.responses.len(), 2);

    let (id, status, response) = &recorded.responses[0];
    assert_eq!(id, "r1");
    assert_eq!(*status, 200);
    assert_eq!(
        response,
        &CommandResponse::Success {
            return_code: 0,
            stdout: "hi\n".to_string(),
            stderr: String::new(),
        }
    );

    let (id, status, response) = &recorded.responses[1];
    assert_eq!(id, "r2");
    assert_eq!(*status, 400);
    assert_eq!(response, &CommandResponse::error("No command provided"));
    drop(recorded);

    session.stop_gracefully().await.unwrap();
}

#[tokio::test]
async fn test_inbound_traffic_does_not_delay_heartbeats() {
    let connector = Arc::new(MockConnector::default());
    let session = spawn_session("assigned", connector.clone());
    let heartbeat = HeartbeatConfig {
        interval: Duration::from_millis(100),
        tick: Duration::from_millis(50),
    };
    let agent = agent(session.clone(), heartbeat);

    let cancel = CancellationToken::new();
    let run = {
        let cancel = cancel.clone();
        tokio::spawn(async move { agent.run(cancel).await })
    };

    let tx = loop {
        if let Some(tx) = connector.inbound_tx.lock().unwrap().clone() {
            break tx;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    };

    let flood = tokio::spawn(async move {
        let mut id = 0;
        while tx
            .send(MethodRequest {
                request_id: id.to_string(),
                method_name: "runCommand".to_string(),
                payload: json!({}),
            })
            .await
            .is_ok()
        {
            id += 1;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    });

    tokio::time::sleep(Duration::from_secs(1)).await;
    cancel.cancel();
    run.await.unwrap().unwrap();
    flood.abort();

    assert!(heartbeats(&connector.recorded) >= 5);
    assert!(!connector.recorded.lock().unwrap().responses.is_empty());

    session.stop_gracefully().await.unwrap();
}
