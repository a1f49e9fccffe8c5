//! Provisioning client against a mock service

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, json};
use wiremock::matchers::{body_partial_json, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use fieldlink_client::dps::DEFAULT_API_VERSION;
use fieldlink_client::{ClientError, DpsClient};
use fieldlink_core::{CoreError, IdentityRecord, Provisioner, ProvisioningClient, TransportError};

const REGISTER_PATH: &str = "/0ne0001/registrations/nexus-1234/register";

fn identity(endpoint: &str) -> IdentityRecord {
    let mut tags = Map::new();
    tags.insert("site".to_string(), json!("dock-4"));
    IdentityRecord {
        global_endpoint: endpoint.to_string(),
        id_scope: "0ne0001".to_string(),
        registration_id: "nexus-1234".to_string(),
        symmetric_key: "MDEyMzQ1Njc4OWFiY2RlZjAxMjM0NTY3ODlhYmNkZWY=".to_string(),
        tags,
    }
}

fn client() -> DpsClient {
    DpsClient::new().poll_interval(Duration::from_millis(10))
}

fn assigned(operation_id: &str) -> serde_json::Value {
    json!({
        "operationId": operation_id,
        "status": "assigned",
        "registrationState": {
            "assignedHub": "hub.example.net",
            "deviceId": "nexus-1234",
            "status": "assigned"
        }
    })
}

#[tokio::test]
async fn test_register_assigned_immediately() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path(REGISTER_PATH))
        .and(query_param("api-version", DEFAULT_API_VERSION))
        .and(header_exists("authorization"))
        .and(body_partial_json(json!({
            "registrationId": "nexus-1234",
            "payload": {"site": "dock-4"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(assigned("op-1")))
        .expect(1)
        .mount(&server)
        .await;

    let operation = client()
        .register_device(&identity(&server.uri()))
        .await
        .unwrap();

    assert_eq!(operation.status, "assigned");
    let state = operation.registration_state.unwrap();
    assert_eq!(state.assigned_hub.as_deref(), Some("hub.example.net"));
}

#[tokio::test]
async fn test_register_polls_while_assigning() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path(REGISTER_PATH))
        .respond_with(
            ResponseTemplate::new(202)
                .set_body_json(json!({"operationId": "op-2", "status": "assigning"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/0ne0001/registrations/nexus-1234/operations/op-2"))
        .and(query_param("api-version", DEFAULT_API_VERSION))
        .respond_with(ResponseTemplate::new(200).set_body_json(assigned("op-2")))
        .expect(1)
        .mount(&server)
        .await;

    let provisioner = Provisioner::new(Arc::new(client()));
    let assignment = provisioner
        .register(&identity(&server.uri()))
        .await
        .unwrap();

    assert_eq!(assignment.assigned_hub, "hub.example.net");
    assert_eq!(assignment.device_id, "nexus-1234");
}

#[tokio::test]
async fn test_register_gives_up_after_max_polls() {
    let server = MockServer::start().await;
    let assigning = json!({"operationId": "op-3", "status": "assigning"});
    Mock::given(method("PUT"))
        .and(path(REGISTER_PATH))
        .respond_with(ResponseTemplate::new(202).set_body_json(assigning.clone()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/0ne0001/registrations/nexus-1234/operations/op-3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(assigning))
        .expect(2)
        .mount(&server)
        .await;

    let result = client()
        .max_polls(2)
        .register_device(&identity(&server.uri()))
        .await;

    assert!(matches!(result, Err(ClientError::InvalidResponse(_))));
}

#[tokio::test]
async fn test_rejected_registration() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path(REGISTER_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad signature"))
        .mount(&server)
        .await;

    let result = client().register(&identity(&server.uri())).await;

    match result {
        Err(TransportError::Rejected { status, message }) => {
            assert_eq!(status, 401);
            assert_eq!(message, "bad signature");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn test_failed_status_is_provisioning_failure() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path(REGISTER_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "operationId": "op-4",
            "status": "failed",
            "registrationState": {"status": "failed", "errorMessage": "device disabled"}
        })))
        .mount(&server)
        .await;

    let provisioner = Provisioner::new(Arc::new(client()));
    let result = provisioner.register(&identity(&server.uri())).await;

    assert!(matches!(
        result,
        Err(CoreError::ProvisioningFailure { status }) if status == "failed"
    ));
}
