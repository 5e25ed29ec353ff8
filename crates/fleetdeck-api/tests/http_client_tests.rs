//! HTTP client tests against a mock fleet endpoint.
//!
//! These verify that responses map onto the typed errors the terminal
//! session classifies: auth, validation, plain HTTP status, and decode.

use fleetdeck_api::{ApiError, FleetApi, HttpFleetApi};
use fleetdeck_core::types::{DeviceStatus, OperationKind};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, header, method, path},
};

async fn client_for(server: &MockServer) -> HttpFleetApi {
    HttpFleetApi::with_api_key(server.uri(), "test-key", 5).unwrap()
}

#[tokio::test]
async fn test_list_devices_success() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/tenants/acme/devices"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"id": "dev-1", "name": "lobby", "status": "online", "space_id": "spc-1"},
            {"id": "dev-2", "name": "dock", "status": "offline"}
        ])))
        .mount(&server)
        .await;

    let devices = client_for(&server).await.list_devices("acme").await.unwrap();
    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0].status, DeviceStatus::Online);
    assert_eq!(devices[1].space_id, None);
}

#[tokio::test]
async fn test_unauthorized_maps_to_auth_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/tenants/acme/incidents"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
        .mount(&server)
        .await;

    let err = client_for(&server).await.list_incidents("acme").await.unwrap_err();
    assert!(matches!(err, ApiError::Auth(ref m) if m.contains("token expired")));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_unprocessable_maps_to_validation_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/tenants/acme/spaces/spc-9/devices"))
        .respond_with(ResponseTemplate::new(422).set_body_string("invalid space"))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .await
        .list_space_devices("acme", "spc-9")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
}

#[tokio::test]
async fn test_server_error_is_retryable_http_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/tenants/acme/tickets"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let err = client_for(&server).await.list_tickets("acme").await.unwrap_err();
    assert_eq!(err.status(), Some(503));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_malformed_body_maps_to_decode_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/tenants/acme/spaces"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
        .mount(&server)
        .await;

    let err = client_for(&server).await.list_spaces("acme").await.unwrap_err();
    assert!(matches!(err, ApiError::Decode(_)));
}

#[tokio::test]
async fn test_connection_refused_maps_to_network_error() {
    // Nothing listens on this port once the server is dropped
    let uri = {
        let server = MockServer::start().await;
        server.uri()
    };

    let client = HttpFleetApi::with_api_key(uri, "k", 2).unwrap();
    let err = client.list_devices("acme").await.unwrap_err();
    assert!(matches!(err, ApiError::Network(_)), "got {err:?}");
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_invoke_operation_posts_operation() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/tenants/acme/devices/dev-1/operations"))
        .and(body_json(serde_json::json!({"operation": "reboot"})))
        .respond_with(ResponseTemplate::new(202).set_body_json(serde_json::json!({
            "operation_id": "op-9",
            "device_id": "dev-1",
            "operation": "reboot",
            "accepted": true
        })))
        .mount(&server)
        .await;

    let receipt = client_for(&server)
        .await
        .invoke_operation("acme", "dev-1", OperationKind::Reboot)
        .await
        .unwrap();
    assert_eq!(receipt.operation_id, "op-9");
    assert!(receipt.accepted);
}

#[test]
fn test_missing_key_env() {
    let tenant = fleetdeck_core::TenantConfig {
        base_url: "http://localhost".into(),
        api_key_env: "FLEETDECK_TEST_KEY_THAT_IS_NEVER_SET".into(),
        timeout_secs: 1,
    };
    let err = match HttpFleetApi::from_tenant("acme", &tenant) {
        Ok(_) => panic!("expected missing key"),
        Err(e) => e,
    };
    assert!(matches!(err, ApiError::MissingKey { ref tenant, .. } if tenant == "acme"));
}
