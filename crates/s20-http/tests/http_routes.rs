//! Route tests for the HTTP front end.
//!
//! Each test builds the real router over a `SimulatedNetwork` and drives it
//! with `tower::ServiceExt::oneshot`, so no TCP or UDP socket is opened.
//! Tests run on tokio's paused clock; retry timeouts elapse instantly.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use s20_client::infrastructure::transport::simulated::{SimulatedNetwork, SimulatedPlug};
use s20_core::protocol::messages::SubscribeAckMessage;
use s20_core::{encode_message, HardwareId, S20Message};
use s20_http::application::PlugService;
use s20_http::domain::{DeviceEntry, ErrorResponse, PlugStateResponse, PowerState, ServerConfig};
use s20_http::infrastructure::router;
use tower::ServiceExt;

const PLUG_ID: HardwareId = HardwareId::new([0xac, 0xcf, 0x23, 0x12, 0x34, 0x56]);
const PLUG_ADDR: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 40);

type Service = PlugService<Arc<SimulatedNetwork>>;

fn setup(network: SimulatedNetwork) -> (Arc<SimulatedNetwork>, Arc<Service>, Router) {
    let network = Arc::new(network);
    let service = Arc::new(PlugService::new(Arc::clone(&network), ServerConfig::default()));
    let app = router(Arc::clone(&service));
    (network, service, app)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let request = Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("valid request");
    let response = app.clone().oneshot(request).await.expect("router is infallible");
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    (status, body.to_vec())
}

fn json<T: serde::de::DeserializeOwned>(body: &[u8]) -> T {
    serde_json::from_slice(body).expect("JSON body")
}

// ── Success paths ─────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_status_returns_current_relay_state() {
    // Arrange
    let plug = SimulatedPlug::new(PLUG_ADDR, PLUG_ID).with_state(true);
    let (_network, _service, app) = setup(SimulatedNetwork::new().with_plug(plug));

    // Act
    let (status, body) = get(&app, "/STATUS/192.168.1.40").await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    let body: PlugStateResponse = json(&body);
    assert_eq!(body.address, PLUG_ADDR);
    assert_eq!(body.hardware_id, PLUG_ID);
    assert_eq!(body.state, PowerState::On);
}

#[tokio::test(start_paused = true)]
async fn test_status_ignores_ack_left_from_an_earlier_request() {
    // Arrange: the plug is OFF but an ON ack from a timed-out exchange is
    // still queued on the shared transport
    let (network, service, app) =
        setup(SimulatedNetwork::new().with_plug(SimulatedPlug::new(PLUG_ADDR, PLUG_ID)));
    service.refresh_devices().await.expect("discovery");
    let stale = S20Message::SubscribeAck(SubscribeAckMessage {
        hardware_id: PLUG_ID,
        on: true,
    });
    let plug_socket = SocketAddr::V4(SocketAddrV4::new(PLUG_ADDR, 10000));
    network.inject(encode_message(&stale).unwrap(), plug_socket);

    // Act
    let (status, body) = get(&app, "/STATUS/192.168.1.40").await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json::<PlugStateResponse>(&body).state, PowerState::Off);
}

#[tokio::test(start_paused = true)]
async fn test_on_then_off_switches_the_plug() {
    // Arrange
    let (network, _service, app) =
        setup(SimulatedNetwork::new().with_plug(SimulatedPlug::new(PLUG_ADDR, PLUG_ID)));

    // Act / Assert: ON
    let (status, body) = get(&app, "/ON/192.168.1.40").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json::<PlugStateResponse>(&body).state, PowerState::On);
    assert_eq!(network.plug_state(PLUG_ID), Some(true));

    // Act / Assert: OFF
    let (status, body) = get(&app, "/OFF/192.168.1.40").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json::<PlugStateResponse>(&body).state, PowerState::Off);
    assert_eq!(network.plug_state(PLUG_ID), Some(false));
}

#[tokio::test(start_paused = true)]
async fn test_devices_lists_plugs_found_at_startup() {
    // Arrange
    let (_network, service, app) = setup(
        SimulatedNetwork::new()
            .with_plug(SimulatedPlug::new(PLUG_ADDR, PLUG_ID).with_state(true))
            .with_plug(SimulatedPlug::new(
                Ipv4Addr::new(192, 168, 1, 41),
                HardwareId::new([0xac, 0xcf, 0x23, 0, 0, 2]),
            )),
    );
    service.refresh_devices().await.expect("discovery");

    // Act
    let (status, body) = get(&app, "/devices").await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    let devices: Vec<DeviceEntry> = json(&body);
    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0].address, PLUG_ADDR, "listing is ordered by address");
    assert_eq!(devices[0].announced_state, Some(PowerState::On));
}

#[tokio::test(start_paused = true)]
async fn test_health_is_ok_without_any_plug() {
    let (_network, _service, app) = setup(SimulatedNetwork::new());

    let (status, body) = get(&app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");
}

// ── Failure paths ─────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_malformed_address_is_bad_request() {
    // Arrange
    let (network, _service, app) = setup(SimulatedNetwork::new());

    // Act
    let (status, body) = get(&app, "/ON/not-an-ip").await;

    // Assert
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json::<ErrorResponse>(&body).error.contains("not-an-ip"));
    assert!(network.sent_frames().is_empty(), "nothing is sent for a bad address");
}

#[tokio::test(start_paused = true)]
async fn test_unknown_address_is_not_found() {
    let (_network, _service, app) = setup(SimulatedNetwork::new());

    let (status, body) = get(&app, "/STATUS/192.168.1.99").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json::<ErrorResponse>(&body).error.contains("192.168.1.99"));
}

#[tokio::test(start_paused = true)]
async fn test_known_plug_that_went_silent_is_gateway_timeout() {
    // Arrange: the plug is discovered, then stops answering
    let (network, service, app) =
        setup(SimulatedNetwork::new().with_plug(SimulatedPlug::new(PLUG_ADDR, PLUG_ID)));
    service.refresh_devices().await.expect("discovery");
    network.set_silent(PLUG_ID, true);

    // Act
    let (status, body) = get(&app, "/ON/192.168.1.40").await;

    // Assert
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert!(json::<ErrorResponse>(&body).error.contains("unreachable"));
    assert_eq!(network.plug_state(PLUG_ID), Some(false));
}

#[tokio::test(start_paused = true)]
async fn test_plug_answering_with_garbage_is_bad_gateway() {
    // Arrange: the plug stops acking and answers the request with junk
    let (network, service, app) =
        setup(SimulatedNetwork::new().with_plug(SimulatedPlug::new(PLUG_ADDR, PLUG_ID)));
    service.refresh_devices().await.expect("discovery");
    network.set_silent(PLUG_ID, true);
    let plug_socket = SocketAddr::V4(SocketAddrV4::new(PLUG_ADDR, 10000));
    network.inject_after_send(vec![0x68, 0x64, 0x00, 0x02], plug_socket);

    // Act
    let (status, _body) = get(&app, "/STATUS/192.168.1.40").await;

    // Assert
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}
