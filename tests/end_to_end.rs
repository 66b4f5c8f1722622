//! End-to-end flow: handshake, session bootstrap, forwarding, expiry.
//!
//! Drives the HTTP application with a scripted controller link whose events
//! are injected as raw controller frames.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode};
use axum::response::Response;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio_test::{assert_err, assert_ok};
use tower::ServiceExt;

use freehome_mcp::controller::{ControllerLink, EventHandler};
use freehome_mcp::devices::{DatapointAddress, DatapointKind, Device, DeviceApi};
use freehome_mcp::protocol::RawEvent;
use freehome_mcp::server::{MCP_PATH, SESSION_HEADER};
use freehome_mcp::{ConnectionState, Error, Result, Service, SessionId};

// ============================================================================
// Scripted collaborators
// ============================================================================

#[derive(Default)]
struct FrameLink {
    handler: Mutex<Option<EventHandler>>,
    opens: AtomicUsize,
    closes: AtomicUsize,
}

impl FrameLink {
    /// Delivers a controller event frame, as the WebSocket loop would.
    fn deliver(&self, frame: Value) {
        let raw: RawEvent = serde_json::from_value(frame).expect("event frame");
        let event = raw.parse().expect("known event");
        if let Some(handler) = self.handler.lock().as_ref() {
            handler(event);
        }
    }
}

#[async_trait]
impl ControllerLink for FrameLink {
    async fn open(&self) -> Result<()> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn set_event_handler(&self, handler: EventHandler) {
        *self.handler.lock() = Some(handler);
    }
}

#[derive(Default)]
struct RecordingDevices {
    writes: Mutex<Vec<(String, DatapointAddress, String)>>,
}

#[async_trait]
impl DeviceApi for RecordingDevices {
    async fn list_devices(&self) -> Result<Vec<Device>> {
        Ok(vec![living_room()])
    }

    async fn get_device(&self, device_id: &str) -> Result<Option<Device>> {
        Ok(Some(living_room()).filter(|d| d.serial_number == device_id))
    }

    async fn set_datapoint(
        &self,
        device_id: &str,
        address: DatapointAddress,
        value: &str,
    ) -> Result<()> {
        self.writes
            .lock()
            .push((device_id.to_string(), address, value.to_string()));
        Ok(())
    }
}

fn living_room() -> Device {
    serde_json::from_value(json!({
        "serialNumber": "ABB7F500",
        "displayName": "Living room",
        "channels": {
            "ch0000": {
                "inputs": { "idp0000": { "value": "0" } },
                "outputs": { "odp0000": { "value": "0" } }
            }
        }
    }))
    .expect("device")
}

// ============================================================================
// Helpers
// ============================================================================

fn service() -> (Arc<FrameLink>, Arc<RecordingDevices>, Service) {
    let link = Arc::new(FrameLink::default());
    let devices = Arc::new(RecordingDevices::default());
    let service = Service::builder()
        .handshake_timeout(Duration::from_secs(5))
        .build_with(link.clone(), devices.clone())
        .expect("service");
    (link, devices, service)
}

/// Starts the handshake and waits until it is pending on the link.
async fn begin_start(service: &Service) -> tokio::task::JoinHandle<Result<()>> {
    let task = {
        let service = service.clone();
        tokio::spawn(async move { service.start().await })
    };

    tokio::time::timeout(Duration::from_secs(2), async {
        while !service.coordinator().has_pending_handshake() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("handshake pending");

    task
}

fn post(session_id: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(MCP_PATH)
        .header("content-type", "application/json");
    if let Some(id) = session_id {
        builder = builder.header(SESSION_HEADER, id);
    }
    builder.body(Body::from(body.to_string())).expect("request")
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

fn initialize() -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": "2025-03-26",
            "capabilities": {},
            "clientInfo": { "name": "e2e", "version": "1.0" }
        }
    })
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_handshake_session_forwarding_and_expiry() {
    let (link, devices, service) = service();
    let app = service.app();

    // (1) connect resolves only after the subscription is confirmed
    let start = begin_start(&service).await;
    assert_eq!(service.coordinator().state(), ConnectionState::Connecting);
    link.deliver(json!({ "type": "event", "method": "subscribed", "params": { "result": true } }));
    assert_ok!(start.await.expect("start task"));
    assert_eq!(service.coordinator().state(), ConnectionState::Confirmed);
    assert_eq!(link.opens.load(Ordering::SeqCst), 1);

    // (2) initialize without id opens a session
    let response = app.clone().oneshot(post(None, &initialize())).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let session_id = response
        .headers()
        .get(SESSION_HEADER)
        .expect("session header")
        .to_str()
        .expect("ascii")
        .to_string();
    let body = json_body(response).await;
    assert_eq!(body["result"]["serverInfo"]["name"], "freehome-mcp-server");
    assert_eq!(service.registry().len(), 1);

    // (3) set datapoint through the session
    let call = json!({
        "jsonrpc": "2.0",
        "id": 2,
        "method": "tools/call",
        "params": {
            "name": "set_device_state",
            "arguments": {
                "deviceId": "ABB7F500",
                "channelId": "ch0000",
                "datapoint": "odp0000",
                "value": "1"
            }
        }
    });
    let response = app
        .clone()
        .oneshot(post(Some(&session_id), &call))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["id"], 2);
    assert!(body["result"].get("isError").is_none());
    {
        let writes = devices.writes.lock();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].1.kind, DatapointKind::Output);
        assert_eq!(writes[0].1.channel, 0);
        assert_eq!(writes[0].2, "1");
    }

    // (4) transport closes, the id expires
    let transport = service
        .registry()
        .lookup(&SessionId::from(session_id.as_str()))
        .expect("registered");
    transport.close();
    assert!(service.registry().is_empty());

    let ping = json!({ "jsonrpc": "2.0", "id": 3, "method": "ping" });
    let response = app.oneshot(post(Some(&session_id), &ping)).await.expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"]["code"], -32001);
}

#[tokio::test]
async fn test_error_event_fails_startup_and_keeps_router_closed() {
    let (link, _devices, service) = service();

    let start = begin_start(&service).await;
    link.deliver(json!({ "type": "event", "method": "error", "params": "authentication failed" }));

    let err = assert_err!(start.await.expect("start task"));
    assert!(matches!(err, Error::HandshakeFailed { ref cause } if cause.contains("authentication failed")));
    assert_eq!(service.coordinator().state(), ConnectionState::Disconnected);

    let response = service
        .app()
        .oneshot(post(None, &initialize()))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(service.registry().is_empty());
}

#[tokio::test]
async fn test_second_start_while_pending_is_rejected() -> anyhow::Result<()> {
    let (link, _devices, service) = service();

    let first = begin_start(&service).await;
    let err = assert_err!(service.start().await);
    assert!(matches!(err, Error::HandshakeAlreadyInProgress));

    link.deliver(json!({ "type": "event", "method": "subscribed", "params": true }));
    first.await??;
    assert_eq!(link.opens.load(Ordering::SeqCst), 1);

    // Confirmed already: a further start is a no-op
    service.start().await?;
    assert_eq!(link.opens.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_subscription_loss_degrades_and_recovers() {
    let (link, _devices, service) = service();

    let start = begin_start(&service).await;
    link.deliver(json!({ "type": "event", "method": "subscribed", "params": true }));
    assert_ok!(start.await.expect("start task"));

    link.deliver(json!({ "type": "event", "method": "subscribed", "params": false }));
    assert_eq!(service.coordinator().state(), ConnectionState::Degraded);

    let response = service
        .app()
        .oneshot(post(None, &initialize()))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    link.deliver(json!({ "type": "event", "method": "subscribed", "params": true }));
    assert_eq!(service.coordinator().state(), ConnectionState::Confirmed);

    service.shutdown().await;
    assert_eq!(service.coordinator().state(), ConnectionState::Disconnected);
    assert_eq!(link.closes.load(Ordering::SeqCst), 1);
}
