//! WebSocket connection to the free@home controller.
//!
//! This module implements [`ControllerLink`] and [`DeviceApi`] over a single
//! WebSocket, including request/response correlation and event routing.
//!
//! # Event Loop
//!
//! Each successful `open()` spawns a tokio task with its own correlation
//! map, so tearing down a replaced socket never touches requests sent on
//! its successor. The task handles:
//!
//! - Incoming frames from the controller (responses, events)
//! - Outgoing device requests from the facade
//! - Request/response correlation by UUID
//! - Event handler callbacks, in arrival order
//!
//! If the socket ends without a local `close()`, the loop reports
//! `error("connection closed")` followed by `subscribed(false)`.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{Value, from_str, from_value, to_string};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::devices::{DatapointAddress, DatapointKind, Device, DeviceApi};
use crate::error::{Error, Result};
use crate::identifiers::RequestId;
use crate::protocol::{
    ControllerCommand, ControllerEvent, ControllerRequest, ControllerResponse, RawEvent,
};

use super::link::{ControllerLink, EventHandler};

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for a controller request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum pending requests before rejecting new ones.
const MAX_PENDING_REQUESTS: usize = 100;

// ============================================================================
// Types
// ============================================================================

/// Client-side WebSocket stream.
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Map of request IDs to response channels.
type CorrelationMap = FxHashMap<RequestId, oneshot::Sender<Result<ControllerResponse>>>;

// ============================================================================
// ControllerEndpoint
// ============================================================================

/// Where and how to reach the controller.
#[derive(Clone)]
pub struct ControllerEndpoint {
    /// WebSocket URL (`ws://` or `wss://`).
    pub url: Url,
    /// Optional HTTP Basic credentials sent on upgrade.
    pub credentials: Option<Credentials>,
}

/// Username/password passed through to the controller.
#[derive(Clone)]
pub struct Credentials {
    /// Account name.
    pub username: String,
    /// Account password.
    pub password: String,
}

impl fmt::Debug for ControllerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerEndpoint")
            .field("url", &self.url.as_str())
            .field(
                "username",
                &self.credentials.as_ref().map(|c| c.username.as_str()),
            )
            .finish_non_exhaustive()
    }
}

impl ControllerEndpoint {
    /// Creates an endpoint without credentials.
    #[inline]
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self {
            url,
            credentials: None,
        }
    }

    /// Adds Basic credentials.
    #[inline]
    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// Returns the `Authorization` header value, if credentials are set.
    fn authorization(&self) -> Option<String> {
        self.credentials.as_ref().map(|c| {
            let token = BASE64.encode(format!("{}:{}", c.username, c.password));
            format!("Basic {token}")
        })
    }
}

// ============================================================================
// LinkCommand
// ============================================================================

/// Internal commands for the event loop.
enum LinkCommand {
    /// Send a request and wait for response.
    Send {
        request: ControllerRequest,
        response_tx: oneshot::Sender<Result<ControllerResponse>>,
    },
    /// Remove a timed-out correlation entry.
    RemoveCorrelation(RequestId),
    /// Shutdown the connection.
    Shutdown,
}

// ============================================================================
// Socket
// ============================================================================

/// Handles to one running event loop.
#[derive(Clone)]
struct Socket {
    /// Commands for the loop.
    command_tx: mpsc::UnboundedSender<LinkCommand>,
    /// Requests awaiting a response on this socket only.
    correlation: Arc<Mutex<CorrelationMap>>,
}

impl Socket {
    fn shutdown(&self) {
        let _ = self.command_tx.send(LinkCommand::Shutdown);
    }
}

// ============================================================================
// ControllerConnection
// ============================================================================

/// WebSocket link to the controller.
///
/// # Thread Safety
///
/// `ControllerConnection` is `Send + Sync` and is shared behind an `Arc`
/// by the coordinator and the device facade.
pub struct ControllerConnection {
    /// Controller address and credentials.
    endpoint: ControllerEndpoint,
    /// Per-request timeout.
    request_timeout: Duration,
    /// Current socket, if open.
    socket: Mutex<Option<Socket>>,
    /// Event handler (shared with event loop).
    event_handler: Arc<Mutex<Option<EventHandler>>>,
}

impl fmt::Debug for ControllerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerConnection")
            .field("endpoint", &self.endpoint)
            .field("open", &self.is_open())
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

impl ControllerConnection {
    /// Creates an unopened connection.
    #[must_use]
    pub fn new(endpoint: ControllerEndpoint, request_timeout: Duration) -> Self {
        Self {
            endpoint,
            request_timeout,
            socket: Mutex::new(None),
            event_handler: Arc::new(Mutex::new(None)),
        }
    }

    /// Returns `true` while the event loop is running.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.socket
            .lock()
            .as_ref()
            .is_some_and(|socket| !socket.command_tx.is_closed())
    }

    /// Returns the number of pending requests on the current socket.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.socket
            .lock()
            .as_ref()
            .map_or(0, |socket| socket.correlation.lock().len())
    }

    /// Sends a command and waits for its result.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the link is not open
    /// - [`Error::RequestTimeout`] if no response arrives in time
    /// - [`Error::Protocol`] if too many requests are pending or the
    ///   controller answered with an error
    pub async fn send(&self, command: ControllerCommand) -> Result<Value> {
        let Socket {
            command_tx,
            correlation,
        } = self.socket.lock().clone().ok_or(Error::ConnectionClosed)?;

        {
            let correlation = correlation.lock();
            if correlation.len() >= MAX_PENDING_REQUESTS {
                warn!(
                    pending = correlation.len(),
                    max = MAX_PENDING_REQUESTS,
                    "Too many pending requests"
                );
                return Err(Error::protocol(format!(
                    "Too many pending requests: {}/{}",
                    correlation.len(),
                    MAX_PENDING_REQUESTS
                )));
            }
        }

        let request = ControllerRequest::new(command);
        let request_id = request.id;
        let (response_tx, response_rx) = oneshot::channel();

        command_tx
            .send(LinkCommand::Send {
                request,
                response_tx,
            })
            .map_err(|_| Error::ConnectionClosed)?;

        match timeout(self.request_timeout, response_rx).await {
            Ok(Ok(result)) => result?.into_result(),
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                let _ = command_tx.send(LinkCommand::RemoveCorrelation(request_id));

                Err(Error::request_timeout(
                    request_id,
                    self.request_timeout.as_millis() as u64,
                ))
            }
        }
    }
}

// ============================================================================
// ControllerConnection - ControllerLink
// ============================================================================

#[async_trait]
impl ControllerLink for ControllerConnection {
    async fn open(&self) -> Result<()> {
        if let Some(previous) = self.socket.lock().take() {
            debug!("Replacing previous controller socket");
            previous.shutdown();
        }

        let mut request = self.endpoint.url.as_str().into_client_request()?;
        if let Some(auth) = self.endpoint.authorization() {
            let value = HeaderValue::from_str(&auth)
                .map_err(|e| Error::config(format!("invalid credentials header: {e}")))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (ws_stream, _) = connect_async(request)
            .await
            .map_err(|e| Error::connection(format!("WebSocket connect failed: {e}")))?;

        info!(url = %self.endpoint.url, "Controller WebSocket established");

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let correlation = Arc::new(Mutex::new(CorrelationMap::default()));
        tokio::spawn(run_event_loop(
            ws_stream,
            command_rx,
            Arc::clone(&correlation),
            Arc::clone(&self.event_handler),
        ));

        let socket = Socket {
            command_tx,
            correlation,
        };
        if let Some(raced) = self.socket.lock().replace(socket) {
            debug!("Concurrent open replaced a controller socket");
            raced.shutdown();
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if let Some(socket) = self.socket.lock().take() {
            socket.shutdown();
        }
        Ok(())
    }

    fn set_event_handler(&self, handler: EventHandler) {
        *self.event_handler.lock() = Some(handler);
    }
}

// ============================================================================
// ControllerConnection - DeviceApi
// ============================================================================

#[async_trait]
impl DeviceApi for ControllerConnection {
    async fn list_devices(&self) -> Result<Vec<Device>> {
        let result = self.send(ControllerCommand::ListDevices).await?;
        Ok(from_value(result)?)
    }

    async fn get_device(&self, device_id: &str) -> Result<Option<Device>> {
        let result = self
            .send(ControllerCommand::GetDevice {
                device_id: device_id.to_string(),
            })
            .await?;

        if result.is_null() {
            return Ok(None);
        }
        Ok(Some(from_value(result)?))
    }

    async fn set_datapoint(
        &self,
        device_id: &str,
        address: DatapointAddress,
        value: &str,
    ) -> Result<()> {
        let device_id = device_id.to_string();
        let value = value.to_string();

        let command = match address.kind {
            DatapointKind::Input => ControllerCommand::SetInputDatapoint {
                device_id,
                channel: address.channel,
                datapoint: address.index,
                value,
            },
            DatapointKind::Output => ControllerCommand::SetOutputDatapoint {
                device_id,
                channel: address.channel,
                datapoint: address.index,
                value,
            },
        };

        self.send(command).await.map(|_| ())
    }
}

// ============================================================================
// Event Loop
// ============================================================================

/// Event loop that handles WebSocket I/O.
async fn run_event_loop(
    ws_stream: WsStream,
    mut command_rx: mpsc::UnboundedReceiver<LinkCommand>,
    correlation: Arc<Mutex<CorrelationMap>>,
    event_handler: Arc<Mutex<Option<EventHandler>>>,
) {
    let (mut ws_write, mut ws_read) = ws_stream.split();
    let mut closed_locally = false;

    loop {
        tokio::select! {
            message = ws_read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        handle_incoming_message(&text, &correlation, &event_handler);
                    }

                    Some(Ok(Message::Close(_))) => {
                        debug!("Controller closed WebSocket");
                        break;
                    }

                    Some(Err(e)) => {
                        error!(error = %e, "Controller WebSocket error");
                        break;
                    }

                    None => {
                        debug!("Controller WebSocket stream ended");
                        break;
                    }

                    // Ignore Binary, Ping, Pong
                    _ => {}
                }
            }

            command = command_rx.recv() => {
                match command {
                    Some(LinkCommand::Send { request, response_tx }) => {
                        let request_id = request.id;

                        let json = match to_string(&request) {
                            Ok(j) => j,
                            Err(e) => {
                                let _ = response_tx.send(Err(Error::Json(e)));
                                continue;
                            }
                        };

                        correlation.lock().insert(request_id, response_tx);

                        if let Err(e) = ws_write.send(Message::Text(json.into())).await
                            && let Some(tx) = correlation.lock().remove(&request_id)
                        {
                            let _ = tx.send(Err(Error::connection(e.to_string())));
                        }

                        trace!(%request_id, "Controller request sent");
                    }

                    Some(LinkCommand::RemoveCorrelation(request_id)) => {
                        correlation.lock().remove(&request_id);
                        debug!(%request_id, "Removed timed-out correlation");
                    }

                    Some(LinkCommand::Shutdown) | None => {
                        debug!("Controller link shutdown requested");
                        closed_locally = true;
                        let _ = ws_write.close().await;
                        break;
                    }
                }
            }
        }
    }

    fail_pending_requests(&correlation);

    if !closed_locally {
        warn!("free@home connection closed unexpectedly");
        deliver(&event_handler, ControllerEvent::Error("connection closed".to_string()));
        deliver(&event_handler, ControllerEvent::Subscribed { confirmed: false });
    }

    debug!("Controller event loop terminated");
}

/// Handles an incoming text frame from the controller.
fn handle_incoming_message(
    text: &str,
    correlation: &Mutex<CorrelationMap>,
    event_handler: &Mutex<Option<EventHandler>>,
) {
    if let Ok(response) = from_str::<ControllerResponse>(text) {
        let tx = correlation.lock().remove(&response.id);

        if let Some(tx) = tx {
            let _ = tx.send(Ok(response));
        } else {
            warn!(id = %response.id, "Response for unknown request");
        }
        return;
    }

    match from_str::<RawEvent>(text) {
        Ok(raw) => match raw.parse() {
            Some(event) => deliver(event_handler, event),
            None => trace!(method = %raw.method, "Ignoring unrecognised controller frame"),
        },
        Err(_) => warn!(text = %text, "Failed to parse controller message"),
    }
}

/// Passes an event to the registered handler, if any.
fn deliver(event_handler: &Mutex<Option<EventHandler>>, event: ControllerEvent) {
    let handler = event_handler.lock();
    if let Some(ref handler) = *handler {
        handler(event);
    }
}

/// Fails all pending requests with ConnectionClosed error.
fn fail_pending_requests(correlation: &Mutex<CorrelationMap>) {
    let pending: Vec<_> = correlation.lock().drain().collect();
    let count = pending.len();

    for (_, tx) in pending {
        let _ = tx.send(Err(Error::ConnectionClosed));
    }

    if count > 0 {
        debug!(count, "Failed pending requests on shutdown");
    }
}

// ============================================================================
// Tests
// ============================================================================
