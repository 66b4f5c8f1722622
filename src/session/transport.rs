//! Per-session transport.
//!
//! Each session owns one worker task that handles its messages strictly in
//! arrival order. The transport signals its own closure exactly once.
//!
//! # Close triggers
//!
//! | Trigger | Source |
//! |---------|--------|
//! | `close()` | HTTP `DELETE`, service shutdown |
//! | Idle timeout | No message within the configured window |
//! | Worker end | Handler task terminated |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, info, trace};

use crate::error::{Error, Result};
use crate::identifiers::SessionId;
use crate::protocol::{JsonRpcMessage, JsonRpcResponse, codes};

// ============================================================================
// Types
// ============================================================================

/// Callback fired once when a transport closes.
pub type CloseHook = Box<dyn FnOnce(&SessionId) + Send>;

/// Per-session protocol state, owned by the worker.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionState {
    /// `initialize` has completed on this session.
    pub initialized: bool,
    /// Protocol version agreed during `initialize`.
    pub protocol_version: Option<String>,
}

/// Handles one JSON-RPC message within a session.
///
/// Returns `None` for notifications.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handles `message`, mutating the session's protocol state.
    async fn handle(
        &self,
        state: &mut SessionState,
        message: JsonRpcMessage,
    ) -> Option<JsonRpcResponse>;
}

/// Queued inbound body plus its reply slot.
struct Job {
    body: Value,
    reply: oneshot::Sender<Result<Option<Value>>>,
}

// ============================================================================
// CloseSignal
// ============================================================================

/// Fires the close hook at most once.
struct CloseSignal {
    id: SessionId,
    fired: AtomicBool,
    hook: Mutex<Option<CloseHook>>,
}

impl CloseSignal {
    fn new(id: SessionId) -> Self {
        Self {
            id,
            fired: AtomicBool::new(false),
            hook: Mutex::new(None),
        }
    }

    fn is_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    fn fire(&self) {
        if self.fired.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(session_id = %self.id, "Session transport closed");
        self.run_hook();
    }

    fn set_hook(&self, hook: CloseHook) {
        *self.hook.lock() = Some(hook);
        // Closed before the hook was attached.
        if self.is_fired() {
            self.run_hook();
        }
    }

    fn run_hook(&self) {
        let hook = self.hook.lock().take();
        if let Some(hook) = hook {
            hook(&self.id);
        }
    }
}

/// Fires the close signal when the worker exits, including on panic.
struct FireOnDrop(Arc<CloseSignal>);

impl Drop for FireOnDrop {
    fn drop(&mut self) {
        self.0.fire();
    }
}

// ============================================================================
// SessionTransport
// ============================================================================

/// Routing object for one session.
pub struct SessionTransport {
    /// Session this transport is registered under.
    id: SessionId,
    /// Creation time.
    created_at: Instant,
    /// Worker queue; `None` once closed.
    jobs: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    /// Close notification.
    close: Arc<CloseSignal>,
}

impl fmt::Debug for SessionTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionTransport")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl SessionTransport {
    /// Spawns the worker task for session `id`.
    ///
    /// With `idle_timeout` set, the transport closes itself once no message
    /// arrives within that window.
    pub fn spawn(
        id: SessionId,
        handler: Arc<dyn MessageHandler>,
        idle_timeout: Option<Duration>,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let close = Arc::new(CloseSignal::new(id.clone()));

        let transport = Arc::new(Self {
            id: id.clone(),
            created_at: Instant::now(),
            jobs: Mutex::new(Some(tx)),
            close: Arc::clone(&close),
        });

        tokio::spawn(run_worker(id, handler, rx, idle_timeout, close));

        transport
    }

    /// Returns the session id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Returns when the transport was created.
    #[inline]
    #[must_use]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Returns `true` once the close signal has fired.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.close.is_fired()
    }

    /// Attaches the close hook.
    ///
    /// Runs immediately if the transport already closed.
    pub fn on_close(&self, hook: CloseHook) {
        self.close.set_hook(hook);
    }

    /// Handles one inbound body (single message or batch).
    ///
    /// Resolves to `None` when the body held only notifications.
    ///
    /// # Errors
    ///
    /// - [`Error::SessionClosed`] if the transport is closed
    /// - [`Error::InvalidRequest`] if the body is not JSON-RPC
    pub async fn handle(&self, body: Value) -> Result<Option<Value>> {
        if self.is_closed() {
            return Err(Error::session_closed(self.id.clone()));
        }

        let (reply, rx) = oneshot::channel();
        {
            let jobs = self.jobs.lock();
            let sender = jobs
                .as_ref()
                .ok_or_else(|| Error::session_closed(self.id.clone()))?;
            sender
                .send(Job { body, reply })
                .map_err(|_| Error::session_closed(self.id.clone()))?;
        }

        rx.await
            .map_err(|_| Error::session_closed(self.id.clone()))?
    }

    /// Closes the transport. Idempotent.
    ///
    /// Messages already queued are still answered.
    pub fn close(&self) {
        self.jobs.lock().take();
        self.close.fire();
    }
}

// ============================================================================
// Worker
// ============================================================================

async fn run_worker(
    id: SessionId,
    handler: Arc<dyn MessageHandler>,
    mut rx: mpsc::UnboundedReceiver<Job>,
    idle_timeout: Option<Duration>,
    close: Arc<CloseSignal>,
) {
    let _close_on_exit = FireOnDrop(close);
    let mut state = SessionState::default();

    debug!(session_id = %id, "Session worker started");

    loop {
        let next = match idle_timeout {
            Some(window) => match timeout(window, rx.recv()).await {
                Ok(job) => job,
                Err(_) => {
                    info!(session_id = %id, idle_ms = window.as_millis() as u64, "Session idle, closing");
                    break;
                }
            },
            None => rx.recv().await,
        };

        let Some(job) = next else {
            break;
        };

        let outcome = dispatch(handler.as_ref(), &mut state, job.body).await;
        if job.reply.send(outcome).is_err() {
            trace!(session_id = %id, "Caller dropped before reply");
        }
    }

    debug!(session_id = %id, "Session worker terminated");
}

/// Handles a single message or a batch, in order.
async fn dispatch(
    handler: &dyn MessageHandler,
    state: &mut SessionState,
    body: Value,
) -> Result<Option<Value>> {
    match body {
        Value::Array(items) => {
            if items.is_empty() {
                return Err(Error::invalid_request("empty batch"));
            }

            let mut responses = Vec::with_capacity(items.len());
            for item in items {
                let response = match JsonRpcMessage::from_value(item) {
                    Ok(message) => handler.handle(state, message).await,
                    Err(e) => Some(JsonRpcResponse::error(
                        Value::Null,
                        codes::INVALID_REQUEST,
                        e.to_string(),
                    )),
                };
                if let Some(response) = response {
                    responses.push(serde_json::to_value(response)?);
                }
            }

            if responses.is_empty() {
                Ok(None)
            } else {
                Ok(Some(Value::Array(responses)))
            }
        }
        Value::Object(_) => {
            let message = JsonRpcMessage::from_value(body)?;
            match handler.handle(state, message).await {
                Some(response) => Ok(Some(serde_json::to_value(response)?)),
                None => Ok(None),
            }
        }
        _ => Err(Error::invalid_request(
            "body must be a JSON-RPC object or batch",
        )),
    }
}

// ============================================================================
// Tests
// ============================================================================
