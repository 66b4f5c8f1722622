//! Request router.
//!
//! Decides, for every inbound request, whether it belongs to a live session,
//! bootstraps a new one, or is rejected.
//!
//! # Decision order
//!
//! | Session id | Payload | Outcome |
//! |------------|---------|---------|
//! | registered | any | Forwarded to that session's transport |
//! | unregistered | any | [`Error::UnknownSession`] |
//! | absent | `initialize` request | New session (requires a confirmed connection) |
//! | absent | anything else | [`Error::MissingSession`] |
//!
//! Only the bootstrap branch mutates the registry.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info};

use crate::controller::HandshakeCoordinator;
use crate::error::{Error, Result};
use crate::identifiers::SessionId;
use crate::protocol::is_initialize_request;
use crate::session::{MessageHandler, SessionRegistry, SessionTransport};

// ============================================================================
// Types
// ============================================================================

/// What the client asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Deliver a JSON-RPC body.
    Post(Vec<u8>),
    /// Terminate the session.
    Delete,
    /// Open a server-initiated stream.
    Get,
}

/// One request at the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundRequest {
    /// Value of the session header, if any.
    pub session_id: Option<SessionId>,
    /// Requested action.
    pub action: Inbound,
}

impl InboundRequest {
    /// A `POST` carrying `body`.
    #[must_use]
    pub fn post(session_id: Option<SessionId>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            session_id,
            action: Inbound::Post(body.into()),
        }
    }

    /// A `DELETE` for `session_id`.
    #[must_use]
    pub fn delete(session_id: Option<SessionId>) -> Self {
        Self {
            session_id,
            action: Inbound::Delete,
        }
    }
}

/// Result of a successfully routed request.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    /// A new session was opened.
    Created {
        /// Freshly generated id.
        session_id: SessionId,
        /// Response to the initialize request.
        body: Option<Value>,
    },
    /// Forwarded to an existing session.
    Reply {
        /// Session that handled the request.
        session_id: SessionId,
        /// Response; `None` for pure notifications.
        body: Option<Value>,
    },
    /// The session was closed on request.
    Terminated {
        /// Session that was closed.
        session_id: SessionId,
    },
}

impl RouteOutcome {
    /// Returns the session the request was routed to.
    #[inline]
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        match self {
            Self::Created { session_id, .. }
            | Self::Reply { session_id, .. }
            | Self::Terminated { session_id } => session_id,
        }
    }

    /// Returns the response body, if any.
    #[inline]
    #[must_use]
    pub fn body(&self) -> Option<&Value> {
        match self {
            Self::Created { body, .. } | Self::Reply { body, .. } => body.as_ref(),
            Self::Terminated { .. } => None,
        }
    }
}

// ============================================================================
// RequestRouter
// ============================================================================

/// Boundary-facing dispatcher.
pub struct RequestRouter {
    /// Live sessions.
    registry: Arc<SessionRegistry>,
    /// Gates session creation.
    coordinator: Arc<HandshakeCoordinator>,
    /// Shared by every session's transport.
    handler: Arc<dyn MessageHandler>,
    /// Idle window for new transports.
    idle_timeout: Option<Duration>,
}

impl fmt::Debug for RequestRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestRouter")
            .field("sessions", &self.registry.len())
            .field("state", &self.coordinator.state())
            .field("idle_timeout", &self.idle_timeout)
            .finish_non_exhaustive()
    }
}

impl RequestRouter {
    /// Creates a router.
    #[must_use]
    pub fn new(
        registry: Arc<SessionRegistry>,
        coordinator: Arc<HandshakeCoordinator>,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        Self {
            registry,
            coordinator,
            handler,
            idle_timeout: None,
        }
    }

    /// Closes sessions that stay idle for `idle_timeout`.
    #[must_use]
    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Returns the session registry.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Routes one request.
    ///
    /// # Errors
    ///
    /// Client faults:
    /// - [`Error::UnknownSession`] for an unregistered or expired id
    /// - [`Error::MissingSession`] for a non-initialize request without id
    /// - [`Error::InvalidRequest`] for a body that is not JSON
    /// - [`Error::MethodNotAllowed`] for `GET` without id or on a known session
    ///
    /// Server faults:
    /// - [`Error::NotConnected`] if a session would be created before the
    ///   controller connection is confirmed
    /// - [`Error::DuplicateSession`] on an id collision
    pub async fn route(&self, request: InboundRequest) -> Result<RouteOutcome> {
        let InboundRequest { session_id, action } = request;

        let Some(session_id) = session_id else {
            return match action {
                Inbound::Post(body) => {
                    let body = parse_body(&body)?;
                    if is_initialize_request(&body) {
                        self.open_session(body).await
                    } else {
                        Err(Error::MissingSession)
                    }
                }
                Inbound::Delete => Err(Error::MissingSession),
                Inbound::Get => Err(Error::method_not_allowed("GET")),
            };
        };

        // An unknown id is reported as such whatever the method.
        let transport = self
            .registry
            .lookup(&session_id)
            .ok_or_else(|| Error::unknown_session(session_id.clone()))?;

        match action {
            Inbound::Post(body) => {
                let body = parse_body(&body)?;
                let reply = transport.handle(body).await.map_err(expired)?;
                Ok(RouteOutcome::Reply {
                    session_id,
                    body: reply,
                })
            }
            Inbound::Delete => {
                transport.close();
                info!(session_id = %session_id, "Session terminated by client");
                Ok(RouteOutcome::Terminated { session_id })
            }
            Inbound::Get => Err(Error::method_not_allowed("GET")),
        }
    }

    /// Bootstraps a session for an initialize request.
    async fn open_session(&self, body: Value) -> Result<RouteOutcome> {
        if !self.coordinator.is_confirmed() {
            debug!(state = %self.coordinator.state(), "Refusing session before connection confirmed");
            return Err(Error::NotConnected);
        }

        let session_id = SessionId::generate();
        let transport = SessionTransport::spawn(
            session_id.clone(),
            Arc::clone(&self.handler),
            self.idle_timeout,
        );

        if let Err(e) = self.registry.create(session_id.clone(), Arc::clone(&transport)) {
            transport.close();
            return Err(e);
        }

        let registry = Arc::downgrade(&self.registry);
        transport.on_close(Box::new(move |id| {
            if let Some(registry) = registry.upgrade() {
                registry.remove(id);
            }
        }));

        match transport.handle(body).await {
            Ok(reply) => Ok(RouteOutcome::Created {
                session_id,
                body: reply,
            }),
            Err(e) => {
                transport.close();
                Err(expired(e))
            }
        }
    }
}

/// Parses a request body as JSON.
fn parse_body(body: &[u8]) -> Result<Value> {
    serde_json::from_slice(body).map_err(|e| Error::invalid_request(format!("Parse error: {e}")))
}

/// Reports a transport that closed mid-request as an expired session.
fn expired(error: Error) -> Error {
    match error {
        Error::SessionClosed { session_id } => Error::UnknownSession { session_id },
        other => other,
    }
}

// ============================================================================
// Tests
// ============================================================================
