//! Error types for the free@home MCP bridge.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use freehome_mcp::{Error, Result};
//!
//! async fn example(service: &Service) -> Result<()> {
//!     service.start().await?;
//!     service.serve().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Handshake | [`Error::HandshakeAlreadyInProgress`], [`Error::HandshakeFailed`], [`Error::NotConnected`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionClosed`], [`Error::RequestTimeout`], [`Error::Protocol`] |
//! | Session | [`Error::UnknownSession`], [`Error::MissingSession`], [`Error::DuplicateSession`], [`Error::SessionClosed`] |
//! | Request | [`Error::InvalidRequest`], [`Error::MethodNotAllowed`], [`Error::InvalidArgument`] |
//! | Device | [`Error::DeviceNotFound`], [`Error::ChannelNotFound`], [`Error::BackingServiceFailure`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`], [`Error::ChannelClosed`] |
//!
//! # Fault Classes
//!
//! Every error is either a client fault or a server fault, never both.
//! The HTTP boundary uses [`Error::is_client_fault`] to choose between
//! 4xx and 5xx statuses.

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::{RequestId, SessionId};

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when service configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Handshake Errors
    // ========================================================================
    /// A `connect()` call is already waiting for confirmation.
    #[error("Handshake already in progress")]
    HandshakeAlreadyInProgress,

    /// Transport open failed or an error event preempted confirmation.
    ///
    /// Fatal at startup: the service must not begin routing.
    #[error("Handshake failed: {cause}")]
    HandshakeFailed {
        /// Why the handshake did not complete.
        cause: String,
    },

    /// Operation requires a confirmed controller connection.
    #[error("Not connected to free@home controller")]
    NotConnected,

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// WebSocket connection failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Controller connection closed while a request was outstanding.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Controller request timeout.
    #[error("Request {request_id} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The request ID that timed out.
        request_id: RequestId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Protocol violation or error response from the controller.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Session Errors
    // ========================================================================
    /// Request referenced a session id that is not registered.
    #[error("Unknown session: {session_id}")]
    UnknownSession {
        /// The unknown or expired session id.
        session_id: SessionId,
    },

    /// Request carried no session id and does not start a session.
    #[error("Bad Request: No valid session ID provided")]
    MissingSession,

    /// Registry insert collided with an existing id.
    #[error("Duplicate session: {session_id}")]
    DuplicateSession {
        /// The colliding session id.
        session_id: SessionId,
    },

    /// Session transport has already shut down.
    #[error("Session closed: {session_id}")]
    SessionClosed {
        /// The closed session id.
        session_id: SessionId,
    },

    // ========================================================================
    // Request Errors
    // ========================================================================
    /// Inbound payload is not valid JSON or not a JSON-RPC message.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of what was malformed.
        message: String,
    },

    /// HTTP method not supported on the endpoint.
    #[error("Method not allowed: {method}")]
    MethodNotAllowed {
        /// The rejected HTTP method.
        method: String,
    },

    /// Invalid argument in a tool call.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    // ========================================================================
    // Device Errors
    // ========================================================================
    /// Device not known to the controller.
    #[error("Failed to {operation}: Device with ID {device_id} not found")]
    DeviceNotFound {
        /// Operation that looked the device up.
        operation: String,
        /// The missing device id.
        device_id: String,
    },

    /// Channel not present on the device.
    #[error("Failed to {operation}: Channel with ID {channel_id} not found on device {device_id}")]
    ChannelNotFound {
        /// Operation that looked the channel up.
        operation: String,
        /// Device that was searched.
        device_id: String,
        /// The missing channel id.
        channel_id: String,
    },

    /// A forwarded device operation failed in the controller.
    #[error("Failed to {operation}: {cause}")]
    BackingServiceFailure {
        /// Operation that was attempted.
        operation: String,
        /// Underlying failure.
        cause: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// Channel receive error.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a handshake failed error.
    #[inline]
    pub fn handshake_failed(cause: impl Into<String>) -> Self {
        Self::HandshakeFailed {
            cause: cause.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(request_id: RequestId, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            request_id,
            timeout_ms,
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates an unknown session error.
    #[inline]
    pub fn unknown_session(session_id: SessionId) -> Self {
        Self::UnknownSession { session_id }
    }

    /// Creates a duplicate session error.
    #[inline]
    pub fn duplicate_session(session_id: SessionId) -> Self {
        Self::DuplicateSession { session_id }
    }

    /// Creates a session closed error.
    #[inline]
    pub fn session_closed(session_id: SessionId) -> Self {
        Self::SessionClosed { session_id }
    }

    /// Creates an invalid request error.
    #[inline]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates a method not allowed error.
    #[inline]
    pub fn method_not_allowed(method: impl Into<String>) -> Self {
        Self::MethodNotAllowed {
            method: method.into(),
        }
    }

    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a device not found error.
    #[inline]
    pub fn device_not_found(operation: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self::DeviceNotFound {
            operation: operation.into(),
            device_id: device_id.into(),
        }
    }

    /// Creates a channel not found error.
    #[inline]
    pub fn channel_not_found(
        operation: impl Into<String>,
        device_id: impl Into<String>,
        channel_id: impl Into<String>,
    ) -> Self {
        Self::ChannelNotFound {
            operation: operation.into(),
            device_id: device_id.into(),
            channel_id: channel_id.into(),
        }
    }

    /// Creates a backing service failure from any displayable cause.
    #[inline]
    pub fn backing_service(operation: impl Into<String>, cause: impl ToString) -> Self {
        Self::BackingServiceFailure {
            operation: operation.into(),
            cause: cause.to_string(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if the caller sent something the service cannot act on.
    ///
    /// Client faults are not fixed by retrying the same request.
    #[inline]
    #[must_use]
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            Self::UnknownSession { .. }
                | Self::MissingSession
                | Self::SessionClosed { .. }
                | Self::InvalidRequest { .. }
                | Self::MethodNotAllowed { .. }
                | Self::InvalidArgument { .. }
                | Self::DeviceNotFound { .. }
                | Self::ChannelNotFound { .. }
        )
    }

    /// Returns `true` if the failure lies with the service or the controller.
    #[inline]
    #[must_use]
    pub fn is_server_fault(&self) -> bool {
        !self.is_client_fault()
    }

    /// Returns `true` if this is a handshake or connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::HandshakeAlreadyInProgress
                | Self::HandshakeFailed { .. }
                | Self::NotConnected
                | Self::Connection { .. }
                | Self::ConnectionClosed
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed on retry.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NotConnected
                | Self::ConnectionClosed
                | Self::RequestTimeout { .. }
                | Self::BackingServiceFailure { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
