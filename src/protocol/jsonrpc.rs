//! JSON-RPC 2.0 messages on the inbound boundary.
//!
//! MCP clients speak JSON-RPC over HTTP. This module only models the
//! envelope; method semantics live in [`crate::mcp`].

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Protocol version marker carried by every message.
pub const JSONRPC_VERSION: &str = "2.0";

/// Standard and server-defined JSON-RPC error codes.
pub mod codes {
    /// Invalid JSON was received.
    pub const PARSE_ERROR: i64 = -32700;
    /// The JSON sent is not a valid request object.
    pub const INVALID_REQUEST: i64 = -32600;
    /// The method does not exist.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Invalid method parameters.
    pub const INVALID_PARAMS: i64 = -32602;
    /// Internal error.
    pub const INTERNAL_ERROR: i64 = -32603;
    /// Generic transport-level rejection (bad or missing session).
    pub const SERVER_ERROR: i64 = -32000;
    /// Session id not registered.
    pub const SESSION_NOT_FOUND: i64 = -32001;
    /// Controller connection not confirmed yet.
    pub const NOT_READY: i64 = -32002;
}

// ============================================================================
// JsonRpcMessage
// ============================================================================

/// An inbound request or notification.
///
/// A message without `id` is a notification and gets no response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcMessage {
    /// Always `"2.0"`.
    pub jsonrpc: String,

    /// Request id; absent for notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,

    /// Method name.
    pub method: String,

    /// Method parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcMessage {
    /// Parses a single message from a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if the value is not a JSON-RPC 2.0
    /// request or notification.
    pub fn from_value(value: Value) -> Result<Self> {
        let message: Self = serde_json::from_value(value)
            .map_err(|e| Error::invalid_request(format!("not a JSON-RPC message: {e}")))?;

        if message.jsonrpc != JSONRPC_VERSION {
            return Err(Error::invalid_request(format!(
                "unsupported jsonrpc version: {}",
                message.jsonrpc
            )));
        }

        Ok(message)
    }

    /// Returns `true` if this message expects no response.
    #[inline]
    #[must_use]
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Returns a named parameter, if present.
    #[inline]
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.as_ref().and_then(|p| p.get(key))
    }
}

// ============================================================================
// JsonRpcResponse
// ============================================================================

/// An outbound response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Always `"2.0"`.
    pub jsonrpc: String,

    /// Echoes the request id; `null` when the request could not be read.
    pub id: Value,

    /// Success payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Error payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Creates a success response.
    #[inline]
    #[must_use]
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Creates an error response.
    #[inline]
    #[must_use]
    pub fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    /// Returns `true` if this is an error response.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Error object inside a [`JsonRpcResponse`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Numeric error code (see [`codes`]).
    pub code: i64,

    /// Human-readable message.
    pub message: String,

    /// Optional structured detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

// ============================================================================
// Session Bootstrap Detection
// ============================================================================

/// Returns `true` if `body` is a well-formed MCP `initialize` request.
///
/// Only a single object qualifies; batches never open a session.
#[must_use]
pub fn is_initialize_request(body: &Value) -> bool {
    let Some(object) = body.as_object() else {
        return false;
    };

    object.get("jsonrpc").and_then(Value::as_str) == Some(JSONRPC_VERSION)
        && object.get("method").and_then(Value::as_str) == Some("initialize")
        && object.get("id").is_some_and(|id| !id.is_null())
        && object
            .get("params")
            .and_then(|p| p.get("protocolVersion"))
            .is_some_and(Value::is_string)
}

// ============================================================================
// Tests
// ============================================================================
