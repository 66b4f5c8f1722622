//! Controller wire messages.
//!
//! Frames exchanged with the free@home controller over its WebSocket.
//! Requests go out, responses and events come back on the same socket.
//!
//! # Formats
//!
//! Request:
//! ```json
//! { "id": "uuid", "method": "devices.get", "params": { "deviceId": "ABB7F500" } }
//! ```
//!
//! Response:
//! ```json
//! { "id": "uuid", "type": "success", "result": { ... } }
//! { "id": "uuid", "type": "error", "error": "code", "message": "text" }
//! ```
//!
//! Event:
//! ```json
//! { "type": "event", "method": "subscribed", "params": true }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::RequestId;

// ============================================================================
// ControllerRequest
// ============================================================================

/// A request from the bridge to the controller.
#[derive(Debug, Clone, Serialize)]
pub struct ControllerRequest {
    /// Unique identifier for request/response correlation.
    pub id: RequestId,

    /// Command with method and params.
    #[serde(flatten)]
    pub command: ControllerCommand,
}

impl ControllerRequest {
    /// Creates a new request with auto-generated ID.
    #[inline]
    #[must_use]
    pub fn new(command: ControllerCommand) -> Self {
        Self {
            id: RequestId::generate(),
            command,
        }
    }
}

// ============================================================================
// ControllerCommand
// ============================================================================

/// Device operations understood by the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum ControllerCommand {
    /// List every device known to the controller.
    #[serde(rename = "devices.list")]
    ListDevices,

    /// Fetch one device including its channels.
    #[serde(rename = "devices.get")]
    GetDevice {
        /// Device serial number.
        #[serde(rename = "deviceId")]
        device_id: String,
    },

    /// Write an input datapoint.
    #[serde(rename = "datapoint.setInput")]
    SetInputDatapoint {
        /// Device serial number.
        #[serde(rename = "deviceId")]
        device_id: String,
        /// Channel number.
        channel: u32,
        /// Datapoint index.
        datapoint: u32,
        /// Value to write.
        value: String,
    },

    /// Write an output datapoint.
    #[serde(rename = "datapoint.setOutput")]
    SetOutputDatapoint {
        /// Device serial number.
        #[serde(rename = "deviceId")]
        device_id: String,
        /// Channel number.
        channel: u32,
        /// Datapoint index.
        datapoint: u32,
        /// Value to write.
        value: String,
    },
}

// ============================================================================
// ControllerResponse
// ============================================================================

/// A response from the controller.
#[derive(Debug, Clone, Deserialize)]
pub struct ControllerResponse {
    /// Matches the request `id`.
    pub id: RequestId,

    /// Response type.
    #[serde(rename = "type")]
    pub response_type: ResponseType,

    /// Result data (if success).
    #[serde(default)]
    pub result: Option<Value>,

    /// Error code (if error).
    #[serde(default)]
    pub error: Option<String>,

    /// Error message (if error).
    #[serde(default)]
    pub message: Option<String>,
}

impl ControllerResponse {
    /// Returns `true` if this is a success response.
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.response_type == ResponseType::Success
    }

    /// Extracts the result value, returning error if response was error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the response was an error.
    pub fn into_result(self) -> Result<Value> {
        match self.response_type {
            ResponseType::Success => Ok(self.result.unwrap_or(Value::Null)),
            ResponseType::Error => {
                let error_code = self.error.unwrap_or_else(|| "unknown error".to_string());
                let message = self.message.unwrap_or_else(|| error_code.clone());
                Err(Error::protocol(message))
            }
        }
    }
}

/// Response type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// Successful response.
    Success,
    /// Error response.
    Error,
}

// ============================================================================
// RawEvent
// ============================================================================

/// An unparsed event frame pushed by the controller.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEvent {
    /// Event type marker (always "event").
    #[serde(rename = "type")]
    pub event_type: String,

    /// Event name.
    pub method: String,

    /// Event-specific data.
    #[serde(default)]
    pub params: Value,
}

impl RawEvent {
    /// Parses the frame into a typed event.
    ///
    /// Returns `None` for frames that are not events or carry an
    /// unrecognised method.
    #[must_use]
    pub fn parse(&self) -> Option<ControllerEvent> {
        if self.event_type != "event" {
            return None;
        }

        match self.method.as_str() {
            "update" => Some(ControllerEvent::Update(self.params.clone())),
            "error" => Some(ControllerEvent::Error(error_payload(&self.params))),
            "subscribed" => Some(ControllerEvent::Subscribed {
                confirmed: subscribed_flag(&self.params),
            }),
            _ => None,
        }
    }
}

/// Error events carry either a bare string or `{ "message": ... }`.
fn error_payload(params: &Value) -> String {
    match params {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| params.to_string()),
        Value::Null => "unknown controller error".to_string(),
        other => other.to_string(),
    }
}

/// Subscription events carry either a bare bool or `{ "result": bool }`.
fn subscribed_flag(params: &Value) -> bool {
    params
        .as_bool()
        .or_else(|| params.get("result").and_then(Value::as_bool))
        .unwrap_or(false)
}

// ============================================================================
// ControllerEvent
// ============================================================================

/// Typed out-of-band notification from the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    /// Datapoint or device update. Informational only.
    Update(Value),
    /// Controller-side error.
    Error(String),
    /// Subscription confirmed (`true`) or revoked (`false`).
    Subscribed {
        /// Whether the subscription is active.
        confirmed: bool,
    },
}

impl ControllerEvent {
    /// Short name for logging.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Update(_) => "update",
            Self::Error(_) => "error",
            Self::Subscribed { .. } => "subscribed",
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
