//! Device tools exposed through `tools/list` and `tools/call`.
//!
//! | Tool | Arguments | Result |
//! |------|-----------|--------|
//! | `get_devices` | none | `[{id, name}]` |
//! | `get_device_info` | `deviceId` | `{id, name}` |
//! | `set_device_state` | `deviceId`, `channelId`, `datapoint`, `value` | `{success}` |
//! | `get_datapoints` | `deviceId`, `channelId` | `{inputs, outputs}` |

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Value, json};

use crate::devices::DeviceService;
use crate::error::{Error, Result};

// ============================================================================
// Catalogue
// ============================================================================

/// Returns the tool descriptors advertised by `tools/list`.
#[must_use]
pub fn catalogue() -> Value {
    json!([
        {
            "name": "get_devices",
            "description": "Get all devices from the free@home system",
            "inputSchema": { "type": "object", "properties": {} }
        },
        {
            "name": "get_device_info",
            "description": "Get detailed information about a specific device",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "deviceId": {
                        "type": "string",
                        "description": "The ID of the device to get information for"
                    }
                },
                "required": ["deviceId"]
            }
        },
        {
            "name": "set_device_state",
            "description": "Control a device by setting its state",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "deviceId": { "type": "string", "description": "The ID of the device to control" },
                    "channelId": { "type": "string", "description": "The channel ID of the device" },
                    "datapoint": {
                        "type": "string",
                        "description": "The datapoint to set (e.g., \"odp0000\" for switch)"
                    },
                    "value": { "type": "string", "description": "The value to set" }
                },
                "required": ["deviceId", "channelId", "datapoint", "value"]
            }
        },
        {
            "name": "get_datapoints",
            "description": "Get all datapoints for a specific device and channel",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "deviceId": { "type": "string", "description": "The ID of the device" },
                    "channelId": { "type": "string", "description": "The channel ID" }
                },
                "required": ["deviceId", "channelId"]
            }
        }
    ])
}

// ============================================================================
// ToolCall
// ============================================================================

/// A validated tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
    /// List every device.
    GetDevices,
    /// Describe one device.
    GetDeviceInfo {
        /// Device serial number.
        device_id: String,
    },
    /// Write one datapoint.
    SetDeviceState {
        /// Device serial number.
        device_id: String,
        /// Channel id, e.g. `ch0000`.
        channel_id: String,
        /// Datapoint, e.g. `odp0000`.
        datapoint: String,
        /// Value to write.
        value: String,
    },
    /// Read the datapoints of one channel.
    GetDatapoints {
        /// Device serial number.
        device_id: String,
        /// Channel id.
        channel_id: String,
    },
}

impl ToolCall {
    /// Validates `name` and its `arguments`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for unknown tools and for required
    /// arguments that are missing, empty, or not strings.
    pub fn parse(name: &str, arguments: Option<&Value>) -> Result<Self> {
        match name {
            "get_devices" => Ok(Self::GetDevices),
            "get_device_info" => {
                let device_id = required(arguments, "deviceId")
                    .ok_or_else(|| Error::invalid_argument("deviceId is required and must be a string"))?;
                Ok(Self::GetDeviceInfo { device_id })
            }
            "set_device_state" => {
                let fields = (
                    required(arguments, "deviceId"),
                    required(arguments, "channelId"),
                    required(arguments, "datapoint"),
                    required(arguments, "value"),
                );
                match fields {
                    (Some(device_id), Some(channel_id), Some(datapoint), Some(value)) => {
                        Ok(Self::SetDeviceState {
                            device_id,
                            channel_id,
                            datapoint,
                            value,
                        })
                    }
                    _ => Err(Error::invalid_argument(
                        "deviceId, channelId, datapoint, and value are required and must be strings",
                    )),
                }
            }
            "get_datapoints" => {
                match (required(arguments, "deviceId"), required(arguments, "channelId")) {
                    (Some(device_id), Some(channel_id)) => Ok(Self::GetDatapoints {
                        device_id,
                        channel_id,
                    }),
                    _ => Err(Error::invalid_argument(
                        "deviceId and channelId are required and must be strings",
                    )),
                }
            }
            other => Err(Error::invalid_argument(format!("Unknown tool: {other}"))),
        }
    }

    /// Returns the tool name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::GetDevices => "get_devices",
            Self::GetDeviceInfo { .. } => "get_device_info",
            Self::SetDeviceState { .. } => "set_device_state",
            Self::GetDatapoints { .. } => "get_datapoints",
        }
    }

    /// Runs the call against the device facade.
    ///
    /// # Errors
    ///
    /// Propagates the facade's error.
    pub async fn execute(&self, devices: &DeviceService) -> Result<Value> {
        let value = match self {
            Self::GetDevices => serde_json::to_value(devices.get_devices().await?)?,
            Self::GetDeviceInfo { device_id } => {
                serde_json::to_value(devices.get_device_info(device_id).await?)?
            }
            Self::SetDeviceState {
                device_id,
                channel_id,
                datapoint,
                value,
            } => {
                let success = devices
                    .set_device_state(device_id, channel_id, datapoint, value)
                    .await?;
                json!({ "success": success })
            }
            Self::GetDatapoints {
                device_id,
                channel_id,
            } => serde_json::to_value(devices.get_datapoints(device_id, channel_id).await?)?,
        };
        Ok(value)
    }
}

/// Returns a non-empty string argument.
fn required(arguments: Option<&Value>, key: &str) -> Option<String> {
    arguments
        .and_then(|args| args.get(key))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

// ============================================================================
// Results
// ============================================================================

/// Wraps a tool outcome as an MCP `CallToolResult`.
///
/// Failures become a text result flagged with `isError`.
#[must_use]
pub fn tool_result(outcome: Result<Value>) -> Value {
    match outcome {
        Ok(value) => {
            let text = serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
            json!({ "content": [{ "type": "text", "text": text }] })
        }
        Err(e) => json!({
            "content": [{ "type": "text", "text": format!("Error: {e}") }],
            "isError": true
        }),
    }
}

// ============================================================================
// Tests
// ============================================================================
