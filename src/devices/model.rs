//! Device data model and datapoint addressing.
//!
//! free@home addresses a writable value as device → channel → datapoint.
//! Channels are named `ch0000`, datapoints `idp0000` (input) or `odp0000`
//! (output) with a hexadecimal index.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

// ============================================================================
// Device
// ============================================================================

/// A device as reported by the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Serial number, used as the device id in listings.
    #[serde(default)]
    pub serial_number: String,

    /// Device id as reported by single-device lookups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,

    /// User-facing name.
    #[serde(default)]
    pub display_name: String,

    /// Channels keyed by channel id (`ch0000`).
    #[serde(default)]
    pub channels: BTreeMap<String, Channel>,
}

/// One functional channel of a device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    /// User-facing name.
    #[serde(default)]
    pub display_name: Option<String>,

    /// Input datapoints keyed by name (`idp0000`).
    #[serde(default)]
    pub inputs: Map<String, Value>,

    /// Output datapoints keyed by name (`odp0000`).
    #[serde(default)]
    pub outputs: Map<String, Value>,
}

// ============================================================================
// Facade Views
// ============================================================================

/// Id and name of a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceSummary {
    /// Device serial number.
    pub id: String,
    /// Display name.
    pub name: String,
}

impl DeviceSummary {
    /// Summary of a single-device lookup: `deviceId`, else the serial number.
    #[must_use]
    pub fn info(device: &Device) -> Self {
        let id = device
            .device_id
            .clone()
            .unwrap_or_else(|| device.serial_number.clone());
        Self {
            id,
            name: device.display_name.clone(),
        }
    }
}

impl From<&Device> for DeviceSummary {
    fn from(device: &Device) -> Self {
        Self {
            id: device.serial_number.clone(),
            name: device.display_name.clone(),
        }
    }
}

/// Input and output datapoints of one channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Datapoints {
    /// Input datapoints.
    pub inputs: Map<String, Value>,
    /// Output datapoints.
    pub outputs: Map<String, Value>,
}

impl From<&Channel> for Datapoints {
    fn from(channel: &Channel) -> Self {
        Self {
            inputs: channel.inputs.clone(),
            outputs: channel.outputs.clone(),
        }
    }
}

// ============================================================================
// DatapointAddress
// ============================================================================

/// Direction of a datapoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatapointKind {
    /// Written by the user (`idp`).
    Input,
    /// Reported by the device (`odp`).
    Output,
}

/// Fully resolved target of a datapoint write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DatapointAddress {
    /// Channel number.
    pub channel: u32,
    /// Input or output.
    pub kind: DatapointKind,
    /// Datapoint index.
    pub index: u32,
}

impl DatapointAddress {
    /// Resolves a channel id and datapoint name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if either part is not numeric.
    pub fn parse(channel_id: &str, datapoint: &str) -> Result<Self> {
        let channel = parse_channel_id(channel_id)?;
        let (kind, index) = parse_datapoint(datapoint)?;
        Ok(Self {
            channel,
            kind,
            index,
        })
    }
}

/// Parses `ch0003` or `3` into a channel number.
pub fn parse_channel_id(channel_id: &str) -> Result<u32> {
    let digits = channel_id.strip_prefix("ch").unwrap_or(channel_id);
    digits
        .parse()
        .map_err(|_| Error::invalid_argument(format!("invalid channel id: {channel_id}")))
}

/// Parses `idpXXXX`/`odpXXXX` (hex) or a bare decimal index (input).
pub fn parse_datapoint(datapoint: &str) -> Result<(DatapointKind, u32)> {
    let invalid = || Error::invalid_argument(format!("invalid datapoint: {datapoint}"));

    if let Some(hex) = datapoint.strip_prefix("idp") {
        let index = u32::from_str_radix(hex, 16).map_err(|_| invalid())?;
        return Ok((DatapointKind::Input, index));
    }

    if let Some(hex) = datapoint.strip_prefix("odp") {
        let index = u32::from_str_radix(hex, 16).map_err(|_| invalid())?;
        return Ok((DatapointKind::Output, index));
    }

    let index = datapoint.parse().map_err(|_| invalid())?;
    Ok((DatapointKind::Input, index))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_parse_channel_id() {
        assert_eq!(parse_channel_id("ch0003").expect("prefixed"), 3);
        assert_eq!(parse_channel_id("12").expect("bare"), 12);
        assert!(parse_channel_id("chXY").is_err());
        assert!(parse_channel_id("").is_err());
    }

    #[test]
    fn test_parse_datapoint_hex() {
        assert_eq!(
            parse_datapoint("idp0010").expect("input"),
            (DatapointKind::Input, 16)
        );
        assert_eq!(
            parse_datapoint("odp000a").expect("output"),
            (DatapointKind::Output, 10)
        );
    }

    #[test]
    fn test_parse_datapoint_decimal_is_input() {
        assert_eq!(
            parse_datapoint("10").expect("decimal"),
            (DatapointKind::Input, 10)
        );
    }

    #[test]
    fn test_parse_datapoint_invalid() {
        let err = parse_datapoint("odpzz").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
        assert!(parse_datapoint("switch").is_err());
    }

    #[test]
    fn test_address_parse() {
        let address = DatapointAddress::parse("ch0000", "idp0000").expect("parse");
        assert_eq!(
            address,
            DatapointAddress {
                channel: 0,
                kind: DatapointKind::Input,
                index: 0,
            }
        );
    }

    #[test]
    fn test_device_deserialization() {
        let device: Device = serde_json::from_value(json!({
            "serialNumber": "ABB7F500",
            "displayName": "Living room",
            "channels": {
                "ch0000": {
                    "displayName": "Ceiling light",
                    "inputs": {"idp0000": {"pairingID": 1, "value": "0"}},
                    "outputs": {"odp0000": {"pairingID": 256, "value": "1"}}
                }
            }
        }))
        .expect("parse");

        assert_eq!(device.serial_number, "ABB7F500");
        let channel = &device.channels["ch0000"];
        assert_eq!(channel.display_name.as_deref(), Some("Ceiling light"));
        assert!(channel.inputs.contains_key("idp0000"));
        assert!(channel.outputs.contains_key("odp0000"));
    }

    #[test]
    fn test_device_id_only_and_defaults() {
        let device: Device = serde_json::from_value(json!({"deviceId": "7EB1000"})).expect("parse");
        assert_eq!(device.device_id.as_deref(), Some("7EB1000"));
        assert!(device.serial_number.is_empty());
        assert!(device.display_name.is_empty());
        assert!(device.channels.is_empty());
        assert_eq!(DeviceSummary::info(&device).id, "7EB1000");
    }

    #[test]
    fn test_device_with_serial_and_device_id() {
        let device: Device = serde_json::from_value(json!({
            "serialNumber": "ABB7F500",
            "deviceId": "ABB7F501",
            "displayName": "Kitchen"
        }))
        .expect("both keys parse");

        assert_eq!(device.serial_number, "ABB7F500");
        assert_eq!(device.device_id.as_deref(), Some("ABB7F501"));
        assert_eq!(DeviceSummary::from(&device).id, "ABB7F500");
        assert_eq!(DeviceSummary::info(&device).id, "ABB7F501");
    }

    #[test]
    fn test_summary_from_device() {
        let device: Device = serde_json::from_value(
            json!({"serialNumber": "ABB7F500", "displayName": "Hall"}),
        )
        .expect("parse");
        let summary = DeviceSummary::from(&device);
        assert_eq!(summary.id, "ABB7F500");
        assert_eq!(summary.name, "Hall");
    }
}
