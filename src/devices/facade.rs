//! Device-operations facade.
//!
//! Gates every operation on a confirmed controller connection and turns
//! collaborator failures into [`Error::BackingServiceFailure`].

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::controller::HandshakeCoordinator;
use crate::error::{Error, Result};

use super::api::DeviceApi;
use super::model::{DatapointAddress, Datapoints, DeviceSummary};

// ============================================================================
// Constants
// ============================================================================

/// Operation names used in error messages.
const GET_DEVICE_INFO: &str = "get device info";
const GET_DATAPOINTS: &str = "get datapoints";

// ============================================================================
// DeviceService
// ============================================================================

/// Device operations for the tool layer.
#[derive(Clone)]
pub struct DeviceService {
    /// Raw controller operations.
    api: Arc<dyn DeviceApi>,
    /// Connection whose state gates every call.
    coordinator: Arc<HandshakeCoordinator>,
}

impl fmt::Debug for DeviceService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceService")
            .field("state", &self.coordinator.state())
            .finish_non_exhaustive()
    }
}

impl DeviceService {
    /// Creates a facade over `api`.
    #[must_use]
    pub fn new(api: Arc<dyn DeviceApi>, coordinator: Arc<HandshakeCoordinator>) -> Self {
        Self { api, coordinator }
    }

    /// Lists every device as `{id, name}`.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] unless the connection is confirmed
    /// - [`Error::BackingServiceFailure`] if the controller call fails
    pub async fn get_devices(&self) -> Result<Vec<DeviceSummary>> {
        self.ensure_connected()?;

        let devices = self
            .api
            .list_devices()
            .await
            .map_err(|e| Error::backing_service("get devices", e))?;

        debug!(count = devices.len(), "Listed devices");
        Ok(devices.iter().map(DeviceSummary::from).collect())
    }

    /// Returns `{id, name}` for one device.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] unless the connection is confirmed
    /// - [`Error::DeviceNotFound`] if the controller does not know the id
    /// - [`Error::BackingServiceFailure`] if the controller call fails
    pub async fn get_device_info(&self, device_id: &str) -> Result<DeviceSummary> {
        self.ensure_connected()?;

        let device = self
            .api
            .get_device(device_id)
            .await
            .map_err(|e| Error::backing_service(GET_DEVICE_INFO, e))?
            .ok_or_else(|| Error::device_not_found(GET_DEVICE_INFO, device_id))?;

        Ok(DeviceSummary::info(&device))
    }

    /// Writes one datapoint.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] unless the connection is confirmed
    /// - [`Error::InvalidArgument`] if the channel or datapoint cannot be parsed
    /// - [`Error::BackingServiceFailure`] if the controller call fails
    pub async fn set_device_state(
        &self,
        device_id: &str,
        channel_id: &str,
        datapoint: &str,
        value: &str,
    ) -> Result<bool> {
        self.ensure_connected()?;

        let address = DatapointAddress::parse(channel_id, datapoint)?;

        self.api
            .set_datapoint(device_id, address, value)
            .await
            .map_err(|e| Error::backing_service("set device state", e))?;

        debug!(device_id, ?address, value, "Datapoint written");
        Ok(true)
    }

    /// Returns the input and output datapoints of one channel.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] unless the connection is confirmed
    /// - [`Error::DeviceNotFound`] / [`Error::ChannelNotFound`] for unknown ids
    /// - [`Error::BackingServiceFailure`] if the controller call fails
    pub async fn get_datapoints(&self, device_id: &str, channel_id: &str) -> Result<Datapoints> {
        self.ensure_connected()?;

        let device = self
            .api
            .get_device(device_id)
            .await
            .map_err(|e| Error::backing_service(GET_DATAPOINTS, e))?
            .ok_or_else(|| Error::device_not_found(GET_DATAPOINTS, device_id))?;

        let channel = device
            .channels
            .get(channel_id)
            .ok_or_else(|| Error::channel_not_found(GET_DATAPOINTS, device_id, channel_id))?;

        Ok(Datapoints::from(channel))
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.coordinator.is_confirmed() {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
