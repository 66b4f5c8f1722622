//! Device operations exposed by the controller.

use async_trait::async_trait;

use crate::error::Result;

use super::model::{DatapointAddress, Device};

/// Raw device operations.
///
/// Implemented by [`crate::controller::ControllerConnection`]. Errors are
/// the collaborator's own; [`super::DeviceService`] wraps them.
#[async_trait]
pub trait DeviceApi: Send + Sync {
    /// Lists every device.
    async fn list_devices(&self) -> Result<Vec<Device>>;

    /// Fetches one device, `None` if unknown.
    async fn get_device(&self, device_id: &str) -> Result<Option<Device>>;

    /// Writes a datapoint value.
    async fn set_datapoint(
        &self,
        device_id: &str,
        address: DatapointAddress,
        value: &str,
    ) -> Result<()>;
}
