//! Device data model and operations facade.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `api` | [`DeviceApi`] trait implemented by the controller link |
//! | `facade` | [`DeviceService`], connection-gated operations |
//! | `model` | Devices, channels, datapoint addressing |

// ============================================================================
// Submodules
// ============================================================================

/// Raw device operations.
pub mod api;

/// Connection-gated device operations.
pub mod facade;

/// Device data model.
pub mod model;

// ============================================================================
// Re-exports
// ============================================================================

pub use api::DeviceApi;
pub use facade::DeviceService;
pub use model::{
    Channel, DatapointAddress, DatapointKind, Datapoints, Device, DeviceSummary,
    parse_channel_id, parse_datapoint,
};
