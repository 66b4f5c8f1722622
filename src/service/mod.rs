//! Service entry point.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Service`] | Owns the connection, sessions and HTTP listener |
//! | [`ServiceBuilder`] | Fluent configuration builder |

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder for service configuration.
pub mod builder;

/// Service wiring and lifecycle.
pub mod core;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::{
    DEFAULT_BIND_IP, DEFAULT_CONTROLLER_PATH, DEFAULT_PORT, ServiceBuilder, controller_ws_url,
};
pub use core::Service;
