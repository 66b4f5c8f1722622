//! Session multiplexing over the shared `/mcp` endpoint.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `registry` | [`SessionRegistry`], id → transport table |
//! | `transport` | [`SessionTransport`], ordered per-session worker |

// ============================================================================
// Submodules
// ============================================================================

/// Session id → transport table.
pub mod registry;

/// Per-session transport.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

pub use registry::SessionRegistry;
pub use transport::{CloseHook, MessageHandler, SessionState, SessionTransport};
