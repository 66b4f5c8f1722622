//! Controller connection layer.
//!
//! Owns the single outbound link to the free@home controller and the
//! handshake that makes it usable.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐   open / close   ┌──────────────────────┐
//! │ HandshakeCoordinator │─────────────────►│ ControllerConnection │◄──► controller
//! │  state + pending     │◄─────────────────│  WebSocket event loop│     (ws/wss)
//! └──────────────────────┘     on_event     └──────────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `HandshakeCoordinator::new` - Registers itself as the link's event handler
//! 2. `connect()` - Stores the pending handshake, opens the WebSocket
//! 3. `subscribed(true)` event - Fulfils the handshake, state `Confirmed`
//! 4. `disconnect()` - Closes the socket, state `Disconnected`
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | WebSocket link and device requests |
//! | `handshake` | Connection state machine |
//! | `link` | `ControllerLink` trait |

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket link to the controller.
pub mod connection;

/// Connection handshake state machine.
pub mod handshake;

/// Link abstraction.
pub mod link;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{ControllerConnection, ControllerEndpoint, Credentials, DEFAULT_REQUEST_TIMEOUT};
pub use handshake::{ConnectionState, DEFAULT_HANDSHAKE_TIMEOUT, HandshakeCoordinator};
pub use link::{ControllerLink, EventHandler};
