//! Wire message types.
//!
//! Two protocols meet in this crate:
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `ControllerRequest` | Bridge → Controller | Device operation |
//! | `ControllerResponse` | Controller → Bridge | Operation result |
//! | `RawEvent` / `ControllerEvent` | Controller → Bridge | Out-of-band notification |
//! | `JsonRpcMessage` | Client → Bridge | MCP request or notification |
//! | `JsonRpcResponse` | Bridge → Client | MCP response |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `controller` | Controller WebSocket frames |
//! | `jsonrpc` | JSON-RPC 2.0 envelope and `initialize` detection |

// ============================================================================
// Submodules
// ============================================================================

/// Controller WebSocket frames.
pub mod controller;

/// JSON-RPC 2.0 envelope.
pub mod jsonrpc;

// ============================================================================
// Re-exports
// ============================================================================

pub use controller::{
    ControllerCommand, ControllerEvent, ControllerRequest, ControllerResponse, RawEvent,
    ResponseType,
};
pub use jsonrpc::{JsonRpcError, JsonRpcMessage, JsonRpcResponse, codes, is_initialize_request};
