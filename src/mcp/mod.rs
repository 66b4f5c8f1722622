//! MCP method handling and device tools.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `handler` | [`McpHandler`], per-message method dispatch |
//! | `tools` | Tool catalogue, argument validation, result wrapping |

// ============================================================================
// Submodules
// ============================================================================

/// Method dispatch.
pub mod handler;

/// Device tools.
pub mod tools;

// ============================================================================
// Re-exports
// ============================================================================

pub use handler::{DEFAULT_PROTOCOL_VERSION, McpHandler, SERVER_NAME, SERVER_VERSION};
pub use tools::{ToolCall, catalogue, tool_result};
