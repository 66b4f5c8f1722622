//! free@home MCP - Model Context Protocol bridge for ABB free@home.
//!
//! This library exposes the devices of one free@home controller as MCP
//! tools over the streamable-HTTP transport.
//!
//! # Architecture
//!
//! The service sits between MCP clients and the controller:
//!
//! - **Inbound (HTTP)**: JSON-RPC on `/mcp`, multiplexed by `mcp-session-id`
//! - **Outbound (WebSocket)**: One subscribed link to the controller
//!
//! Key design principles:
//!
//! - The controller link is usable only after its asynchronous
//!   `subscribed` confirmation, awaited by a single-fulfilment handshake
//! - Each session owns one transport whose worker handles messages in order
//! - The session table is the only structure written by concurrent requests
//! - Connection and registry are constructed once and passed explicitly
//!
//! # Quick Start
//!
//! ```no_run
//! use freehome_mcp::{Result, Service};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let service = Service::builder()
//!         .controller_url("http://192.168.1.10")
//!         .credentials("installer", "secret")
//!         .build()?;
//!
//!     // Blocks until the controller confirms the subscription
//!     service.start().await?;
//!
//!     // Serves http://127.0.0.1:3000/mcp until Ctrl-C
//!     service.serve().await
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | CLI / environment configuration |
//! | [`controller`] | Controller link and handshake coordinator |
//! | [`devices`] | Device model and operations facade |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Session and request id wrappers |
//! | [`mcp`] | MCP method dispatch and tools |
//! | [`protocol`] | Controller and JSON-RPC message types |
//! | [`router`] | Request router |
//! | [`server`] | axum adapter for `/mcp` |
//! | [`service`] | Service wiring and lifecycle |
//! | [`session`] | Session registry and per-session transports |

// ============================================================================
// Modules
// ============================================================================

/// Command-line and environment configuration.
pub mod config;

/// Controller connection layer.
///
/// - [`HandshakeCoordinator`] - Connection state machine
/// - [`ControllerConnection`] - WebSocket link to the controller
pub mod controller;

/// Device data model and operations facade.
pub mod devices;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// MCP method handling.
pub mod mcp;

/// Wire message types.
///
/// Controller frames and JSON-RPC envelopes.
pub mod protocol;

/// Request router.
pub mod router;

/// HTTP adapter.
pub mod server;

/// Service wiring and lifecycle.
///
/// Use [`Service::builder()`] to create a configured service.
pub mod service;

/// Session multiplexing.
pub mod session;

#[cfg(test)]
mod testing;

// ============================================================================
// Re-exports
// ============================================================================

// Configuration
pub use config::Config;

// Controller types
pub use controller::{
    ConnectionState, ControllerConnection, ControllerEndpoint, ControllerLink, EventHandler,
    HandshakeCoordinator,
};

// Device types
pub use devices::{DeviceApi, DeviceService};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{RequestId, SessionId};

// Protocol types
pub use protocol::ControllerEvent;

// Routing types
pub use router::{Inbound, InboundRequest, RequestRouter, RouteOutcome};

// Service types
pub use service::{Service, ServiceBuilder};

// Session types
pub use session::{SessionRegistry, SessionTransport};
