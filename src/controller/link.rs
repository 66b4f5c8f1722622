//! Controller link abstraction.
//!
//! The coordinator only needs three things from the outbound connection:
//! open it, close it, and receive its events. Keeping that behind a trait
//! lets the handshake be driven by a scripted link in tests.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;

use crate::error::Result;
use crate::protocol::ControllerEvent;

// ============================================================================
// Types
// ============================================================================

/// Event handler callback type.
///
/// Called for each event received from the controller, in delivery order,
/// on the link's own event-loop task.
pub type EventHandler = Box<dyn Fn(ControllerEvent) + Send + Sync>;

// ============================================================================
// ControllerLink
// ============================================================================

/// Transport-level connection to the home-automation controller.
#[async_trait]
pub trait ControllerLink: Send + Sync {
    /// Opens the transport.
    ///
    /// Returns once the transport is open. Subscription confirmation arrives
    /// later as a [`ControllerEvent::Subscribed`] event.
    async fn open(&self) -> Result<()>;

    /// Closes the transport. Closing a closed link is a no-op.
    async fn close(&self) -> Result<()>;

    /// Installs the callback that receives controller events.
    fn set_event_handler(&self, handler: EventHandler);
}
