//! Session registry.
//!
//! Maps session ids to their transports. Every request on the `/mcp`
//! endpoint reads it; session creation and transport closure mutate it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            SessionRegistry              │
//! │  ┌─────────────────────────────────┐   │
//! │  │ "0b7c…" → SessionTransport       │   │
//! │  │ "5e21…" → SessionTransport       │   │
//! │  │ "d90f…" → SessionTransport       │   │
//! │  └─────────────────────────────────┘   │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Writers hold the lock only for the map operation itself. Transports are
//! closed after the lock is released, so a close hook calling back into
//! [`SessionRegistry::remove`] never deadlocks.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::identifiers::SessionId;

use super::transport::SessionTransport;

// ============================================================================
// SessionRegistry
// ============================================================================

/// Concurrency-safe table of live sessions.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    /// Live transports by session id.
    sessions: RwLock<FxHashMap<SessionId, Arc<SessionTransport>>>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the transport registered under `session_id`.
    #[must_use]
    pub fn lookup(&self, session_id: &SessionId) -> Option<Arc<SessionTransport>> {
        self.sessions.read().get(session_id).cloned()
    }

    /// Registers `transport` under `session_id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateSession`] if the id is already registered.
    /// The existing entry is left untouched.
    pub fn create(&self, session_id: SessionId, transport: Arc<SessionTransport>) -> Result<()> {
        {
            let mut sessions = self.sessions.write();
            if sessions.contains_key(&session_id) {
                error!(session_id = %session_id, "Session id already registered");
                return Err(Error::duplicate_session(session_id));
            }
            sessions.insert(session_id.clone(), transport);
        }

        info!(session_id = %session_id, "Session registered");
        Ok(())
    }

    /// Removes `session_id`. Removing an absent id is a no-op.
    ///
    /// Returns `true` if an entry was removed.
    pub fn remove(&self, session_id: &SessionId) -> bool {
        let removed = self.sessions.write().remove(session_id);

        match removed {
            Some(_) => {
                info!(session_id = %session_id, "Session removed");
                true
            }
            None => {
                debug!(session_id = %session_id, "Session already absent");
                false
            }
        }
    }

    /// Returns the number of live sessions.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Returns `true` if no session is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Returns every registered id.
    #[must_use]
    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.read().keys().cloned().collect()
    }

    /// Removes and closes every session.
    pub fn close_all(&self) {
        let drained: Vec<_> = {
            let mut sessions = self.sessions.write();
            sessions.drain().collect()
        };

        let count = drained.len();
        for (session_id, transport) in drained {
            transport.close();
            debug!(session_id = %session_id, "Session closed during shutdown");
        }

        info!(count, "All sessions closed");
    }
}

// ============================================================================
// Tests
// ============================================================================
