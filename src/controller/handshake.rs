//! Connection handshake coordinator.
//!
//! Opening the controller transport is only half of connecting: the link is
//! usable once the controller confirms the event subscription, and that
//! confirmation arrives on the event stream, not as the result of `open()`.
//!
//! # State Machine
//!
//! ```text
//!                 connect()              subscribed(true)
//! Disconnected ─────────────► Connecting ─────────────────► Confirmed
//!      ▲                          │                            │
//!      │        error / timeout   │        subscribed(false)   ▼
//!      └──────────────────────────┘                         Degraded
//! ```
//!
//! The in-flight `connect()` parks on a oneshot receiver. The sender sits in
//! the pending slot and is taken exactly once, by whichever of the event
//! handler, the timeout path, or `disconnect()` gets there first.
//!
//! Every `connect()` call is numbered. A failed attempt closes the link only
//! while no later attempt has started, so a stale failure never tears down a
//! socket opened by its successor.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::protocol::ControllerEvent;

use super::link::ControllerLink;

// ============================================================================
// Constants
// ============================================================================

/// Default time to wait for the subscription confirmation.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle state of the controller connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No transport, no handshake.
    Disconnected,
    /// Transport opening or open, confirmation outstanding.
    Connecting,
    /// Transport open and subscription confirmed.
    Confirmed,
    /// Transport nominally open but the subscription was revoked.
    Degraded,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Confirmed => "confirmed",
            Self::Degraded => "degraded",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Transition Table
// ============================================================================

/// What an event does to the pending handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Resolution {
    /// Leave the pending slot untouched.
    Keep,
    /// Complete the pending handshake successfully.
    Fulfil,
    /// Fail the pending handshake with the given cause.
    Fail(String),
}

/// Computes the next state for an event.
fn transition(
    state: ConnectionState,
    pending: bool,
    event: &ControllerEvent,
) -> (ConnectionState, Resolution) {
    use ConnectionState::{Confirmed, Degraded, Disconnected};

    match event {
        ControllerEvent::Update(_) => (state, Resolution::Keep),

        ControllerEvent::Error(message) if pending => {
            (Disconnected, Resolution::Fail(message.clone()))
        }
        ControllerEvent::Error(_) => (state, Resolution::Keep),

        ControllerEvent::Subscribed { confirmed: true } if pending => {
            (Confirmed, Resolution::Fulfil)
        }
        ControllerEvent::Subscribed { confirmed: true } if state == Degraded => {
            (Confirmed, Resolution::Keep)
        }
        ControllerEvent::Subscribed { confirmed: true } => (state, Resolution::Keep),

        ControllerEvent::Subscribed { confirmed: false } if state == Disconnected => {
            (state, Resolution::Keep)
        }
        ControllerEvent::Subscribed { confirmed: false } => (Degraded, Resolution::Keep),
    }
}

// ============================================================================
// HandshakeCoordinator
// ============================================================================

/// One-shot continuation for the in-flight `connect()` call.
type PendingHandshake = oneshot::Sender<Result<()>>;

/// State guarded by a single lock so state and pending slot move together.
struct Inner {
    state: ConnectionState,
    pending: Option<PendingHandshake>,
    /// Number of the latest `connect()` attempt.
    attempt: u64,
}

/// Owns the single outbound controller connection and its handshake.
///
/// # Example
///
/// ```ignore
/// let link = Arc::new(ControllerConnection::new(endpoint));
/// let coordinator = HandshakeCoordinator::new(link, Duration::from_secs(30));
///
/// coordinator.connect().await?;
/// assert_eq!(coordinator.state(), ConnectionState::Confirmed);
/// ```
pub struct HandshakeCoordinator {
    /// Outbound transport.
    link: Arc<dyn ControllerLink>,
    /// Connection state and pending handshake.
    inner: Mutex<Inner>,
    /// Maximum wait for the subscription confirmation.
    handshake_timeout: Duration,
}

impl fmt::Debug for HandshakeCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandshakeCoordinator")
            .field("state", &self.state())
            .field("pending", &self.has_pending_handshake())
            .field("handshake_timeout", &self.handshake_timeout)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// HandshakeCoordinator - Constructor
// ============================================================================

impl HandshakeCoordinator {
    /// Creates a coordinator in `Disconnected` and wires the link's event
    /// stream into [`on_event`](Self::on_event).
    #[must_use]
    pub fn new(link: Arc<dyn ControllerLink>, handshake_timeout: Duration) -> Arc<Self> {
        let coordinator = Arc::new(Self {
            link,
            inner: Mutex::new(Inner {
                state: ConnectionState::Disconnected,
                pending: None,
                attempt: 0,
            }),
            handshake_timeout,
        });

        let weak = Arc::downgrade(&coordinator);
        coordinator.link.set_event_handler(Box::new(move |event| {
            if let Some(coordinator) = weak.upgrade() {
                coordinator.on_event(event);
            }
        }));

        coordinator
    }
}

// ============================================================================
// HandshakeCoordinator - Public API
// ============================================================================

impl HandshakeCoordinator {
    /// Returns the current connection state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    /// Returns `true` once the subscription is confirmed.
    #[inline]
    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        self.state() == ConnectionState::Confirmed
    }

    /// Returns `true` while a `connect()` call is waiting for confirmation.
    #[inline]
    #[must_use]
    pub fn has_pending_handshake(&self) -> bool {
        self.inner.lock().pending.is_some()
    }

    /// Opens the link and waits for the subscription confirmation.
    ///
    /// Returns immediately if already confirmed. From `Degraded` a fresh
    /// handshake is performed.
    ///
    /// # Errors
    ///
    /// - [`Error::HandshakeAlreadyInProgress`] if another call is pending
    /// - [`Error::HandshakeFailed`] if the open fails, an `error` event
    ///   arrives first, confirmation times out, or `disconnect()` intervenes
    pub async fn connect(&self) -> Result<()> {
        let (attempt, rx) = {
            let mut inner = self.inner.lock();

            if inner.pending.is_some() {
                warn!("connect() rejected: handshake already in progress");
                return Err(Error::HandshakeAlreadyInProgress);
            }

            if inner.state == ConnectionState::Confirmed {
                debug!("connect() on confirmed link, nothing to do");
                return Ok(());
            }

            let (tx, rx) = oneshot::channel();
            inner.pending = Some(tx);
            inner.state = ConnectionState::Connecting;
            inner.attempt = inner.attempt.wrapping_add(1);
            (inner.attempt, rx)
        };

        info!(attempt, "Connecting to free@home controller");

        if let Err(e) = self.link.open().await {
            self.abandon_pending(attempt);
            warn!(error = %e, "Controller transport open failed");
            return Err(Error::handshake_failed(e.to_string()));
        }

        debug!("Transport open, awaiting subscription confirmation");

        match timeout(self.handshake_timeout, rx).await {
            Ok(Ok(Ok(()))) => {
                info!("Connected to free@home system");
                Ok(())
            }

            Ok(Ok(Err(e))) => {
                self.close_link(attempt).await;
                Err(e)
            }

            // Sender dropped by disconnect(), possibly before open() finished
            Ok(Err(_)) => {
                self.close_link(attempt).await;
                Err(Error::handshake_failed("handshake abandoned by disconnect"))
            }

            Err(_) => {
                let timeout_ms = self.handshake_timeout.as_millis() as u64;

                if !self.abandon_pending(attempt) {
                    // Resolved at the deadline; the state already says how.
                    if self.is_confirmed() {
                        return Ok(());
                    }
                    return Err(Error::handshake_failed(format!(
                        "handshake did not complete within {timeout_ms}ms"
                    )));
                }

                warn!(timeout_ms, "Subscription confirmation timed out");
                self.close_link(attempt).await;
                Err(Error::handshake_failed(format!(
                    "no subscription confirmation within {timeout_ms}ms"
                )))
            }
        }
    }

    /// Handles one event from the controller.
    ///
    /// Called by the link in delivery order. Never panics and never blocks.
    pub fn on_event(&self, event: ControllerEvent) {
        let (previous, current, pending) = {
            let mut inner = self.inner.lock();
            let previous = inner.state;
            let (next, resolution) = transition(previous, inner.pending.is_some(), &event);
            inner.state = next;

            let pending = match resolution {
                Resolution::Keep => None,
                Resolution::Fulfil => inner.pending.take().map(|tx| (tx, Ok(()))),
                Resolution::Fail(cause) => inner
                    .pending
                    .take()
                    .map(|tx| (tx, Err(Error::handshake_failed(cause)))),
            };

            (previous, next, pending)
        };

        match &event {
            ControllerEvent::Update(payload) => trace!(%payload, "Controller update"),
            ControllerEvent::Error(message) if pending.is_some() => {
                warn!(error = %message, "Controller error preempted handshake");
            }
            ControllerEvent::Error(message) => {
                warn!(error = %message, state = %current, "Controller reported error");
            }
            ControllerEvent::Subscribed { confirmed: false } if previous != current => {
                warn!(from = %previous, "Controller subscription revoked, link degraded");
            }
            ControllerEvent::Subscribed { confirmed } => {
                debug!(confirmed, from = %previous, to = %current, "Subscription event");
            }
        }

        if let Some((tx, outcome)) = pending {
            // Receiver may be gone if connect() already timed out.
            let _ = tx.send(outcome);
        }
    }

    /// Closes the link and resets to `Disconnected`.
    ///
    /// No-op when already disconnected. Teardown errors are logged, not
    /// returned. A pending `connect()` fails with [`Error::HandshakeFailed`].
    pub async fn disconnect(&self) {
        let abandoned = {
            let mut inner = self.inner.lock();
            if inner.state == ConnectionState::Disconnected {
                debug!("disconnect() on disconnected link, nothing to do");
                return;
            }
            inner.state = ConnectionState::Disconnected;
            inner.pending.take()
        };
        drop(abandoned);

        match self.link.close().await {
            Ok(()) => info!("Disconnected from free@home system"),
            Err(e) => warn!(error = %e, "Error disconnecting from free@home"),
        }
    }
}

// ============================================================================
// HandshakeCoordinator - Internals
// ============================================================================

impl HandshakeCoordinator {
    /// Clears the pending slot of `attempt` and resets state.
    ///
    /// Returns `false` if the slot was already empty or belongs to a later
    /// attempt.
    fn abandon_pending(&self, attempt: u64) -> bool {
        let mut inner = self.inner.lock();
        if inner.attempt == attempt && inner.pending.take().is_some() {
            inner.state = ConnectionState::Disconnected;
            true
        } else {
            false
        }
    }

    /// Closes the link after `attempt` failed, unless a later attempt owns it.
    async fn close_link(&self, attempt: u64) {
        let current = self.inner.lock().attempt;
        if current != attempt {
            debug!(attempt, current, "Link owned by a later attempt, not closing");
            return;
        }

        if let Err(e) = self.link.close().await {
            warn!(error = %e, "Failed to close link after handshake failure");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;
    use serde_json::json;
    use tokio_test::{assert_pending, assert_ready_ok, task};

    use crate::testing::{ScriptedLink, coordinator as setup};

    async fn wait_for_pending(coordinator: &HandshakeCoordinator) {
        while !coordinator.has_pending_handshake() {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_connect_confirmed_by_event() {
        let (link, coordinator) = setup(ScriptedLink::default());
        assert_eq!(coordinator.state(), ConnectionState::Disconnected);

        let task = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.connect().await })
        };

        wait_for_pending(&coordinator).await;
        assert_eq!(coordinator.state(), ConnectionState::Connecting);

        link.emit(ControllerEvent::Subscribed { confirmed: true });

        task.await.expect("join").expect("connect should succeed");
        assert_eq!(coordinator.state(), ConnectionState::Confirmed);
        assert!(!coordinator.has_pending_handshake());
    }

    #[tokio::test]
    async fn test_confirmation_during_open() {
        let (_link, coordinator) = setup(ScriptedLink::emitting_on_open(vec![
            ControllerEvent::Update(json!({})),
            ControllerEvent::Subscribed { confirmed: true },
        ]));

        coordinator.connect().await.expect("connect should succeed");
        assert!(coordinator.is_confirmed());
    }

    #[tokio::test]
    async fn test_error_event_fails_handshake() {
        let (link, coordinator) = setup(ScriptedLink::emitting_on_open(vec![
            ControllerEvent::Error("invalid credentials".to_string()),
        ]));

        let err = coordinator.connect().await.unwrap_err();
        assert!(
            matches!(err, Error::HandshakeFailed { ref cause } if cause == "invalid credentials")
        );
        assert_eq!(coordinator.state(), ConnectionState::Disconnected);
        assert!(!coordinator.has_pending_handshake());
        assert_eq!(link.closes(), 1);
    }

    #[tokio::test]
    async fn test_open_failure_propagates_cause() {
        let (_link, coordinator) = setup(ScriptedLink::failing("connection refused"));

        let err = coordinator.connect().await.unwrap_err();
        assert!(matches!(err, Error::HandshakeFailed { ref cause } if cause.contains("connection refused")));
        assert_eq!(coordinator.state(), ConnectionState::Disconnected);
        assert!(!coordinator.has_pending_handshake());
    }

    #[tokio::test]
    async fn test_second_connect_rejected_while_pending() {
        let (link, coordinator) = setup(ScriptedLink::default());

        let first = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.connect().await })
        };
        wait_for_pending(&coordinator).await;

        let second = coordinator.connect().await;
        assert!(matches!(second, Err(Error::HandshakeAlreadyInProgress)));
        assert!(coordinator.has_pending_handshake());

        link.emit(ControllerEvent::Subscribed { confirmed: true });
        first.await.expect("join").expect("first connect unaffected");
        assert_eq!(link.opens(), 1);
    }

    #[tokio::test]
    async fn test_revocation_degrades_then_restores() {
        let (link, coordinator) = setup(ScriptedLink::confirming());
        coordinator.connect().await.expect("connect");

        link.emit(ControllerEvent::Subscribed { confirmed: false });
        assert_eq!(coordinator.state(), ConnectionState::Degraded);

        link.emit(ControllerEvent::Subscribed { confirmed: true });
        assert_eq!(coordinator.state(), ConnectionState::Confirmed);
    }

    #[tokio::test]
    async fn test_revocation_leaves_handshake_pending() {
        let (link, coordinator) = setup(ScriptedLink::default());

        let task = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.connect().await })
        };
        wait_for_pending(&coordinator).await;

        link.emit(ControllerEvent::Subscribed { confirmed: false });
        assert_eq!(coordinator.state(), ConnectionState::Degraded);
        assert!(coordinator.has_pending_handshake());

        link.emit(ControllerEvent::Subscribed { confirmed: true });
        task.await.expect("join").expect("connect");
        assert!(coordinator.is_confirmed());
    }

    #[tokio::test]
    async fn test_late_errors_are_noops() {
        let (link, coordinator) = setup(ScriptedLink::confirming());
        coordinator.connect().await.expect("connect");

        link.emit(ControllerEvent::Error("late".to_string()));
        link.emit(ControllerEvent::Error("later".to_string()));
        assert_eq!(coordinator.state(), ConnectionState::Confirmed);
    }

    #[tokio::test]
    async fn test_update_has_no_effect() {
        let (link, coordinator) = setup(ScriptedLink::default());
        link.emit(ControllerEvent::Update(json!({"datapoints": {}})));
        assert_eq!(coordinator.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_when_confirmed_is_noop() {
        let (link, coordinator) = setup(ScriptedLink::confirming());
        coordinator.connect().await.expect("connect");
        coordinator.connect().await.expect("second connect");
        assert_eq!(link.opens(), 1);
    }

    #[tokio::test]
    async fn test_handshake_timeout() {
        let link = Arc::new(ScriptedLink::default());
        let coordinator = HandshakeCoordinator::new(link.clone(), Duration::from_millis(20));

        let err = coordinator.connect().await.unwrap_err();
        assert!(matches!(err, Error::HandshakeFailed { .. }));
        assert_eq!(coordinator.state(), ConnectionState::Disconnected);
        assert!(!coordinator.has_pending_handshake());
        assert_eq!(link.closes(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let (link, coordinator) = setup(ScriptedLink::confirming());

        coordinator.disconnect().await;
        assert_eq!(link.closes(), 0);

        coordinator.connect().await.expect("connect");
        coordinator.disconnect().await;
        coordinator.disconnect().await;

        assert_eq!(coordinator.state(), ConnectionState::Disconnected);
        assert_eq!(link.closes(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_abandons_pending_connect() {
        let (_link, coordinator) = setup(ScriptedLink::default());

        let task = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.connect().await })
        };
        wait_for_pending(&coordinator).await;

        coordinator.disconnect().await;

        let err = task.await.expect("join").unwrap_err();
        assert!(matches!(err, Error::HandshakeFailed { .. }));
        assert!(!coordinator.has_pending_handshake());
    }

    #[tokio::test]
    async fn test_disconnect_during_open_closes_late_socket() {
        let (link, coordinator) = setup(ScriptedLink::opening_after(Duration::from_millis(50)));

        let task = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.connect().await })
        };
        wait_for_pending(&coordinator).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        coordinator.disconnect().await;
        assert!(!link.is_open());

        let err = task.await.expect("join").unwrap_err();
        assert!(matches!(err, Error::HandshakeFailed { .. }));
        assert!(!link.is_open(), "socket opened after disconnect must be closed");
        assert_eq!(coordinator.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_stale_failure_keeps_successor_link() {
        let (link, coordinator) = setup(ScriptedLink::default());

        let first = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.connect().await })
        };
        wait_for_pending(&coordinator).await;

        // The first attempt fails but has not resumed when the next one opens.
        link.emit(ControllerEvent::Error("denied".to_string()));
        let mut second = task::spawn(coordinator.connect());
        assert_pending!(second.poll());
        assert!(coordinator.has_pending_handshake());

        let err = first.await.expect("join").unwrap_err();
        assert!(matches!(err, Error::HandshakeFailed { ref cause } if cause == "denied"));
        assert_eq!(link.closes(), 0);
        assert!(link.is_open());
        assert_eq!(coordinator.state(), ConnectionState::Connecting);

        link.emit(ControllerEvent::Subscribed { confirmed: true });
        assert_ready_ok!(second.poll());
        assert!(coordinator.is_confirmed());
        assert_eq!(link.opens(), 2);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Confirmed.to_string(), "confirmed");
        assert_eq!(ConnectionState::Degraded.to_string(), "degraded");
    }

    fn arb_event() -> impl Strategy<Value = ControllerEvent> {
        prop_oneof![
            Just(ControllerEvent::Update(json!({}))),
            "[a-z]{1,8}".prop_map(ControllerEvent::Error),
            any::<bool>().prop_map(|confirmed| ControllerEvent::Subscribed { confirmed }),
        ]
    }

    proptest! {
        #[test]
        fn prop_pending_handshake_resolves_at_most_once(events in prop::collection::vec(arb_event(), 0..32)) {
            let (_link, coordinator) = setup(ScriptedLink::default());
            let (tx, mut rx) = oneshot::channel();
            {
                let mut inner = coordinator.inner.lock();
                inner.state = ConnectionState::Connecting;
                inner.pending = Some(tx);
            }

            let mut resolved = false;
            for event in events {
                let before = coordinator.state();
                let was_pending = coordinator.has_pending_handshake();
                coordinator.on_event(event.clone());
                let after = coordinator.state();

                match &event {
                    ControllerEvent::Update(_) => prop_assert_eq!(before, after),
                    ControllerEvent::Error(_) if was_pending => {
                        prop_assert_eq!(after, ConnectionState::Disconnected);
                    }
                    ControllerEvent::Error(_) => prop_assert_eq!(before, after),
                    ControllerEvent::Subscribed { confirmed: true } if was_pending => {
                        prop_assert_eq!(after, ConnectionState::Confirmed);
                    }
                    ControllerEvent::Subscribed { confirmed: false } => {
                        prop_assert_ne!(after, ConnectionState::Confirmed);
                    }
                    ControllerEvent::Subscribed { .. } => {}
                }

                // Confirmed never coexists with a pending handshake.
                if after == ConnectionState::Confirmed {
                    prop_assert!(!coordinator.has_pending_handshake());
                }

                if was_pending && !coordinator.has_pending_handshake() {
                    prop_assert!(!resolved);
                    resolved = true;
                    prop_assert!(rx.try_recv().is_ok());
                }
            }

            if !resolved {
                prop_assert!(coordinator.has_pending_handshake());
            }
        }
    }
}
