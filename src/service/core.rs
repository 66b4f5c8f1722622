//! Service wiring and lifecycle.
//!
//! The [`Service`] owns the handshake coordinator, the session registry and
//! the request router, and runs the HTTP listener.
//!
//! # Lifecycle
//!
//! 1. `build()` - Wires collaborators, nothing connects yet
//! 2. `start()` - Runs the controller handshake once
//! 3. `serve()` - Binds `/mcp` and serves until Ctrl-C
//! 4. `shutdown()` - Closes every session and disconnects

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::controller::{ControllerLink, HandshakeCoordinator};
use crate::devices::{DeviceApi, DeviceService};
use crate::error::Result;
use crate::mcp::McpHandler;
use crate::router::RequestRouter;
use crate::server::{self, MCP_PATH};
use crate::session::SessionRegistry;

use super::builder::ServiceBuilder;

// ============================================================================
// Types
// ============================================================================

/// Shared state behind a [`Service`].
struct ServiceInner {
    /// HTTP listening address.
    bind: SocketAddr,
    /// Single controller connection.
    coordinator: Arc<HandshakeCoordinator>,
    /// Boundary dispatcher.
    router: Arc<RequestRouter>,
}

// ============================================================================
// Service
// ============================================================================

/// The MCP bridge to one free@home controller.
#[derive(Clone)]
pub struct Service {
    inner: Arc<ServiceInner>,
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("bind", &self.inner.bind)
            .field("state", &self.inner.coordinator.state())
            .field("sessions", &self.registry().len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Service - Public API
// ============================================================================

impl Service {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ServiceBuilder {
        ServiceBuilder::new()
    }

    /// Returns the handshake coordinator.
    #[inline]
    #[must_use]
    pub fn coordinator(&self) -> &Arc<HandshakeCoordinator> {
        &self.inner.coordinator
    }

    /// Returns the request router.
    #[inline]
    #[must_use]
    pub fn router(&self) -> &Arc<RequestRouter> {
        &self.inner.router
    }

    /// Returns the session registry.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        self.inner.router.registry()
    }

    /// Returns the configured listening address.
    #[inline]
    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        self.inner.bind
    }

    /// Returns the axum application for `/mcp`.
    #[must_use]
    pub fn app(&self) -> axum::Router {
        server::app(Arc::clone(&self.inner.router))
    }

    /// Connects to the controller and waits for the subscription.
    ///
    /// Must succeed before [`serve`](Self::serve) is called.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::HandshakeFailed`] if the link fails or the
    ///   controller reports an error
    /// - [`crate::Error::HandshakeAlreadyInProgress`] if called concurrently
    pub async fn start(&self) -> Result<()> {
        self.inner.coordinator.connect().await?;
        info!("Connected to free@home controller");
        Ok(())
    }

    /// Serves `/mcp` on the configured address until Ctrl-C, then shuts down.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Io`] if binding or serving fails.
    pub async fn serve(&self) -> Result<()> {
        let listener = TcpListener::bind(self.inner.bind).await?;
        self.serve_on(listener, shutdown_signal()).await
    }

    /// Serves `/mcp` on `listener` until `shutdown` resolves, then shuts down.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Io`] if serving fails.
    pub async fn serve_on<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        info!(%addr, "free@home MCP server listening");
        info!("Connect to: http://{addr}{MCP_PATH}");

        let served = axum::serve(listener, self.app())
            .with_graceful_shutdown(shutdown)
            .await;

        self.shutdown().await;
        served?;
        Ok(())
    }

    /// Closes every session and disconnects from the controller.
    pub async fn shutdown(&self) {
        info!("Service shutting down");
        self.registry().close_all();
        self.inner.coordinator.disconnect().await;
        info!("Service shutdown complete");
    }
}

// ============================================================================
// Service - Internal API
// ============================================================================

impl Service {
    /// Wires collaborators per `config`.
    pub(crate) fn new(
        config: &ServiceBuilder,
        link: Arc<dyn ControllerLink>,
        api: Arc<dyn DeviceApi>,
    ) -> Self {
        let coordinator = HandshakeCoordinator::new(link, config.handshake_deadline());
        let devices = DeviceService::new(api, Arc::clone(&coordinator));
        let handler = Arc::new(McpHandler::new(devices));

        let router = RequestRouter::new(
            Arc::new(SessionRegistry::new()),
            Arc::clone(&coordinator),
            handler,
        )
        .with_idle_timeout(config.idle_timeout());

        Self {
            inner: Arc::new(ServiceInner {
                bind: config.bind_addr(),
                coordinator,
                router: Arc::new(router),
            }),
        }
    }
}

/// Resolves on Ctrl-C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

// ============================================================================
// Tests
// ============================================================================
