//! Builder pattern for service configuration.
//!
//! # Example
//!
//! ```no_run
//! use freehome_mcp::Service;
//!
//! # async fn example() -> freehome_mcp::Result<()> {
//! let service = Service::builder()
//!     .controller_url("ws://192.168.1.10/fhapi/v1/api/ws")
//!     .credentials("installer", "secret")
//!     .port(3000)
//!     .build()?;
//!
//! service.start().await?;
//! service.serve().await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::controller::{
    ControllerConnection, ControllerEndpoint, ControllerLink, DEFAULT_HANDSHAKE_TIMEOUT,
    DEFAULT_REQUEST_TIMEOUT,
};
use crate::devices::DeviceApi;
use crate::error::{Error, Result};

use super::core::Service;

// ============================================================================
// Constants
// ============================================================================

/// Default listening address (localhost).
pub const DEFAULT_BIND_IP: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Default listening port.
pub const DEFAULT_PORT: u16 = 3000;

/// Path used when the controller URL names only a host.
pub const DEFAULT_CONTROLLER_PATH: &str = "/fhapi/v1/api/ws";

// ============================================================================
// ServiceBuilder
// ============================================================================

/// Builder for configuring a [`Service`].
///
/// Use [`Service::builder()`] to create a new builder.
#[derive(Debug, Clone)]
pub struct ServiceBuilder {
    /// Controller URL as given.
    controller_url: Option<String>,
    /// Basic credentials.
    credentials: Option<(String, String)>,
    /// HTTP listening address.
    bind: SocketAddr,
    /// Deadline for the subscription confirmation.
    handshake_timeout: Duration,
    /// Deadline for each controller request.
    request_timeout: Duration,
    /// Idle window after which sessions close.
    session_idle_timeout: Option<Duration>,
}

impl Default for ServiceBuilder {
    fn default() -> Self {
        Self {
            controller_url: None,
            credentials: None,
            bind: SocketAddr::new(DEFAULT_BIND_IP, DEFAULT_PORT),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            session_idle_timeout: None,
        }
    }
}

// ============================================================================
// ServiceBuilder Implementation
// ============================================================================

impl ServiceBuilder {
    /// Creates a builder with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the controller URL.
    ///
    /// Accepts `ws`, `wss`, `http` and `https`; HTTP schemes are mapped to
    /// their WebSocket counterparts.
    #[inline]
    #[must_use]
    pub fn controller_url(mut self, url: impl Into<String>) -> Self {
        self.controller_url = Some(url.into());
        self
    }

    /// Sets the Basic credentials sent on the WebSocket upgrade.
    #[inline]
    #[must_use]
    pub fn credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Sets the HTTP listening address.
    #[inline]
    #[must_use]
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind = addr;
        self
    }

    /// Sets the HTTP listening port, keeping the IP.
    #[inline]
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.bind.set_port(port);
        self
    }

    /// Sets the handshake deadline.
    #[inline]
    #[must_use]
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Sets the per-request controller deadline.
    #[inline]
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Closes sessions idle for longer than `timeout`.
    #[inline]
    #[must_use]
    pub fn session_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.session_idle_timeout = timeout;
        self
    }

    /// Builds the service over a WebSocket connection to the controller.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the controller URL is missing or invalid
    /// - [`Error::Config`] if a timeout is zero
    pub fn build(self) -> Result<Service> {
        let url = self.validate_controller_url()?;
        self.validate_timeouts()?;

        let mut endpoint = ControllerEndpoint::new(url);
        if let Some((username, password)) = &self.credentials {
            endpoint = endpoint.with_credentials(username.clone(), password.clone());
        }

        let connection = Arc::new(ControllerConnection::new(endpoint, self.request_timeout));
        let link: Arc<dyn ControllerLink> = connection.clone();
        let api: Arc<dyn DeviceApi> = connection;

        Ok(Service::new(&self, link, api))
    }

    /// Builds the service over caller-supplied collaborators.
    ///
    /// The controller URL and credentials are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a timeout is zero.
    pub fn build_with(
        self,
        link: Arc<dyn ControllerLink>,
        api: Arc<dyn DeviceApi>,
    ) -> Result<Service> {
        self.validate_timeouts()?;
        Ok(Service::new(&self, link, api))
    }

    pub(crate) fn bind_addr(&self) -> SocketAddr {
        self.bind
    }

    pub(crate) fn handshake_deadline(&self) -> Duration {
        self.handshake_timeout
    }

    pub(crate) fn idle_timeout(&self) -> Option<Duration> {
        self.session_idle_timeout
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ServiceBuilder {
    fn validate_controller_url(&self) -> Result<Url> {
        let raw = self.controller_url.as_deref().ok_or_else(|| {
            Error::config(
                "Controller URL is required. Use .controller_url() or FREEHOME_BASE_URL.\n\
                 Example: ws://192.168.1.10/fhapi/v1/api/ws",
            )
        })?;

        controller_ws_url(raw)
    }

    fn validate_timeouts(&self) -> Result<()> {
        if self.handshake_timeout.is_zero() {
            return Err(Error::config("Handshake timeout must be greater than zero"));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::config("Request timeout must be greater than zero"));
        }
        if self.session_idle_timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::config("Session idle timeout must be greater than zero"));
        }
        Ok(())
    }
}

/// Normalizes a controller URL to a WebSocket URL.
///
/// `http`/`https` become `ws`/`wss`. A bare host gets the default API path.
///
/// # Errors
///
/// Returns [`Error::Config`] for unparseable URLs or unsupported schemes.
pub fn controller_ws_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw.trim())
        .map_err(|e| Error::config(format!("Invalid controller URL '{raw}': {e}")))?;

    let scheme = match url.scheme() {
        "ws" | "http" => "ws",
        "wss" | "https" => "wss",
        other => {
            return Err(Error::config(format!(
                "Unsupported controller URL scheme '{other}' (expected ws, wss, http or https)"
            )));
        }
    };

    if url.scheme() != scheme {
        url.set_scheme(scheme)
            .map_err(|()| Error::config(format!("Cannot use scheme '{scheme}' for '{raw}'")))?;
    }

    if url.path().is_empty() || url.path() == "/" {
        url.set_path(DEFAULT_CONTROLLER_PATH);
    }

    Ok(url)
}

// ============================================================================
// Tests
// ============================================================================
