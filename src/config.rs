//! Command-line and environment configuration.
//!
//! Every option can be given as a flag or through the environment.
//!
//! | Flag | Environment | Default |
//! |------|-------------|---------|
//! | `--controller-url` | `FREEHOME_BASE_URL` | required |
//! | `--username` | `FREEHOME_USERNAME` | none |
//! | `--password` | `FREEHOME_PASSWORD` | none |
//! | `--bind` | `BIND_ADDR` | `127.0.0.1` |
//! | `--port` | `PORT` | `3000` |
//! | `--handshake-timeout-secs` | `HANDSHAKE_TIMEOUT_SECS` | `30` |
//! | `--request-timeout-secs` | `REQUEST_TIMEOUT_SECS` | `30` |
//! | `--session-idle-timeout-secs` | `SESSION_IDLE_TIMEOUT_SECS` | none |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use clap::Parser;

use crate::error::{Error, Result};
use crate::service::{DEFAULT_BIND_IP, ServiceBuilder, controller_ws_url};

// ============================================================================
// Config
// ============================================================================

/// Runtime configuration for the `freehome-mcp` binary.
#[derive(Clone, Parser)]
#[command(name = "freehome-mcp", version, about = "MCP server for ABB free@home")]
pub struct Config {
    /// Controller WebSocket URL (ws, wss, http or https).
    #[arg(long, env = "FREEHOME_BASE_URL")]
    pub controller_url: String,

    /// Controller user name.
    #[arg(long, env = "FREEHOME_USERNAME")]
    pub username: Option<String>,

    /// Controller password.
    #[arg(long, env = "FREEHOME_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Address the HTTP server binds to.
    #[arg(long, env = "BIND_ADDR", default_value_t = DEFAULT_BIND_IP)]
    pub bind: IpAddr,

    /// Port the HTTP server listens on.
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Seconds to wait for the subscription confirmation.
    #[arg(long, env = "HANDSHAKE_TIMEOUT_SECS", default_value_t = 30)]
    pub handshake_timeout_secs: u64,

    /// Seconds to wait for each controller response.
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Close sessions idle for this many seconds.
    #[arg(long, env = "SESSION_IDLE_TIMEOUT_SECS")]
    pub session_idle_timeout_secs: Option<u64>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("controller_url", &self.controller_url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("bind", &self.bind)
            .field("port", &self.port)
            .field("handshake_timeout_secs", &self.handshake_timeout_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("session_idle_timeout_secs", &self.session_idle_timeout_secs)
            .finish()
    }
}

impl Config {
    /// Checks values clap cannot check.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an invalid controller URL, a zero
    /// timeout, or a password without user name.
    pub fn validate(&self) -> Result<()> {
        controller_ws_url(&self.controller_url)?;

        if self.handshake_timeout_secs == 0 {
            return Err(Error::config("HANDSHAKE_TIMEOUT_SECS must be greater than zero"));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::config("REQUEST_TIMEOUT_SECS must be greater than zero"));
        }
        if self.session_idle_timeout_secs == Some(0) {
            return Err(Error::config("SESSION_IDLE_TIMEOUT_SECS must be greater than zero"));
        }
        if self.password.is_some() && self.username.is_none() {
            return Err(Error::config("FREEHOME_PASSWORD given without FREEHOME_USERNAME"));
        }

        Ok(())
    }

    /// Returns the HTTP listening address.
    #[inline]
    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    /// Converts into a service builder.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if [`validate`](Self::validate) fails.
    pub fn into_builder(self) -> Result<ServiceBuilder> {
        self.validate()?;

        let mut builder = ServiceBuilder::new()
            .controller_url(self.controller_url.clone())
            .bind(self.socket_addr())
            .handshake_timeout(Duration::from_secs(self.handshake_timeout_secs))
            .request_timeout(Duration::from_secs(self.request_timeout_secs))
            .session_idle_timeout(self.session_idle_timeout_secs.map(Duration::from_secs));

        if let Some(username) = self.username {
            builder = builder.credentials(username, self.password.unwrap_or_default());
        }

        Ok(builder)
    }
}

// ============================================================================
// Tests
// ============================================================================
