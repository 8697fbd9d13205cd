//! Listener options: how connections are accepted and where authenticated
//! requests are sent.
//!
//! These are fixed for the life of a [`Supervisor`](crate::Supervisor).  The
//! per-session [`RelayConfig`](relay_core::RelayConfig) is what changes on
//! reconfiguration.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
#[cfg(unix)]
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use relay_core::domain::DEFAULT_PORT;
use relay_core::protocol::DEFAULT_MAX_FRAME_BYTES;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid downstream endpoint {0:?}: expected host:port or an absolute socket path")]
pub struct InvalidEndpoint(pub String);

/// Address of the local management endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownstreamEndpoint {
    /// `host:port`, resolved on every connect.
    Tcp(String),
    /// Filesystem path of a Unix domain socket.
    #[cfg(unix)]
    Unix(PathBuf),
}

impl Default for DownstreamEndpoint {
    fn default() -> Self {
        DownstreamEndpoint::Tcp(format!("127.0.0.1:{DEFAULT_PORT}"))
    }
}

impl FromStr for DownstreamEndpoint {
    type Err = InvalidEndpoint;

    /// Parses `host:port`, `[v6]:port`, or (on Unix) an absolute path.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        #[cfg(unix)]
        {
            if s.starts_with('/') {
                return Ok(DownstreamEndpoint::Unix(PathBuf::from(s)));
            }
        }
        match s.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                Ok(DownstreamEndpoint::Tcp(s.to_string()))
            }
            _ => Err(InvalidEndpoint(s.to_string())),
        }
    }
}

impl fmt::Display for DownstreamEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownstreamEndpoint::Tcp(addr) => f.write_str(addr),
            #[cfg(unix)]
            DownstreamEndpoint::Unix(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Accept-loop and drain tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerOptions {
    /// Interface to bind; the port comes from the relay configuration.
    pub bind_address: IpAddr,
    pub downstream: DownstreamEndpoint,
    /// Pause before a new connection is served, to blunt connection floods.
    pub accept_delay: Duration,
    /// How long one `accept` waits before the loop re-checks its control signal.
    pub accept_idle_timeout: Duration,
    /// Upper bound on waiting for workers during reconfigure and stop.
    pub drain_timeout: Duration,
    /// Poll interval while the relay is disabled.
    pub disabled_poll_interval: Duration,
    pub max_frame_bytes: usize,
}

impl Default for ListenerOptions {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            downstream: DownstreamEndpoint::default(),
            accept_delay: Duration::from_millis(100),
            accept_idle_timeout: Duration::from_secs(10),
            drain_timeout: Duration::from_secs(5),
            disabled_poll_interval: Duration::from_secs(2),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
