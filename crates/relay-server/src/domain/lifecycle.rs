//! Supervisor state machine and the status events it reports.
//!
//! ```text
//! Stopped ──start──▶ Starting ──▶ Running ──reconfigure/stop──▶ Draining
//!    ▲                   ▲                                          │
//!    │                   └──────────────── reconfigure ─────────────┤
//!    └──────────────────────────────────── stop ────────────────────┘
//! ```

use std::fmt;
use std::net::SocketAddr;

/// Lifecycle position of the relay supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Stopped,
    Starting,
    Running,
    Draining,
}

/// Status notification pushed to the hosting application.
///
/// Each event maps to a two-letter code, which is all a hosting UI needs to
/// display relay status.  Delivery is best effort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// The listener is bound and accepting.
    Started { addr: SocketAddr },
    /// The relay is disabled in configuration and is polling for a change.
    IdleWait,
    /// A peer passed the allow-list and a session was opened.
    Connected { peer: SocketAddr },
    /// A peer failed the allow-list and was disconnected without a reply.
    IpRejected { peer: SocketAddr },
    /// Workers were still running when a drain deadline expired.
    TimeoutWarning { lingering: usize },
    /// A new configuration is being applied.
    Reconfiguring,
}

impl RelayEvent {
    /// Two-letter status code for the hosting application.
    pub fn code(&self) -> &'static str {
        match self {
            RelayEvent::Started { .. } => "ST",
            RelayEvent::IdleWait => "ID",
            RelayEvent::Connected { .. } => "CN",
            RelayEvent::IpRejected { .. } => "IP",
            RelayEvent::TimeoutWarning { .. } => "TO",
            RelayEvent::Reconfiguring => "RC",
        }
    }
}

impl fmt::Display for RelayEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
