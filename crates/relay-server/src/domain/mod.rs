//! Domain layer for relay-server.
//!
//! Plain types describing what the relay does, with no sockets, tasks or
//! files: the lifecycle events pushed to the hosting application, the
//! supervisor's state machine, and the listener options that shape how
//! connections are accepted and where authenticated requests go.

pub mod lifecycle;
pub mod options;

pub use lifecycle::{RelayEvent, SupervisorState};
pub use options::{DownstreamEndpoint, InvalidEndpoint, ListenerOptions};
