//! Application layer for relay-server.
//!
//! Orchestrates `relay-core` per connection: decides whether a frame is an
//! authentication step or a request to forward, applies the shared lockout
//! ledger, and reaches the outside world only through traits:
//!
//! - [`Downstream`] forwards authenticated requests to the local endpoint.
//! - [`EventSink`] receives lifecycle events for the hosting application.
//!
//! Infrastructure supplies the real implementations; tests supply doubles.

pub mod ledger;
pub mod notify;
pub mod session;

pub use ledger::LockoutLedger;
pub use notify::{EventSink, NullEventSink};
pub use session::{Downstream, Session};
