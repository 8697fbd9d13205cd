//! relay-server library crate.
//!
//! Accepts management-console connections over TCP, authenticates each
//! session, and forwards authenticated requests to the local management
//! endpoint.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Management console  (0x03-terminated frames over TCP)
//!         ↕
//! [relay-server]
//!   ├── domain/           Lifecycle events, supervisor state, listener options
//!   ├── application/      Per-connection Session, shared lockout ledger, event sink seam
//!   └── infrastructure/
//!         ├── supervisor/  Listener lifecycle: start, reconfigure, drain, stop
//!         ├── worker/      One task per accepted connection
//!         ├── frame_io/    Async frame reader/writer
//!         ├── downstream/  Connection to the local management endpoint
//!         ├── event_sink/  Channel-backed event delivery
//!         └── storage/     TOML settings file
//!         ↕
//! Local management endpoint  (same framing, TCP or Unix socket)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` and `relay-core`; the downstream
//!   connection and the event sink are reached through traits.
//! - `infrastructure` owns every socket, task and file.

pub mod error;

/// Domain layer: lifecycle types and listener options (no I/O).
pub mod domain;

/// Application layer: session state machine and shared lockout ledger.
pub mod application;

/// Infrastructure layer: sockets, tasks, settings file.
pub mod infrastructure;

pub use error::RelayError;
pub use infrastructure::supervisor::Supervisor;
