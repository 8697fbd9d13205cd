//! # relay-core
//!
//! Shared library for the remote management relay: the frame codec, the
//! XML-shaped wire messages, relay configuration, the connection allow-list,
//! the lockout policy and both challenge/response credential verifiers.
//!
//! This crate performs no I/O.  It has no sockets, no async runtime and no
//! global state, so every piece can be exercised with plain unit tests.  The
//! `relay-server` crate supplies the network plumbing around it.
//!
//! # Architecture overview
//!
//! A management console connects to the relay over TCP.  Every request and
//! reply is a UTF-8 block terminated by a single `0x03` byte.  Before the
//! relay forwards anything to the local management endpoint, the console
//! must prove it knows the shared secret:
//!
//! - **`protocol`** – How bytes become frames ([`protocol::frame`]) and how
//!   authentication frames are recognised and answered
//!   ([`protocol::messages`]).
//!
//! - **`domain`** – Relay configuration, the allow-list filter and the
//!   progressive lockout policy that slows down credential guessing.
//!
//! - **`auth`** – The two interchangeable verifiers: a nonce + MD5 digest
//!   challenge and an encrypted-probe challenge using ChaCha20-Poly1305.

pub mod auth;
pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `relay_core::RelayConfig` instead of `relay_core::domain::config::RelayConfig`.
pub use auth::{AuthError, AuthState, Challenge, Verdict, Verifier};
pub use domain::allow_list::{is_allowed, strip_port};
pub use domain::config::{ConfigError, RelayConfig};
pub use domain::lockout::{ledger_key, LockoutEntry, LockoutPolicy};
pub use protocol::frame::{encode_frame, FrameDecoder, FrameError, TERMINATOR};
pub use protocol::messages::AuthRequest;
