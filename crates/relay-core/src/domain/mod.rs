//! Domain layer: relay configuration, the allow-list filter and the lockout
//! policy.  Pure types and functions; time is always passed in by the caller.

pub mod allow_list;
pub mod config;
pub mod lockout;

pub use allow_list::{is_allowed, strip_port};
pub use config::{ConfigError, RelayConfig, DEFAULT_PORT, MAX_ALLOWED_ADDRESSES};
pub use lockout::{ledger_key, LockoutEntry, LockoutPolicy};
