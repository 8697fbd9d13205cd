//! Infrastructure layer for relay-server.
//!
//! Everything that touches a socket, a task or a file lives here:
//!
//! - Binding the listener and supervising its lifecycle
//! - Running one worker task per accepted console connection
//! - Reading and writing `0x03`-terminated frames
//! - Connecting to the local management endpoint
//! - Delivering lifecycle events to the hosting application
//! - Loading and saving the settings file
//!
//! Authentication decisions are not made here; workers hand each frame to
//! the application layer's [`Session`](crate::application::Session).

pub mod downstream;
pub mod event_sink;
pub mod frame_io;
pub mod storage;
pub mod supervisor;
pub mod worker;

pub use downstream::DownstreamBridge;
pub use event_sink::ChannelEventSink;
pub use storage::{load_settings, save_settings, RelaySettings, SettingsError};
pub use supervisor::Supervisor;
