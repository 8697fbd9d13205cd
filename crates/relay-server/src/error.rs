//! Error type for the relay server library.

use std::io;
use std::net::SocketAddr;

use relay_core::{ConfigError, FrameError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    /// `start` or `reconfigure` was handed a configuration that failed validation.
    #[error("invalid relay configuration: {0}")]
    Config(#[from] ConfigError),

    /// The listening socket could not be bound.
    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The local endpoint closed its connection before sending a reply.
    #[error("downstream endpoint closed the connection before replying")]
    DownstreamClosed,
}
