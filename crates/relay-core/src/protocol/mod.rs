//! Protocol module containing the frame codec and the wire messages.

pub mod frame;
pub mod messages;

pub use frame::{encode_frame, FrameDecoder, FrameError, DEFAULT_MAX_FRAME_BYTES, TERMINATOR};
pub use messages::AuthRequest;
