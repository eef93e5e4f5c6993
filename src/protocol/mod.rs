//! Protocol module - wire format, framing, and frame types.
//!
//! This module implements the text frame protocol spoken with the broker:
//! - Frame encoding with computed UTF-8 `content-length`
//! - Lazy decoding of concatenated frames
//! - Fragmentation of large writes
//! - Frame buffer for reassembling byte streams

mod frame;
mod frame_buffer;
mod unmarshal;
mod wire_format;

pub use frame::{fragment, marshal, Frame, Headers};
pub use frame_buffer::{FrameBuffer, DEFAULT_MAX_BUFFERED};
pub use unmarshal::{unmarshal, Unmarshal};
pub use wire_format::{
    headers, versions, Command, HeartBeat, DEFAULT_MAX_FRAME_SIZE, HEADER_BODY_DIVIDER, HEARTBEAT,
    LF, NULL, OMIT_CONTENT_LENGTH,
};
