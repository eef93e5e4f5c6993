//! Frame buffer for byte-stream transports.
//!
//! Message-oriented transports (WebSocket) hand over whole payloads. A raw
//! TCP stream does not, so reads are accumulated here and split back into
//! wire units:
//! - a bare line terminator between frames becomes a [`HEARTBEAT`] unit
//! - a frame is emitted once its NUL terminator has arrived; when the header
//!   block declares `content-length`, the body is taken by length so embedded
//!   NULs survive
//!
//! # Example
//!
//! ```
//! use lockstream_client::protocol::FrameBuffer;
//!
//! let mut buffer = FrameBuffer::new();
//! assert!(buffer.push(b"MESSAGE\n\nhel").is_empty());
//!
//! let units: Vec<String> = buffer
//!     .push(b"lo\0\n")
//!     .into_iter()
//!     .collect::<Result<_, _>>()
//!     .unwrap();
//! assert_eq!(units, vec!["MESSAGE\n\nhello\0".to_string(), "\n".to_string()]);
//! ```

use bytes::BytesMut;

use super::wire_format::{headers as names, HEARTBEAT};
use crate::error::{LockstreamError, Result};

/// Default upper bound on a buffered, incomplete frame (1 MiB).
pub const DEFAULT_MAX_BUFFERED: usize = 1024 * 1024;

/// State machine for frame extraction.
#[derive(Debug, Clone, Copy)]
enum State {
    /// Looking for the end of the header block.
    WaitingForHeaders,
    /// Header block seen; frame ends at `end` (exclusive, NUL included).
    WaitingForBody { end: usize },
    /// Header block seen without `content-length`; scan for NUL from `from`.
    ScanningForNull { from: usize },
}

/// Accumulates stream bytes and yields complete wire units.
pub struct FrameBuffer {
    buffer: BytesMut,
    state: State,
    max_buffered: usize,
}

impl FrameBuffer {
    /// Create a new frame buffer with default limits.
    pub fn new() -> Self {
        Self::with_max_buffered(DEFAULT_MAX_BUFFERED)
    }

    /// Create a new frame buffer with a custom limit on incomplete data.
    pub fn with_max_buffered(max_buffered: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(16 * 1024),
            state: State::WaitingForHeaders,
            max_buffered,
        }
    }

    /// Push data and extract every complete unit.
    ///
    /// A malformed frame yields an `Err` item in place of the unit; its bytes
    /// are discarded up to the next NUL and extraction carries on, so frames
    /// that follow it in the same read are still returned. Errors are
    /// protocol violations: an unparseable `content-length`, a
    /// length-delimited body not followed by NUL, a unit that is not UTF-8,
    /// or an incomplete frame growing past the configured limit.
    pub fn push(&mut self, data: &[u8]) -> Vec<Result<String>> {
        self.buffer.extend_from_slice(data);

        let mut units = Vec::new();
        loop {
            match self.try_extract_one() {
                Ok(Some(unit)) => units.push(Ok(unit)),
                Ok(None) => break,
                Err(e) => units.push(Err(e)),
            }
        }

        if self.buffer.len() > self.max_buffered {
            self.clear();
            units.push(Err(LockstreamError::Protocol(format!(
                "incomplete frame exceeds {} bytes",
                self.max_buffered
            ))));
        }

        units
    }

    fn try_extract_one(&mut self) -> Result<Option<String>> {
        match self.state {
            State::WaitingForHeaders => {
                match self.buffer.first() {
                    None => return Ok(None),
                    Some(b'\n') => {
                        let _ = self.buffer.split_to(1);
                        return Ok(Some(HEARTBEAT.to_string()));
                    }
                    Some(b'\r') | Some(0) => {
                        let _ = self.buffer.split_to(1);
                        return self.try_extract_one();
                    }
                    Some(_) => {}
                }

                let divider = match find(&self.buffer, b"\n\n") {
                    Some(d) => d,
                    None => return Ok(None),
                };
                let body_start = divider + 2;

                self.state = match content_length(&self.buffer[..divider]) {
                    Ok(Some(len)) => match body_start.checked_add(len).and_then(|e| e.checked_add(1)) {
                        Some(end) => State::WaitingForBody { end },
                        None => {
                            self.discard_segment(body_start);
                            return Err(LockstreamError::Protocol(format!(
                                "content-length {} out of range",
                                len
                            )));
                        }
                    },
                    Ok(None) => State::ScanningForNull { from: body_start },
                    Err(e) => {
                        self.discard_segment(body_start);
                        return Err(e);
                    }
                };
                self.try_extract_one()
            }

            State::WaitingForBody { end } => {
                if self.buffer.len() < end {
                    return Ok(None);
                }
                self.state = State::WaitingForHeaders;
                if self.buffer[end - 1] != 0 {
                    self.discard_segment(end - 1);
                    return Err(LockstreamError::Protocol(
                        "frame body longer than content-length".to_string(),
                    ));
                }
                self.take_unit(end).map(Some)
            }

            State::ScanningForNull { from } => match self.buffer[from..].iter().position(|b| *b == 0) {
                Some(offset) => {
                    self.state = State::WaitingForHeaders;
                    self.take_unit(from + offset + 1).map(Some)
                }
                None => {
                    self.state = State::ScanningForNull {
                        from: self.buffer.len(),
                    };
                    Ok(None)
                }
            },
        }
    }

    /// Drop everything up to and including the next NUL at or after `from`.
    fn discard_segment(&mut self, from: usize) {
        self.state = State::WaitingForHeaders;
        match self.buffer[from..].iter().position(|b| *b == 0) {
            Some(offset) => {
                let _ = self.buffer.split_to(from + offset + 1);
            }
            None => self.buffer.clear(),
        }
    }

    fn take_unit(&mut self, len: usize) -> Result<String> {
        let bytes = self.buffer.split_to(len);
        String::from_utf8(bytes.to_vec())
            .map_err(|e| LockstreamError::Protocol(format!("frame is not UTF-8: {}", e)))
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop buffered data and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForHeaders;
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// First `content-length` in a header block, if any.
fn content_length(header_block: &[u8]) -> Result<Option<usize>> {
    let prefix = names::CONTENT_LENGTH.as_bytes();
    for line in header_block.split(|b| *b == b'\n').skip(1) {
        let Some(colon) = line.iter().position(|b| *b == b':') else {
            continue;
        };
        let name = String::from_utf8_lossy(&line[..colon]);
        if name.trim().as_bytes() != prefix {
            continue;
        }
        let value = String::from_utf8_lossy(&line[colon + 1..]);
        return value.trim().parse::<usize>().map(Some).map_err(|_| {
            LockstreamError::Protocol(format!("invalid content-length '{}'", value.trim()))
        });
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{marshal, unmarshal, Headers};

    fn ok_units(results: Vec<Result<String>>) -> Vec<String> {
        results.into_iter().collect::<Result<Vec<_>>>().unwrap()
    }

    #[test]
    fn test_complete_frame_in_one_push() {
        let wire = marshal("MESSAGE", &Headers::new().with("id", "1"), "payload");
        let mut buffer = FrameBuffer::new();

        let units = ok_units(buffer.push(wire.as_bytes()));
        assert_eq!(units, vec![wire]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_byte_by_byte() {
        let wire = marshal("MESSAGE", &Headers::new(), "开锁");
        let mut buffer = FrameBuffer::new();
        let mut units = Vec::new();

        for b in wire.as_bytes() {
            units.extend(ok_units(buffer.push(&[*b])));
        }

        assert_eq!(units, vec![wire]);
    }

    #[test]
    fn test_heartbeats_between_frames() {
        let mut buffer = FrameBuffer::new();
        let units = ok_units(buffer.push(b"\n\nA\n\n\0\r\n"));
        assert_eq!(units, vec!["\n", "\n", "A\n\n\0", "\n"]);
    }

    #[test]
    fn test_content_length_with_embedded_null() {
        let mut buffer = FrameBuffer::new();
        let units = ok_units(buffer.push(b"MESSAGE\ncontent-length:3\n\na\0b\0"));

        assert_eq!(units.len(), 1);
        let frame = unmarshal(&units[0]).next().unwrap().unwrap();
        assert_eq!(frame.body, "a\0b");
    }

    #[test]
    fn test_multiple_frames_one_push() {
        let mut data = marshal("A", &Headers::new(), "1");
        data.push_str(&marshal("B", &Headers::new(), ""));
        let mut buffer = FrameBuffer::new();

        let units = ok_units(buffer.push(data.as_bytes()));
        assert_eq!(units.len(), 2);
    }

    #[test]
    fn test_length_mismatch_resyncs_at_next_null() {
        let mut buffer = FrameBuffer::new();
        let results = buffer.push(b"MESSAGE\ncontent-length:1\n\nabc\0B\n\nok\0");

        assert_eq!(results.len(), 2);
        assert!(matches!(results[0], Err(LockstreamError::Protocol(_))));
        assert_eq!(results[1].as_deref().unwrap(), "B\n\nok\0");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_invalid_content_length_is_error() {
        let mut buffer = FrameBuffer::new();
        let results = buffer.push(b"MESSAGE\ncontent-length:x\n\nabc\0");
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_max_buffered_limit() {
        let mut buffer = FrameBuffer::with_max_buffered(8);
        let results = buffer.push(b"MESSAGE\nlong-header-without-end");
        assert!(results.last().unwrap().is_err());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_huge_content_length_is_error() {
        let mut buffer = FrameBuffer::new();
        let data = format!("MESSAGE\ncontent-length:{}\n\nx\0B\n\nok\0", usize::MAX);
        let results = buffer.push(data.as_bytes());

        assert_eq!(results.len(), 2);
        assert!(matches!(results[0], Err(LockstreamError::Protocol(_))));
        assert_eq!(results[1].as_ref().unwrap(), "B\n\nok\0");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut buffer = FrameBuffer::new();
        assert!(buffer.push(b"MESSAGE\n\npartial").is_empty());
        assert!(!buffer.is_empty());
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.len(), 0);
    }
}
