//! Frame decoding.
//!
//! [`unmarshal`] returns a lazy, single-pass iterator over the frames in one
//! transport payload. Frames are separated by a NUL byte and any number of
//! line terminators; empty segments are skipped.
//!
//! Each item is a `Result`: a segment with no header/body divider, an
//! unparseable `content-length`, or a body that overruns its declared length
//! yields `Err(LockstreamError::Protocol)`, after which decoding resumes at
//! the next NUL.

use super::frame::{Frame, Headers};
use super::wire_format::{headers as names, HEADER_BODY_DIVIDER, LF, NULL};
use crate::error::{LockstreamError, Result};

/// Decode all frames contained in `data`.
pub fn unmarshal(data: &str) -> Unmarshal<'_> {
    Unmarshal { data, pos: 0 }
}

/// Iterator returned by [`unmarshal`].
#[derive(Debug)]
pub struct Unmarshal<'a> {
    data: &'a str,
    pos: usize,
}

impl<'a> Unmarshal<'a> {
    /// Bytes not yet consumed.
    pub fn remaining(&self) -> &'a str {
        &self.data[self.pos..]
    }

    fn skip_padding(&mut self) {
        let rest = self.remaining();
        let trimmed = rest.trim_start_matches(|c| c == NULL || c == LF || c == '\r');
        self.pos += rest.len() - trimmed.len();
    }

    /// Move the cursor just past the next NUL, or to the end.
    fn skip_segment(&mut self) {
        self.pos = match self.remaining().find(NULL) {
            Some(nul) => self.pos + nul + 1,
            None => self.data.len(),
        };
    }

    fn next_frame(&mut self) -> Result<Frame> {
        let rest = self.remaining();
        let segment_end = rest.find(NULL).unwrap_or(rest.len());

        let divider = match rest.find(HEADER_BODY_DIVIDER) {
            Some(d) if d < segment_end => d,
            _ => {
                self.skip_segment();
                return Err(LockstreamError::Protocol(
                    "frame has no header/body divider".to_string(),
                ));
            }
        };

        let mut lines = rest[..divider].split(LF);
        let command = lines.next().unwrap_or_default().trim().to_string();

        // Reverse order so the first occurrence of a repeated header wins.
        let header_lines: Vec<&str> = lines.collect();
        let mut headers = Headers::new();
        for line in header_lines.iter().rev() {
            if let Some((name, value)) = line.split_once(':') {
                headers.insert(name.trim(), value.trim());
            }
        }

        let body_start = divider + HEADER_BODY_DIVIDER.len();
        let body = match headers.get(names::CONTENT_LENGTH) {
            Some(raw) => {
                let len = match raw.parse::<usize>() {
                    Ok(len) => len,
                    Err(_) => {
                        self.skip_segment();
                        return Err(LockstreamError::Protocol(format!(
                            "invalid content-length '{}'",
                            raw
                        )));
                    }
                };
                let bounded = body_start
                    .checked_add(len)
                    .and_then(|end| rest.get(body_start..end).map(|body| (body, end)));
                let (body, body_end) = match bounded {
                    Some(bounded) => bounded,
                    None => {
                        self.skip_segment();
                        return Err(LockstreamError::Protocol(format!(
                            "content-length {} overruns payload",
                            len
                        )));
                    }
                };
                if !rest[body_end..].starts_with(NULL) {
                    self.pos += body_end;
                    self.skip_segment();
                    return Err(LockstreamError::Protocol(format!(
                        "frame body longer than content-length {}",
                        len
                    )));
                }
                self.pos += body_end + 1;
                body
            }
            None => {
                let body = &rest[body_start..segment_end.max(body_start)];
                self.pos += (segment_end + 1).min(rest.len());
                body
            }
        };

        Ok(Frame::new(command, headers, body))
    }
}

impl<'a> Iterator for Unmarshal<'a> {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        self.skip_padding();
        if self.pos >= self.data.len() {
            return None;
        }
        Some(self.next_frame())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::marshal;

    fn frames(data: &str) -> Vec<Frame> {
        unmarshal(data).collect::<Result<Vec<_>>>().unwrap()
    }

    #[test]
    fn test_single_frame() {
        let decoded = frames("MESSAGE\nsubscription:sub-0\nmessage-id:7\n\nhello\0");
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].command, "MESSAGE");
        assert_eq!(decoded[0].header("subscription"), Some("sub-0"));
        assert_eq!(decoded[0].header("message-id"), Some("7"));
        assert_eq!(decoded[0].body, "hello");
    }

    #[test]
    fn test_concatenated_frames_with_padding() {
        let data = "CONNECTED\nversion:1.1\n\n\0\n\nMESSAGE\n\nbody\0\n";
        let decoded = frames(data);
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].command, "CONNECTED");
        assert_eq!(decoded[1].command, "MESSAGE");
        assert_eq!(decoded[1].body, "body");
    }

    #[test]
    fn test_duplicate_header_first_wins() {
        let decoded = frames("MESSAGE\nfoo:first\nfoo:second\n\n\0");
        assert_eq!(decoded[0].header("foo"), Some("first"));
    }

    #[test]
    fn test_content_length_allows_embedded_null() {
        let data = "MESSAGE\ncontent-length:5\n\na\0b\0c\0";
        let decoded = frames(data);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].body, "a\0b\0c");
    }

    #[test]
    fn test_content_length_counts_bytes() {
        let wire = marshal("SEND", &Headers::new(), "锁锁锁");
        let decoded = frames(&wire);
        assert_eq!(decoded[0].body, "锁锁锁");
        assert_eq!(decoded[0].header("content-length"), Some("9"));
    }

    #[test]
    fn test_header_values_are_trimmed() {
        let decoded = frames("MESSAGE\n key : value \n\n\0");
        assert_eq!(decoded[0].header("key"), Some("value"));
    }

    #[test]
    fn test_missing_divider_is_violation_and_recovers() {
        let data = "GARBAGE\0MESSAGE\n\nok\0";
        let mut iter = unmarshal(data);

        assert!(matches!(iter.next(), Some(Err(LockstreamError::Protocol(_)))));
        let frame = iter.next().unwrap().unwrap();
        assert_eq!(frame.body, "ok");
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_content_length_overrun_is_violation() {
        let data = "MESSAGE\ncontent-length:50\n\nshort\0";
        let mut iter = unmarshal(data);
        assert!(matches!(iter.next(), Some(Err(LockstreamError::Protocol(_)))));
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_huge_content_length_is_violation() {
        let data = format!(
            "MESSAGE\ncontent-length:{}\n\nx\0MESSAGE\n\nok\0",
            usize::MAX
        );
        let mut iter = unmarshal(&data);
        assert!(matches!(iter.next(), Some(Err(LockstreamError::Protocol(_)))));
        assert_eq!(iter.next().unwrap().unwrap().body, "ok");
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_invalid_content_length_is_violation() {
        let data = "MESSAGE\ncontent-length:abc\n\nx\0";
        let results: Vec<_> = unmarshal(data).collect();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }

    #[test]
    fn test_body_without_terminator_reads_to_end() {
        let decoded = frames("MESSAGE\n\npartial");
        assert_eq!(decoded[0].body, "partial");
    }

    #[test]
    fn test_empty_and_padding_only_input() {
        assert_eq!(unmarshal("").count(), 0);
        assert_eq!(unmarshal("\n\n\0\n").count(), 0);
    }

    #[test]
    fn test_lazy_single_pass() {
        let data = "A\n\n\0B\n\n\0";
        let mut iter = unmarshal(data);
        assert_eq!(iter.next().unwrap().unwrap().command, "A");
        assert_eq!(iter.remaining(), "B\n\n\0");
        assert_eq!(iter.next().unwrap().unwrap().command, "B");
        assert!(iter.next().is_none());
    }
}
