//! Frame struct, header map and marshalling.
//!
//! # Example
//!
//! ```
//! use lockstream_client::protocol::{marshal, unmarshal, Headers};
//!
//! let mut headers = Headers::new();
//! headers.insert("destination", "/request/cmd");
//! let wire = marshal("SEND", &headers, "hello");
//!
//! let frames: Vec<_> = unmarshal(&wire).collect::<Result<_, _>>().unwrap();
//! assert_eq!(frames[0].command, "SEND");
//! assert_eq!(frames[0].header("content-length"), Some("5"));
//! assert_eq!(frames[0].body, "hello");
//! ```

use std::fmt;

use super::wire_format::{headers as names, Command, LF, NULL, OMIT_CONTENT_LENGTH};

/// Ordered header map.
///
/// Serialization follows insertion order. Inserting an existing name
/// replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Create an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a header.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Look up a header value.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Remove a header, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let idx = self.entries.iter().position(|(n, _)| n == name)?;
        Some(self.entries.remove(idx).1)
    }

    /// Check whether a header is present.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterate in serialization order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of headers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (k, v) in iter {
            headers.insert(k, v);
        }
        headers
    }
}

/// A decoded protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: String,
    pub headers: Headers,
    pub body: String,
}

impl Frame {
    /// Create a new frame.
    pub fn new(command: impl Into<String>, headers: Headers, body: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            headers,
            body: body.into(),
        }
    }

    /// Typed command.
    pub fn kind(&self) -> Command {
        Command::parse(&self.command)
    }

    /// Look up a header value.
    #[inline]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Serialize to wire text (including the trailing NUL).
    pub fn marshal(&self) -> String {
        marshal(&self.command, &self.headers, &self.body)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command)?;
        for (name, value) in self.headers.iter() {
            write!(f, "\n{}:{}", name, value)?;
        }
        write!(f, "\n\n{}", self.body)
    }
}

/// Build a complete wire frame.
///
/// A non-empty body gets a computed `content-length` (UTF-8 byte count),
/// replacing any caller value, unless the caller set `content-length` to
/// `"false"`. The sentinel itself never reaches the wire.
pub fn marshal(command: &str, headers: &Headers, body: &str) -> String {
    let mut headers = headers.clone();
    let omit_length = headers.get(names::CONTENT_LENGTH) == Some(OMIT_CONTENT_LENGTH);
    if omit_length {
        headers.remove(names::CONTENT_LENGTH);
    } else if !body.is_empty() {
        headers.insert(names::CONTENT_LENGTH, body.len().to_string());
    }

    let header_bytes: usize = headers.iter().map(|(n, v)| n.len() + v.len() + 2).sum();
    let mut out = String::with_capacity(command.len() + header_bytes + body.len() + 3);
    out.push_str(command);
    out.push(LF);
    for (name, value) in headers.iter() {
        out.push_str(name);
        out.push(':');
        out.push_str(value);
        out.push(LF);
    }
    out.push(LF);
    out.push_str(body);
    out.push(NULL);
    out
}

/// Split an encoded frame into transport writes of at most `max_size` bytes.
///
/// Cuts fall on UTF-8 character boundaries so every piece is valid text.
/// A `max_size` of zero disables fragmentation.
pub fn fragment(wire: &str, max_size: usize) -> Vec<&str> {
    if max_size == 0 || wire.len() <= max_size {
        return vec![wire];
    }

    let mut pieces = Vec::with_capacity(wire.len() / max_size + 1);
    let mut rest = wire;
    while rest.len() > max_size {
        let mut cut = max_size;
        while cut > 0 && !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        if cut == 0 {
            // A single character wider than max_size; emit it whole.
            cut = rest
                .char_indices()
                .nth(1)
                .map(|(i, _)| i)
                .unwrap_or(rest.len());
        }
        let (head, tail) = rest.split_at(cut);
        pieces.push(head);
        rest = tail;
    }
    if !rest.is_empty() {
        pieces.push(rest);
    }
    pieces
}
