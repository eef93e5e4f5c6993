//! Wire format constants and header vocabulary.
//!
//! Frames are line-based text:
//! ```text
//! COMMAND\n
//! name:value\n
//! ...\n
//! \n
//! body\0
//! ```
//!
//! A frame ends with a single NUL byte, optionally followed by LF padding.
//! A bare LF on its own is a heartbeat, not a frame.

use std::fmt;
use std::time::Duration;

/// Frame terminator.
pub const NULL: char = '\0';

/// Line terminator.
pub const LF: char = '\n';

/// Keep-alive unit sent and received between frames.
pub const HEARTBEAT: &str = "\n";

/// Separator between the header block and the body.
pub const HEADER_BODY_DIVIDER: &str = "\n\n";

/// Default maximum size of a single transport write (16 KiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024;

/// Value of `content-length` that suppresses the computed header.
pub const OMIT_CONTENT_LENGTH: &str = "false";

/// Protocol versions.
pub mod versions {
    pub const V1_0: &str = "1.0";
    pub const V1_1: &str = "1.1";
    pub const V1_2: &str = "1.2";

    /// Value sent in `accept-version`.
    pub const SUPPORTED: &str = "1.1,1.0";

    /// Versions whose `CONNECTED` frame carries heartbeat negotiation.
    #[inline]
    pub fn negotiates_heartbeat(version: &str) -> bool {
        version == V1_1 || version == V1_2
    }
}

/// Well-known header names.
pub mod headers {
    pub const ACCEPT_VERSION: &str = "accept-version";
    pub const CONTENT_LENGTH: &str = "content-length";
    pub const DESTINATION: &str = "destination";
    pub const HEART_BEAT: &str = "heart-beat";
    pub const HOST: &str = "host";
    pub const ID: &str = "id";
    pub const LOGIN: &str = "login";
    pub const MESSAGE_ID: &str = "message-id";
    pub const PASSCODE: &str = "passcode";
    pub const RECEIPT_ID: &str = "receipt-id";
    pub const SERVER: &str = "server";
    pub const SUBSCRIPTION: &str = "subscription";
    pub const TRANSACTION: &str = "transaction";
    pub const VERSION: &str = "version";
}

/// Frame commands known to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Connect,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Message,
    Receipt,
    Error,
    Ack,
    Nack,
    Begin,
    Commit,
    Abort,
    Disconnect,
    /// Anything the client does not recognise.
    Other(String),
}

impl Command {
    /// Parse a command line.
    pub fn parse(s: &str) -> Self {
        match s {
            "CONNECT" => Self::Connect,
            "CONNECTED" => Self::Connected,
            "SEND" => Self::Send,
            "SUBSCRIBE" => Self::Subscribe,
            "UNSUBSCRIBE" => Self::Unsubscribe,
            "MESSAGE" => Self::Message,
            "RECEIPT" => Self::Receipt,
            "ERROR" => Self::Error,
            "ACK" => Self::Ack,
            "NACK" => Self::Nack,
            "BEGIN" => Self::Begin,
            "COMMIT" => Self::Commit,
            "ABORT" => Self::Abort,
            "DISCONNECT" => Self::Disconnect,
            other => Self::Other(other.to_string()),
        }
    }

    /// Wire representation.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Connect => "CONNECT",
            Self::Connected => "CONNECTED",
            Self::Send => "SEND",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
            Self::Ack => "ACK",
            Self::Nack => "NACK",
            Self::Begin => "BEGIN",
            Self::Commit => "COMMIT",
            Self::Abort => "ABORT",
            Self::Disconnect => "DISCONNECT",
            Self::Other(s) => s,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Heartbeat intervals as carried in the `heart-beat` header.
///
/// `outgoing` is how often the sender promises to emit traffic,
/// `incoming` is how often it wants to receive traffic. Zero disables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartBeat {
    pub outgoing: Duration,
    pub incoming: Duration,
}

impl HeartBeat {
    /// Create from millisecond values.
    pub fn from_millis(outgoing: u64, incoming: u64) -> Self {
        Self {
            outgoing: Duration::from_millis(outgoing),
            incoming: Duration::from_millis(incoming),
        }
    }

    /// Header value, e.g. `"10000,10000"`.
    pub fn to_header(&self) -> String {
        format!(
            "{},{}",
            self.outgoing.as_millis(),
            self.incoming.as_millis()
        )
    }

    /// Parse a header value. Returns `None` for anything but two integers.
    pub fn parse(value: &str) -> Option<Self> {
        let mut parts = value.split(',');
        let outgoing = parts.next()?.trim().parse::<u64>().ok()?;
        let incoming = parts.next()?.trim().parse::<u64>().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self::from_millis(outgoing, incoming))
    }
}
