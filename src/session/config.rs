//! Session configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::protocol::{HeartBeat, DEFAULT_MAX_FRAME_SIZE};
use crate::writer::{WriterConfig, DEFAULT_CHANNEL_CAPACITY, DEFAULT_MAX_PENDING_PAYLOADS};

/// Default heartbeat interval in both directions (10 seconds).
pub const DEFAULT_HEARTBEAT_MS: u64 = 10_000;

/// Default number of consecutive protocol violations before teardown.
pub const DEFAULT_MAX_PROTOCOL_VIOLATIONS: u32 = 3;

/// Transport session settings.
///
/// Deserializes from JSON with every field optional:
///
/// ```
/// use lockstream_client::session::SessionConfig;
///
/// let config: SessionConfig = serde_json::from_str(r#"{"heartbeat_incoming_ms": 0}"#).unwrap();
/// assert_eq!(config.heartbeat_outgoing_ms, 10_000);
/// assert_eq!(config.heartbeat_incoming_ms, 0);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How often the client promises to send traffic. 0 disables.
    /// Default: 10000
    pub heartbeat_outgoing_ms: u64,
    /// How often the client wants server traffic. 0 disables.
    /// Default: 10000
    pub heartbeat_incoming_ms: u64,
    /// Largest single transport write; longer frames are fragmented.
    /// 0 disables fragmentation. Default: 16384
    pub max_frame_size: usize,
    /// Consecutive malformed frames tolerated before the connection is
    /// torn down. Default: 3
    pub max_protocol_violations: u32,
    /// Outbound queue capacity. Default: 1024
    pub writer_channel_capacity: usize,
    /// Queued payloads before sends are refused. Default: 1024
    pub writer_max_pending: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_outgoing_ms: DEFAULT_HEARTBEAT_MS,
            heartbeat_incoming_ms: DEFAULT_HEARTBEAT_MS,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_protocol_violations: DEFAULT_MAX_PROTOCOL_VIOLATIONS,
            writer_channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            writer_max_pending: DEFAULT_MAX_PENDING_PAYLOADS,
        }
    }
}

impl SessionConfig {
    /// Create a config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set both heartbeat intervals.
    pub fn heartbeat(mut self, outgoing: Duration, incoming: Duration) -> Self {
        self.heartbeat_outgoing_ms = outgoing.as_millis() as u64;
        self.heartbeat_incoming_ms = incoming.as_millis() as u64;
        self
    }

    /// Set the maximum transport write size.
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Set the protocol violation limit.
    pub fn max_protocol_violations(mut self, limit: u32) -> Self {
        self.max_protocol_violations = limit;
        self
    }

    /// Set the outbound queue capacity.
    pub fn writer_channel_capacity(mut self, capacity: usize) -> Self {
        self.writer_channel_capacity = capacity;
        self
    }

    /// Heartbeat intervals offered in `CONNECT`.
    pub fn local_heartbeat(&self) -> HeartBeat {
        HeartBeat::from_millis(self.heartbeat_outgoing_ms, self.heartbeat_incoming_ms)
    }

    pub(crate) fn writer_config(&self) -> WriterConfig {
        WriterConfig {
            max_pending_payloads: self.writer_max_pending,
            channel_capacity: self.writer_channel_capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.local_heartbeat(), HeartBeat::from_millis(10_000, 10_000));
        assert_eq!(config.max_frame_size, 16 * 1024);
        assert_eq!(config.max_protocol_violations, 3);
    }

    #[test]
    fn test_builder_chaining() {
        let config = SessionConfig::new()
            .heartbeat(Duration::from_secs(1), Duration::ZERO)
            .max_frame_size(0)
            .max_protocol_violations(1)
            .writer_channel_capacity(8);

        assert_eq!(config.local_heartbeat(), HeartBeat::from_millis(1_000, 0));
        assert_eq!(config.max_frame_size, 0);
        assert_eq!(config.max_protocol_violations, 1);
        assert_eq!(config.writer_config().channel_capacity, 8);
    }
}
