use std::fmt;

/// Transport session connection state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    /// Transport opening or `CONNECT` sent, no `CONNECTED` yet.
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// Why a session ended through the error path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionFailure {
    /// The transport could not be opened.
    ConnectFailed(String),
    /// The server sent an `ERROR` frame.
    ServerError(crate::protocol::Frame),
    /// The transport closed or failed without a `DISCONNECT`.
    TransportClosed(String),
    /// No server traffic for more than twice the negotiated interval.
    HeartbeatTimeout,
    /// Consecutive malformed frames reached the configured limit.
    ProtocolViolations(u32),
}

impl fmt::Display for SessionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionFailure::ConnectFailed(e) => write!(f, "connect failed: {}", e),
            SessionFailure::ServerError(frame) => match frame.header("message") {
                Some(message) => write!(f, "server error: {}", message),
                None => write!(f, "server error: {}", frame.body),
            },
            SessionFailure::TransportClosed(e) => write!(f, "transport closed: {}", e),
            SessionFailure::HeartbeatTimeout => f.write_str("heartbeat timeout"),
            SessionFailure::ProtocolViolations(n) => {
                write!(f, "{} consecutive protocol violations", n)
            }
        }
    }
}
