//! Transport module - persistent bidirectional text streams.
//!
//! A transport moves opaque text payloads. Framing is left to the session,
//! except on byte streams where payload boundaries have to be rebuilt.
//!
//! Provides:
//! - [`WebSocketConnector`] - WebSocket with the broker's subprotocols
//! - [`TcpConnector`] - raw TCP, NUL-delimited
//! - [`MemoryConnector`] - in-process pair for tests and embedding
//!
//! [`TransportKind`] picks one of the network variants once at startup.

mod memory;
mod tcp;
mod websocket;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::Result;

pub use memory::{MemoryConnector, MemoryListener, MemoryPeer};
pub use tcp::TcpConnector;
pub use websocket::{WebSocketConnector, SUBPROTOCOLS};

/// Boxed future type for object-safe transport traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Outbound half of a transport.
pub trait PayloadSink: Send + 'static {
    /// Write one payload.
    fn send<'a>(&'a mut self, payload: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Close the transport.
    fn close(&mut self) -> BoxFuture<'_, Result<()>>;
}

/// Inbound half of a transport.
pub trait PayloadStream: Send + 'static {
    /// Next inbound payload. `None` once the peer has closed.
    fn next_payload(&mut self) -> BoxFuture<'_, Option<Result<String>>>;
}

/// An open transport, split into independently owned halves.
pub struct TransportHalves {
    pub sink: Box<dyn PayloadSink>,
    pub stream: Box<dyn PayloadStream>,
}

/// Where and how to open a transport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Endpoint {
    /// `ws://host/path` for WebSocket, `host:port` for TCP.
    pub address: String,
    /// Session cookie from login, attached to the handshake when the
    /// transport supports it.
    pub cookie: Option<String>,
}

impl Endpoint {
    /// Endpoint without a cookie.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            cookie: None,
        }
    }

    /// Attach a session cookie.
    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookie = Some(cookie.into());
        self
    }
}

/// Opens transports.
pub trait Connector: Send + Sync + 'static {
    fn connect<'a>(&'a self, endpoint: &'a Endpoint) -> BoxFuture<'a, Result<TransportHalves>>;
}

/// Network transport variants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// WebSocket, the modern runtime path.
    #[default]
    WebSocket,
    /// Raw TCP for legacy runtimes.
    Tcp,
}

impl TransportKind {
    /// Connector for this variant.
    pub fn connector(self) -> Arc<dyn Connector> {
        match self {
            TransportKind::WebSocket => Arc::new(WebSocketConnector),
            TransportKind::Tcp => Arc::new(TcpConnector),
        }
    }

    /// Transport address for a host and realtime path.
    ///
    /// TCP ignores the path.
    pub fn address(self, host: &str, path: &str) -> String {
        match self {
            TransportKind::WebSocket => format!("ws://{}{}", host, path),
            TransportKind::Tcp => host.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_address() {
        assert_eq!(
            TransportKind::WebSocket.address("lock.example:8080", "/realtime"),
            "ws://lock.example:8080/realtime"
        );
        assert_eq!(
            TransportKind::Tcp.address("lock.example:61613", "/realtime"),
            "lock.example:61613"
        );
    }

    #[test]
    fn test_transport_kind_deserialize() {
        let kind: TransportKind = serde_json::from_str("\"tcp\"").unwrap();
        assert_eq!(kind, TransportKind::Tcp);
        let kind: TransportKind = serde_json::from_str("\"websocket\"").unwrap();
        assert_eq!(kind, TransportKind::WebSocket);
        assert_eq!(TransportKind::default(), TransportKind::WebSocket);
    }

    #[test]
    fn test_endpoint_cookie() {
        let endpoint = Endpoint::new("ws://a/b").with_cookie("sid=1");
        assert_eq!(endpoint.cookie.as_deref(), Some("sid=1"));
    }
}
