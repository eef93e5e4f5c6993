//! In-process transport.
//!
//! [`MemoryConnector::new`] returns the client-side connector and a
//! [`MemoryListener`] that yields one [`MemoryPeer`] per connect. The peer
//! plays the broker: it reads what the client wrote and pushes payloads back.
//! Dropping the listener makes further connects fail.

use tokio::sync::mpsc;

use super::{BoxFuture, Connector, Endpoint, PayloadSink, PayloadStream, TransportHalves};
use crate::error::{LockstreamError, Result};
use crate::protocol::{unmarshal, Frame, NULL};

/// Client side of an in-process transport.
pub struct MemoryConnector {
    accept_tx: mpsc::UnboundedSender<MemoryPeer>,
}

impl MemoryConnector {
    /// Create a connector and the listener that receives its connections.
    pub fn new() -> (Self, MemoryListener) {
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        (
            Self { accept_tx },
            MemoryListener { accept_rx },
        )
    }
}

impl Connector for MemoryConnector {
    fn connect<'a>(&'a self, endpoint: &'a Endpoint) -> BoxFuture<'a, Result<TransportHalves>> {
        Box::pin(async move {
            let (to_peer_tx, to_peer_rx) = mpsc::unbounded_channel();
            let (to_client_tx, to_client_rx) = mpsc::unbounded_channel();

            let peer = MemoryPeer {
                endpoint: endpoint.clone(),
                inbound: to_peer_rx,
                outbound: Some(to_client_tx),
                pending: String::new(),
            };
            self.accept_tx
                .send(peer)
                .map_err(|_| LockstreamError::ConnectionClosed)?;

            Ok(TransportHalves {
                sink: Box::new(MemorySink {
                    tx: Some(to_peer_tx),
                }),
                stream: Box::new(MemorySource { rx: to_client_rx }),
            })
        })
    }
}

/// Accepts connections made through a [`MemoryConnector`].
pub struct MemoryListener {
    accept_rx: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryListener {
    /// Wait for the next connection. `None` once the connector is gone.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.accept_rx.recv().await
    }

    /// Take a connection if one is already waiting.
    pub fn try_accept(&mut self) -> Option<MemoryPeer> {
        self.accept_rx.try_recv().ok()
    }
}

/// Server end of one in-process connection.
pub struct MemoryPeer {
    /// Endpoint the client asked for.
    pub endpoint: Endpoint,
    inbound: mpsc::UnboundedReceiver<String>,
    outbound: Option<mpsc::UnboundedSender<String>>,
    pending: String,
}

impl MemoryPeer {
    /// Next raw payload written by the client. `None` once the client closed.
    pub async fn recv(&mut self) -> Option<String> {
        self.inbound.recv().await
    }

    /// Next complete frame from the client, skipping heartbeats.
    ///
    /// Fragmented writes are joined at the NUL terminator, so bodies with
    /// embedded NULs are not supported here.
    pub async fn recv_frame(&mut self) -> Option<Frame> {
        loop {
            let trimmed = self.pending.trim_start_matches(|c| c == '\n' || c == '\r').len();
            self.pending.drain(..self.pending.len() - trimmed);

            if let Some(nul) = self.pending.find(NULL) {
                let unit: String = self.pending.drain(..=nul).collect();
                if let Some(Ok(frame)) = unmarshal(&unit).next() {
                    return Some(frame);
                }
                continue;
            }

            let payload = self.inbound.recv().await?;
            self.pending.push_str(&payload);
        }
    }

    /// Push a payload to the client. Returns false if the client is gone.
    pub fn send(&self, payload: impl Into<String>) -> bool {
        match &self.outbound {
            Some(tx) => tx.send(payload.into()).is_ok(),
            None => false,
        }
    }

    /// Push an encoded frame to the client.
    pub fn send_frame(&self, frame: &Frame) -> bool {
        self.send(frame.marshal())
    }

    /// Close the server side. The client sees end of stream.
    pub fn close(&mut self) {
        self.outbound = None;
    }
}

struct MemorySink {
    tx: Option<mpsc::UnboundedSender<String>>,
}

impl PayloadSink for MemorySink {
    fn send<'a>(&'a mut self, payload: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            match &self.tx {
                Some(tx) => tx
                    .send(payload.to_string())
                    .map_err(|_| LockstreamError::ConnectionClosed),
                None => Err(LockstreamError::ConnectionClosed),
            }
        })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<()>> {
        self.tx = None;
        Box::pin(async { Ok(()) })
    }
}

struct MemorySource {
    rx: mpsc::UnboundedReceiver<String>,
}

impl PayloadStream for MemorySource {
    fn next_payload(&mut self) -> BoxFuture<'_, Option<Result<String>>> {
        Box::pin(async move { self.rx.recv().await.map(Ok) })
    }
}
