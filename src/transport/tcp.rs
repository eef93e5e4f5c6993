//! Raw TCP transport.
//!
//! The stream carries frames back to back. Reads are reassembled into
//! frames and heartbeat units with a [`FrameBuffer`].

use std::collections::VecDeque;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use super::{BoxFuture, Connector, Endpoint, PayloadSink, PayloadStream, TransportHalves};
use crate::error::Result;
use crate::protocol::FrameBuffer;

/// Read buffer size.
const READ_BUFFER_SIZE: usize = 16 * 1024;

/// Opens TCP transports.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    fn connect<'a>(&'a self, endpoint: &'a Endpoint) -> BoxFuture<'a, Result<TransportHalves>> {
        Box::pin(async move {
            tracing::debug!("Opening TCP stream to {}", endpoint.address);
            let stream = TcpStream::connect(endpoint.address.as_str()).await?;
            stream.set_nodelay(true)?;
            let (read, write) = stream.into_split();

            Ok(TransportHalves {
                sink: Box::new(TcpSink { write }),
                stream: Box::new(TcpSource {
                    read,
                    frames: FrameBuffer::new(),
                    ready: VecDeque::new(),
                    buf: vec![0u8; READ_BUFFER_SIZE],
                }),
            })
        })
    }
}

struct TcpSink {
    write: OwnedWriteHalf,
}

impl PayloadSink for TcpSink {
    fn send<'a>(&'a mut self, payload: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.write.write_all(payload.as_bytes()).await?;
            self.write.flush().await?;
            Ok(())
        })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.write.shutdown().await?;
            Ok(())
        })
    }
}

struct TcpSource {
    read: OwnedReadHalf,
    frames: FrameBuffer,
    ready: VecDeque<Result<String>>,
    buf: Vec<u8>,
}

impl PayloadStream for TcpSource {
    fn next_payload(&mut self) -> BoxFuture<'_, Option<Result<String>>> {
        Box::pin(async move {
            loop {
                if let Some(unit) = self.ready.pop_front() {
                    return Some(unit);
                }

                let n = match self.read.read(&mut self.buf).await {
                    Ok(0) => return None,
                    Ok(n) => n,
                    Err(e) => return Some(Err(e.into())),
                };
                self.ready.extend(self.frames.push(&self.buf[..n]));
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{marshal, Headers};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_reassembles_split_writes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let wire = marshal("MESSAGE", &Headers::new().with("subscription", "sub-0"), "开锁");
        let server_wire = wire.clone();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let bytes = server_wire.as_bytes();
            let (a, b) = bytes.split_at(7);
            socket.write_all(b"\n").await.unwrap();
            socket.write_all(a).await.unwrap();
            socket.flush().await.unwrap();
            tokio::task::yield_now().await;
            socket.write_all(b).await.unwrap();
        });

        let halves = TcpConnector
            .connect(&Endpoint::new(addr.to_string()))
            .await
            .unwrap();
        let mut stream = halves.stream;

        assert_eq!(stream.next_payload().await.unwrap().unwrap(), "\n");
        assert_eq!(stream.next_payload().await.unwrap().unwrap(), wire);

        server.await.unwrap();
        assert!(stream.next_payload().await.is_none());
    }

    #[tokio::test]
    async fn test_tcp_sink_writes_payload() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = String::new();
            socket.read_to_string(&mut received).await.unwrap();
            received
        });

        let mut halves = TcpConnector
            .connect(&Endpoint::new(addr.to_string()))
            .await
            .unwrap();
        halves.sink.send("DISCONNECT\n\n\0").await.unwrap();
        halves.sink.close().await.unwrap();

        assert_eq!(server.await.unwrap(), "DISCONNECT\n\n\0");
    }
}
