//! WebSocket transport over `tokio-tungstenite`.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{COOKIE, SEC_WEBSOCKET_PROTOCOL};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::{BoxFuture, Connector, Endpoint, PayloadSink, PayloadStream, TransportHalves};
use crate::error::{LockstreamError, Result};

/// Subprotocols offered in the handshake.
pub const SUBPROTOCOLS: &str = "v10.stomp, v11.stomp";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens WebSocket transports.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl Connector for WebSocketConnector {
    fn connect<'a>(&'a self, endpoint: &'a Endpoint) -> BoxFuture<'a, Result<TransportHalves>> {
        Box::pin(async move {
            let mut request = endpoint.address.as_str().into_client_request()?;
            request
                .headers_mut()
                .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(SUBPROTOCOLS));
            if let Some(cookie) = &endpoint.cookie {
                let value = HeaderValue::from_str(cookie).map_err(|e| {
                    LockstreamError::Config(format!("invalid session cookie: {}", e))
                })?;
                request.headers_mut().insert(COOKIE, value);
            }

            tracing::debug!("Opening WebSocket to {}", endpoint.address);
            let (ws, _response) = tokio_tungstenite::connect_async(request).await?;
            let (sink, stream) = ws.split();

            Ok(TransportHalves {
                sink: Box::new(WebSocketSink { sink }),
                stream: Box::new(WebSocketSource { stream }),
            })
        })
    }
}

struct WebSocketSink {
    sink: SplitSink<WsStream, Message>,
}

impl PayloadSink for WebSocketSink {
    fn send<'a>(&'a mut self, payload: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.sink.send(Message::text(payload.to_string())).await?;
            Ok(())
        })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.sink.close().await?;
            Ok(())
        })
    }
}

struct WebSocketSource {
    stream: SplitStream<WsStream>,
}

impl PayloadStream for WebSocketSource {
    fn next_payload(&mut self) -> BoxFuture<'_, Option<Result<String>>> {
        Box::pin(async move {
            loop {
                match self.stream.next().await {
                    Some(Ok(Message::Text(text))) => return Some(Ok(text.to_string())),
                    Some(Ok(Message::Binary(data))) => {
                        return Some(String::from_utf8(data.to_vec()).map_err(|e| {
                            LockstreamError::Protocol(format!("binary payload is not UTF-8: {}", e))
                        }))
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::debug!("WebSocket closed by peer: {:?}", frame);
                        return None;
                    }
                    // Control frames are answered by tungstenite.
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Some(Err(e.into())),
                    None => return None,
                }
            }
        })
    }
}
