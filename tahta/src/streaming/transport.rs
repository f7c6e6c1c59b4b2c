//! Transport seam between the session state machine and the socket.
//!
//! The session speaks in text frames; how they reach the provider is
//! behind [`StreamTransport`]. Production uses [`WsTransport`]
//! (tokio-tungstenite); tests inject a channel-backed mock through the
//! same trait.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use tahta_core::TahtaError;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Write half of an established connection.
#[async_trait]
pub trait FrameSink: Send {
    /// Send one text frame.
    async fn send(&mut self, frame: String) -> Result<(), TahtaError>;

    /// Perform the close handshake and release the connection.
    async fn close(&mut self) -> Result<(), TahtaError>;
}

/// One established streaming connection, split into halves. The inbound
/// stream yields text frames and terminates when the peer closes; transport
/// failures surface as `Err` items before termination.
pub struct Connection {
    /// Write half.
    pub sink: Box<dyn FrameSink>,
    /// Read half.
    pub frames: BoxStream<'static, Result<String, TahtaError>>,
}

/// Connection factory used by the session for the initial connect and for
/// every reconnect attempt.
#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// Open a connection to `url`, suspending until the handshake
    /// completes or fails.
    ///
    /// # Errors
    /// Returns `TahtaError::Connection` when the handshake fails. No
    /// timeout is enforced here beyond what the underlying socket
    /// library applies.
    async fn connect(&self, url: &str) -> Result<Connection, TahtaError>;
}

/// Default transport: a WebSocket client over TLS (rustls roots).
///
/// Binary and ping/pong frames are dropped (the provider's heartbeat is a
/// JSON text frame); a close frame ends the inbound stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsTransport;

impl WsTransport {
    /// Create the default transport.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

struct WsSink {
    inner: futures_util::stream::SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, frame: String) -> Result<(), TahtaError> {
        self.inner
            .send(Message::Text(frame.into()))
            .await
            .map_err(|e| TahtaError::connection(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TahtaError> {
        self.inner
            .close()
            .await
            .map_err(|e| TahtaError::close(e.to_string()))
    }
}

#[async_trait]
impl StreamTransport for WsTransport {
    async fn connect(&self, url: &str) -> Result<Connection, TahtaError> {
        let parsed = url::Url::parse(url)
            .map_err(|e| TahtaError::connection(format!("invalid connection url: {e}")))?;

        let (ws, _response) = tokio_tungstenite::connect_async(parsed.as_str())
            .await
            .map_err(|e| TahtaError::connection(e.to_string()))?;

        let (sink, stream) = ws.split();
        let frames = stream
            .filter_map(|item| async move {
                match item {
                    Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                    // Close ends the stream on the next poll; everything
                    // else is not part of the feed protocol.
                    Ok(_) => None,
                    Err(e) => Some(Err(TahtaError::connection(e.to_string()))),
                }
            })
            .boxed();

        Ok(Connection {
            sink: Box::new(WsSink { inner: sink }),
            frames,
        })
    }
}
