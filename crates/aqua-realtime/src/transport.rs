//! Push socket transport.
//!
//! [`Connector`] opens sockets and [`PushSocket`] yields their inbound
//! events. The connection manager only talks to these traits; production
//! uses [`WsConnector`] over `tokio-tungstenite`, tests script their own.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::errors::TransportError;
use crate::state::CLOSE_NO_STATUS;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Something that happened on an open socket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SocketEvent {
    /// A text frame.
    Text(String),
    /// The socket closed. `code` is `None` when the stream ended without a
    /// close frame, and [`CLOSE_NO_STATUS`] for a close frame without a code.
    Closed {
        /// Close code from the peer.
        code: Option<u16>,
        /// Close reason from the peer.
        reason: String,
    },
    /// The socket failed.
    Failed(String),
}

/// An open push socket.
#[async_trait]
pub trait PushSocket: Send {
    /// Wait for the next inbound event.
    ///
    /// Must be cancel-safe. After `Closed` or `Failed` the socket is done.
    async fn next_event(&mut self) -> SocketEvent;

    /// Close the socket from our side.
    async fn close(&mut self);
}

/// Opens push sockets.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a socket to `url` (credential already embedded).
    async fn connect(&self, url: &str) -> Result<Box<dyn PushSocket>, TransportError>;
}

/// `tokio-tungstenite` connector with a handshake timeout.
#[derive(Clone, Debug)]
pub struct WsConnector {
    timeout: Duration,
}

impl WsConnector {
    /// Connector that gives up on handshakes after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Connector for WsConnector {
    #[tracing::instrument(skip_all)]
    async fn connect(&self, url: &str) -> Result<Box<dyn PushSocket>, TransportError> {
        let (stream, _) = tokio::time::timeout(self.timeout, connect_async(url))
            .await
            .map_err(|_| TransportError::Timeout {
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            })?
            .map_err(handshake_error)?;
        Ok(Box::new(WsSocket { stream }))
    }
}

fn handshake_error(err: tungstenite::Error) -> TransportError {
    match err {
        tungstenite::Error::Http(resp) => TransportError::from_status(resp.status().as_u16()),
        other => TransportError::Io(other.to_string()),
    }
}

/// Socket over a `tokio-tungstenite` stream.
pub struct WsSocket {
    stream: WsStream,
}

#[async_trait]
impl PushSocket for WsSocket {
    async fn next_event(&mut self) -> SocketEvent {
        loop {
            let Some(msg) = self.stream.next().await else {
                return SocketEvent::Closed {
                    code: None,
                    reason: String::new(),
                };
            };
            match msg {
                Ok(Message::Text(text)) => return SocketEvent::Text(text.as_str().to_owned()),
                Ok(Message::Close(frame)) => {
                    let (code, reason) = match frame {
                        Some(f) => (Some(u16::from(f.code)), f.reason.as_str().to_owned()),
                        None => (Some(CLOSE_NO_STATUS), String::new()),
                    };
                    return SocketEvent::Closed { code, reason };
                }
                Ok(Message::Binary(_) | Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                Err(e) => return SocketEvent::Failed(e.to_string()),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!(error = %e, "error closing push socket");
        }
    }
}

impl std::fmt::Debug for WsSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsSocket").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connector_keeps_timeout() {
        let connector = WsConnector::new(Duration::from_secs(3));
        assert_eq!(connector.timeout, Duration::from_secs(3));
    }

    #[tokio::test]
    async fn refused_connection_is_io_error() {
        let connector = WsConnector::new(Duration::from_secs(5));
        let Err(err) = connector.connect("ws://127.0.0.1:1/ws").await else {
            panic!("connect to a closed port succeeded");
        };
        assert!(matches!(err, TransportError::Io(_)));
    }
}
