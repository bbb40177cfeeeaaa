//! Socket abstraction.
//!
//! The supervisor only needs three things from a socket: the next frame, a
//! ping, and a close. [`TungsteniteConnector`] provides them over
//! `tokio-tungstenite`; tests substitute scripted connections.

use std::fmt;

use async_trait::async_trait;
use futures::{SinkExt as _, StreamExt as _};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::trace;
use url::Url;

use crate::error::{StreamError, StreamResult};

/// Frame received from the socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedFrame {
    /// Text payload (one event)
    Text(String),
    /// Answer to a heartbeat ping
    Pong,
    /// Binary, ping or other control frames
    Other,
}

/// An open socket
#[async_trait]
pub trait FeedConnection: Send {
    /// Next frame; `None` when the peer closed the socket
    async fn next_frame(&mut self) -> Option<StreamResult<FeedFrame>>;

    /// Send a heartbeat ping
    async fn ping(&mut self) -> StreamResult<()>;

    /// Close the socket, ignoring errors
    async fn close(&mut self);
}

/// Opens sockets
#[async_trait]
pub trait FeedConnector: Send + Sync + fmt::Debug {
    /// Connect to `url`
    async fn connect(&self, url: &Url) -> StreamResult<Box<dyn FeedConnection>>;
}

/// WebSocket connector over `tokio-tungstenite`
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl FeedConnector for TungsteniteConnector {
    async fn connect(&self, url: &Url) -> StreamResult<Box<dyn FeedConnection>> {
        let (ws, response) = connect_async(url.as_str())
            .await
            .map_err(|e| StreamError::Connect(e.to_string()))?;
        trace!(status = %response.status(), "WebSocket handshake complete");
        Ok(Box::new(TungsteniteConnection { ws }))
    }
}

struct TungsteniteConnection {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl FeedConnection for TungsteniteConnection {
    async fn next_frame(&mut self) -> Option<StreamResult<FeedFrame>> {
        match self.ws.next().await? {
            Ok(Message::Text(text)) => Some(Ok(FeedFrame::Text(text.to_string()))),
            Ok(Message::Pong(_)) => Some(Ok(FeedFrame::Pong)),
            Ok(Message::Close(frame)) => {
                trace!(?frame, "Peer closed the socket");
                None
            }
            Ok(_) => Some(Ok(FeedFrame::Other)),
            Err(e) => Some(Err(StreamError::Socket(e.to_string()))),
        }
    }

    async fn ping(&mut self) -> StreamResult<()> {
        self.ws
            .send(Message::Ping(Vec::new().into()))
            .await
            .map_err(|e| StreamError::Socket(e.to_string()))
    }

    async fn close(&mut self) {
        let _ = self.ws.close(None).await;
    }
}
