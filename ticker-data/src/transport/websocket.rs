use super::{Connector, Frame, Transport, TransportError};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message,
};
use tracing::debug;
use url::Url;

/// Opens secure WebSocket connections via `tokio-tungstenite`.
#[derive(Copy, Clone, Debug, Default)]
pub struct WsConnector;

/// Open `tokio-tungstenite` WebSocket.
#[derive(Debug)]
pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Connector for WsConnector {
    type Transport = WsTransport;

    async fn connect(&self, url: &Url) -> Result<Self::Transport, TransportError> {
        debug!(%url, "attempting to establish WebSocket connection");
        let (stream, _response) = connect_async(url.as_str())
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;
        Ok(WsTransport { stream })
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        self.stream
            .send(Message::from(frame))
            .await
            .map_err(|error| TransportError::Send(error.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<Frame, TransportError>> {
        loop {
            match self.stream.next().await? {
                Ok(message) => {
                    if let Some(frame) = frame_from_message(message) {
                        return Some(Ok(frame));
                    }
                }
                Err(error) => return Some(Err(TransportError::Receive(error.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(error) = self.stream.close(None).await {
            debug!(%error, "WebSocket close handshake failed");
        }
    }
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => Message::text(text),
            Frame::Binary(bytes) => Message::binary(bytes),
            Frame::Ping(bytes) => Message::Ping(bytes.into()),
            Frame::Pong(bytes) => Message::Pong(bytes.into()),
            Frame::Close => Message::Close(None),
        }
    }
}

/// Raw continuation frames are reassembled by tungstenite and never surface here.
fn frame_from_message(message: Message) -> Option<Frame> {
    match message {
        Message::Text(text) => Some(Frame::Text(text.as_str().to_owned())),
        Message::Binary(bytes) => Some(Frame::Binary(bytes.to_vec())),
        Message::Ping(bytes) => Some(Frame::Ping(bytes.to_vec())),
        Message::Pong(bytes) => Some(Frame::Pong(bytes.to_vec())),
        Message::Close(_) => Some(Frame::Close),
        Message::Frame(_) => None,
    }
}
