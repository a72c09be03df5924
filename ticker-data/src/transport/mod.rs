//! Library-neutral duplex message channel consumed by the feed supervisor.
//!
//! The supervisor only ever sees [`Frame`]s; [`websocket::WsConnector`] adapts a
//! `tokio-tungstenite` connection, [`mock::MockConnector`] replays scripted sessions.

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

/// Concrete WebSocket transport.
pub mod websocket;

/// Scripted in-memory transport for driving the supervisor deterministically.
pub mod mock;

/// A single framed message exchanged with an exchange server.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

impl Frame {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }
}

/// Transport level failures.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum TransportError {
    #[error("failed to connect: {0}")]
    Connect(String),

    #[error("failed to send frame: {0}")]
    Send(String),

    #[error("failed to receive frame: {0}")]
    Receive(String),

    #[error("connection closed")]
    Closed,
}

/// An open bidirectional message channel.
#[async_trait]
pub trait Transport: Send + 'static {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError>;

    /// Next inbound frame, or `None` once the peer has gone away.
    ///
    /// Must be cancel safe: it is raced against timers and shutdown.
    async fn recv(&mut self) -> Option<Result<Frame, TransportError>>;

    /// Release the underlying connection. Never fails; errors are logged.
    async fn close(&mut self);
}

/// Opens [`Transport`]s.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Transport: Transport;

    async fn connect(&self, url: &Url) -> Result<Self::Transport, TransportError>;
}
