//! Normalised cryptocurrency exchange price feeds.
//!
//! Each exchange is integrated via a [`FeedAdapter`](exchange::FeedAdapter) that turns its wire
//! protocol into [`TickEvent`]s. A [`FeedSupervisor`](supervisor::FeedSupervisor) keeps one
//! connection per exchange alive (connect, subscribe, stream, reconnect with backoff) and
//! pushes every tick into a shared [`TickSink`].
//!
//! Transport is abstracted behind [`transport::Connector`]: production code uses
//! [`transport::websocket::WsConnector`], tests replay scripted sessions with
//! [`transport::mock::MockConnector`].

pub mod backoff;

pub mod catalog;

pub mod de;

/// All errors generated in `ticker-data`.
pub mod error;

/// Normalised [`TickEvent`] and its consumer [`TickSink`].
pub mod event;

/// [`FeedAdapter`](exchange::FeedAdapter) trait and the exchange integrations.
pub mod exchange;

/// Exchange & instrument identity.
pub mod instrument;

pub mod supervisor;

pub mod transport;

pub use event::{TickEvent, TickSink};
