use crate::{
    error::FeedError,
    event::TickEvent,
    exchange::{FeedAdapter, FeedMessage},
    transport::{Connector, Frame, Transport, TransportError},
};
use chrono::Utc;
use fnv::FnvHashSet;
use tracing::debug;

/// Outcome of a single [`FeedConnection::receive_next`].
#[derive(Clone, PartialEq, Debug)]
pub enum Received {
    Ticks(Vec<TickEvent>),
    /// A pending subscription was confirmed; `remaining` are still outstanding.
    Acknowledged { remaining: usize },
    Heartbeat,
    Ignored,
}

/// One live connection to an exchange, composed from a [`FeedAdapter`] and a [`Transport`].
///
/// Sequence: [`connect`](Self::connect) -> [`subscribe`](Self::subscribe) ->
/// [`receive_next`](Self::receive_next)* -> [`close`](Self::close).
#[derive(Debug)]
pub struct FeedConnection<'a, A, T> {
    adapter: &'a mut A,
    transport: T,
    pending: FnvHashSet<u64>,
}

impl<'a, A, T> FeedConnection<'a, A, T>
where
    A: FeedAdapter,
    T: Transport,
{
    /// Open a transport to the adapter's endpoint, clearing any per-connection adapter state.
    pub async fn connect<C>(adapter: &'a mut A, connector: &C) -> Result<Self, FeedError>
    where
        C: Connector<Transport = T>,
    {
        let url = adapter.url()?;
        let transport = connector.connect(&url).await?;
        adapter.reset();
        debug!(exchange = %A::ID, %url, "connected");

        Ok(Self {
            adapter,
            transport,
            pending: FnvHashSet::default(),
        })
    }

    /// Send every subscription request, returning how many await acknowledgement.
    pub async fn subscribe(&mut self) -> Result<usize, FeedError> {
        for request in self.adapter.subscribe() {
            self.transport.send(Frame::Text(request.payload)).await?;
            self.pending.insert(request.id);
        }

        Ok(self.pending.len())
    }

    /// Await and interpret the next inbound frame.
    ///
    /// Cancel safe provided the [`Transport`] is: nothing is awaited after a frame arrives.
    pub async fn receive_next(&mut self) -> Result<Received, FeedError> {
        let frame = self.transport.recv().await.ok_or(TransportError::Closed)??;

        match frame {
            Frame::Text(text) => match self.adapter.parse(&text, Utc::now())? {
                FeedMessage::Ticks(ticks) => Ok(Received::Ticks(ticks)),
                FeedMessage::SubscriptionAck(id) if self.pending.remove(&id) => {
                    Ok(Received::Acknowledged {
                        remaining: self.pending.len(),
                    })
                }
                FeedMessage::SubscriptionAck(id) => {
                    debug!(exchange = %A::ID, id, "ignoring unexpected acknowledgement");
                    Ok(Received::Ignored)
                }
                FeedMessage::Ignore => Ok(Received::Ignored),
            },
            Frame::Ping(_) | Frame::Pong(_) => Ok(Received::Heartbeat),
            Frame::Binary(bytes) => Err(FeedError::malformed(
                A::ID,
                format!("unexpected binary frame of {} bytes", bytes.len()),
            )),
            Frame::Close => Err(FeedError::from(TransportError::Closed)),
        }
    }

    /// Send a keep-alive ping.
    pub async fn ping(&mut self) -> Result<(), FeedError> {
        self.transport
            .send(Frame::Ping(Vec::new()))
            .await
            .map_err(FeedError::from)
    }

    /// Subscriptions sent but not yet acknowledged.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub async fn close(mut self) {
        self.transport.close().await;
        debug!(exchange = %A::ID, "connection closed");
    }
}
