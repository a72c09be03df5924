use crate::{
    error::FeedError,
    event::TickEvent,
    instrument::{ExchangeId, InstrumentSpec},
};
use chrono::{DateTime, Utc};
use fnv::FnvHashMap;
use smol_str::SmolStr;
use std::sync::Arc;
use url::Url;

/// `Binance` combined-stream ticker & aggregate trade integration.
pub mod binance;

/// `HitBTC` JSON-RPC ticker integration.
pub mod hitbtc;

/// Translates one exchange's wire protocol to and from normalised [`TickEvent`]s.
///
/// Stateless across messages apart from any sequence bookkeeping the venue mandates, which
/// is cleared by [`FeedAdapter::reset`] whenever a fresh connection is opened.
pub trait FeedAdapter: Send + 'static {
    const ID: ExchangeId;

    /// Endpoint to connect to.
    fn url(&self) -> Result<Url, FeedError>;

    /// Instruments this adapter subscribes to.
    fn markets(&self) -> &Markets;

    /// Requests to send once connected. Every request must be acknowledged before the feed
    /// is considered streaming.
    fn subscribe(&mut self) -> Vec<SubscribeRequest>;

    /// Parse a text frame.
    ///
    /// Subscription confirmations and heartbeats are not errors, they map to
    /// [`FeedMessage::SubscriptionAck`] and [`FeedMessage::Ignore`].
    fn parse(&mut self, text: &str, received: DateTime<Utc>) -> Result<FeedMessage, FeedError>;

    /// Forget per-connection state.
    fn reset(&mut self) {}
}

/// Subscription request awaiting acknowledgement under `id`.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct SubscribeRequest {
    pub id: u64,
    pub payload: String,
}

/// Outcome of parsing one inbound message.
#[derive(Clone, PartialEq, Debug)]
pub enum FeedMessage {
    Ticks(Vec<TickEvent>),
    SubscriptionAck(u64),
    Ignore,
}

/// Subscribed instruments of a single exchange, keyed by canonical symbol.
#[derive(Clone, Debug)]
pub struct Markets {
    exchange: ExchangeId,
    ordered: Vec<Arc<InstrumentSpec>>,
    by_symbol: FnvHashMap<SmolStr, Arc<InstrumentSpec>>,
}

impl Markets {
    pub fn new(
        exchange: ExchangeId,
        instruments: impl IntoIterator<Item = InstrumentSpec>,
    ) -> Result<Self, FeedError> {
        let mut ordered = Vec::new();
        let mut by_symbol = FnvHashMap::default();

        for spec in instruments {
            if spec.id.exchange != exchange {
                return Err(FeedError::Configuration(format!(
                    "{} cannot be subscribed to via {exchange}",
                    spec.id
                )));
            }
            if by_symbol.contains_key(&spec.id.symbol) {
                continue;
            }
            let spec = Arc::new(spec);
            by_symbol.insert(spec.id.symbol.clone(), Arc::clone(&spec));
            ordered.push(spec);
        }

        if ordered.is_empty() {
            return Err(FeedError::Configuration(format!(
                "no instruments to subscribe to on {exchange}"
            )));
        }

        Ok(Self {
            exchange,
            ordered,
            by_symbol,
        })
    }

    pub fn exchange(&self) -> ExchangeId {
        self.exchange
    }

    pub fn get(&self, symbol: &str) -> Option<&Arc<InstrumentSpec>> {
        self.by_symbol.get(symbol)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<InstrumentSpec>> {
        self.ordered.iter()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}
