use crate::instrument::{InstrumentId, InstrumentSpec};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Normalised price update produced by a [`FeedAdapter`](crate::exchange::FeedAdapter).
///
/// Transient: consumed immediately by a [`TickSink`].
#[derive(Clone, PartialEq, Debug)]
pub struct TickEvent {
    /// Exchange timestamp, when the venue reports one.
    pub time_exchange: Option<DateTime<Utc>>,
    /// Local receipt timestamp.
    pub time_received: DateTime<Utc>,
    pub instrument: Arc<InstrumentSpec>,
    pub price: Decimal,
    /// Rolling 24h quote volume, if carried by this message.
    pub volume: Option<Decimal>,
    /// Best bid, if carried by this message.
    pub bid: Option<Decimal>,
    /// Best ask, if carried by this message.
    pub ask: Option<Decimal>,
    /// Opening price of the rolling 24h window.
    pub open: Option<Decimal>,
}

impl TickEvent {
    pub fn id(&self) -> &InstrumentId {
        &self.instrument.id
    }
}

/// Destination for normalised [`TickEvent`]s.
///
/// Implementations must tolerate concurrent calls from many feed supervisors.
pub trait TickSink: Send + Sync + 'static {
    fn apply_tick(&self, tick: TickEvent);
}
