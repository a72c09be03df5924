use crate::pulse::{Direction, Pulse};
use chrono::{DateTime, Utc};
use indexmap::{IndexMap, map::Entry};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use smol_str::SmolStr;
use std::{sync::Arc, time::Duration};
use ticker_data::{
    TickEvent, TickSink,
    instrument::{InstrumentId, InstrumentSpec},
};
use tokio::time::Instant;
use tracing::trace;

/// Live state of one instrument.
#[derive(Clone, Debug)]
pub struct Instrument {
    spec: Arc<InstrumentSpec>,
    price: Decimal,
    previous: Option<Decimal>,
    /// Fixed by the first tick that carries one.
    tick_size: Option<Decimal>,
    volume: Option<Decimal>,
    bid: Option<Decimal>,
    ask: Option<Decimal>,
    open: Option<Decimal>,
    time_received: DateTime<Utc>,
    updated: Instant,
    pulse: Pulse,
}

impl Instrument {
    fn new(tick: TickEvent, now: Instant) -> Self {
        Self {
            tick_size: tick.instrument.tick_size,
            spec: tick.instrument,
            price: tick.price,
            previous: None,
            volume: tick.volume,
            bid: tick.bid,
            ask: tick.ask,
            open: tick.open,
            time_received: tick.time_received,
            updated: now,
            pulse: Pulse::default(),
        }
    }

    /// Apply a tick, returning `false` if it is older than the last one applied.
    fn apply(&mut self, tick: &TickEvent, now: Instant) -> bool {
        if tick.time_received < self.time_received {
            return false;
        }

        if self.tick_size.is_none() {
            self.tick_size = tick.instrument.tick_size;
        }

        if let Some(direction) = Direction::of(&self.price, &tick.price) {
            self.pulse.trigger(direction, now);
        }

        self.previous = Some(self.price);
        self.price = tick.price;
        // Trade updates carry the price alone; keep the last known ticker fields
        self.volume = tick.volume.or(self.volume);
        self.bid = tick.bid.or(self.bid);
        self.ask = tick.ask.or(self.ask);
        self.open = tick.open.or(self.open);
        self.time_received = tick.time_received;
        self.updated = now;
        true
    }

    fn snapshot(&self, now: Instant, stale_after: Duration) -> InstrumentSnapshot {
        InstrumentSnapshot {
            id: self.spec.id.clone(),
            base: self.spec.base.clone(),
            quote: self.spec.quote.clone(),
            price: self.price,
            previous: self.previous,
            tick_size: self.tick_size,
            volume: self.volume,
            bid: self.bid,
            ask: self.ask,
            open: self.open,
            pulse: self.pulse,
            stale: now.saturating_duration_since(self.updated) >= stale_after,
        }
    }
}

/// Consistent, immutable copy of one instrument.
#[derive(Clone, PartialEq, Debug)]
pub struct InstrumentSnapshot {
    pub id: InstrumentId,
    pub base: SmolStr,
    pub quote: SmolStr,
    pub price: Decimal,
    pub previous: Option<Decimal>,
    pub tick_size: Option<Decimal>,
    pub volume: Option<Decimal>,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
    /// Opening price of the rolling 24h window.
    pub open: Option<Decimal>,
    pub pulse: Pulse,
    /// No update within the configured staleness window.
    pub stale: bool,
}

impl InstrumentSnapshot {
    /// Direction of the most recent price change, regardless of pulse state.
    pub fn last_move(&self) -> Option<Direction> {
        self.previous
            .and_then(|previous| Direction::of(&previous, &self.price))
    }

    /// Percentage change of the last price over the rolling 24h window.
    pub fn change(&self) -> Option<Decimal> {
        let open = self.open.filter(|open| !open.is_zero())?;
        (self.price - open)
            .checked_div(open)
            .map(|ratio| ratio * Decimal::ONE_HUNDRED)
    }
}

/// Every instrument in the registry, in insertion order.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Snapshot {
    pub instruments: Vec<InstrumentSnapshot>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }
}

/// Shared store of every tracked [`Instrument`].
///
/// Locking is per instrument: the map lock is only held to find or insert an entry, never
/// while an instrument is mutated, so unrelated instruments never contend.
#[derive(Debug, Default)]
pub struct Registry {
    instruments: RwLock<IndexMap<InstrumentId, Arc<Mutex<Instrument>>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.instruments.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.read().is_empty()
    }

    /// Upsert the tick's instrument, shift its price & trigger its pulse on a change.
    pub fn apply_tick_at(&self, tick: TickEvent, now: Instant) {
        let existing = self.instruments.read().get(tick.id()).cloned();

        let instrument = match existing {
            Some(instrument) => instrument,
            None => {
                let mut instruments = self.instruments.write();
                match instruments.entry(tick.id().clone()) {
                    // Lost an insertion race against another feed reporting this identity
                    Entry::Occupied(entry) => Arc::clone(entry.get()),
                    Entry::Vacant(entry) => {
                        trace!(instrument = %tick.id(), price = %tick.price, "tracking new instrument");
                        entry.insert(Arc::new(Mutex::new(Instrument::new(tick, now))));
                        return;
                    }
                }
            }
        };

        if !instrument.lock().apply(&tick, now) {
            trace!(instrument = %tick.id(), "discarding out of order tick");
        }
    }

    /// Advance every pulse to `now`.
    pub fn decay(&self, now: Instant, decay: Option<Duration>) {
        for instrument in self.handles() {
            instrument.lock().pulse.decay(now, decay);
        }
    }

    /// Copy every instrument, each one atomically.
    pub fn snapshot(&self, now: Instant, stale_after: Duration) -> Snapshot {
        Snapshot {
            instruments: self
                .handles()
                .iter()
                .map(|instrument| instrument.lock().snapshot(now, stale_after))
                .collect(),
        }
    }

    fn handles(&self) -> Vec<Arc<Mutex<Instrument>>> {
        self.instruments.read().values().cloned().collect()
    }
}

impl TickSink for Registry {
    fn apply_tick(&self, tick: TickEvent) {
        self.apply_tick_at(tick, Instant::now());
    }
}
