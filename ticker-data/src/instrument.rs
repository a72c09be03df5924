use crate::error::FeedError;
use derive_more::Display;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::str::FromStr;

/// Unique identifier for an exchange integration.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, Deserialize, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeId {
    #[display("Binance")]
    Binance,
    #[display("HitBTC")]
    HitBtc,
}

impl ExchangeId {
    /// Lower-case name used in configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeId::Binance => "binance",
            ExchangeId::HitBtc => "hitbtc",
        }
    }
}

impl FromStr for ExchangeId {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "binance" => Ok(ExchangeId::Binance),
            "hitbtc" => Ok(ExchangeId::HitBtc),
            other => Err(FeedError::Configuration(format!(
                "unsupported exchange: {other:?}"
            ))),
        }
    }
}

/// Identity of an instrument: exchange + canonical (upper-case, concatenated) trading pair
/// symbol, eg/ `Binance:BTCUSDT`.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, Deserialize, Serialize)]
#[display("{exchange}:{symbol}")]
pub struct InstrumentId {
    pub exchange: ExchangeId,
    pub symbol: SmolStr,
}

impl InstrumentId {
    pub fn new(exchange: ExchangeId, symbol: impl Into<SmolStr>) -> Self {
        Self {
            exchange,
            symbol: symbol.into(),
        }
    }
}

/// Static description of a subscribable instrument, as published by the exchange symbol
/// catalog.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Deserialize, Serialize)]
pub struct InstrumentSpec {
    pub id: InstrumentId,
    pub base: SmolStr,
    pub quote: SmolStr,
    /// Smallest meaningful price increment, trailing zeros removed.
    pub tick_size: Option<Decimal>,
}

impl InstrumentSpec {
    pub fn new(
        id: InstrumentId,
        base: impl Into<SmolStr>,
        quote: impl Into<SmolStr>,
        tick_size: Option<Decimal>,
    ) -> Self {
        Self {
            id,
            base: base.into(),
            quote: quote.into(),
            tick_size: tick_size.map(|tick| tick.normalize()),
        }
    }

    /// Number of significant fractional digits in the tick size, if known.
    pub fn precision(&self) -> Option<u32> {
        self.tick_size.map(fractional_digits)
    }
}

/// Number of significant fractional digits of a decimal, eg/ `0.0100` -> 2, `5` -> 0.
pub fn fractional_digits(value: Decimal) -> u32 {
    value.normalize().scale()
}
