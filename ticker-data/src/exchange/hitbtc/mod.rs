use super::{FeedAdapter, FeedMessage, Markets, SubscribeRequest};
use crate::{de::de_opt_decimal_str, error::FeedError, event::TickEvent, instrument::ExchangeId};
use chrono::{DateTime, Utc};
use fnv::FnvHashMap;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Value, json};
use smol_str::SmolStr;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// [`HitBtc`] JSON-RPC server base url.
///
/// See docs: <https://api.hitbtc.com/api/2/explore/#/Socket_API>
pub const BASE_URL_HITBTC: &str = "wss://api.hitbtc.com/api/2/ws";

/// [`HitBtc`] spot exchange feed.
///
/// Every symbol is subscribed with its own `subscribeTicker` request, each acknowledged
/// individually by a JSON-RPC result carrying the same request id.
#[derive(Clone, Debug)]
pub struct HitBtc {
    markets: Markets,
    next_request_id: u64,
    pending: FnvHashMap<u64, SmolStr>,
}

impl HitBtc {
    pub fn new(markets: Markets) -> Result<Self, FeedError> {
        if markets.exchange() != Self::ID {
            return Err(FeedError::Configuration(format!(
                "{} markets passed to {} feed",
                markets.exchange(),
                Self::ID
            )));
        }

        Ok(Self {
            markets,
            next_request_id: 1,
            pending: FnvHashMap::default(),
        })
    }

    fn rejected(&mut self, request_id: u64, reason: String) -> FeedError {
        let reason = match self.pending.remove(&request_id) {
            Some(symbol) => format!("{symbol}: {reason}"),
            None => reason,
        };

        FeedError::SubscriptionRejected {
            exchange: Self::ID,
            request_id,
            reason,
        }
    }

    fn on_ticker(&self, params: Value, received: DateTime<Utc>) -> Result<FeedMessage, FeedError> {
        let ticker = serde_json::from_value::<HitBtcTicker>(params)
            .map_err(|error| FeedError::malformed(Self::ID, error))?;

        let Some(instrument) = self.markets.get(&ticker.symbol) else {
            warn!(symbol = %ticker.symbol, "received tick for unsubscribed symbol");
            return Ok(FeedMessage::Ignore);
        };

        // Freshly listed or untraded symbols report a null last price
        let Some(price) = ticker.last else {
            return Ok(FeedMessage::Ignore);
        };

        Ok(FeedMessage::Ticks(vec![TickEvent {
            time_exchange: ticker.timestamp,
            time_received: received,
            instrument: Arc::clone(instrument),
            price,
            volume: ticker.volume_quote,
            bid: ticker.bid,
            ask: ticker.ask,
            open: ticker.open,
        }]))
    }
}

impl FeedAdapter for HitBtc {
    const ID: ExchangeId = ExchangeId::HitBtc;

    fn url(&self) -> Result<Url, FeedError> {
        Url::parse(BASE_URL_HITBTC).map_err(|error| FeedError::Configuration(error.to_string()))
    }

    fn markets(&self) -> &Markets {
        &self.markets
    }

    fn subscribe(&mut self) -> Vec<SubscribeRequest> {
        let symbols = self
            .markets
            .iter()
            .map(|spec| spec.id.symbol.clone())
            .collect::<Vec<_>>();

        symbols
            .into_iter()
            .map(|symbol| {
                let id = self.next_request_id;
                self.next_request_id += 1;

                let payload = json!({
                    "method": "subscribeTicker",
                    "params": { "symbol": symbol },
                    "id": id,
                });
                self.pending.insert(id, symbol);

                SubscribeRequest {
                    id,
                    payload: payload.to_string(),
                }
            })
            .collect()
    }

    fn parse(&mut self, text: &str, received: DateTime<Utc>) -> Result<FeedMessage, FeedError> {
        let message = serde_json::from_str::<HitBtcMessage>(text)
            .map_err(|error| FeedError::malformed(Self::ID, error))?;

        match message {
            HitBtcMessage::Notification { method, params } => match method.as_str() {
                "ticker" => self.on_ticker(params, received),
                other => {
                    debug!(method = other, "ignoring unsupported notification");
                    Ok(FeedMessage::Ignore)
                }
            },
            HitBtcMessage::Error { error, id } => {
                let mut reason = format!("{} ({})", error.message, error.code);
                if let Some(description) = error.description {
                    reason.push_str(": ");
                    reason.push_str(&description);
                }

                match id {
                    Some(id) if self.pending.contains_key(&id) => Err(self.rejected(id, reason)),
                    _ => Err(FeedError::malformed(Self::ID, reason)),
                }
            }
            HitBtcMessage::Response { result, id } => {
                if !self.pending.contains_key(&id) {
                    debug!(id, %result, "ignoring response to unknown request");
                    return Ok(FeedMessage::Ignore);
                }

                if result == Value::Bool(true) {
                    self.pending.remove(&id);
                    Ok(FeedMessage::SubscriptionAck(id))
                } else {
                    Err(self.rejected(id, format!("unexpected result: {result}")))
                }
            }
        }
    }

    fn reset(&mut self) {
        self.pending.clear();
    }
}

/// Inbound JSON-RPC message on the [`HitBtc`] socket.
///
/// ### Raw Payload Examples
/// #### Subscription Response
/// ```json
/// {"jsonrpc": "2.0", "result": true, "id": 123}
/// ```
/// #### Error Response
/// ```json
/// {
///     "jsonrpc": "2.0",
///     "error": {
///         "code": 2001,
///         "message": "Symbol not found",
///         "description": "Try get /api/2/public/symbol, to get list of all available symbols."
///     },
///     "id": 123
/// }
/// ```
#[derive(Clone, PartialEq, Debug, Deserialize)]
#[serde(untagged)]
enum HitBtcMessage {
    Notification {
        method: String,
        params: Value,
    },
    Error {
        error: HitBtcError,
        id: Option<u64>,
    },
    Response {
        result: Value,
        id: u64,
    },
}

#[derive(Clone, PartialEq, Debug, Deserialize)]
struct HitBtcError {
    code: i64,
    message: String,
    description: Option<String>,
}

/// ### Raw Payload Examples
/// See docs: <https://api.hitbtc.com/#subscribe-to-ticker>
/// ```json
/// {
///     "ask": "0.054464",
///     "bid": "0.054463",
///     "last": "0.054463",
///     "open": "0.057133",
///     "low": "0.053615",
///     "high": "0.057559",
///     "volume": "33068.346",
///     "volumeQuote": "1832.687530809",
///     "timestamp": "2017-10-19T15:45:44.941Z",
///     "symbol": "ETHBTC"
/// }
/// ```
#[derive(Clone, PartialEq, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HitBtcTicker {
    symbol: SmolStr,
    #[serde(default, deserialize_with = "de_opt_decimal_str")]
    last: Option<Decimal>,
    #[serde(default, deserialize_with = "de_opt_decimal_str")]
    bid: Option<Decimal>,
    #[serde(default, deserialize_with = "de_opt_decimal_str")]
    ask: Option<Decimal>,
    #[serde(default, deserialize_with = "de_opt_decimal_str")]
    open: Option<Decimal>,
    #[serde(default, deserialize_with = "de_opt_decimal_str")]
    volume_quote: Option<Decimal>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}
