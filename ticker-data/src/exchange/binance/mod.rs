use super::{FeedAdapter, FeedMessage, Markets, SubscribeRequest};
use crate::{
    de::de_u64_epoch_ms_as_datetime_utc,
    error::FeedError,
    event::TickEvent,
    instrument::ExchangeId,
};
use chrono::{DateTime, Utc};
use fnv::FnvHashMap;
use itertools::Itertools;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use smol_str::SmolStr;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// [`Binance`] combined stream server base url.
///
/// See docs: <https://developers.binance.com/docs/binance-spot-api-docs/web-socket-streams>
pub const BASE_URL_BINANCE: &str = "wss://stream.binance.com:9443/stream";

/// [`Binance`] spot exchange feed.
///
/// Subscribes to the `<symbol>@ticker` stream for last price & rolling quote volume, and the
/// `<symbol>@aggTrade` stream for lower latency price updates. Aggregate trade ids are
/// required to be contiguous per symbol, so a forward jump signals a desynchronised feed.
#[derive(Clone, Debug)]
pub struct Binance {
    markets: Markets,
    next_request_id: u64,
    last_agg_trade: FnvHashMap<SmolStr, u64>,
}

impl Binance {
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
            last_agg_trade: FnvHashMap::default(),
        })
    }

    fn stream_names(&self) -> Vec<String> {
        self.markets
            .iter()
            .flat_map(|spec| {
                let symbol = spec.id.symbol.to_ascii_lowercase();
                [format!("{symbol}@ticker"), format!("{symbol}@aggTrade")]
            })
            .collect()
    }

    fn check_sequence(&mut self, symbol: &SmolStr, id: u64) -> Result<bool, FeedError> {
        match self.last_agg_trade.get(symbol).copied() {
            Some(last) if id <= last => Ok(false),
            Some(last) if id != last + 1 => {
                self.last_agg_trade.insert(symbol.clone(), id);
                Err(FeedError::SequenceGap {
                    symbol: symbol.clone(),
                    expected: last + 1,
                    received: id,
                })
            }
            _ => {
                self.last_agg_trade.insert(symbol.clone(), id);
                Ok(true)
            }
        }
    }
}

impl FeedAdapter for Binance {
    const ID: ExchangeId = ExchangeId::Binance;

    fn url(&self) -> Result<Url, FeedError> {
        Url::parse(BASE_URL_BINANCE).map_err(|error| FeedError::Configuration(error.to_string()))
    }

    fn markets(&self) -> &Markets {
        &self.markets
    }

    fn subscribe(&mut self) -> Vec<SubscribeRequest> {
        let id = self.next_request_id;
        self.next_request_id += 1;

        let streams = self.stream_names();
        debug!(id, streams = %streams.iter().join(","), "subscribing to Binance streams");

        let payload = json!({
            "method": "SUBSCRIBE",
            "params": streams,
            "id": id,
        });

        vec![SubscribeRequest {
            id,
            payload: payload.to_string(),
        }]
    }

    fn parse(&mut self, text: &str, received: DateTime<Utc>) -> Result<FeedMessage, FeedError> {
        let message = serde_json::from_str::<BinanceMessage>(text)
            .map_err(|error| FeedError::malformed(Self::ID, error))?;

        match message {
            BinanceMessage::Stream { stream, data } => self.on_stream(&stream, data, received),
            BinanceMessage::Error { error, id } => match id {
                Some(request_id) => Err(FeedError::SubscriptionRejected {
                    exchange: Self::ID,
                    request_id,
                    reason: format!("{} ({})", error.msg, error.code),
                }),
                None => Err(FeedError::malformed(Self::ID, error.msg)),
            },
            BinanceMessage::Response { id } => Ok(FeedMessage::SubscriptionAck(id)),
        }
    }

    fn reset(&mut self) {
        self.last_agg_trade.clear();
    }
}

impl Binance {
    fn on_stream(
        &mut self,
        stream: &str,
        data: BinanceStreamData,
        received: DateTime<Utc>,
    ) -> Result<FeedMessage, FeedError> {
        let (symbol, time, price, ticker) = match data {
            BinanceStreamData::Ticker(ticker) => (
                ticker.symbol.clone(),
                ticker.time,
                ticker.last_price,
                Some(ticker),
            ),
            BinanceStreamData::AggTrade(trade) => {
                if !self.check_sequence(&trade.symbol, trade.id)? {
                    debug!(%stream, id = trade.id, "ignoring replayed aggregate trade");
                    return Ok(FeedMessage::Ignore);
                }
                (trade.symbol, trade.time, trade.price, None)
            }
            BinanceStreamData::Unknown => {
                debug!(%stream, "ignoring unsupported stream event");
                return Ok(FeedMessage::Ignore);
            }
        };

        let Some(instrument) = self.markets.get(&symbol) else {
            warn!(%stream, %symbol, "received tick for unsubscribed symbol");
            return Ok(FeedMessage::Ignore);
        };

        // Aggregate trades only move the last price
        let ticker = ticker.as_ref();
        Ok(FeedMessage::Ticks(vec![TickEvent {
            time_exchange: Some(time),
            time_received: received,
            instrument: Arc::clone(instrument),
            price,
            volume: ticker.map(|ticker| ticker.quote_volume),
            bid: ticker.and_then(|ticker| ticker.best_bid),
            ask: ticker.and_then(|ticker| ticker.best_ask),
            open: ticker.and_then(|ticker| ticker.open_price),
        }]))
    }
}

/// Inbound message on the [`Binance`] combined stream endpoint.
///
/// ### Raw Payload Examples
/// See docs: <https://developers.binance.com/docs/binance-spot-api-docs/web-socket-streams#live-subscribingunsubscribing-to-streams>
/// #### Subscription Response
/// ```json
/// {"result": null, "id": 1}
/// ```
/// #### Error Response
/// ```json
/// {"error": {"code": 2, "msg": "Invalid request: unknown stream"}, "id": 1}
/// ```
#[derive(Clone, PartialEq, Debug, Deserialize)]
#[serde(untagged)]
enum BinanceMessage {
    Stream {
        stream: String,
        data: BinanceStreamData,
    },
    Error {
        error: BinanceError,
        id: Option<u64>,
    },
    Response {
        id: u64,
    },
}

#[derive(Clone, PartialEq, Debug, Deserialize)]
struct BinanceError {
    code: i64,
    msg: String,
}

#[derive(Clone, PartialEq, Debug, Deserialize)]
#[serde(tag = "e")]
enum BinanceStreamData {
    #[serde(rename = "24hrTicker")]
    Ticker(BinanceTicker),
    #[serde(rename = "aggTrade")]
    AggTrade(BinanceAggTrade),
    #[serde(other)]
    Unknown,
}

/// ### Raw Payload Examples
/// See docs: <https://developers.binance.com/docs/binance-spot-api-docs/web-socket-streams#individual-symbol-ticker-streams>
/// ```json
/// {
///     "e": "24hrTicker",
///     "E": 1672515782136,
///     "s": "BNBBTC",
///     "o": "0.0010",
///     "c": "0.0025",
///     "b": "0.0024",
///     "a": "0.0026",
///     "q": "18",
///     ...
/// }
/// ```
#[derive(Clone, PartialEq, Debug, Deserialize)]
struct BinanceTicker {
    #[serde(rename = "E", deserialize_with = "de_u64_epoch_ms_as_datetime_utc")]
    time: DateTime<Utc>,
    #[serde(rename = "s")]
    symbol: SmolStr,
    #[serde(rename = "c")]
    last_price: Decimal,
    #[serde(rename = "q")]
    quote_volume: Decimal,
    #[serde(rename = "b", default)]
    best_bid: Option<Decimal>,
    #[serde(rename = "a", default)]
    best_ask: Option<Decimal>,
    #[serde(rename = "o", default)]
    open_price: Option<Decimal>,
}

/// ### Raw Payload Examples
/// See docs: <https://developers.binance.com/docs/binance-spot-api-docs/web-socket-streams#aggregate-trade-streams>
/// ```json
/// {
///     "e": "aggTrade",
///     "E": 1672515782136,
///     "s": "BNBBTC",
///     "a": 12345,
///     "p": "0.001",
///     "q": "100",
///     "T": 1672515782136,
///     "m": true
/// }
/// ```
#[derive(Clone, PartialEq, Debug, Deserialize)]
struct BinanceAggTrade {
    #[serde(rename = "T", deserialize_with = "de_u64_epoch_ms_as_datetime_utc")]
    time: DateTime<Utc>,
    #[serde(rename = "s")]
    symbol: SmolStr,
    #[serde(rename = "a")]
    id: u64,
    #[serde(rename = "p")]
    price: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::test_util::spec;
    use rust_decimal_macros::dec;

    fn binance() -> Binance {
        Binance::new(
            Markets::new(
                ExchangeId::Binance,
                [
                    spec(ExchangeId::Binance, "BTC", "USDT", Some(dec!(0.01))),
                    spec(ExchangeId::Binance, "ETH", "BTC", Some(dec!(0.00001))),
                ],
            )
            .unwrap(),
        )
        .unwrap()
    }

    fn agg_trade(symbol: &str, id: u64, price: &str) -> String {
        format!(
            r#"{{"stream":"{}@aggTrade","data":{{"e":"aggTrade","E":1672515782136,"s":"{symbol}","a":{id},"p":"{price}","q":"0.5","f":1,"l":2,"T":1672515782130,"m":true,"M":true}}}}"#,
            symbol.to_ascii_lowercase()
        )
    }

    #[test]
    fn test_subscribe() {
        let mut binance = binance();

        let requests = binance.subscribe();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].id, 1);
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&requests[0].payload).unwrap(),
            json!({
                "method": "SUBSCRIBE",
                "params": ["btcusdt@ticker", "btcusdt@aggTrade", "ethbtc@ticker", "ethbtc@aggTrade"],
                "id": 1,
            })
        );

        // Each reconnect uses a fresh request id
        assert_eq!(binance.subscribe()[0].id, 2);
    }

    #[test]
    fn test_parse() {
        struct TestCase {
            input: &'static str,
            expected: Result<Option<(Decimal, Option<Decimal>)>, FeedError>,
        }

        let tests = vec![
            TestCase {
                // TC0: subscription response
                input: r#"{"result":null,"id":1}"#,
                expected: Ok(None),
            },
            TestCase {
                // TC1: 24hr ticker with string prices preserving precision
                input: r#"{"stream":"btcusdt@ticker","data":{"e":"24hrTicker","E":1672515782136,"s":"BTCUSDT","p":"-94.99","P":"-0.57","c":"16578.50000000","Q":"0.001","b":"16578.49","q":"276150392.10523800"}}"#,
                expected: Ok(Some((dec!(16578.50000000), Some(dec!(276150392.10523800))))),
            },
            TestCase {
                // TC2: rejected subscription
                input: r#"{"error":{"code":2,"msg":"Invalid request"},"id":1}"#,
                expected: Err(FeedError::SubscriptionRejected {
                    exchange: ExchangeId::Binance,
                    request_id: 1,
                    reason: "Invalid request (2)".to_string(),
                }),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = binance().parse(test.input, Utc::now());
            match (actual, test.expected) {
                (Ok(FeedMessage::SubscriptionAck(1)), Ok(None)) => {}
                (Ok(FeedMessage::Ticks(ticks)), Ok(Some((price, volume)))) => {
                    assert_eq!(ticks.len(), 1, "TC{} failed", index);
                    assert_eq!(ticks[0].price, price, "TC{} failed", index);
                    assert_eq!(ticks[0].price.scale(), price.scale(), "TC{} failed", index);
                    assert_eq!(ticks[0].volume, volume, "TC{} failed", index);
                    assert_eq!(ticks[0].id().symbol, "BTCUSDT", "TC{} failed", index);
                    assert_eq!(ticks[0].instrument.tick_size, Some(dec!(0.01)), "TC{} failed", index);
                }
                (Err(actual), Err(expected)) => assert_eq!(actual, expected, "TC{} failed", index),
                (actual, expected) => {
                    panic!("TC{index} failed because actual != expected. \nActual: {actual:?}\nExpected: {expected:?}\n");
                }
            }
        }
    }

    #[test]
    fn test_parse_ticker_quotes() {
        let mut binance = binance();
        let now = Utc::now();

        let message = binance
            .parse(
                r#"{"stream":"ethbtc@ticker","data":{"e":"24hrTicker","E":1672515782136,"s":"ETHBTC","p":"0.00012","P":"0.17","o":"0.07010","c":"0.07022","b":"0.07021","a":"0.07023","q":"1523.75"}}"#,
                now,
            )
            .unwrap();
        let FeedMessage::Ticks(ticks) = message else {
            panic!("expected ticks, got {message:?}");
        };
        assert_eq!(ticks[0].bid, Some(dec!(0.07021)));
        assert_eq!(ticks[0].ask, Some(dec!(0.07023)));
        assert_eq!(ticks[0].open, Some(dec!(0.07010)));

        // Aggregate trades carry the price alone
        let message = binance.parse(&agg_trade("ETHBTC", 1, "0.07024"), now).unwrap();
        let FeedMessage::Ticks(ticks) = message else {
            panic!("expected ticks, got {message:?}");
        };
        assert_eq!(ticks[0].price, dec!(0.07024));
        assert_eq!((ticks[0].volume, ticks[0].bid, ticks[0].ask, ticks[0].open), (None, None, None, None));
    }

    #[test]
    fn test_parse_malformed_and_ignored() {
        let mut binance = binance();

        assert!(matches!(
            binance.parse("not json", Utc::now()),
            Err(FeedError::MalformedMessage { .. })
        ));
        assert!(matches!(
            binance.parse(r#"{"stream":"btcusdt@ticker","data":{"e":"24hrTicker","s":"BTCUSDT"}}"#, Utc::now()),
            Err(FeedError::MalformedMessage { .. })
        ));
        assert_eq!(
            binance
                .parse(r#"{"stream":"btcusdt@kline_1m","data":{"e":"kline","E":1,"s":"BTCUSDT"}}"#, Utc::now())
                .unwrap(),
            FeedMessage::Ignore
        );
        assert_eq!(
            binance.parse(&agg_trade("DOGEUSDT", 1, "0.07"), Utc::now()).unwrap(),
            FeedMessage::Ignore
        );
    }

    #[test]
    fn test_agg_trade_sequence() {
        let mut binance = binance();
        let now = Utc::now();

        assert!(matches!(
            binance.parse(&agg_trade("BTCUSDT", 100, "16578.5"), now).unwrap(),
            FeedMessage::Ticks(_)
        ));
        assert!(matches!(
            binance.parse(&agg_trade("BTCUSDT", 101, "16578.6"), now).unwrap(),
            FeedMessage::Ticks(_)
        ));

        // Symbols are sequenced independently
        assert!(matches!(
            binance.parse(&agg_trade("ETHBTC", 7, "0.07"), now).unwrap(),
            FeedMessage::Ticks(_)
        ));

        // Replays are ignored
        assert_eq!(
            binance.parse(&agg_trade("BTCUSDT", 101, "16578.6"), now).unwrap(),
            FeedMessage::Ignore
        );

        assert_eq!(
            binance.parse(&agg_trade("BTCUSDT", 104, "16579.0"), now),
            Err(FeedError::SequenceGap {
                symbol: SmolStr::new("BTCUSDT"),
                expected: 102,
                received: 104,
            })
        );

        // A fresh connection starts a fresh sequence
        binance.reset();
        assert!(matches!(
            binance.parse(&agg_trade("BTCUSDT", 250, "16580.0"), now).unwrap(),
            FeedMessage::Ticks(_)
        ));
    }
}
