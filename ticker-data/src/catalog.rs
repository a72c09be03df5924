//! Exchange symbol catalog & 24h volume ranking, fetched once at startup over REST.

use crate::{
    de::de_opt_decimal_str,
    error::FeedError,
    exchange::Markets,
    instrument::{ExchangeId, InstrumentId, InstrumentSpec},
};
use fnv::FnvHashMap;
use itertools::Itertools;
use rust_decimal::Decimal;
use serde::{Deserialize, de::DeserializeOwned};
use smol_str::SmolStr;
use tracing::{debug, info};

/// [`ExchangeId::Binance`] REST symbol list.
///
/// See docs: <https://developers.binance.com/docs/binance-spot-api-docs/rest-api/general-endpoints#exchange-information>
pub const URL_BINANCE_EXCHANGE_INFO: &str = "https://api.binance.com/api/v3/exchangeInfo";

/// [`ExchangeId::Binance`] REST 24h rolling window ticker for every symbol.
pub const URL_BINANCE_TICKER_24HR: &str = "https://api.binance.com/api/v3/ticker/24hr";

/// [`ExchangeId::HitBtc`] REST symbol list.
///
/// See docs: <https://api.hitbtc.com/#symbols>
pub const URL_HITBTC_SYMBOLS: &str = "https://api.hitbtc.com/api/2/public/symbol";

/// [`ExchangeId::HitBtc`] REST ticker for every symbol.
pub const URL_HITBTC_TICKER: &str = "https://api.hitbtc.com/api/2/public/ticker";

/// Quote currencies whose volume is already denominated in US dollars.
const USD_QUOTES: [&str; 2] = ["USD", "USDT"];

/// Last price & 24h quote volume for one symbol, used to rank symbols by activity.
#[derive(Clone, PartialEq, Debug)]
pub struct VolumeTicker {
    pub symbol: SmolStr,
    pub last: Option<Decimal>,
    pub quote_volume: Option<Decimal>,
}

/// US dollar value of one unit of each currency, taken from `XXXUSD` & `XXXUSDT` last
/// prices. Used to express 24h volume in a common unit.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct UsdRates {
    rates: FnvHashMap<SmolStr, Decimal>,
}

impl UsdRates {
    /// Record `price` of `base` if `quote` is a US dollar currency, returning `true` if it was.
    pub fn observe(&mut self, base: &str, quote: &str, price: Decimal) -> bool {
        if !is_usd(quote) || price.is_zero() {
            return false;
        }
        self.rates.insert(SmolStr::new(base), price);
        true
    }

    /// US dollar value of one unit of `currency`, if known.
    pub fn rate(&self, currency: &str) -> Option<Decimal> {
        if is_usd(currency) {
            return Some(Decimal::ONE);
        }
        self.rates.get(currency).copied()
    }

    /// Express `amount` of `from` in units of `to`.
    pub fn convert(&self, amount: Decimal, from: &str, to: &str) -> Option<Decimal> {
        if from == to {
            return Some(amount);
        }
        let from_rate = self.rate(from)?;
        let to_rate = self.rate(to).filter(|rate| !rate.is_zero())?;
        amount.checked_mul(from_rate)?.checked_div(to_rate)
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

fn is_usd(currency: &str) -> bool {
    USD_QUOTES.contains(&currency)
}

/// Every instrument an exchange currently lists, keyed by canonical symbol.
#[derive(Clone, Debug)]
pub struct SymbolCatalog {
    exchange: ExchangeId,
    symbols: FnvHashMap<SmolStr, InstrumentSpec>,
}

impl SymbolCatalog {
    pub fn new(exchange: ExchangeId, specs: impl IntoIterator<Item = InstrumentSpec>) -> Self {
        Self {
            exchange,
            symbols: specs
                .into_iter()
                .filter(|spec| spec.id.exchange == exchange)
                .map(|spec| (spec.id.symbol.clone(), spec))
                .collect(),
        }
    }

    /// Download the symbol list of `exchange`.
    pub async fn fetch(client: &reqwest::Client, exchange: ExchangeId) -> Result<Self, FeedError> {
        let url = match exchange {
            ExchangeId::Binance => URL_BINANCE_EXCHANGE_INFO,
            ExchangeId::HitBtc => URL_HITBTC_SYMBOLS,
        };

        let body = get_text(client, url).await?;
        let catalog = Self::parse(exchange, &body)?;
        info!(%exchange, symbols = catalog.len(), "loaded exchange symbol catalog");
        Ok(catalog)
    }

    /// Parse a symbol list response body.
    pub fn parse(exchange: ExchangeId, body: &str) -> Result<Self, FeedError> {
        let specs = match exchange {
            ExchangeId::Binance => decode::<BinanceExchangeInfo>(body)?
                .symbols
                .into_iter()
                .filter(|symbol| symbol.status == "TRADING")
                .map(|symbol| {
                    let tick_size = symbol.filters.iter().find_map(|filter| match filter {
                        BinanceFilter::Price { tick_size } => Some(*tick_size),
                        BinanceFilter::Other => None,
                    });
                    InstrumentSpec::new(
                        InstrumentId::new(exchange, symbol.symbol),
                        symbol.base_asset,
                        symbol.quote_asset,
                        tick_size.filter(|tick| !tick.is_zero()),
                    )
                })
                .collect::<Vec<_>>(),
            ExchangeId::HitBtc => decode::<Vec<HitBtcSymbol>>(body)?
                .into_iter()
                .map(|symbol| {
                    InstrumentSpec::new(
                        InstrumentId::new(exchange, symbol.id),
                        symbol.base_currency,
                        symbol.quote_currency,
                        symbol.tick_size.filter(|tick| !tick.is_zero()),
                    )
                })
                .collect::<Vec<_>>(),
        };

        Ok(Self::new(exchange, specs))
    }

    pub fn exchange(&self) -> ExchangeId {
        self.exchange
    }

    pub fn get(&self, symbol: &str) -> Option<&InstrumentSpec> {
        self.symbols.get(symbol)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Resolve a user supplied pair (eg/ `btc/usd`, `ETH-BTC`, `"eth btc"`) to a listed
    /// symbol.
    ///
    /// Exchanges list USD and Tether markets interchangeably, so an unlisted `XXXUSD` falls
    /// back to `XXXUSDT`.
    pub fn canonicalize(&self, pair: &str) -> Result<SmolStr, FeedError> {
        let symbol = pair
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .map(|c| c.to_ascii_uppercase())
            .collect::<String>();

        if self.symbols.contains_key(symbol.as_str()) {
            return Ok(SmolStr::new(symbol));
        }

        if symbol.ends_with("USD") {
            let tether = format!("{symbol}T");
            if self.symbols.contains_key(tether.as_str()) {
                debug!(%pair, symbol = %tether, "substituting Tether market");
                return Ok(SmolStr::new(tether));
            }
        }

        Err(FeedError::Configuration(format!(
            "{pair:?} is not listed on {}",
            self.exchange
        )))
    }

    /// Build the subscription [`Markets`] for already canonical `symbols`.
    pub fn markets<'a>(
        &self,
        symbols: impl IntoIterator<Item = &'a SmolStr>,
    ) -> Result<Markets, FeedError> {
        let specs = symbols
            .into_iter()
            .map(|symbol| {
                self.get(symbol).cloned().ok_or_else(|| {
                    FeedError::Configuration(format!("{symbol} is not listed on {}", self.exchange))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Markets::new(self.exchange, specs)
    }

    /// Download the 24h rolling window ticker of every symbol.
    pub async fn volume_tickers(&self, client: &reqwest::Client) -> Result<Vec<VolumeTicker>, FeedError> {
        let url = match self.exchange {
            ExchangeId::Binance => URL_BINANCE_TICKER_24HR,
            ExchangeId::HitBtc => URL_HITBTC_TICKER,
        };

        let body = get_text(client, url).await?;
        let tickers = parse_volume_tickers(self.exchange, &body)?;
        debug!(exchange = %self.exchange, tickers = tickers.len(), "loaded 24h tickers");
        Ok(tickers)
    }

    /// US dollar rates of every currency with a listed USD or Tether market.
    pub fn usd_rates(&self, tickers: &[VolumeTicker]) -> UsdRates {
        let mut rates = UsdRates::default();
        for ticker in tickers {
            if let (Some(spec), Some(last)) = (self.get(&ticker.symbol), ticker.last) {
                rates.observe(&spec.base, &spec.quote, last);
            }
        }
        rates
    }

    /// Order listed symbols by 24h quote volume converted to USD, largest first.
    ///
    /// Volume quoted in another currency is converted with that currency's USD (or Tether)
    /// last price. Symbols whose quote currency cannot be converted are skipped.
    pub fn rank_by_volume(&self, tickers: &[VolumeTicker]) -> Vec<SmolStr> {
        let rates = self.usd_rates(tickers);

        tickers
            .iter()
            .filter_map(|ticker| {
                let spec = self.get(&ticker.symbol)?;
                let volume = ticker.quote_volume?;
                match rates.rate(&spec.quote).and_then(|rate| volume.checked_mul(rate)) {
                    Some(usd_volume) => Some((&ticker.symbol, usd_volume)),
                    None => {
                        debug!(symbol = %ticker.symbol, quote = %spec.quote, "skipping unconvertible volume");
                        None
                    }
                }
            })
            .sorted_by(|(a_symbol, a_volume), (b_symbol, b_volume)| {
                b_volume.cmp(a_volume).then_with(|| a_symbol.cmp(b_symbol))
            })
            .map(|(symbol, _)| symbol.clone())
            .collect()
    }
}

/// Parse a 24h ticker response body.
pub fn parse_volume_tickers(
    exchange: ExchangeId,
    body: &str,
) -> Result<Vec<VolumeTicker>, FeedError> {
    let tickers = match exchange {
        ExchangeId::Binance => decode::<Vec<BinanceTicker24hr>>(body)?
            .into_iter()
            .map(|ticker| VolumeTicker {
                symbol: ticker.symbol,
                last: ticker.last_price,
                quote_volume: ticker.quote_volume,
            })
            .collect(),
        ExchangeId::HitBtc => decode::<Vec<HitBtcTicker>>(body)?
            .into_iter()
            .map(|ticker| VolumeTicker {
                symbol: ticker.symbol,
                last: ticker.last,
                quote_volume: ticker.volume_quote,
            })
            .collect(),
    };

    Ok(tickers)
}

async fn get_text(client: &reqwest::Client, url: &str) -> Result<String, FeedError> {
    client
        .get(url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|error| FeedError::Catalog(format!("GET {url}: {error}")))?
        .text()
        .await
        .map_err(|error| FeedError::Catalog(format!("GET {url}: {error}")))
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, FeedError> {
    serde_json::from_str(body).map_err(|error| FeedError::Catalog(error.to_string()))
}

#[derive(Debug, Deserialize)]
struct BinanceExchangeInfo {
    symbols: Vec<BinanceSymbol>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BinanceSymbol {
    symbol: SmolStr,
    status: String,
    base_asset: SmolStr,
    quote_asset: SmolStr,
    #[serde(default)]
    filters: Vec<BinanceFilter>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "filterType")]
enum BinanceFilter {
    #[serde(rename = "PRICE_FILTER")]
    Price {
        #[serde(rename = "tickSize")]
        tick_size: Decimal,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BinanceTicker24hr {
    symbol: SmolStr,
    #[serde(default, deserialize_with = "de_opt_decimal_str")]
    last_price: Option<Decimal>,
    #[serde(default, deserialize_with = "de_opt_decimal_str")]
    quote_volume: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HitBtcSymbol {
    id: SmolStr,
    base_currency: SmolStr,
    quote_currency: SmolStr,
    #[serde(default, deserialize_with = "de_opt_decimal_str")]
    tick_size: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HitBtcTicker {
    symbol: SmolStr,
    #[serde(default, deserialize_with = "de_opt_decimal_str")]
    last: Option<Decimal>,
    #[serde(default, deserialize_with = "de_opt_decimal_str")]
    volume_quote: Option<Decimal>,
}
