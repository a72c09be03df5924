//! Board layout: shared price precision, column widths & row order.

use crate::{
    config::{BoardConfig, PriceThreshold, SortMode, VolumeUnit},
    registry::{InstrumentSnapshot, Snapshot},
};
use itertools::Itertools;
use rust_decimal::{Decimal, RoundingStrategy};
use std::cmp::Reverse;
use ticker_data::{catalog::UsdRates, instrument::fractional_digits};
use tracing::debug;

pub const HEADING_PAIR: &str = "Pair";
pub const HEADING_PRICE: &str = "Price";
pub const HEADING_BID: &str = "Bid";
pub const HEADING_ASK: &str = "Ask";
pub const HEADING_CHANGE: &str = "Δ (24h)";

/// Volume column heading, eg/ `Vol (USD)`.
pub fn volume_heading(unit: VolumeUnit) -> String {
    format!("Vol ({unit})")
}

/// Character widths of the board columns.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct ColumnWidths {
    pub pair: usize,
    pub price: usize,
    pub volume: usize,
    pub bid: usize,
    pub ask: usize,
    pub change: usize,
}

impl ColumnWidths {
    /// Widths of the column headings alone.
    pub fn headings(volume_heading: &str) -> Self {
        Self::of(&RowText {
            pair: HEADING_PAIR.to_string(),
            price: HEADING_PRICE.to_string(),
            volume: volume_heading.to_string(),
            bid: HEADING_BID.to_string(),
            ask: HEADING_ASK.to_string(),
            change: HEADING_CHANGE.to_string(),
        })
    }

    fn of(row: &RowText) -> Self {
        Self {
            pair: row.pair.chars().count(),
            price: row.price.chars().count(),
            volume: row.volume.chars().count(),
            bid: row.bid.chars().count(),
            ask: row.ask.chars().count(),
            change: row.change.chars().count(),
        }
    }

    fn max(self, other: Self) -> Self {
        Self {
            pair: self.pair.max(other.pair),
            price: self.price.max(other.price),
            volume: self.volume.max(other.volume),
            bid: self.bid.max(other.bid),
            ask: self.ask.max(other.ask),
            change: self.change.max(other.change),
        }
    }
}

/// Derived presentation state of the board.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Layout {
    /// Decimal places shared by every price below the reduced precision threshold.
    pub price_scale: u32,
    /// Indices into [`Snapshot::instruments`], in display order.
    pub rows: Vec<usize>,
    pub widths: ColumnWidths,
}

/// Formatted cells of one board row.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct RowText {
    pub pair: String,
    pub price: String,
    pub volume: String,
    pub bid: String,
    pub ask: String,
    pub change: String,
}

/// Required decimal places of one instrument: its tick size, else its last price.
pub fn instrument_precision(instrument: &InstrumentSnapshot) -> u32 {
    instrument
        .tick_size
        .map(fractional_digits)
        .unwrap_or_else(|| fractional_digits(instrument.price))
}

/// Board-wide price precision: the finest precision among all instruments.
pub fn board_precision(snapshot: &Snapshot) -> u32 {
    snapshot
        .instruments
        .iter()
        .map(instrument_precision)
        .max()
        .unwrap_or(0)
}

/// Format `price` at `scale` decimal places, padding with zeros, or at the threshold's
/// reduced scale for high magnitude prices in the listed quote currencies.
pub fn format_price(price: Decimal, quote: &str, scale: u32, threshold: &PriceThreshold) -> String {
    let scale = if threshold.applies(quote, price) {
        threshold.reduced_scale
    } else {
        scale
    };

    let mut price = price.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero);
    price.rescale(scale);
    price.to_string()
}

/// Volume at `scale` decimal places with thousands separators, empty when unknown.
pub fn format_volume(volume: Option<Decimal>, scale: u32) -> String {
    let Some(volume) = volume else {
        return String::new();
    };

    let mut rounded = volume
        .round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero)
        .abs();
    rounded.rescale(scale);

    let digits = rounded.trunc().to_string();
    let grouped = digits
        .as_bytes()
        .rchunks(3)
        .rev()
        .map(|chunk| String::from_utf8_lossy(chunk))
        .join(",");

    let fraction = rounded.to_string();
    let grouped = match fraction.split_once('.') {
        Some((_, fraction)) => format!("{grouped}.{fraction}"),
        None => grouped,
    };

    if volume.is_sign_negative() && !rounded.is_zero() {
        format!("-{grouped}")
    } else {
        grouped
    }
}

/// Signed percentage at three decimal places, eg/ `+1.234%`, empty when unknown.
pub fn format_change(change: Option<Decimal>) -> String {
    let Some(change) = change else {
        return String::new();
    };

    let mut change = change.round_dp_with_strategy(3, RoundingStrategy::MidpointAwayFromZero);
    change.rescale(3);
    if change.is_zero() {
        change.set_sign_positive(true);
    }

    if change.is_sign_negative() {
        format!("{change}%")
    } else {
        format!("+{change}%")
    }
}

/// Keeps the current [`Layout`], recomputing it as instruments appear and precision or
/// ordering change. Column widths only ever grow, so rows do not jitter.
#[derive(Clone, Debug)]
pub struct LayoutEngine {
    sort: SortMode,
    threshold: PriceThreshold,
    max_rows: Option<usize>,
    volume_unit: VolumeUnit,
    volume_heading: String,
    rates: UsdRates,
    layout: Layout,
    generation: u64,
}

impl LayoutEngine {
    pub fn new(config: &BoardConfig) -> Self {
        let volume_heading = volume_heading(config.volume_unit);
        Self {
            sort: config.sort,
            threshold: config.price_threshold.clone(),
            max_rows: config.max_rows,
            volume_unit: config.volume_unit,
            layout: Layout {
                price_scale: 0,
                rows: Vec::new(),
                widths: ColumnWidths::headings(&volume_heading),
            },
            volume_heading,
            rates: config.usd_rates.clone(),
            generation: 0,
        }
    }

    /// Current layout for `snapshot`, recomputed only if it changed.
    pub fn update(&mut self, snapshot: &Snapshot) -> &Layout {
        for instrument in &snapshot.instruments {
            self.rates.observe(&instrument.base, &instrument.quote, instrument.price);
        }

        let price_scale = board_precision(snapshot);
        let rows = self.order(snapshot);

        let widths = rows
            .iter()
            .map(|index| ColumnWidths::of(&self.format_row(price_scale, &snapshot.instruments[*index])))
            .fold(self.layout.widths, ColumnWidths::max);

        let next = Layout {
            price_scale,
            rows,
            widths,
        };

        if next != self.layout {
            self.generation += 1;
            debug!(
                generation = self.generation,
                price_scale = next.price_scale,
                rows = next.rows.len(),
                widths = ?next.widths,
                "board layout recomputed"
            );
            self.layout = next;
        }

        &self.layout
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Number of times the layout has changed.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn volume_heading(&self) -> &str {
        &self.volume_heading
    }

    /// 24h volume of `instrument` in the board volume unit, `None` if unknown or not
    /// convertible with the rates seen so far.
    pub fn volume(&self, instrument: &InstrumentSnapshot) -> Option<Decimal> {
        let volume = instrument.volume?;
        match self.volume_unit.currency() {
            Some(target) => self.rates.convert(volume, &instrument.quote, target),
            None => Some(volume),
        }
    }

    /// Formatted cells of `instrument` under the current layout.
    pub fn row_text(&self, instrument: &InstrumentSnapshot) -> RowText {
        self.format_row(self.layout.price_scale, instrument)
    }

    fn format_row(&self, price_scale: u32, instrument: &InstrumentSnapshot) -> RowText {
        let price = |price: Decimal| format_price(price, &instrument.quote, price_scale, &self.threshold);
        RowText {
            pair: format!("{}/{}", instrument.base, instrument.quote),
            price: price(instrument.price),
            volume: format_volume(self.volume(instrument), self.volume_unit.scale()),
            bid: instrument.bid.map(&price).unwrap_or_default(),
            ask: instrument.ask.map(&price).unwrap_or_default(),
            change: format_change(instrument.change()),
        }
    }

    fn order(&self, snapshot: &Snapshot) -> Vec<usize> {
        let indices = 0..snapshot.len();
        let rows = match self.sort {
            SortMode::Insertion => indices.collect::<Vec<_>>(),
            SortMode::Volume => indices
                .sorted_by_key(|index| Reverse(self.volume(&snapshot.instruments[*index])))
                .collect(),
        };

        match self.max_rows {
            Some(max_rows) => rows.into_iter().take(max_rows).collect(),
            None => rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pulse::Pulse;
    use rust_decimal_macros::dec;
    use smol_str::SmolStr;
    use ticker_data::instrument::{ExchangeId, InstrumentId};

    fn instrument(
        base: &str,
        quote: &str,
        price: Decimal,
        tick_size: Option<Decimal>,
        volume: Option<Decimal>,
    ) -> InstrumentSnapshot {
        InstrumentSnapshot {
            id: InstrumentId::new(ExchangeId::Binance, format!("{base}{quote}")),
            base: SmolStr::new(base),
            quote: SmolStr::new(quote),
            price,
            previous: None,
            tick_size,
            volume,
            bid: None,
            ask: None,
            open: None,
            pulse: Pulse::default(),
            stale: false,
        }
    }

    #[test]
    fn test_board_precision() {
        struct TestCase {
            input: Vec<InstrumentSnapshot>,
            expected: u32,
        }

        let tests = vec![
            TestCase {
                // TC0: finest tick size wins
                input: vec![
                    instrument("BTC", "USD", dec!(100.5), Some(dec!(0.01)), None),
                    instrument("XRP", "USD", dec!(0.5), Some(dec!(0.0001)), None),
                ],
                expected: 4,
            },
            TestCase {
                // TC1: unknown tick size falls back to the normalised price scale
                input: vec![
                    instrument("BTC", "USD", dec!(100.5), Some(dec!(0.01)), None),
                    instrument("ETH", "BTC", dec!(0.054463000), None, None),
                ],
                expected: 6,
            },
            TestCase {
                // TC2: empty board
                input: vec![],
                expected: 0,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let snapshot = Snapshot {
                instruments: test.input,
            };
            assert_eq!(board_precision(&snapshot), test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_format_price() {
        struct TestCase {
            input: (Decimal, &'static str, u32),
            expected: &'static str,
        }

        let threshold = PriceThreshold::default();

        let tests = vec![
            TestCase {
                // TC0: high magnitude USD price rounded to cents
                input: (dec!(15000.1234), "USD", 4),
                expected: "15000.12",
            },
            TestCase {
                // TC1: low magnitude USD price at full board precision
                input: (dec!(0.1234), "USD", 4),
                expected: "0.1234",
            },
            TestCase {
                // TC2: padded with trailing zeros, never truncated
                input: (dec!(100.5), "BTC", 4),
                expected: "100.5000",
            },
            TestCase {
                // TC3: reduced precision pads too
                input: (dec!(16578), "USDT", 8),
                expected: "16578.00",
            },
            TestCase {
                // TC4: rounding half away from zero
                input: (dec!(20.125), "USDT", 4),
                expected: "20.13",
            },
            TestCase {
                // TC5: surplus exchange precision is rounded to board precision
                input: (dec!(0.05446300), "BTC", 6),
                expected: "0.054463",
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let (price, quote, scale) = test.input;
            assert_eq!(
                format_price(price, quote, scale, &threshold),
                test.expected,
                "TC{} failed",
                index
            );
        }
    }

    #[test]
    fn test_format_volume() {
        struct TestCase {
            input: (Option<Decimal>, u32),
            expected: &'static str,
        }

        let tests = vec![
            TestCase {
                // TC0: unknown
                input: (None, 0),
                expected: "",
            },
            TestCase {
                // TC1: small
                input: (Some(dec!(999.4)), 0),
                expected: "999",
            },
            TestCase {
                // TC2: rounded & grouped
                input: (Some(dec!(276150392.505238)), 0),
                expected: "276,150,393",
            },
            TestCase {
                // TC3: exact thousand
                input: (Some(dec!(1000)), 0),
                expected: "1,000",
            },
            TestCase {
                // TC4: zero
                input: (Some(dec!(0.00)), 0),
                expected: "0",
            },
            TestCase {
                // TC5: BTC volume keeps two places
                input: (Some(dec!(13807.456)), 2),
                expected: "13,807.46",
            },
            TestCase {
                // TC6: ETH volume padded to one place
                input: (Some(dec!(250000)), 1),
                expected: "250,000.0",
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let (volume, scale) = test.input;
            assert_eq!(format_volume(volume, scale), test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_format_change() {
        struct TestCase {
            input: Option<Decimal>,
            expected: &'static str,
        }

        let tests = vec![
            TestCase {
                // TC0: unknown
                input: None,
                expected: "",
            },
            TestCase {
                // TC1: rise
                input: Some(dec!(1.23456)),
                expected: "+1.235%",
            },
            TestCase {
                // TC2: fall
                input: Some(dec!(-0.5729)),
                expected: "-0.573%",
            },
            TestCase {
                // TC3: flat
                input: Some(dec!(0)),
                expected: "+0.000%",
            },
            TestCase {
                // TC4: negligible fall rounds to flat
                input: Some(dec!(-0.0001)),
                expected: "+0.000%",
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            assert_eq!(format_change(test.input), test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_layout_engine_update() {
        let config = BoardConfig::default();
        let mut engine = LayoutEngine::new(&config);

        let mut snapshot = Snapshot {
            instruments: vec![
                instrument("BTC", "USD", dec!(15000.1234), Some(dec!(0.01)), Some(dec!(1500))),
                instrument("XRP", "USD", dec!(0.1234), Some(dec!(0.0001)), None),
            ],
        };

        let layout = engine.update(&snapshot).clone();
        assert_eq!(layout.price_scale, 4);
        assert_eq!(layout.rows, vec![0, 1]);
        assert_eq!(
            layout.widths,
            ColumnWidths {
                pair: 7,
                price: 8,
                volume: 9,
                bid: 3,
                ask: 3,
                change: 7,
            }
        );
        assert_eq!(engine.row_text(&snapshot.instruments[0]).price, "15000.12");
        assert_eq!(engine.row_text(&snapshot.instruments[1]).price, "0.1234");
        assert_eq!(engine.generation(), 1);

        // Unchanged inputs keep the cached layout
        engine.update(&snapshot);
        assert_eq!(engine.generation(), 1);

        // Narrower prices never shrink the columns
        snapshot.instruments[0].price = dec!(9.5);
        assert_eq!(engine.update(&snapshot).widths, layout.widths);
        assert_eq!(engine.generation(), 1);

        // A finer tick size widens the price column for every row
        snapshot.instruments.push(instrument("SHB", "BTC", dec!(0.00000123), Some(dec!(0.00000001)), None));
        let layout = engine.update(&snapshot);
        assert_eq!(layout.price_scale, 8);
        assert_eq!(layout.rows, vec![0, 1, 2]);
        assert_eq!(engine.generation(), 2);
        assert_eq!(engine.row_text(&snapshot.instruments[1]).price, "0.12340000");
    }

    #[test]
    fn test_layout_engine_volume_sort() {
        let config = BoardConfig::default()
            .with_sort(SortMode::Volume)
            .with_max_rows(Some(3));
        let mut engine = LayoutEngine::new(&config);

        let snapshot = Snapshot {
            instruments: vec![
                instrument("AAA", "USD", dec!(1), None, Some(dec!(10))),
                instrument("BBB", "USD", dec!(1), None, Some(dec!(30))),
                instrument("CCC", "USD", dec!(1), None, None),
                instrument("DDD", "USD", dec!(1), None, Some(dec!(10))),
                instrument("EEE", "USD", dec!(1), None, Some(dec!(20))),
            ],
        };

        // Equal volumes keep insertion order; unknown volume sorts last
        assert_eq!(engine.update(&snapshot).rows, vec![1, 4, 0]);

        let engine = &mut LayoutEngine::new(&config.with_max_rows(None));
        assert_eq!(engine.update(&snapshot).rows, vec![1, 4, 0, 3, 2]);
    }

    #[test]
    fn test_layout_engine_volume_sort_converts_to_unit() {
        let rates = {
            let mut rates = UsdRates::default();
            rates.observe("BTC", "USDT", dec!(20000));
            rates.observe("ETH", "USDT", dec!(1000));
            rates
        };
        let snapshot = Snapshot {
            instruments: vec![
                instrument("ETH", "BTC", dec!(0.05), None, Some(dec!(5000))),
                instrument("DOGE", "USDT", dec!(0.07), None, Some(dec!(6000))),
                instrument("LTC", "BNB", dec!(0.3), None, Some(dec!(9000000))),
            ],
        };

        let config = BoardConfig::default()
            .with_sort(SortMode::Volume)
            .with_usd_rates(rates);

        // 5000 BTC is worth far more than 6000 USDT; BNB volume cannot be converted
        let mut engine = LayoutEngine::new(&config);
        assert_eq!(engine.update(&snapshot).rows, vec![0, 1, 2]);
        assert_eq!(engine.volume_heading(), "Vol (USD)");
        assert_eq!(engine.row_text(&snapshot.instruments[0]).volume, "100,000,000");
        assert_eq!(engine.row_text(&snapshot.instruments[1]).volume, "6,000");
        assert_eq!(engine.row_text(&snapshot.instruments[2]).volume, "");

        let mut engine = LayoutEngine::new(&config.clone().with_volume_unit(VolumeUnit::Btc));
        engine.update(&snapshot);
        assert_eq!(engine.volume_heading(), "Vol (BTC)");
        assert_eq!(engine.row_text(&snapshot.instruments[0]).volume, "5,000.00");
        assert_eq!(engine.row_text(&snapshot.instruments[1]).volume, "0.30");

        // Unconverted quote volume ranks the raw figures
        let mut engine = LayoutEngine::new(&config.with_volume_unit(VolumeUnit::Quote));
        assert_eq!(engine.update(&snapshot).rows, vec![2, 1, 0]);
        assert_eq!(engine.row_text(&snapshot.instruments[0]).volume, "5,000");
    }

    #[test]
    fn test_layout_engine_live_rates() {
        let mut snapshot = Snapshot {
            instruments: vec![
                instrument("ETH", "BTC", dec!(0.05), None, Some(dec!(10))),
                instrument("BTC", "USDT", dec!(20000), Some(dec!(0.01)), Some(dec!(1))),
            ],
        };
        let mut engine = LayoutEngine::new(&BoardConfig::default());

        engine.update(&snapshot);
        assert_eq!(engine.volume(&snapshot.instruments[0]), Some(dec!(200000)));

        // BTC/USDT on the board keeps the BTC rate current
        snapshot.instruments[1].price = dec!(30000);
        engine.update(&snapshot);
        assert_eq!(engine.volume(&snapshot.instruments[0]), Some(dec!(300000)));
    }

    #[test]
    fn test_row_text_quotes_and_change() {
        let mut btc = instrument("BTC", "USDT", dec!(16483.51), Some(dec!(0.01)), Some(dec!(1)));
        btc.bid = Some(dec!(16483.5));
        btc.ask = Some(dec!(16483.52));
        btc.open = Some(dec!(16578.50));
        let mut eth = instrument("ETH", "BTC", dec!(0.07022), Some(dec!(0.00001)), None);
        eth.bid = Some(dec!(0.07021));

        let snapshot = Snapshot {
            instruments: vec![btc, eth],
        };
        let mut engine = LayoutEngine::new(&BoardConfig::default());
        let widths = engine.update(&snapshot).widths;

        let row = engine.row_text(&snapshot.instruments[0]);
        assert_eq!(row.bid, "16483.50");
        assert_eq!(row.ask, "16483.52");
        assert_eq!(row.change, "-0.573%");

        // Quotes share the board precision, missing fields stay blank
        let row = engine.row_text(&snapshot.instruments[1]);
        assert_eq!(row.bid, "0.07021");
        assert_eq!(row.ask, "");
        assert_eq!(row.change, "");

        assert_eq!(widths.bid, 8);
        assert_eq!(widths.change, 7);
    }
}
