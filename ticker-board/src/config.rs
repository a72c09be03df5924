use crate::capability::ColorCapability;
use derive_more::Display;
use rust_decimal::Decimal;
use smol_str::SmolStr;
use std::time::Duration;
use ticker_data::catalog::UsdRates;

/// Default board redraw interval.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(250);

/// Default silence after which an instrument is drawn as stale.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(15);

/// Pulse highlight speed.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default, Display)]
pub enum PulseMode {
    #[default]
    #[display("normal")]
    Normal,
    #[display("fast")]
    Fast,
    #[display("off")]
    Off,
}

impl PulseMode {
    /// Time for a highlight to fade from full intensity to neutral, `None` if disabled.
    pub fn decay(&self) -> Option<Duration> {
        match self {
            PulseMode::Normal => Some(Duration::from_secs(1)),
            PulseMode::Fast => Some(Duration::from_millis(400)),
            PulseMode::Off => None,
        }
    }
}

/// Board row ordering.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default, Display)]
pub enum SortMode {
    /// Order in which instruments first ticked.
    #[default]
    #[display("insertion")]
    Insertion,
    /// Descending 24h volume in the board volume unit, ties by insertion order.
    #[display("volume")]
    Volume,
}

/// Currency the 24h volume column is expressed in.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default, Display)]
pub enum VolumeUnit {
    #[default]
    #[display("USD")]
    Usd,
    #[display("BTC")]
    Btc,
    #[display("ETH")]
    Eth,
    /// Each pair's own quote currency, unconverted.
    #[display("quote")]
    Quote,
}

impl VolumeUnit {
    /// Target currency of the conversion, `None` if volume is shown as reported.
    pub fn currency(&self) -> Option<&'static str> {
        match self {
            VolumeUnit::Usd => Some("USD"),
            VolumeUnit::Btc => Some("BTC"),
            VolumeUnit::Eth => Some("ETH"),
            VolumeUnit::Quote => None,
        }
    }

    /// Decimal places shown for volume in this unit.
    pub fn scale(&self) -> u32 {
        match self {
            VolumeUnit::Usd | VolumeUnit::Quote => 0,
            VolumeUnit::Eth => 1,
            VolumeUnit::Btc => 2,
        }
    }
}

/// Reduced display precision for high magnitude prices in the listed quote currencies.
///
/// eg/ with the defaults, `15000.1234` quoted in USD is shown as `15000.12`.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct PriceThreshold {
    pub magnitude: Decimal,
    pub reduced_scale: u32,
    pub quotes: Vec<SmolStr>,
}

impl Default for PriceThreshold {
    fn default() -> Self {
        Self {
            magnitude: Decimal::TEN,
            reduced_scale: 2,
            quotes: ["USD", "USDT", "USDC"].into_iter().map(SmolStr::new).collect(),
        }
    }
}

impl PriceThreshold {
    /// Determine if `price` quoted in `quote` is displayed at the reduced precision.
    pub fn applies(&self, quote: &str, price: Decimal) -> bool {
        price.abs() >= self.magnitude && self.quotes.iter().any(|listed| listed == quote)
    }
}

/// Everything the board needs, resolved once at startup.
#[derive(Clone, PartialEq, Debug)]
pub struct BoardConfig {
    pub pulse: PulseMode,
    pub sort: SortMode,
    pub color: ColorCapability,
    pub price_threshold: PriceThreshold,
    pub refresh_interval: Duration,
    pub stale_after: Duration,
    /// Show a `+`/`-` marker next to each price.
    pub direction_indicator: bool,
    /// Draw once more after shutdown is requested.
    pub final_render: bool,
    pub max_rows: Option<usize>,
    pub volume_unit: VolumeUnit,
    /// Startup conversion rates, refined by live prices of USD quoted instruments.
    pub usd_rates: UsdRates,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            pulse: PulseMode::default(),
            sort: SortMode::default(),
            color: ColorCapability::default(),
            price_threshold: PriceThreshold::default(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            stale_after: DEFAULT_STALE_AFTER,
            direction_indicator: false,
            final_render: true,
            max_rows: None,
            volume_unit: VolumeUnit::default(),
            usd_rates: UsdRates::default(),
        }
    }
}

impl BoardConfig {
    pub fn with_pulse(mut self, pulse: PulseMode) -> Self {
        self.pulse = pulse;
        self
    }

    pub fn with_sort(mut self, sort: SortMode) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_color(mut self, color: ColorCapability) -> Self {
        self.color = color;
        self
    }

    pub fn with_price_threshold(mut self, threshold: PriceThreshold) -> Self {
        self.price_threshold = threshold;
        self
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn with_direction_indicator(mut self, enabled: bool) -> Self {
        self.direction_indicator = enabled;
        self
    }

    pub fn with_final_render(mut self, enabled: bool) -> Self {
        self.final_render = enabled;
        self
    }

    pub fn with_max_rows(mut self, max_rows: Option<usize>) -> Self {
        self.max_rows = max_rows;
        self
    }

    pub fn with_volume_unit(mut self, unit: VolumeUnit) -> Self {
        self.volume_unit = unit;
        self
    }

    pub fn with_usd_rates(mut self, rates: UsdRates) -> Self {
        self.usd_rates = rates;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_price_threshold_applies() {
        struct TestCase {
            input: (&'static str, Decimal),
            expected: bool,
        }

        let threshold = PriceThreshold::default();

        let tests = vec![
            TestCase {
                // TC0: USD quote at the threshold
                input: ("USD", dec!(10)),
                expected: true,
            },
            TestCase {
                // TC1: Tether quote above the threshold
                input: ("USDT", dec!(15000.1234)),
                expected: true,
            },
            TestCase {
                // TC2: USD quote below the threshold
                input: ("USD", dec!(0.1234)),
                expected: false,
            },
            TestCase {
                // TC3: non USD quote above the threshold
                input: ("BTC", dec!(15.5)),
                expected: false,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let (quote, price) = test.input;
            assert_eq!(threshold.applies(quote, price), test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_default_config() {
        let config = BoardConfig::default();
        assert_eq!(config.pulse.decay(), Some(Duration::from_secs(1)));
        assert_eq!(config.sort, SortMode::Insertion);
        assert_eq!(config.refresh_interval, Duration::from_millis(250));
        assert_eq!(config.stale_after, Duration::from_secs(15));
        assert!(config.final_render);
        assert_eq!(config.volume_unit, VolumeUnit::Usd);

        let config = config
            .with_pulse(PulseMode::Fast)
            .with_sort(SortMode::Volume)
            .with_max_rows(Some(10));
        assert_eq!(config.pulse.decay(), Some(Duration::from_millis(400)));
        assert_eq!(config.sort, SortMode::Volume);
        assert_eq!(config.max_rows, Some(10));
        assert_eq!(PulseMode::Off.decay(), None);
    }

    #[test]
    fn test_volume_unit() {
        struct TestCase {
            input: VolumeUnit,
            expected: (Option<&'static str>, u32, &'static str),
        }

        let tests = vec![
            TestCase {
                // TC0
                input: VolumeUnit::Usd,
                expected: (Some("USD"), 0, "USD"),
            },
            TestCase {
                // TC1
                input: VolumeUnit::Eth,
                expected: (Some("ETH"), 1, "ETH"),
            },
            TestCase {
                // TC2
                input: VolumeUnit::Btc,
                expected: (Some("BTC"), 2, "BTC"),
            },
            TestCase {
                // TC3: reported volume left as is
                input: VolumeUnit::Quote,
                expected: (None, 0, "quote"),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let unit = test.input;
            let actual = (unit.currency(), unit.scale(), unit.to_string());
            let (currency, scale, display) = test.expected;
            assert_eq!(actual, (currency, scale, display.to_string()), "TC{} failed", index);
        }
    }
}
