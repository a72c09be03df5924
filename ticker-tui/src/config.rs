use crate::error::ConfigError;
use clap::{ArgAction, Parser, ValueEnum, builder::BoolishValueParser};
use std::path::PathBuf;
use ticker_board::{
    BoardConfig, ColorCapability,
    capability::ColorSignals,
    config::{PulseMode, SortMode, VolumeUnit},
};
use ticker_data::{instrument::ExchangeId, supervisor::SupervisorConfig};

/// Number of leading pairs shown when no arguments are given.
pub const SHOW_FIRST: usize = 24;

/// Terminal rows taken by the title & column headings.
const HEADING_ROWS: u16 = 2;

const PAIR_FORMS: &str = "\
PAIRs take one of the following (case-insensitive) forms:

    basequote base_quote base/quote base-quote \"base quote\"

Color is detected from NO_COLOR, HAS_24, COLORTERM & TERM unless --color is given.
With --logfile, RUST_LOG filters what is written (default: info).";

/// Show NUM leading pairs, by 24h volume, and/or PAIRs as a live price board.
#[derive(Debug, Parser)]
#[command(name = "coin-ticker", version, after_help = PAIR_FORMS)]
pub struct Cli {
    /// Optional leading count of pairs ranked by 24h volume, followed by PAIRs
    #[arg(value_name = "NUM|PAIR")]
    pub args: Vec<String>,

    /// Exchange to stream from: binance or hitbtc
    #[arg(long, env = "TICKER_EXCHANGE", default_value = "binance")]
    pub exchange: ExchangeId,

    /// Price change highlight speed
    #[arg(long, env = "PULSE", value_enum, ignore_case = true, default_value_t = PulseArg::Normal)]
    pub pulse: PulseArg,

    /// Order rows by 24h volume
    #[arg(long, env = "VOL_SORTED", action = ArgAction::SetTrue, value_parser = BoolishValueParser::new())]
    pub vol_sorted: bool,

    /// Currency the 24h volume column is shown in
    #[arg(long, env = "VOL_UNIT", value_enum, ignore_case = true, default_value_t = VolumeArg::Usd)]
    pub vol_unit: VolumeArg,

    /// Mark price moves with +/-
    #[arg(long, env = "INDICATOR", action = ArgAction::SetTrue, value_parser = BoolishValueParser::new())]
    pub indicator: bool,

    /// Force the color depth: truecolor, 256 or none
    #[arg(long, env = "TICKER_COLOR", value_parser = parse_color)]
    pub color: Option<ColorCapability>,

    /// Write logs to this file
    #[arg(long, env = "LOGFILE")]
    pub logfile: Option<PathBuf>,
}

/// `--pulse` choices.
#[derive(Copy, Clone, Eq, PartialEq, Debug, ValueEnum)]
pub enum PulseArg {
    #[value(alias = "on")]
    Normal,
    Fast,
    #[value(aliases = ["0", "false", "no", "null", "none"])]
    Off,
}

impl From<PulseArg> for PulseMode {
    fn from(pulse: PulseArg) -> Self {
        match pulse {
            PulseArg::Normal => PulseMode::Normal,
            PulseArg::Fast => PulseMode::Fast,
            PulseArg::Off => PulseMode::Off,
        }
    }
}

/// `--vol-unit` choices.
#[derive(Copy, Clone, Eq, PartialEq, Debug, ValueEnum)]
pub enum VolumeArg {
    Usd,
    Btc,
    Eth,
    /// Each pair's own quote currency
    #[value(aliases = ["none", "null"])]
    Quote,
}

impl From<VolumeArg> for VolumeUnit {
    fn from(unit: VolumeArg) -> Self {
        match unit {
            VolumeArg::Usd => VolumeUnit::Usd,
            VolumeArg::Btc => VolumeUnit::Btc,
            VolumeArg::Eth => VolumeUnit::Eth,
            VolumeArg::Quote => VolumeUnit::Quote,
        }
    }
}

/// Fully resolved startup configuration.
#[derive(Clone, PartialEq, Debug)]
pub struct TickerConfig {
    pub exchange: ExchangeId,
    /// Also show this many pairs, ranked by 24h volume, after the explicit ones.
    pub leaders: Option<usize>,
    /// Pairs as typed by the user, not yet checked against the exchange.
    pub pairs: Vec<String>,
    pub board: BoardConfig,
    pub supervisor: SupervisorConfig,
    pub logfile: Option<PathBuf>,
}

impl Cli {
    /// Resolve against the process environment & terminal size.
    pub fn into_config_from_env(self) -> Result<TickerConfig, ConfigError> {
        let rows = crossterm::terminal::size().ok().map(|(_, rows)| rows);
        self.into_config(|key| std::env::var(key).ok(), rows)
    }

    /// Split the positional arguments & detect color, with color signal lookups done via
    /// `var`.
    ///
    /// `rows` is the terminal height, when known, and caps the number of board rows.
    pub fn into_config<F>(self, var: F, rows: Option<u16>) -> Result<TickerConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let body_rows = rows.map(|rows| usize::from(rows.saturating_sub(HEADING_ROWS)));

        let (leaders, pairs) = match self.args.split_first() {
            None => {
                let num = body_rows.map_or(SHOW_FIRST, |rows| rows.clamp(1, SHOW_FIRST));
                (Some(num), Vec::new())
            }
            Some((first, rest)) if !first.is_empty() && first.bytes().all(|b| b.is_ascii_digit()) => {
                let num = first.parse::<usize>().map_err(|_| ConfigError::InvalidValue {
                    var: "NUM",
                    value: first.clone(),
                    expected: "a count of pairs",
                })?;
                if num == 0 {
                    return Err(ConfigError::ZeroLeaders);
                }
                (Some(num), rest.to_vec())
            }
            Some(_) => (None, self.args.clone()),
        };

        let color = self.color.unwrap_or_else(|| {
            ColorCapability::from_signals(&ColorSignals {
                ticker_color: None,
                no_color: var("NO_COLOR"),
                has_24: var("HAS_24"),
                colorterm: var("COLORTERM"),
                term: var("TERM"),
            })
        });

        let sort = if self.vol_sorted {
            SortMode::Volume
        } else {
            SortMode::Insertion
        };

        let board = BoardConfig::default()
            .with_pulse(self.pulse.into())
            .with_sort(sort)
            .with_volume_unit(self.vol_unit.into())
            .with_color(color)
            .with_direction_indicator(self.indicator)
            .with_max_rows(body_rows.map(|rows| rows.max(1)));

        Ok(TickerConfig {
            exchange: self.exchange,
            leaders,
            pairs,
            board,
            supervisor: SupervisorConfig::default(),
            logfile: self.logfile.filter(|path| !path.as_os_str().is_empty()),
        })
    }
}

fn parse_color(name: &str) -> Result<ColorCapability, String> {
    ColorCapability::parse(name).ok_or_else(|| "expected truecolor, 256 or none".to_string())
}
