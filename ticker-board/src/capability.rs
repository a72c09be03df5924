use derive_more::Display;

/// Color depth the terminal can display.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default, Display)]
pub enum ColorCapability {
    /// 24-bit color: continuous pulse gradient.
    #[display("truecolor")]
    TrueColor,
    /// xterm 256 color palette: gradient quantised to the nearest entry.
    #[default]
    #[display("256")]
    Ansi256,
    /// Plain text.
    #[display("none")]
    NoColor,
}

/// Raw environment signals used to detect [`ColorCapability`].
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct ColorSignals {
    /// Explicit override: `truecolor`, `256` or `none`.
    pub ticker_color: Option<String>,
    /// Any value disables color (<https://no-color.org>).
    pub no_color: Option<String>,
    /// Legacy truecolor override.
    pub has_24: Option<String>,
    pub colorterm: Option<String>,
    pub term: Option<String>,
}

impl ColorCapability {
    /// Parse an explicit capability name.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "truecolor" | "24bit" | "24" => Some(Self::TrueColor),
            "256" | "256color" | "ansi256" => Some(Self::Ansi256),
            "none" | "off" | "0" | "no" => Some(Self::NoColor),
            _ => None,
        }
    }

    /// Detect the capability, most explicit signal first.
    pub fn from_signals(signals: &ColorSignals) -> Self {
        if let Some(capability) = signals.ticker_color.as_deref().and_then(Self::parse) {
            return capability;
        }

        if signals.no_color.as_deref().is_some_and(|value| !value.is_empty()) {
            return Self::NoColor;
        }

        if signals.has_24.as_deref().is_some_and(is_truthy) {
            return Self::TrueColor;
        }

        if signals
            .colorterm
            .as_deref()
            .is_some_and(|value| matches!(value, "truecolor" | "24bit"))
        {
            return Self::TrueColor;
        }

        match signals.term.as_deref() {
            None | Some("") | Some("dumb") => Self::NoColor,
            Some(_) => Self::Ansi256,
        }
    }
}

/// Interpret an environment flag: anything but empty, `0`, `false`, `no` or `off`.
pub fn is_truthy(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "" | "0" | "false" | "no" | "off"
    )
}
