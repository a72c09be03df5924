use crate::{
    capability::ColorCapability,
    layout::{
        HEADING_ASK, HEADING_BID, HEADING_CHANGE, HEADING_PAIR, HEADING_PRICE, Layout, LayoutEngine,
        RowText,
    },
    palette::{Palette, Rgb},
    pulse::Direction,
    registry::{InstrumentSnapshot, Snapshot},
};
use crossterm::{
    cursor::MoveTo,
    queue,
    style::{Colors, Print, ResetColor, SetColors},
    terminal::{Clear, ClearType},
};
use std::io::{self, Write};

/// Board rows start below the title & column headings.
const FIRST_ROW: u16 = 2;

/// Draws the full board into any [`Write`]r.
///
/// Output is a pure function of the [`Layout`], [`Snapshot`] and configuration: rendering
/// the same inputs twice produces byte-identical output.
#[derive(Clone, Debug)]
pub struct Renderer {
    capability: ColorCapability,
    direction_indicator: bool,
    palette: Palette,
    title: String,
}

/// Colors of one board line.
#[derive(Copy, Clone, Debug)]
struct LineColors {
    label_fg: Rgb,
    price_fg: Rgb,
    price_bg: Rgb,
    change_fg: Rgb,
    bg: Rgb,
}

impl Renderer {
    pub fn new(capability: ColorCapability, direction_indicator: bool, title: impl Into<String>) -> Self {
        Self {
            capability,
            direction_indicator,
            palette: Palette::default(),
            title: title.into(),
        }
    }

    pub fn render<W: Write>(
        &self,
        out: &mut W,
        engine: &LayoutEngine,
        snapshot: &Snapshot,
    ) -> io::Result<()> {
        let layout = engine.layout();

        queue!(out, MoveTo(0, 0))?;
        self.set_colors(out, self.palette.heading_fg, self.palette.heading_bg)?;
        queue!(
            out,
            Print(format!(" {:<width$} ", self.title, width = line_width(layout, self.direction_indicator))),
        )?;
        self.end_line(out)?;

        queue!(out, MoveTo(0, 1))?;
        self.set_colors(out, self.palette.heading_fg, self.palette.shade)?;
        let headings = RowText {
            pair: HEADING_PAIR.to_string(),
            price: HEADING_PRICE.to_string(),
            volume: engine.volume_heading().to_string(),
            bid: HEADING_BID.to_string(),
            ask: HEADING_ASK.to_string(),
            change: HEADING_CHANGE.to_string(),
        };
        queue!(out, Print(self.line(layout, &headings)))?;
        self.end_line(out)?;

        let mut line = FIRST_ROW;
        for (position, index) in layout.rows.iter().enumerate() {
            let Some(instrument) = snapshot.instruments.get(*index) else {
                continue;
            };
            queue!(out, MoveTo(0, line))?;
            self.render_row(out, layout, engine, position, instrument)?;
            line = line.saturating_add(1);
        }

        queue!(out, MoveTo(0, line), Clear(ClearType::FromCursorDown))
    }

    fn render_row<W: Write>(
        &self,
        out: &mut W,
        layout: &Layout,
        engine: &LayoutEngine,
        position: usize,
        instrument: &InstrumentSnapshot,
    ) -> io::Result<()> {
        let text = engine.row_text(instrument);
        let colors = self.line_colors(position, instrument);
        let widths = layout.widths;

        let indicator = match (self.direction_indicator, instrument.last_move()) {
            (false, _) => None,
            (true, Some(Direction::Up)) => Some('+'),
            (true, Some(Direction::Down)) => Some('-'),
            (true, None) => Some(' '),
        };

        self.set_colors(out, colors.label_fg, colors.bg)?;
        queue!(out, Print(format!(" {:<width$}  ", text.pair, width = widths.pair)))?;

        self.set_colors(out, colors.price_fg, colors.price_bg)?;
        queue!(out, Print(format!("{:>width$}", text.price, width = widths.price)))?;
        if let Some(indicator) = indicator {
            queue!(out, Print(indicator))?;
        }

        self.set_colors(out, colors.label_fg, colors.bg)?;
        queue!(
            out,
            Print(format!(
                "  {:>volume$}  {:>bid$}  {:>ask$}  ",
                text.volume,
                text.bid,
                text.ask,
                volume = widths.volume,
                bid = widths.bid,
                ask = widths.ask,
            ))
        )?;

        self.set_colors(out, colors.change_fg, colors.bg)?;
        queue!(out, Print(format!("{:>width$} ", text.change, width = widths.change)))?;
        self.end_line(out)
    }

    /// Uncolored line of `cells`, aligned like a board row.
    fn line(&self, layout: &Layout, cells: &RowText) -> String {
        let widths = layout.widths;
        let indicator = if self.direction_indicator { " " } else { "" };
        format!(
            " {:<pair$}  {:>price$}{indicator}  {:>volume$}  {:>bid$}  {:>ask$}  {:>change$} ",
            cells.pair,
            cells.price,
            cells.volume,
            cells.bid,
            cells.ask,
            cells.change,
            pair = widths.pair,
            price = widths.price,
            volume = widths.volume,
            bid = widths.bid,
            ask = widths.ask,
            change = widths.change,
        )
    }

    fn line_colors(&self, position: usize, instrument: &InstrumentSnapshot) -> LineColors {
        let palette = &self.palette;
        let bg = if position % 2 == 0 { palette.shade } else { palette.tint };

        if instrument.stale {
            return LineColors {
                label_fg: palette.stale,
                price_fg: palette.stale,
                price_bg: bg,
                change_fg: palette.stale,
                bg,
            };
        }

        let (price_fg, price_bg) = match instrument.pulse.direction() {
            Some(direction) => {
                let (fg, pulse_bg) = match direction {
                    Direction::Up => (palette.up_fg, palette.up_bg),
                    Direction::Down => (palette.down_fg, palette.down_bg),
                };
                let intensity = instrument.pulse.intensity();
                (palette.normal.lerp(fg, intensity), bg.lerp(pulse_bg, intensity))
            }
            None => (palette.normal, bg),
        };

        let change_fg = match instrument
            .open
            .and_then(|open| Direction::of(&open, &instrument.price))
        {
            Some(Direction::Up) => palette.up_fg,
            Some(Direction::Down) => palette.down_fg,
            None => palette.dim,
        };

        LineColors {
            label_fg: palette.dim,
            price_fg,
            price_bg,
            change_fg,
            bg,
        }
    }

    /// Reset colors and blank the rest of the line.
    fn end_line<W: Write>(&self, out: &mut W) -> io::Result<()> {
        if self.capability != ColorCapability::NoColor {
            queue!(out, ResetColor)?;
        }
        queue!(out, Clear(ClearType::UntilNewLine))
    }

    fn set_colors<W: Write>(&self, out: &mut W, fg: Rgb, bg: Rgb) -> io::Result<()> {
        let (Some(fg), Some(bg)) = (fg.to_color(self.capability), bg.to_color(self.capability)) else {
            return Ok(());
        };
        queue!(out, SetColors(Colors::new(fg, bg)))
    }
}

fn line_width(layout: &Layout, direction_indicator: bool) -> usize {
    let widths = layout.widths;
    // " pair  price[indicator]  volume  bid  ask  change"
    widths.pair
        + 2
        + widths.price
        + usize::from(direction_indicator)
        + 2
        + widths.volume
        + 2
        + widths.bid
        + 2
        + widths.ask
        + 2
        + widths.change
}
