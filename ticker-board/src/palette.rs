//! Board colors and their reduction to what the terminal can display.

use crate::capability::ColorCapability;
use crossterm::style::Color;

/// 24-bit color.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn from_hex(hex: u32) -> Self {
        Self {
            r: ((hex >> 16) & 0xff) as u8,
            g: ((hex >> 8) & 0xff) as u8,
            b: (hex & 0xff) as u8,
        }
    }

    /// Linear blend towards `other`, `t` clamped to `[0, 1]`.
    pub fn lerp(self, other: Rgb, t: f32) -> Rgb {
        let t = t.clamp(0.0, 1.0);
        let mix = |from: u8, to: u8| -> u8 {
            (f32::from(from) + (f32::from(to) - f32::from(from)) * t).round() as u8
        };
        Rgb {
            r: mix(self.r, other.r),
            g: mix(self.g, other.g),
            b: mix(self.b, other.b),
        }
    }

    /// Terminal color for `capability`, `None` when color is disabled.
    pub fn to_color(self, capability: ColorCapability) -> Option<Color> {
        match capability {
            ColorCapability::TrueColor => Some(Color::Rgb {
                r: self.r,
                g: self.g,
                b: self.b,
            }),
            ColorCapability::Ansi256 => Some(Color::AnsiValue(ansi256(self))),
            ColorCapability::NoColor => None,
        }
    }
}

/// Channel levels of the xterm 6x6x6 color cube.
const CUBE_LEVELS: [u8; 6] = [0, 95, 135, 175, 215, 255];

/// Nearest xterm-256 palette index, choosing between the color cube (16-231) and the
/// grey ramp (232-255).
pub fn ansi256(rgb: Rgb) -> u8 {
    let cube_index = |value: u8| -> u8 {
        match value {
            0..48 => 0,
            48..115 => 1,
            _ => (value - 35) / 40,
        }
    };

    let (r, g, b) = (cube_index(rgb.r), cube_index(rgb.g), cube_index(rgb.b));
    let cube = Rgb {
        r: CUBE_LEVELS[usize::from(r)],
        g: CUBE_LEVELS[usize::from(g)],
        b: CUBE_LEVELS[usize::from(b)],
    };

    let average = (u32::from(rgb.r) + u32::from(rgb.g) + u32::from(rgb.b)) / 3;
    let grey_index = (average.saturating_sub(3) / 10).min(23) as u8;
    let grey_level = 8 + 10 * grey_index;
    let grey = Rgb {
        r: grey_level,
        g: grey_level,
        b: grey_level,
    };

    if distance(rgb, grey) < distance(rgb, cube) {
        232 + grey_index
    } else {
        16 + 36 * r + 6 * g + b
    }
}

fn distance(a: Rgb, b: Rgb) -> u32 {
    let channel = |x: u8, y: u8| u32::from(x.abs_diff(y)).pow(2);
    channel(a.r, b.r) + channel(a.g, b.g) + channel(a.b, b.b)
}

/// Board colors.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Palette {
    /// Even row background.
    pub shade: Rgb,
    /// Odd row background.
    pub tint: Rgb,
    pub heading_bg: Rgb,
    pub heading_fg: Rgb,
    pub normal: Rgb,
    pub dim: Rgb,
    pub stale: Rgb,
    /// Peak background & price color of a rising price.
    pub up_bg: Rgb,
    pub up_fg: Rgb,
    /// Peak background & price color of a falling price.
    pub down_bg: Rgb,
    pub down_fg: Rgb,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            shade: Rgb::from_hex(0x14374A),
            tint: Rgb::from_hex(0x163E53),
            heading_bg: Rgb::from_hex(0x153043),
            heading_fg: Rgb::from_hex(0x507691),
            normal: Rgb::from_hex(0xD3D7CF),
            dim: Rgb::from_hex(0xA1B5C1),
            stale: Rgb::from_hex(0x325A6A),
            up_bg: Rgb::from_hex(0x105554),
            up_fg: Rgb::from_hex(0x0ACD8A),
            down_bg: Rgb::from_hex(0x3E3D48),
            down_fg: Rgb::from_hex(0xE55541),
        }
    }
}
