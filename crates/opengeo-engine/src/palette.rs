//! Colour palettes for rendered exports.

use std::str::FromStr;

use opengeo_core::error::{OpengeoError, Result};

const VIRIDIS: &[&str] = &[
    "440154", "482878", "3e4989", "31688e", "26828e", "1f9e89", "35b779", "6ece58", "b5de2b", "fde725",
];

const RDYLGN: &[&str] = &[
    "a50026", "d73027", "f46d43", "fdae61", "fee08b", "ffffbf", "d9ef8b", "a6d96a", "66bd63", "1a9850",
    "006837",
];

const NDVI: &[&str] = &[
    "ffffff", "ce7e45", "df923d", "f1b555", "fcd163", "99b718", "74a901", "66a000", "529400", "3e8601",
    "207401", "056201", "004c00", "023b01", "012e01", "011d01", "011301",
];

const TERRAIN: &[&str] = &["333399", "0294fa", "24d36d", "fefe98", "7f6a5a", "ffffff"];

const GRAY: &[&str] = &["000000", "ffffff"];

const CSS_COLORS: &[(&str, &str)] = &[
    ("black", "000000"),
    ("white", "ffffff"),
    ("red", "ff0000"),
    ("green", "008000"),
    ("lime", "00ff00"),
    ("blue", "0000ff"),
    ("yellow", "ffff00"),
    ("orange", "ffa500"),
    ("purple", "800080"),
    ("brown", "a52a2a"),
    ("gray", "808080"),
    ("grey", "808080"),
    ("darkgreen", "006400"),
    ("forestgreen", "228b22"),
    ("navy", "000080"),
    ("cyan", "00ffff"),
    ("magenta", "ff00ff"),
    ("beige", "f5f5dc"),
    ("tan", "d2b48c"),
];

/// Ordered colour stops, linearly interpolated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    stops: Vec<[u8; 3]>,
}

impl Default for Palette {
    fn default() -> Self {
        Self::viridis()
    }
}

impl Palette {
    pub fn viridis() -> Self {
        Self { stops: VIRIDIS.iter().filter_map(|hex| parse_hex(hex)).collect() }
    }

    /// Built-in palette by name: `viridis`, `gray`, `rdylgn`, `ndvi`, `terrain`
    pub fn named(name: &str) -> Result<Self> {
        let stops = match name.trim().to_lowercase().as_str() {
            "viridis" => VIRIDIS,
            "gray" | "grey" | "greys" => GRAY,
            "rdylgn" => RDYLGN,
            "ndvi" => NDVI,
            "terrain" => TERRAIN,
            other => {
                return Err(OpengeoError::invalid_argument(
                    "palette",
                    format!("unknown palette '{}'", other),
                ))
            }
        };
        Ok(Self { stops: stops.iter().filter_map(|hex| parse_hex(hex)).collect() })
    }

    /// Palette from CSS colour names or hex codes (`#rrggbb`, `rrggbb`, `#rgb`)
    pub fn from_colors<S: AsRef<str>>(colors: &[S]) -> Result<Self> {
        let stops = colors
            .iter()
            .map(|c| {
                parse_color(c.as_ref()).ok_or_else(|| {
                    OpengeoError::invalid_argument("palette", format!("unknown colour '{}'", c.as_ref()))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        if stops.is_empty() {
            return Err(OpengeoError::invalid_argument("palette", "palette needs at least one colour"));
        }
        Ok(Self { stops })
    }

    pub fn stops(&self) -> &[[u8; 3]] {
        &self.stops
    }

    /// Colour at `t` in `[0, 1]`; values outside are clamped
    pub fn color_at(&self, t: f64) -> [u8; 3] {
        let [first, ..] = self.stops.as_slice() else {
            return [0, 0, 0];
        };
        if self.stops.len() == 1 {
            return *first;
        }
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        let position = t * (self.stops.len() - 1) as f64;
        let lower = (position.floor() as usize).min(self.stops.len() - 2);
        let frac = position - lower as f64;
        let (a, b) = (self.stops[lower], self.stops[lower + 1]);
        std::array::from_fn(|i| (a[i] as f64 + (b[i] as f64 - a[i] as f64) * frac).round() as u8)
    }
}

impl FromStr for Palette {
    type Err = OpengeoError;

    /// A palette name, or a comma separated colour list
    fn from_str(s: &str) -> Result<Self> {
        if s.contains(',') || s.trim_start().starts_with('#') {
            let colors: Vec<&str> = s.split(',').map(str::trim).filter(|c| !c.is_empty()).collect();
            Self::from_colors(&colors)
        } else {
            Self::named(s).or_else(|_| Self::from_colors(&[s]))
        }
    }
}

fn parse_color(color: &str) -> Option<[u8; 3]> {
    let color = color.trim();
    CSS_COLORS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(color))
        .and_then(|(_, hex)| parse_hex(hex))
        .or_else(|| parse_hex(color))
}

fn parse_hex(hex: &str) -> Option<[u8; 3]> {
    let hex = hex.trim_start_matches('#');
    let expanded: String = match hex.len() {
        3 => hex.chars().flat_map(|c| [c, c]).collect(),
        6 => hex.to_string(),
        _ => return None,
    };
    let channel = |i: usize| u8::from_str_radix(expanded.get(i..i + 2)?, 16).ok();
    Some([channel(0)?, channel(2)?, channel(4)?])
}
