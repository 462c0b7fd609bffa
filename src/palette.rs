//! Colors assigned to label types by position.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An sRGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color(pub [u8; 3]);

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b])
    }

    /// Parse `#rrggbb` (the leading `#` is optional).
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim().trim_start_matches('#');
        if hex.len() != 6 {
            return None;
        }
        let channel = |range: std::ops::Range<usize>| {
            hex.get(range).and_then(|s| u8::from_str_radix(s, 16).ok())
        };
        Some(Self([channel(0..2)?, channel(2..4)?, channel(4..6)?]))
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.0[0], self.0[1], self.0[2])
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Fallback for shapes whose type is not in the registered table.
pub const UNKNOWN_TYPE_COLOR: Color = Color::rgb(0x9e, 0x9e, 0x9e);

/// Default palette, cycled by type index.
pub const DEFAULT_PALETTE: [Color; 20] = [
    Color::rgb(0xff, 0x00, 0x00),
    Color::rgb(0x00, 0xff, 0x00),
    Color::rgb(0x00, 0x00, 0xff),
    Color::rgb(0xff, 0xff, 0x00),
    Color::rgb(0xff, 0x00, 0xff),
    Color::rgb(0x00, 0xff, 0xff),
    Color::rgb(0xff, 0x80, 0x00),
    Color::rgb(0x80, 0x00, 0xff),
    Color::rgb(0x00, 0x80, 0x40),
    Color::rgb(0xff, 0x66, 0x99),
    Color::rgb(0x66, 0x33, 0x00),
    Color::rgb(0x00, 0x66, 0xcc),
    Color::rgb(0x99, 0xcc, 0x00),
    Color::rgb(0xcc, 0x33, 0x33),
    Color::rgb(0x33, 0x99, 0x99),
    Color::rgb(0xff, 0xcc, 0x99),
    Color::rgb(0x66, 0x66, 0xff),
    Color::rgb(0x99, 0x00, 0x33),
    Color::rgb(0x00, 0xcc, 0x99),
    Color::rgb(0xcc, 0x99, 0xff),
];

/// An ordered list of colors handed out by index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    colors: Vec<Color>,
}

impl Palette {
    /// Build a palette; an empty list falls back to the default colors.
    pub fn new(colors: Vec<Color>) -> Self {
        if colors.is_empty() {
            log::warn!("Empty palette supplied, using the default palette");
            return Self::default();
        }
        Self { colors }
    }

    /// Color for a type index. Negative indices map to the first color and
    /// indices past the end wrap around.
    pub fn color_by_index(&self, index: isize) -> Color {
        let index = if index < 0 { 0 } else { index as usize };
        self.colors[index % self.colors.len()]
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            colors: DEFAULT_PALETTE.to_vec(),
        }
    }
}
