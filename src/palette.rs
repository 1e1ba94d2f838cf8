//! Label to color lookup for overlay boxes.

use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Key of the global fallback entry in the color map.
pub const DEFAULT_COLOR_KEY: &str = "default";

/// Fallback for unmapped labels reported by the custom-trained model.
pub const CUSTOM_MODEL_FALLBACK: Color = Color([0xFF, 0x99, 0x00]);
/// Fallback for unmapped labels reported by the COCO model.
pub const COCO_MODEL_FALLBACK: Color = Color([0x33, 0x66, 0xFF]);

const BUILTIN_DEFAULT: Color = Color([0x00, 0xFF, 0xFF]);

/// 24-bit RGB color, written as `#RRGGBB`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Color(pub [u8; 3]);

impl Color {
    pub fn rgb(self) -> [u8; 3] {
        self.0
    }
}

impl FromStr for Color {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let hex = s
            .trim()
            .strip_prefix('#')
            .ok_or_else(|| anyhow!("color '{}' must start with '#'", s))?;
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(anyhow!("color '{}' must be #RRGGBB", s));
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16);
        Ok(Self([channel(0)?, channel(2)?, channel(4)?]))
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b] = self.0;
        write!(f, "#{:02X}{:02X}{:02X}", r, g, b)
    }
}

/// Deterministic color selection over a configured label map.
#[derive(Clone, Debug)]
pub struct Palette {
    colors: BTreeMap<String, Color>,
    default: Color,
}

impl Palette {
    /// Build from a `label -> #RRGGBB` map. The `default` entry, when
    /// present, is also the global fallback.
    pub fn from_hex_map(map: &BTreeMap<String, String>) -> Result<Self> {
        let mut colors = BTreeMap::new();
        for (label, hex) in map {
            let color: Color = hex.parse()?;
            colors.insert(label.clone(), color);
        }
        let default = colors
            .get(DEFAULT_COLOR_KEY)
            .copied()
            .unwrap_or(BUILTIN_DEFAULT);
        Ok(Self { colors, default })
    }

    /// Mapped color for `label`, else the per-model fallback, else the
    /// global default.
    pub fn color_for(&self, label: &str, model: Option<&str>) -> Color {
        if let Some(color) = self.colors.get(label) {
            return *color;
        }
        match model {
            Some("custom") => CUSTOM_MODEL_FALLBACK,
            Some("coco") => COCO_MODEL_FALLBACK,
            _ => self.default,
        }
    }

    pub fn default_color(&self) -> Color {
        self.default
    }
}
