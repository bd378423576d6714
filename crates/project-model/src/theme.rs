//! Theme tokens and transition context.
//!
//! Themes are resolved by id outside this crate; the timeline only carries
//! the resolved color tokens used to paint generated title and logo cards.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// An sRGB color with straight (non-premultiplied) alpha.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Same color with alpha multiplied by `opacity` in `[0, 1]`.
    pub fn with_opacity(self, opacity: f64) -> Self {
        let opacity = if opacity.is_finite() {
            opacity.clamp(0.0, 1.0)
        } else {
            1.0
        };
        Self {
            a: (self.a as f64 * opacity).round() as u8,
            ..self
        }
    }

    pub fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

/// Error returned for malformed hex colors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid color {0:?}: expected #rrggbb or #rrggbbaa")]
pub struct ParseColorError(pub String);

impl FromStr for Color {
    type Err = ParseColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim().trim_start_matches('#');
        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| ParseColorError(s.to_string()))
        };
        if !hex.is_ascii() {
            return Err(ParseColorError(s.to_string()));
        }
        match hex.len() {
            6 => Ok(Color::rgb(channel(0)?, channel(2)?, channel(4)?)),
            8 => Ok(Color::rgba(channel(0)?, channel(2)?, channel(4)?, channel(6)?)),
            _ => Err(ParseColorError(s.to_string())),
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.a == 255 {
            write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            write!(
                f,
                "#{:02x}{:02x}{:02x}{:02x}",
                self.r, self.g, self.b, self.a
            )
        }
    }
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Resolved color tokens of a theme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThemeTokens {
    /// Theme identifier (informational).
    pub id: String,
    /// Card background.
    pub background: Color,
    /// Primary brand color.
    pub primary: Color,
    /// Accent used for card decorations.
    pub accent: Color,
    /// Card text color.
    pub text: Color,
}

impl Default for ThemeTokens {
    fn default() -> Self {
        Self {
            id: "classic".to_string(),
            background: Color::rgb(0x1a, 0x1a, 0x1a),
            primary: Color::rgb(0xf5, 0xf5, 0xf5),
            accent: Color::rgb(0xe0, 0xa1, 0x3a),
            text: Color::WHITE,
        }
    }
}

/// Context that requires an animated transition segment (e.g. a flight to
/// a location on a themed globe).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionContext {
    /// Human-readable location the transition flies to.
    pub location: Option<String>,
    /// Theme the transition is styled for.
    pub theme_id: Option<String>,
}

impl TransitionContext {
    /// A context only requires a transition when it names something.
    pub fn requires_transition(&self) -> bool {
        self.location.as_deref().is_some_and(|s| !s.trim().is_empty())
            || self.theme_id.as_deref().is_some_and(|s| !s.trim().is_empty())
    }
}
