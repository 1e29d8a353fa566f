//! Brush settings shared by outgoing stroke batches.
//!
//! The UI picks a colour (usually from HSV sliders), a size, and a shape;
//! every point of a batch is drawn with the same [`Brush`].

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};

/// 8-bit RGB colour as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rgb {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl Rgb {
    /// Build a colour from its three channels.
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Convert hue/saturation/value (each in `0.0..=1.0`) to RGB.
    ///
    /// Hue wraps: `1.0` is the same red as `0.0`. Out-of-range inputs are
    /// clamped rather than rejected since they come straight from sliders.
    pub fn from_hsv(h: f32, s: f32, v: f32) -> Self {
        let s = s.clamp(0.0, 1.0);
        let v = v.clamp(0.0, 1.0);
        if s == 0.0 {
            let c = channel(v);
            return Self::new(c, c, c);
        }

        let h = h.rem_euclid(1.0) * 6.0;
        let sector = h.floor();
        let f = h - sector;
        let p = v * (1.0 - s);
        let q = v * (1.0 - s * f);
        let t = v * (1.0 - s * (1.0 - f));

        let (r, g, b) = match sector as u32 % 6 {
            0 => (v, t, p),
            1 => (q, v, p),
            2 => (p, v, t),
            3 => (p, q, v),
            4 => (t, p, v),
            _ => (v, p, q),
        };
        Self::new(channel(r), channel(g), channel(b))
    }
}

fn channel(unit: f32) -> u8 {
    (unit * 255.0).round().clamp(0.0, 255.0) as u8
}

impl FromStr for Rgb {
    type Err = anyhow::Error;

    /// Parse `RRGGBB` or `#RRGGBB`.
    fn from_str(s: &str) -> Result<Self> {
        let hex = s.strip_prefix('#').unwrap_or(s);
        if hex.len() != 6 || !hex.is_ascii() {
            bail!("expected a colour like RRGGBB, got {s:?}");
        }
        let byte = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16).map_err(|e| anyhow!("bad colour {s:?}: {e}"))
        };
        Ok(Self::new(byte(0..2)?, byte(2..4)?, byte(4..6)?))
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Brush tip shape. The discriminant is the wire byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrushShape {
    /// Hard-edged round tip.
    #[default]
    Circle = 0,
    /// Hard-edged square tip.
    Square = 1,
    /// Round tip with soft falloff.
    SoftCircle = 2,
}

impl BrushShape {
    /// Wire encoding of this shape.
    pub const fn to_wire(self) -> u8 {
        self as u8
    }

    /// Decode a wire byte; `None` for unknown shapes.
    pub const fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Circle),
            1 => Some(Self::Square),
            2 => Some(Self::SoftCircle),
            _ => None,
        }
    }
}

impl FromStr for BrushShape {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "circle" | "round" => Ok(Self::Circle),
            "square" => Ok(Self::Square),
            "soft" | "soft_circle" | "softcircle" => Ok(Self::SoftCircle),
            other => bail!("unknown brush shape {other:?} (circle, square, soft)"),
        }
    }
}

/// Everything a batch needs besides its points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Brush {
    /// Stroke colour.
    pub color: Rgb,
    /// Tip size in canvas pixels.
    pub size: u8,
    /// Tip shape.
    pub shape: BrushShape,
}

impl Default for Brush {
    fn default() -> Self {
        Self {
            color: Rgb::new(0, 0, 0),
            size: 3,
            shape: BrushShape::Circle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hsv_primaries() {
        assert_eq!(Rgb::from_hsv(0.0, 1.0, 1.0), Rgb::new(255, 0, 0));
        assert_eq!(Rgb::from_hsv(1.0 / 3.0, 1.0, 1.0), Rgb::new(0, 255, 0));
        assert_eq!(Rgb::from_hsv(2.0 / 3.0, 1.0, 1.0), Rgb::new(0, 0, 255));
    }

    #[test]
    fn test_hsv_hue_wraps() {
        assert_eq!(Rgb::from_hsv(1.0, 1.0, 1.0), Rgb::from_hsv(0.0, 1.0, 1.0));
    }

    #[test]
    fn test_hsv_zero_saturation_is_grey() {
        assert_eq!(Rgb::from_hsv(0.7, 0.0, 0.5), Rgb::new(128, 128, 128));
        assert_eq!(Rgb::from_hsv(0.2, 0.0, 0.0), Rgb::new(0, 0, 0));
    }

    #[test]
    fn test_parse_hex_colour() {
        assert_eq!("ff8000".parse::<Rgb>().unwrap(), Rgb::new(255, 128, 0));
        assert_eq!("#0a0B0c".parse::<Rgb>().unwrap(), Rgb::new(10, 11, 12));
        assert!("fff".parse::<Rgb>().is_err());
        assert!("gg0000".parse::<Rgb>().is_err());
    }

    #[test]
    fn test_display_hex_colour() {
        assert_eq!(Rgb::new(255, 128, 0).to_string(), "#ff8000");
    }

    #[test]
    fn test_shape_wire_bytes() {
        for shape in [BrushShape::Circle, BrushShape::Square, BrushShape::SoftCircle] {
            assert_eq!(BrushShape::from_wire(shape.to_wire()), Some(shape));
        }
        assert_eq!(BrushShape::from_wire(3), None);
    }

    #[test]
    fn test_parse_shape_names() {
        assert_eq!("soft".parse::<BrushShape>().unwrap(), BrushShape::SoftCircle);
        assert_eq!("Square".parse::<BrushShape>().unwrap(), BrushShape::Square);
        assert!("star".parse::<BrushShape>().is_err());
    }
}
