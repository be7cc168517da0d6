use anyhow::{Context, Result};
use nalgebra::Vector3;

/// Multiplier to expand hex color shorthand (e.g., F -> FF)
const HEX_SHORTHAND_MULTIPLIER: u8 = 17;

/// RGB color represented as [R, G, B] with values 0-255
pub type Color = [u8; 3];

/// Parse a hex color string into RGB
/// Supports: "#ff0000", "ff0000", "#f00", "f00"
pub fn parse_hex_color(hex: &str) -> Result<Color> {
  let hex = hex.trim().trim_start_matches('#');

  let (r, g, b) = match hex.len() {
    3 => {
      // Expand shorthand: "f00" -> "ff0000"
      let r = u8::from_str_radix(&hex[0..1], 16).context("Invalid red component")?;
      let g = u8::from_str_radix(&hex[1..2], 16).context("Invalid green component")?;
      let b = u8::from_str_radix(&hex[2..3], 16).context("Invalid blue component")?;
      (
        r * HEX_SHORTHAND_MULTIPLIER,
        g * HEX_SHORTHAND_MULTIPLIER,
        b * HEX_SHORTHAND_MULTIPLIER,
      )
    }
    6 => {
      let r = u8::from_str_radix(&hex[0..2], 16).context("Invalid red component")?;
      let g = u8::from_str_radix(&hex[2..4], 16).context("Invalid green component")?;
      let b = u8::from_str_radix(&hex[4..6], 16).context("Invalid blue component")?;
      (r, g, b)
    }
    _ => anyhow::bail!("Hex color must be 3 or 6 characters long (got: {})", hex),
  };

  Ok([r, g, b])
}

/// Format a color as a lowercase "#rrggbb" string
pub fn format_hex_color(color: Color) -> String {
  format!("#{:02x}{:02x}{:02x}", color[0], color[1], color[2])
}

/// Lift a color into RGB space as a vector of 0-255 components
pub fn to_vector(color: Color) -> Vector3<f64> {
  Vector3::new(color[0] as f64, color[1] as f64, color[2] as f64)
}

/// Calculate the Euclidean distance between two colors in 0-255 RGB space
pub fn color_distance(a: Color, b: Color) -> f64 {
  (to_vector(a) - to_vector(b)).norm()
}
