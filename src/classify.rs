use crate::color::{color_distance, Color};
use crate::error::{CutoutError, Result};
use serde::{Deserialize, Serialize};

/// Default Euclidean RGB tolerance for the distance test
pub const DEFAULT_TOLERANCE_DISTANCE: f64 = 60.0;

/// Default per-channel threshold above which a pixel counts as near-white
pub const DEFAULT_WHITE_THRESHOLD: u8 = 240;

/// Default factor by which green must exceed red and blue
pub const DEFAULT_GREEN_DOMINANCE_FACTOR: f64 = 1.2;

/// Tolerance used by the chroma-green preset
pub const CHROMA_GREEN_TOLERANCE_DISTANCE: f64 = 35.0;

/// Bounds used by the chroma-green test once green dominance is established.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GreenKeyThresholds {
  /// Red must stay below this for the refinement test
  pub max_red: u8,
  /// Green must exceed this for the refinement test
  pub min_green: u8,
  /// Blue must stay below this for the refinement test
  pub max_blue: u8,
  /// Alternate test: green must exceed `max(r, b)` times this factor...
  pub greenish_factor: f64,
  /// ...and this absolute floor
  pub greenish_min_green: u8,
}

impl Default for GreenKeyThresholds {
  fn default() -> Self {
    Self {
      max_red: 120,
      min_green: 100,
      max_blue: 120,
      greenish_factor: 1.4,
      greenish_min_green: 80,
    }
  }
}

/// Tunables for the per-pixel background decision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationParameters {
  /// Pixels closer than this to the background estimate are background
  pub tolerance_distance: f64,
  /// Pixels brighter than this on every channel are background
  pub white_threshold: u8,
  /// Enable the chroma-key green test
  pub chroma_green_enabled: bool,
  /// Factor by which green must exceed both red and blue
  pub green_dominance_factor: f64,
  pub green_key: GreenKeyThresholds,
}

impl Default for ClassificationParameters {
  fn default() -> Self {
    Self {
      tolerance_distance: DEFAULT_TOLERANCE_DISTANCE,
      white_threshold: DEFAULT_WHITE_THRESHOLD,
      chroma_green_enabled: false,
      green_dominance_factor: DEFAULT_GREEN_DOMINANCE_FACTOR,
      green_key: GreenKeyThresholds::default(),
    }
  }
}

impl ClassificationParameters {
  /// Preset for images generated on a chroma-key green background
  pub fn chroma_green() -> Self {
    Self {
      tolerance_distance: CHROMA_GREEN_TOLERANCE_DISTANCE,
      chroma_green_enabled: true,
      ..Self::default()
    }
  }

  pub fn validate(&self) -> Result<()> {
    if !self.tolerance_distance.is_finite() || self.tolerance_distance < 0.0 {
      return Err(CutoutError::Config(format!(
        "tolerance_distance must be a finite number >= 0 (got {})",
        self.tolerance_distance
      )));
    }
    if !self.green_dominance_factor.is_finite() || self.green_dominance_factor < 0.0 {
      return Err(CutoutError::Config(format!(
        "green_dominance_factor must be a finite number >= 0 (got {})",
        self.green_dominance_factor
      )));
    }
    if !self.green_key.greenish_factor.is_finite() || self.green_key.greenish_factor < 0.0 {
      return Err(CutoutError::Config(format!(
        "greenish_factor must be a finite number >= 0 (got {})",
        self.green_key.greenish_factor
      )));
    }
    Ok(())
  }
}

/// Near-white test: every channel strictly above the threshold
pub fn is_near_white(pixel: Color, threshold: u8) -> bool {
  pixel.iter().all(|&channel| channel > threshold)
}

/// Chroma-key green test
///
/// Green must dominate red and blue by `dominance_factor`, and then either fit
/// the refinement bounds or pass the alternate "greenish" test.
pub fn is_chroma_green(pixel: Color, dominance_factor: f64, key: &GreenKeyThresholds) -> bool {
  let [r, g, b] = pixel.map(f64::from);

  let dominant = g > r * dominance_factor && g > b * dominance_factor;
  if !dominant {
    return false;
  }

  let refined = pixel[0] < key.max_red && pixel[1] > key.min_green && pixel[2] < key.max_blue;
  let greenish = g > r.max(b) * key.greenish_factor && pixel[1] > key.greenish_min_green;

  refined || greenish
}

/// Decide whether a pixel belongs to the background
///
/// Tests run in order and stop at the first match:
/// 1. near-white
/// 2. chroma-key green (only when enabled)
/// 3. Euclidean distance to the background estimate below the tolerance
///
/// # Arguments
/// * `pixel` - The pixel's RGB color
/// * `background` - The estimated background color
/// * `params` - Thresholds for the three tests
pub fn is_background(pixel: Color, background: Color, params: &ClassificationParameters) -> bool {
  if is_near_white(pixel, params.white_threshold) {
    return true;
  }

  if params.chroma_green_enabled
    && is_chroma_green(pixel, params.green_dominance_factor, &params.green_key)
  {
    return true;
  }

  color_distance(pixel, background) < params.tolerance_distance
}
