use crate::background::estimate_background_color;
use crate::classify::{is_background, ClassificationParameters};
use crate::color::Color;
use crate::error::{CutoutError, Result};
use image::imageops::{self, FilterType};
use image::{ImageFormat, RgbaImage};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// Longest side of the classification buffer on regular displays
pub const DEFAULT_MAX_PROCESSING_SIZE: u32 = 600;

/// Longest side of the classification buffer on small screens
pub const COMPACT_MAX_PROCESSING_SIZE: u32 = 400;

/// Resampling filter used for the processing downscale and the output resize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResizeFilter {
  Nearest,
  #[default]
  Triangle,
  CatmullRom,
  Lanczos3,
}

impl From<ResizeFilter> for FilterType {
  fn from(filter: ResizeFilter) -> Self {
    match filter {
      ResizeFilter::Nearest => FilterType::Nearest,
      ResizeFilter::Triangle => FilterType::Triangle,
      ResizeFilter::CatmullRom => FilterType::CatmullRom,
      ResizeFilter::Lanczos3 => FilterType::Lanczos3,
    }
  }
}

/// Sizes and filter for one local removal pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessingOptions {
  /// Cap on the longer side of the buffer that gets classified.
  /// `None` classifies at the source resolution.
  pub max_processing_size: Option<u32>,
  /// Exact output dimensions. `None` keeps the source dimensions.
  pub output_size: Option<(u32, u32)>,
  pub filter: ResizeFilter,
}

impl Default for ProcessingOptions {
  fn default() -> Self {
    Self {
      max_processing_size: Some(DEFAULT_MAX_PROCESSING_SIZE),
      output_size: None,
      filter: ResizeFilter::default(),
    }
  }
}

impl ProcessingOptions {
  pub fn validate(&self) -> Result<()> {
    if let Some((width, height)) = self.output_size {
      if width == 0 || height == 0 {
        return Err(CutoutError::Config(format!(
          "output size must be non-zero (got {}x{})",
          width, height
        )));
      }
    }
    if self.max_processing_size == Some(0) {
      return Err(CutoutError::Config(
        "max_processing_size must be non-zero".to_string(),
      ));
    }
    Ok(())
  }
}

/// Result of a local background removal pass
pub struct LocalCutout {
  /// PNG-encoded RGBA output
  pub png: Vec<u8>,
  pub width: u32,
  pub height: u32,
  /// Background color estimated from the processing buffer's corners
  pub background: Color,
}

/// Dimensions of the buffer that gets classified
///
/// The longer side is capped at `max_size` and the other side follows the
/// aspect ratio, rounded. Square images are capped by height. Never returns a
/// zero side for a non-empty image.
pub fn processing_dimensions(width: u32, height: u32, max_size: Option<u32>) -> (u32, u32) {
  let Some(max_size) = max_size else {
    return (width, height);
  };
  if width == 0 || height == 0 {
    return (width, height);
  }

  let aspect = width as f64 / height as f64;
  if width > height {
    let w = max_size.min(width).max(1);
    let h = (w as f64 / aspect).round().max(1.0) as u32;
    (w, h)
  } else {
    let h = max_size.min(height).max(1);
    let w = (h as f64 * aspect).round().max(1.0) as u32;
    (w, h)
  }
}

/// Clear the alpha channel of every background pixel
///
/// The output has the same dimensions as the input. Background pixels keep
/// their color but get alpha 0; all other bytes are copied unchanged. Pixels
/// that are already fully transparent stay that way.
pub fn apply_transparency(
  img: &RgbaImage,
  background: Color,
  params: &ClassificationParameters,
) -> RgbaImage {
  let mut output = img.clone();
  let raw: &mut [u8] = &mut output;

  raw.par_chunks_mut(4).for_each(|pixel| {
    if pixel[3] != 0 && is_background([pixel[0], pixel[1], pixel[2]], background, params) {
      pixel[3] = 0;
    }
  });

  output
}

/// Run estimation, classification and resampling on a decoded image
///
/// The image is first downscaled to the processing size, the background is
/// estimated from that buffer's corners, background pixels are cleared, and
/// the result is resampled to `options.output_size`, or back to the source size.
///
/// # Returns
/// The composited image and the background color that was removed
pub fn composite(
  img: &RgbaImage,
  params: &ClassificationParameters,
  options: &ProcessingOptions,
) -> (RgbaImage, Color) {
  let (width, height) = img.dimensions();
  let (proc_width, proc_height) =
    processing_dimensions(width, height, options.max_processing_size);
  let filter: FilterType = options.filter.into();

  let working = if (proc_width, proc_height) == (width, height) {
    img.clone()
  } else {
    log::debug!(
      "downscaling {}x{} -> {}x{} for classification",
      width,
      height,
      proc_width,
      proc_height
    );
    imageops::resize(img, proc_width, proc_height, filter)
  };

  let background = estimate_background_color(&working);
  let cleared = apply_transparency(&working, background, params);

  let (out_width, out_height) = options.output_size.unwrap_or((width, height));
  let output = if (out_width, out_height) == (proc_width, proc_height) {
    cleared
  } else {
    imageops::resize(&cleared, out_width, out_height, filter)
  };

  (output, background)
}

/// Decode raw image bytes into an RGBA buffer
pub fn decode_image(bytes: &[u8]) -> Result<RgbaImage> {
  image::load_from_memory(bytes)
    .map(|img| img.to_rgba8())
    .map_err(|e| CutoutError::Decode(format!("Failed to load image: {}", e)))
}

/// Encode an RGBA buffer as PNG
pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>> {
  let mut buffer = Cursor::new(Vec::new());
  img
    .write_to(&mut buffer, ImageFormat::Png)
    .map_err(|e| CutoutError::Processing(format!("Failed to write output image: {}", e)))?;
  Ok(buffer.into_inner())
}

/// Remove the background of an encoded image without any remote service
///
/// # Arguments
/// * `bytes` - The encoded source image
/// * `params` - Classification thresholds
/// * `options` - Processing and output sizes
///
/// # Returns
/// The PNG-encoded transparent image with its dimensions
pub fn remove_background_locally(
  bytes: &[u8],
  params: &ClassificationParameters,
  options: &ProcessingOptions,
) -> Result<LocalCutout> {
  params.validate()?;
  options.validate()?;

  let source = decode_image(bytes)?;
  let (output, background) = composite(&source, params, options);
  let (width, height) = output.dimensions();
  let png = encode_png(&output)?;

  Ok(LocalCutout {
    png,
    width,
    height,
    background,
  })
}
