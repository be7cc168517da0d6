use crate::color::Color;
use image::RgbaImage;

/// Upper bound on the side of a corner sample, in pixels
pub const MAX_CORNER_SIZE: u32 = 8;

/// Corner samples are at most 1/20th of the shorter image side
const CORNER_SIZE_DIVISOR: u32 = 20;

/// A rectangular area of an image. The origin may be negative and the extent
/// may run past the image edges; sampling clamps it to the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
  pub x: i64,
  pub y: i64,
  pub width: u32,
  pub height: u32,
}

impl Region {
  pub fn new(x: i64, y: i64, width: u32, height: u32) -> Self {
    Self {
      x,
      y,
      width,
      height,
    }
  }

  /// Intersect the region with a `width` x `height` buffer.
  ///
  /// Returns half-open pixel ranges `(x0..x1, y0..y1)`, or `None` when the
  /// intersection is empty.
  fn clamp_to(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    let x0 = self.x.max(0);
    let y0 = self.y.max(0);
    let x1 = (self.x + self.width as i64).min(width as i64);
    let y1 = (self.y + self.height as i64).min(height as i64);

    if x0 >= x1 || y0 >= y1 {
      return None;
    }

    Some((x0 as u32, x1 as u32, y0 as u32, y1 as u32))
  }
}

/// Side length of the square sampled at each image corner
///
/// `min(8, floor(min(width, height) / 20))`, so a corner sample never exceeds
/// the image. Images shorter than 20px on one side get a size of 0.
pub fn corner_size(width: u32, height: u32) -> u32 {
  MAX_CORNER_SIZE.min(width.min(height) / CORNER_SIZE_DIVISOR)
}

/// Compute the average color of a region of an image
///
/// Only pixels inside both the region and the image contribute. Alpha is
/// ignored. Each channel mean is rounded to the nearest integer.
///
/// # Arguments
/// * `img` - The image to sample
/// * `region` - The requested region, clamped to the image bounds
///
/// # Returns
/// The mean RGB color, or black when the clamped region is empty
pub fn average_color(img: &RgbaImage, region: Region) -> Color {
  let (width, height) = img.dimensions();
  let Some((x0, x1, y0, y1)) = region.clamp_to(width, height) else {
    return [0, 0, 0];
  };

  let mut sums = [0u64; 3];
  let mut count = 0u64;

  for y in y0..y1 {
    for x in x0..x1 {
      let pixel = img.get_pixel(x, y);
      sums[0] += pixel[0] as u64;
      sums[1] += pixel[1] as u64;
      sums[2] += pixel[2] as u64;
      count += 1;
    }
  }

  let mean = |sum: u64| (sum as f64 / count as f64).round() as u8;
  [mean(sums[0]), mean(sums[1]), mean(sums[2])]
}
