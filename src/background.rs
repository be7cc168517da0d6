use crate::color::{color_distance, format_hex_color, Color};
use crate::sample::{average_color, corner_size, Region};
use image::RgbaImage;

/// Regions sampled for background estimation
///
/// Order: top-left, top-right, bottom-left, bottom-right.
pub fn corner_regions(width: u32, height: u32) -> [Region; 4] {
  let size = corner_size(width, height);
  let right = width as i64 - size as i64;
  let bottom = height as i64 - size as i64;

  [
    Region::new(0, 0, size, size),
    Region::new(right, 0, size, size),
    Region::new(0, bottom, size, size),
    Region::new(right, bottom, size, size),
  ]
}

/// Average color of each corner, in `corner_regions` order
pub fn corner_colors(img: &RgbaImage) -> [Color; 4] {
  let (width, height) = img.dimensions();
  corner_regions(width, height).map(|region| average_color(img, region))
}

/// Pick the candidate that agrees most with the rest
///
/// Each candidate is scored by the sum of its Euclidean distances to every
/// candidate; the lowest score wins and ties go to the earliest candidate.
/// A single outlier therefore never beats a majority.
///
/// # Returns
/// The winning color, or black for an empty slice
pub fn most_representative(candidates: &[Color]) -> Color {
  let mut best = [0, 0, 0];
  let mut lowest = f64::MAX;

  for &candidate in candidates {
    let total: f64 = candidates
      .iter()
      .map(|&other| color_distance(candidate, other))
      .sum();

    if total < lowest {
      lowest = total;
      best = candidate;
    }
  }

  best
}

/// Estimate the background color from the four image corners
///
/// # Arguments
/// * `img` - The image to analyze
///
/// # Returns
/// The corner color closest to the consensus of all four corners. Images too
/// small to have a corner sample yield black.
pub fn estimate_background_color(img: &RgbaImage) -> Color {
  let corners = corner_colors(img);
  let estimate = most_representative(&corners);
  log::debug!("corner samples {:?} -> background {}", corners, format_hex_color(estimate));
  estimate
}
