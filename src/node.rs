use crate::background::estimate_background_color as estimate_bg;
use crate::classify::{is_background, ClassificationParameters};
use crate::color::parse_hex_color;
use crate::config::CutoutConfig;
use crate::error::CutoutError;
use crate::orchestrator::{Cutout, Failure, Orchestrator, ResultOrigin};
use crate::process::{decode_image, remove_background_locally, ProcessingOptions};
use crate::remote::RemoteService;
use crate::source::{GenerationRequest, HttpFetcher};
use napi::bindgen_prelude::*;
use napi_derive::napi;
use std::sync::Arc;
use url::Url;

#[napi(object)]
pub struct RgbColor {
  pub r: u8,
  pub g: u8,
  pub b: u8,
}

#[napi(object)]
pub struct ClassificationOptions {
  /// Euclidean RGB distance to the background estimate (default: 60)
  pub tolerance_distance: Option<f64>,
  /// Per-channel near-white threshold (default: 240)
  pub white_threshold: Option<u8>,
  /// Also key out dominant green (default: false)
  pub chroma_green: Option<bool>,
  /// Factor by which green must exceed red and blue (default: 1.2)
  pub green_dominance_factor: Option<f64>,
}

#[napi(object)]
pub struct RemoveBackgroundOptions {
  /// The input image buffer
  pub input: Buffer,
  pub classification: Option<ClassificationOptions>,
  /// Output width; must be given together with `height`
  pub width: Option<u32>,
  /// Output height; must be given together with `width`
  pub height: Option<u32>,
  /// Longer side of the classified buffer (default: 600, 0 = full resolution)
  pub max_processing_size: Option<u32>,
}

#[napi(object)]
pub struct CutoutResult {
  /// The unprocessed image as fetched
  pub original: Buffer,
  /// The transparent image
  pub transparent: Buffer,
  pub width: u32,
  pub height: u32,
  /// "local" or "remote:<service>"
  pub origin: String,
  /// States visited, e.g. ["Fetching", "RemoteAttempt", "LocalFallback", "Done"]
  pub trace: Vec<String>,
}

fn to_napi_error(err: CutoutError) -> Error {
  let status = if err.is_invalid_input() {
    Status::InvalidArg
  } else {
    Status::GenericFailure
  };
  Error::new(status, err.to_string())
}

fn failure_to_napi_error(failure: Failure) -> Error {
  Error::new(Status::GenericFailure, failure.to_string())
}

fn to_params(options: Option<&ClassificationOptions>) -> ClassificationParameters {
  let base = if options.and_then(|o| o.chroma_green).unwrap_or(false) {
    ClassificationParameters::chroma_green()
  } else {
    ClassificationParameters::default()
  };

  let Some(options) = options else {
    return base;
  };

  ClassificationParameters {
    tolerance_distance: options.tolerance_distance.unwrap_or(base.tolerance_distance),
    white_threshold: options.white_threshold.unwrap_or(base.white_threshold),
    green_dominance_factor: options
      .green_dominance_factor
      .unwrap_or(base.green_dominance_factor),
    ..base
  }
}

fn to_processing_options(options: &RemoveBackgroundOptions) -> Result<ProcessingOptions> {
  let output_size = match (options.width, options.height) {
    (Some(width), Some(height)) => Some((width, height)),
    (None, None) => None,
    _ => {
      return Err(Error::new(
        Status::InvalidArg,
        "width and height must be given together".to_string(),
      ))
    }
  };

  let defaults = ProcessingOptions::default();
  let max_processing_size = match options.max_processing_size {
    Some(0) => None,
    Some(size) => Some(size),
    None => defaults.max_processing_size,
  };

  Ok(ProcessingOptions {
    max_processing_size,
    output_size,
    ..defaults
  })
}

fn to_cutout_result(cutout: &Cutout) -> CutoutResult {
  let origin = match &cutout.result.origin {
    ResultOrigin::Remote(service) => format!("remote:{}", service),
    ResultOrigin::Local => "local".to_string(),
  };

  CutoutResult {
    original: cutout.original.clone().into(),
    transparent: cutout.result.bytes.clone().into(),
    width: cutout.result.width,
    height: cutout.result.height,
    origin,
    trace: cutout.trace.iter().map(|s| format!("{:?}", s)).collect(),
  }
}

fn remove_background_internal(options: &RemoveBackgroundOptions) -> Result<Vec<u8>> {
  let params = to_params(options.classification.as_ref());
  let processing = to_processing_options(options)?;
  let local =
    remove_background_locally(&options.input, &params, &processing).map_err(to_napi_error)?;
  Ok(local.png)
}

pub struct AsyncRemoveBackground {
  options: RemoveBackgroundOptions,
}

#[napi]
impl Task for AsyncRemoveBackground {
  type Output = Vec<u8>;
  type JsValue = Buffer;

  fn compute(&mut self) -> Result<Self::Output> {
    remove_background_internal(&self.options)
  }

  fn resolve(&mut self, _env: Env, output: Self::Output) -> Result<Self::JsValue> {
    Ok(output.into())
  }
}

#[napi]
/// Remove the background of an image locally, off the main thread
///
/// The background color is estimated from the image corners; near-white,
/// optionally chroma-green, and background-colored pixels become transparent.
///
/// # Returns
/// A promise that resolves to the processed image buffer (PNG format)
pub fn remove_background(options: RemoveBackgroundOptions) -> AsyncTask<AsyncRemoveBackground> {
  AsyncTask::new(AsyncRemoveBackground { options })
}

#[napi]
/// Remove the background of an image locally and synchronously
///
/// # Returns
/// The processed image buffer (PNG format)
pub fn remove_background_sync(options: RemoveBackgroundOptions) -> Result<Buffer> {
  let result = remove_background_internal(&options)?;
  Ok(result.into())
}

#[napi]
/// Estimate the background color of an image from its four corners
pub fn estimate_background_color(input: Buffer) -> Result<RgbColor> {
  let img = decode_image(&input).map_err(to_napi_error)?;
  let [r, g, b] = estimate_bg(&img);
  Ok(RgbColor { r, g, b })
}

#[napi]
/// Decide whether one pixel would be removed as background
pub fn is_background_pixel(
  pixel: RgbColor,
  background: RgbColor,
  options: Option<ClassificationOptions>,
) -> bool {
  let params = to_params(options.as_ref());
  is_background(
    [pixel.r, pixel.g, pixel.b],
    [background.r, background.g, background.b],
    &params,
  )
}

#[napi]
/// Parse a hex color string into an RGB color
///
/// Supports formats: "#ff0000", "ff0000", "#f00", "f00"
pub fn parse_color(hex: String) -> Result<RgbColor> {
  let [r, g, b] = parse_hex_color(&hex)
    .map_err(|e| Error::new(Status::InvalidArg, format!("Invalid hex color: {}", e)))?;
  Ok(RgbColor { r, g, b })
}

/// Fetches generated images and removes their backgrounds, remote service
/// first, with a bounded cache of finished results.
#[napi]
pub struct BackgroundRemover {
  inner: Arc<Orchestrator<HttpFetcher, RemoteService>>,
  base: Url,
}

#[napi]
impl BackgroundRemover {
  /// Create a remover from an optional TOML configuration document
  #[napi(constructor)]
  pub fn new(config: Option<String>) -> Result<Self> {
    let config = match config {
      Some(content) => CutoutConfig::from_toml(&content).map_err(to_napi_error)?,
      None => CutoutConfig::default(),
    };
    let base = config.generation.base_url().map_err(to_napi_error)?;
    let inner = Orchestrator::from_config(&config).map_err(to_napi_error)?;

    Ok(Self {
      inner: Arc::new(inner),
      base,
    })
  }

  /// Fetch an image by URL and remove its background
  #[napi]
  pub async fn process(&self, url: String) -> Result<CutoutResult> {
    let inner = Arc::clone(&self.inner);
    let cutout = inner.process_url(&url).await.map_err(failure_to_napi_error)?;
    Ok(to_cutout_result(&cutout))
  }

  /// Generate an image from a prompt (white background hint) and remove its background
  #[napi]
  pub async fn process_prompt(
    &self,
    prompt: String,
    width: Option<u32>,
    height: Option<u32>,
    seed: Option<u32>,
  ) -> Result<CutoutResult> {
    let defaults = GenerationRequest::new(prompt);
    let request = GenerationRequest {
      width: width.unwrap_or(defaults.width),
      height: height.unwrap_or(defaults.height),
      seed: seed.map(u64::from),
      ..defaults
    };

    let inner = Arc::clone(&self.inner);
    let base = self.base.clone();
    let cutout = inner
      .process_request(&request, &base)
      .await
      .map_err(failure_to_napi_error)?;
    Ok(to_cutout_result(&cutout))
  }

  /// Number of finished cutouts currently cached
  #[napi]
  pub fn cached_results(&self) -> u32 {
    self.inner.cache().len() as u32
  }
}
