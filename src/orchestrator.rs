//! Remote-first background removal with a local fallback.
//!
//! One orchestration walks an explicit state machine:
//!
//! ```text
//! Fetching ──ok──> RemoteAttempt ──ok──> Done
//!    │                  │
//!    │             err/timeout/undecodable
//!    │                  v
//!    │             LocalFallback ──ok──> Done
//!    │                  │
//!    └──err──> Failed <─┘err
//! ```
//!
//! The remote attempt always resolves before the fallback starts, and is made
//! at most once. A disabled remote service goes straight to the fallback.

use crate::cache::ResultCache;
use crate::classify::ClassificationParameters;
use crate::config::CutoutConfig;
use crate::error::{CutoutError, Result};
use crate::process::{decode_image, remove_background_locally, ProcessingOptions};
use crate::remote::{RemoteRemover, RemoteService};
use crate::source::{GenerationRequest, HttpFetcher, ImageFetcher};
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

/// States of one orchestration, as recorded in its trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
  Fetching,
  RemoteAttempt,
  LocalFallback,
  Done,
  Failed,
}

/// Where a transparent image came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultOrigin {
  /// Name of the remote service
  Remote(String),
  Local,
}

/// A transparent image and the size it was rendered at.
#[derive(Debug, Clone)]
pub struct ProcessingResult {
  /// Encoded image bytes: the service's response, or PNG for local results
  pub bytes: Vec<u8>,
  pub width: u32,
  pub height: u32,
  pub origin: ResultOrigin,
}

/// Finished answer to one request: the original next to its cutout.
#[derive(Debug, Clone)]
pub struct Cutout {
  pub original: Vec<u8>,
  pub result: ProcessingResult,
  pub trace: Vec<Stage>,
}

/// A request that ended in `Stage::Failed`.
///
/// When the source image was fetched before the failure, `original` holds it
/// so the caller can still show the unprocessed image.
#[derive(Debug, thiserror::Error)]
#[error("background removal failed during {stage:?}: {error}")]
pub struct Failure {
  /// Last stage before `Failed`
  pub stage: Stage,
  #[source]
  pub error: CutoutError,
  pub original: Option<Vec<u8>>,
  pub trace: Vec<Stage>,
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
  pub params: ClassificationParameters,
  pub options: ProcessingOptions,
  /// Deadline for the remote removal call
  pub remote_timeout: Duration,
  pub cache_capacity: usize,
}

impl Default for OrchestratorSettings {
  fn default() -> Self {
    Self::from(&CutoutConfig::default())
  }
}

impl From<&CutoutConfig> for OrchestratorSettings {
  fn from(config: &CutoutConfig) -> Self {
    Self {
      params: config.classification,
      options: config.processing.options(),
      remote_timeout: config.remote.timeout(),
      cache_capacity: config.cache.capacity,
    }
  }
}

enum State {
  Fetching { url: String },
  RemoteAttempt { original: Vec<u8> },
  LocalFallback { original: Vec<u8> },
  Done { original: Vec<u8>, result: ProcessingResult },
  Failed { error: CutoutError, original: Option<Vec<u8>> },
}

impl State {
  fn stage(&self) -> Stage {
    match self {
      State::Fetching { .. } => Stage::Fetching,
      State::RemoteAttempt { .. } => Stage::RemoteAttempt,
      State::LocalFallback { .. } => Stage::LocalFallback,
      State::Done { .. } => Stage::Done,
      State::Failed { .. } => Stage::Failed,
    }
  }
}

/// Drives fetch, remote removal and local fallback for each request.
pub struct Orchestrator<F, R> {
  fetcher: F,
  remote: R,
  settings: OrchestratorSettings,
  cache: ResultCache<Cutout>,
}

impl Orchestrator<HttpFetcher, RemoteService> {
  /// Build an HTTP-backed orchestrator from a validated configuration
  pub fn from_config(config: &CutoutConfig) -> Result<Self> {
    config.validate()?;

    let fetcher = HttpFetcher::new(
      Duration::from_secs(config.generation.fetch_timeout_secs),
      Duration::from_secs(config.remote.connect_timeout_secs),
    )?;
    let remote = RemoteService::from_config(&config.remote)?;

    Ok(Self::new(fetcher, remote, OrchestratorSettings::from(config)))
  }
}

impl<F, R> Orchestrator<F, R>
where
  F: ImageFetcher + Sync,
  R: RemoteRemover + Sync,
{
  pub fn new(fetcher: F, remote: R, settings: OrchestratorSettings) -> Self {
    let cache = ResultCache::new(settings.cache_capacity);
    Self {
      fetcher,
      remote,
      settings,
      cache,
    }
  }

  pub fn settings(&self) -> &OrchestratorSettings {
    &self.settings
  }

  pub fn cache(&self) -> &ResultCache<Cutout> {
    &self.cache
  }

  /// Fetch an image by URL and remove its background
  ///
  /// Results are cached by URL; revisiting a URL returns the cached cutout
  /// without fetching or calling the remote service again. Failures are not
  /// cached.
  pub async fn process_url(&self, url: &str) -> Result<Arc<Cutout>, Failure> {
    self.process_url_with(url, self.settings.options).await
  }

  /// Generate an image from a prompt and remove its background
  ///
  /// A local fallback is rendered at the requested generation size, matching
  /// what the remote service returns for the same image.
  pub async fn process_request(
    &self,
    request: &GenerationRequest,
    base: &Url,
  ) -> Result<Arc<Cutout>, Failure> {
    let url = request.to_url(base);
    log::info!("generating {:?} ({}x{})", request.prompt, request.width, request.height);

    let options = ProcessingOptions {
      output_size: Some((request.width, request.height)),
      ..self.settings.options
    };
    self.process_url_with(url.as_str(), options).await
  }

  /// Remove the background of bytes the caller already holds
  ///
  /// Starts at the remote attempt; nothing is fetched or cached.
  pub async fn process_bytes(&self, original: Vec<u8>) -> Result<Cutout, Failure> {
    let initial = self.after_fetch(original);
    self.run(initial, self.settings.options).await
  }

  async fn process_url_with(
    &self,
    url: &str,
    options: ProcessingOptions,
  ) -> Result<Arc<Cutout>, Failure> {
    if let Some(hit) = self.cache.get(url) {
      log::debug!("cache hit for {}", url);
      return Ok(hit);
    }

    let initial = State::Fetching {
      url: url.to_string(),
    };
    let cutout = self.run(initial, options).await?;
    Ok(self.cache.insert(url, cutout))
  }

  async fn run(&self, initial: State, options: ProcessingOptions) -> Result<Cutout, Failure> {
    let started = Instant::now();
    let mut trace = Vec::new();
    let mut state = initial;

    loop {
      trace.push(state.stage());
      state = match state {
        State::Fetching { url } => self.fetch(&url).await,
        State::RemoteAttempt { original } => self.attempt_remote(original).await,
        State::LocalFallback { original } => self.fall_back_locally(original, options).await,
        State::Done { original, result } => {
          log::info!(
            "cutout ready: {}x{} from {:?} in {:?}",
            result.width,
            result.height,
            result.origin,
            started.elapsed()
          );
          return Ok(Cutout {
            original,
            result,
            trace,
          });
        }
        State::Failed { error, original } => {
          let stage = trace
            .iter()
            .rev()
            .nth(1)
            .copied()
            .unwrap_or(Stage::Fetching);
          return Err(Failure {
            stage,
            error,
            original,
            trace,
          });
        }
      };
    }
  }

  fn after_fetch(&self, original: Vec<u8>) -> State {
    if self.remote.is_enabled() {
      State::RemoteAttempt { original }
    } else {
      log::debug!("remote removal disabled, removing locally");
      State::LocalFallback { original }
    }
  }

  async fn fetch(&self, url: &str) -> State {
    log::debug!("fetching source image {}", url);
    match self.fetcher.fetch(url).await {
      Ok(original) => self.after_fetch(original),
      Err(error) => {
        log::error!("failed to fetch source image: {}", error);
        State::Failed {
          error,
          original: None,
        }
      }
    }
  }

  async fn attempt_remote(&self, original: Vec<u8>) -> State {
    let service = self.remote.name();
    let timeout = self.settings.remote_timeout;
    log::debug!("trying {} with a {:?} deadline", service, timeout);

    let call = self.remote.remove_background(original.clone());
    let outcome = match tokio::time::timeout(timeout, call).await {
      Ok(Ok(bytes)) => remote_result(bytes, service),
      Ok(Err(error)) => Err(error),
      Err(_) => Err(CutoutError::Timeout(timeout)),
    };

    match outcome {
      Ok(result) => State::Done { original, result },
      Err(error) => {
        log::warn!("{} removal failed, falling back to local processing: {}", service, error);
        State::LocalFallback { original }
      }
    }
  }

  async fn fall_back_locally(&self, original: Vec<u8>, options: ProcessingOptions) -> State {
    let params = self.settings.params;
    let source = original.clone();

    let joined = tokio::task::spawn_blocking(move || {
      remove_background_locally(&source, &params, &options)
    })
    .await;

    let outcome = joined
      .map_err(|e| CutoutError::Processing(format!("local removal worker failed: {}", e)))
      .and_then(|result| result);

    match outcome {
      Ok(local) => {
        log::debug!("local fallback removed background {:?}", local.background);
        State::Done {
          original,
          result: ProcessingResult {
            bytes: local.png,
            width: local.width,
            height: local.height,
            origin: ResultOrigin::Local,
          },
        }
      }
      Err(error) => {
        log::error!("local background removal failed: {}", error);
        State::Failed {
          error,
          original: Some(original),
        }
      }
    }
  }
}

/// Accept a remote response only if it decodes as an image
fn remote_result(bytes: Vec<u8>, service: &str) -> Result<ProcessingResult> {
  let (width, height) = decode_image(&bytes)?.dimensions();
  Ok(ProcessingResult {
    bytes,
    width,
    height,
    origin: ResultOrigin::Remote(service.to_string()),
  })
}
