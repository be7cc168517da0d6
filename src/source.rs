//! Generated-image source: URL templating for the text-to-image endpoint and
//! the fetcher that downloads the raw bytes.

use crate::error::{CutoutError, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use url::Url;

/// Default text-to-image endpoint
pub const DEFAULT_GENERATION_BASE: &str = "https://image.pollinations.ai";

/// Seeds are drawn below this bound when none is given
const SEED_MODULUS: u64 = 1_000_000_000;

/// Prompt suffix steering the generator toward an easily removable background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackgroundHint {
  #[default]
  White,
  ChromaGreen,
  None,
}

impl BackgroundHint {
  fn suffix(self) -> &'static str {
    match self {
      BackgroundHint::White => ", with white flat solid background with no shadows or gradients.",
      BackgroundHint::ChromaGreen => {
        ", on a solid bright green chroma key background with no shadows or gradients."
      }
      BackgroundHint::None => "",
    }
  }
}

/// One text-to-image generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
  pub prompt: String,
  pub width: u32,
  pub height: u32,
  pub seed: Option<u64>,
  pub model: Option<String>,
  pub enhance: bool,
  pub private: bool,
  pub nologo: bool,
  pub hint: BackgroundHint,
}

impl GenerationRequest {
  pub fn new(prompt: impl Into<String>) -> Self {
    Self {
      prompt: prompt.into(),
      width: 512,
      height: 512,
      seed: None,
      model: None,
      enhance: false,
      private: false,
      nologo: false,
      hint: BackgroundHint::default(),
    }
  }

  /// The prompt as sent to the generator, background hint included
  pub fn full_prompt(&self) -> String {
    format!("{}{}", self.prompt.trim(), self.hint.suffix())
  }

  /// Build `{base}/prompt/{prompt}?width=..&height=..&seed=..[&model=..][&enhance=true]...`
  ///
  /// A missing seed is replaced by a time-derived one, so the returned URL is
  /// always reproducible on its own.
  pub fn to_url(&self, base: &Url) -> Url {
    let seed = self.seed.unwrap_or_else(time_seed);

    let mut url = base.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
      segments.pop_if_empty().push("prompt").push(&self.full_prompt());
    }

    {
      let mut query = url.query_pairs_mut();
      query.clear();
      query.append_pair("width", &self.width.to_string());
      query.append_pair("height", &self.height.to_string());
      query.append_pair("seed", &seed.to_string());
      if let Some(model) = self.model.as_deref().filter(|m| !m.is_empty()) {
        query.append_pair("model", model);
      }
      if self.enhance {
        query.append_pair("enhance", "true");
      }
      if self.private {
        query.append_pair("private", "true");
      }
      if self.nologo {
        query.append_pair("nologo", "true");
      }
    }

    url
  }
}

fn time_seed() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_nanos() as u64 % SEED_MODULUS)
    .unwrap_or(0)
}

/// Source of raw image bytes.
pub trait ImageFetcher {
  fn fetch(&self, url: &str) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

/// Fetches images over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpFetcher {
  client: reqwest::Client,
  timeout: Duration,
}

impl HttpFetcher {
  pub fn new(timeout: Duration, connect_timeout: Duration) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .connect_timeout(connect_timeout)
      .build()
      .map_err(|e| CutoutError::Config(format!("cannot build HTTP client: {}", e)))?;
    Ok(Self { client, timeout })
  }
}

impl ImageFetcher for HttpFetcher {
  fn fetch(&self, url: &str) -> impl Future<Output = Result<Vec<u8>>> + Send {
    let request = self.client.get(url);
    let timeout = self.timeout;

    async move {
      let response = request
        .send()
        .await
        .map_err(|e| CutoutError::from_transport(e, timeout))?;

      let status = response.status();
      if !status.is_success() {
        return Err(CutoutError::Http {
          status: status.as_u16(),
          message: status.canonical_reason().map(str::to_string),
        });
      }

      let bytes = response
        .bytes()
        .await
        .map_err(|e| CutoutError::from_transport(e, timeout))?;
      Ok(bytes.to_vec())
    }
  }
}
