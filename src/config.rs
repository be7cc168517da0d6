//! TOML configuration.
//!
//! # Example
//!
//! ```toml
//! [classification]
//! tolerance_distance = 60.0     # Euclidean RGB distance to the background estimate
//! white_threshold = 240         # Per-channel near-white threshold
//! chroma_green_enabled = false  # Also key out dominant green
//! green_dominance_factor = 1.2
//!
//! [processing]
//! max_processing_size = 600     # Longer side of the classified buffer (0 = full size)
//! compact = false               # Use the 400px cap for small screens
//! filter = "triangle"           # nearest | triangle | catmull-rom | lanczos3
//! # output_width = 512
//! # output_height = 512
//!
//! [remote]
//! service = "proxy"             # proxy | remove-bg | none
//! endpoint = "https://example.com/proxy.php"
//! timeout_secs = 30
//!
//! [generation]
//! base_url = "https://image.pollinations.ai"
//!
//! [cache]
//! capacity = 32
//! ```

use crate::classify::ClassificationParameters;
use crate::error::{CutoutError, Result};
use crate::process::{
  ProcessingOptions, ResizeFilter, COMPACT_MAX_PROCESSING_SIZE, DEFAULT_MAX_PROCESSING_SIZE,
};
use crate::source::DEFAULT_GENERATION_BASE;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Which remote removal service to try before the local fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceKind {
  /// Skip the remote attempt and always remove locally
  #[default]
  None,
  /// Direct API with an API key
  RemoveBg,
  /// CORS proxy that forwards to the upstream model
  Proxy,
}

/// `[processing]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
  /// Longer side of the classified buffer; 0 disables downscaling.
  pub max_processing_size: u32,
  /// Use the smaller small-screen cap instead of `max_processing_size`.
  pub compact: bool,
  pub filter: ResizeFilter,
  pub output_width: Option<u32>,
  pub output_height: Option<u32>,
}

impl Default for ProcessingConfig {
  fn default() -> Self {
    Self {
      max_processing_size: DEFAULT_MAX_PROCESSING_SIZE,
      compact: false,
      filter: ResizeFilter::default(),
      output_width: None,
      output_height: None,
    }
  }
}

impl ProcessingConfig {
  pub fn options(&self) -> ProcessingOptions {
    let max_processing_size = if self.compact {
      Some(COMPACT_MAX_PROCESSING_SIZE)
    } else if self.max_processing_size == 0 {
      None
    } else {
      Some(self.max_processing_size)
    };

    ProcessingOptions {
      max_processing_size,
      output_size: self.output_width.zip(self.output_height),
      filter: self.filter,
    }
  }
}

/// `[remote]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
  pub service: ServiceKind,
  /// Service URL. Defaults to the public API for `remove-bg`; required for `proxy`.
  pub endpoint: Option<String>,
  /// API key for `remove-bg`.
  pub api_key: Option<String>,
  /// Deadline for one remote removal call.
  pub timeout_secs: u64,
  pub connect_timeout_secs: u64,
}

impl Default for RemoteConfig {
  fn default() -> Self {
    Self {
      service: ServiceKind::default(),
      endpoint: None,
      api_key: None,
      timeout_secs: 30,
      connect_timeout_secs: 5,
    }
  }
}

impl RemoteConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }
}

/// `[generation]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
  pub base_url: String,
  /// Deadline for downloading a generated image. Generation is slow.
  pub fetch_timeout_secs: u64,
}

impl Default for GenerationConfig {
  fn default() -> Self {
    Self {
      base_url: DEFAULT_GENERATION_BASE.to_string(),
      fetch_timeout_secs: 120,
    }
  }
}

impl GenerationConfig {
  pub fn base_url(&self) -> Result<Url> {
    Url::parse(&self.base_url).map_err(|e| {
      CutoutError::Config(format!("invalid generation.base_url {:?}: {}", self.base_url, e))
    })
  }
}

/// `[cache]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Number of finished cutouts kept for revisits.
  pub capacity: usize,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self { capacity: 32 }
  }
}

/// Whole configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CutoutConfig {
  pub classification: ClassificationParameters,
  pub processing: ProcessingConfig,
  pub remote: RemoteConfig,
  pub generation: GenerationConfig,
  pub cache: CacheConfig,
}

impl CutoutConfig {
  /// Parse and validate a TOML document.
  pub fn from_toml(content: &str) -> Result<Self> {
    let config: Self =
      toml::from_str(content).map_err(|e| CutoutError::Config(e.message().to_string()))?;
    config.validate()?;
    Ok(config)
  }

  /// Read, parse and validate a TOML file.
  pub fn load(path: &Path) -> Result<Self> {
    let content = std::fs::read_to_string(path)
      .map_err(|e| CutoutError::Config(format!("cannot read {}: {}", path.display(), e)))?;
    Self::from_toml(&content)
  }

  pub fn validate(&self) -> Result<()> {
    self.classification.validate()?;
    self.processing.options().validate()?;

    if self.processing.output_width.is_some() != self.processing.output_height.is_some() {
      return Err(CutoutError::Config(
        "processing.output_width and processing.output_height must be set together".to_string(),
      ));
    }
    if self.remote.timeout_secs == 0 || self.generation.fetch_timeout_secs == 0 {
      return Err(CutoutError::Config(
        "remote.timeout_secs and generation.fetch_timeout_secs must be > 0".to_string(),
      ));
    }
    if self.cache.capacity == 0 {
      return Err(CutoutError::Config("cache.capacity must be > 0".to_string()));
    }
    self.generation.base_url()?;

    Ok(())
  }
}
