use std::time::Duration;

/// Errors raised while fetching, removing a background, or configuring.
#[derive(Debug, thiserror::Error)]
pub enum CutoutError {
  #[error("network failure: {0}")]
  Network(String),

  #[error("HTTP {status}{}", .message.as_deref().map(|m| format!(": {}", m)).unwrap_or_default())]
  Http { status: u16, message: Option<String> },

  #[error("decode failure: {0}")]
  Decode(String),

  #[error("timed out after {0:?}")]
  Timeout(Duration),

  #[error("processing failure: {0}")]
  Processing(String),

  #[error("invalid configuration: {0}")]
  Config(String),
}

pub type Result<T, E = CutoutError> = std::result::Result<T, E>;

impl CutoutError {
  /// Map a transport error, keeping timeouts distinguishable.
  pub(crate) fn from_transport(err: reqwest::Error, timeout: Duration) -> Self {
    if err.is_timeout() {
      CutoutError::Timeout(timeout)
    } else if err.is_connect() {
      CutoutError::Network(format!("cannot connect: {}", err))
    } else {
      CutoutError::Network(format!("request failed: {}", err))
    }
  }

  /// Whether the caller supplied something invalid, as opposed to a runtime failure.
  pub fn is_invalid_input(&self) -> bool {
    matches!(self, CutoutError::Config(_) | CutoutError::Decode(_))
  }
}
