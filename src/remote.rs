//! Remote background-removal services.
//!
//! Two wire formats are supported:
//!
//! - the direct API (`RemoveBgClient`): multipart `image_file` + `size=auto`
//!   with an `X-Api-Key` header; errors come back as `{"errors":[{"title":..}]}`
//! - the CORS proxy (`ProxyClient`): multipart `image`, upstream bytes streamed
//!   back verbatim; errors come back as `{"error":..}`

use crate::config::{RemoteConfig, ServiceKind};
use crate::error::{CutoutError, Result};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use url::Url;

/// Default endpoint of the direct removal API
pub const DEFAULT_REMOVE_BG_ENDPOINT: &str = "https://api.remove.bg/v1.0/removebg";


/// A service that turns image bytes into a transparent image.
pub trait RemoteRemover {
  /// Short name for logs and result provenance
  fn name(&self) -> &str;

  /// Whether a remote attempt should be made at all
  fn is_enabled(&self) -> bool {
    true
  }

  fn remove_background(&self, image: Vec<u8>) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

#[derive(Deserialize)]
struct RemoveBgErrorBody {
  errors: Vec<RemoveBgErrorEntry>,
}

#[derive(Deserialize)]
struct RemoveBgErrorEntry {
  title: String,
}

#[derive(Deserialize)]
struct ProxyErrorBody {
  error: String,
}

/// Extract the titles of a direct-API error body, joined by "; "
pub fn parse_remove_bg_error(body: &[u8]) -> Option<String> {
  let parsed: RemoveBgErrorBody = serde_json::from_slice(body).ok()?;
  let titles: Vec<String> = parsed.errors.into_iter().map(|e| e.title).collect();
  if titles.is_empty() {
    None
  } else {
    Some(titles.join("; "))
  }
}

/// Extract the message of a proxy error body
pub fn parse_proxy_error(body: &[u8]) -> Option<String> {
  serde_json::from_slice::<ProxyErrorBody>(body)
    .ok()
    .map(|b| b.error)
}

fn build_client(timeout: Duration, connect_timeout: Duration) -> Result<reqwest::Client> {
  reqwest::Client::builder()
    .timeout(timeout)
    .connect_timeout(connect_timeout)
    .build()
    .map_err(|e| CutoutError::Config(format!("cannot build HTTP client: {}", e)))
}

/// File name and MIME type for an upload, sniffed from the image bytes
///
/// Unrecognized bytes are labeled as PNG and left for the service to reject.
fn upload_metadata(image: &[u8]) -> (String, &'static str) {
  match image::guess_format(image) {
    Ok(format) => {
      let extension = format.extensions_str().first().copied().unwrap_or("img");
      (format!("image.{}", extension), format.to_mime_type())
    }
    Err(_) => ("image.png".to_string(), "image/png"),
  }
}

fn image_part(image: Vec<u8>) -> Result<Part> {
  let (file_name, mime) = upload_metadata(&image);
  Part::bytes(image)
    .file_name(file_name)
    .mime_str(mime)
    .map_err(|e| CutoutError::Processing(format!("cannot build upload part: {}", e)))
}

/// Send a request and return the body of a successful response
///
/// Non-success responses become `CutoutError::Http` with whatever message
/// `parse_error` can pull out of the body.
async fn send_for_image(
  request: reqwest::RequestBuilder,
  timeout: Duration,
  parse_error: fn(&[u8]) -> Option<String>,
) -> Result<Vec<u8>> {
  let response = request
    .send()
    .await
    .map_err(|e| CutoutError::from_transport(e, timeout))?;

  let status = response.status();
  let body = response
    .bytes()
    .await
    .map_err(|e| CutoutError::from_transport(e, timeout))?;

  if !status.is_success() {
    return Err(CutoutError::Http {
      status: status.as_u16(),
      message: parse_error(&body),
    });
  }

  Ok(body.to_vec())
}

/// Client for the direct removal API.
#[derive(Debug, Clone)]
pub struct RemoveBgClient {
  client: reqwest::Client,
  endpoint: Url,
  api_key: String,
  timeout: Duration,
}

impl RemoveBgClient {
  pub fn new(
    endpoint: Url,
    api_key: impl Into<String>,
    timeout: Duration,
    connect_timeout: Duration,
  ) -> Result<Self> {
    Ok(Self {
      client: build_client(timeout, connect_timeout)?,
      endpoint,
      api_key: api_key.into(),
      timeout,
    })
  }
}

impl RemoteRemover for RemoveBgClient {
  fn name(&self) -> &str {
    "remove-bg"
  }

  fn remove_background(&self, image: Vec<u8>) -> impl Future<Output = Result<Vec<u8>>> + Send {
    async move {
      let form = Form::new()
        .text("size", "auto")
        .part("image_file", image_part(image)?);

      log::debug!("posting image to {}", self.endpoint);
      let request = self
        .client
        .post(self.endpoint.clone())
        .header("X-Api-Key", &self.api_key)
        .multipart(form);

      send_for_image(request, self.timeout, parse_remove_bg_error).await
    }
  }
}

/// Client for the CORS proxy in front of the upstream removal model.
#[derive(Debug, Clone)]
pub struct ProxyClient {
  client: reqwest::Client,
  endpoint: Url,
  timeout: Duration,
}

impl ProxyClient {
  pub fn new(endpoint: Url, timeout: Duration, connect_timeout: Duration) -> Result<Self> {
    Ok(Self {
      client: build_client(timeout, connect_timeout)?,
      endpoint,
      timeout,
    })
  }
}

impl RemoteRemover for ProxyClient {
  fn name(&self) -> &str {
    "proxy"
  }

  fn remove_background(&self, image: Vec<u8>) -> impl Future<Output = Result<Vec<u8>>> + Send {
    async move {
      let form = Form::new().part("image", image_part(image)?);

      log::debug!("posting image to proxy {}", self.endpoint);
      let request = self.client.post(self.endpoint.clone()).multipart(form);

      send_for_image(request, self.timeout, parse_proxy_error).await
    }
  }
}

/// The remote service selected by configuration.
#[derive(Debug, Clone)]
pub enum RemoteService {
  RemoveBg(RemoveBgClient),
  Proxy(ProxyClient),
  Disabled,
}

impl RemoteService {
  pub fn from_config(config: &RemoteConfig) -> Result<Self> {
    let timeout = Duration::from_secs(config.timeout_secs);
    let connect_timeout = Duration::from_secs(config.connect_timeout_secs);

    let endpoint = |default: Option<&str>| -> Result<Url> {
      let raw = config
        .endpoint
        .as_deref()
        .or(default)
        .ok_or_else(|| CutoutError::Config("remote.endpoint is required".to_string()))?;
      Url::parse(raw)
        .map_err(|e| CutoutError::Config(format!("invalid remote.endpoint {:?}: {}", raw, e)))
    };

    match config.service {
      ServiceKind::None => Ok(RemoteService::Disabled),
      ServiceKind::RemoveBg => {
        let api_key = config
          .api_key
          .clone()
          .filter(|key| !key.is_empty())
          .ok_or_else(|| CutoutError::Config("remote.api_key is required for remove-bg".into()))?;
        Ok(RemoteService::RemoveBg(RemoveBgClient::new(
          endpoint(Some(DEFAULT_REMOVE_BG_ENDPOINT))?,
          api_key,
          timeout,
          connect_timeout,
        )?))
      }
      ServiceKind::Proxy => Ok(RemoteService::Proxy(ProxyClient::new(
        endpoint(None)?,
        timeout,
        connect_timeout,
      )?)),
    }
  }
}

impl RemoteRemover for RemoteService {
  fn name(&self) -> &str {
    match self {
      RemoteService::RemoveBg(client) => client.name(),
      RemoteService::Proxy(client) => client.name(),
      RemoteService::Disabled => "disabled",
    }
  }

  fn is_enabled(&self) -> bool {
    !matches!(self, RemoteService::Disabled)
  }

  fn remove_background(&self, image: Vec<u8>) -> impl Future<Output = Result<Vec<u8>>> + Send {
    async move {
      match self {
        RemoteService::RemoveBg(client) => client.remove_background(image).await,
        RemoteService::Proxy(client) => client.remove_background(image).await,
        RemoteService::Disabled => Err(CutoutError::Config(
          "remote background removal is disabled".to_string(),
        )),
      }
    }
  }
}
