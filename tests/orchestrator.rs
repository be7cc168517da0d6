mod common;

use common::{png, red_square_on_white};
use image::{Rgba, RgbaImage};
use sprite_cutout::remote::RemoteRemover;
use sprite_cutout::source::ImageFetcher;
use sprite_cutout::{
  remove_background_locally, CutoutError, GenerationRequest, Orchestrator, OrchestratorSettings,
  Result, ResultOrigin, Stage,
};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use url::Url;

/// Serves the same bytes for every URL and records what was asked for
struct StaticFetcher {
  bytes: Vec<u8>,
  calls: Arc<AtomicUsize>,
  urls: Arc<Mutex<Vec<String>>>,
}

impl StaticFetcher {
  fn new(bytes: Vec<u8>) -> Self {
    Self {
      bytes,
      calls: Arc::default(),
      urls: Arc::default(),
    }
  }
}

impl ImageFetcher for StaticFetcher {
  fn fetch(&self, url: &str) -> impl Future<Output = Result<Vec<u8>>> + Send {
    self.calls.fetch_add(1, Ordering::SeqCst);
    self.urls.lock().unwrap().push(url.to_string());
    let bytes = self.bytes.clone();
    async move { Ok(bytes) }
  }
}

struct MissingFetcher;

impl ImageFetcher for MissingFetcher {
  fn fetch(&self, _url: &str) -> impl Future<Output = Result<Vec<u8>>> + Send {
    async {
      Err(CutoutError::Http {
        status: 404,
        message: Some("Not Found".to_string()),
      })
    }
  }
}

enum Behavior {
  Fail,
  Hang,
  Succeed(Vec<u8>),
  Garbage,
  Disabled,
}

struct MockRemote {
  behavior: Behavior,
  calls: Arc<AtomicUsize>,
}

impl MockRemote {
  fn new(behavior: Behavior) -> Self {
    Self {
      behavior,
      calls: Arc::default(),
    }
  }
}

impl RemoteRemover for MockRemote {
  fn name(&self) -> &str {
    "mock"
  }

  fn is_enabled(&self) -> bool {
    !matches!(self.behavior, Behavior::Disabled)
  }

  fn remove_background(&self, _image: Vec<u8>) -> impl Future<Output = Result<Vec<u8>>> + Send {
    self.calls.fetch_add(1, Ordering::SeqCst);
    async move {
      match &self.behavior {
        Behavior::Fail => Err(CutoutError::Http {
          status: 500,
          message: Some("upstream down".to_string()),
        }),
        Behavior::Hang => {
          tokio::time::sleep(Duration::from_secs(30)).await;
          Ok(Vec::new())
        }
        Behavior::Succeed(bytes) => Ok(bytes.clone()),
        Behavior::Garbage => Ok(b"{\"status\":\"ok\"}".to_vec()),
        Behavior::Disabled => panic!("disabled remote must not be called"),
      }
    }
  }
}

fn settings() -> OrchestratorSettings {
  OrchestratorSettings {
    remote_timeout: Duration::from_millis(100),
    ..Default::default()
  }
}

const URL: &str = "https://images.test/sprite.png";

#[tokio::test]
async fn remote_error_falls_back_to_local_result() {
  let source = png(&red_square_on_white(64));
  let remote = MockRemote::new(Behavior::Fail);
  let remote_calls = Arc::clone(&remote.calls);
  let orchestrator = Orchestrator::new(StaticFetcher::new(source.clone()), remote, settings());

  let cutout = orchestrator.process_url(URL).await.unwrap();

  let expected = remove_background_locally(
    &source,
    &orchestrator.settings().params,
    &orchestrator.settings().options,
  )
  .unwrap();
  assert_eq!(cutout.result.bytes, expected.png);
  assert_eq!(cutout.result.origin, ResultOrigin::Local);
  assert_eq!(cutout.original, source);
  assert_eq!(
    cutout.trace,
    vec![Stage::Fetching, Stage::RemoteAttempt, Stage::LocalFallback, Stage::Done]
  );
  assert_eq!(remote_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn remote_timeout_falls_back_without_retrying() {
  let remote = MockRemote::new(Behavior::Hang);
  let remote_calls = Arc::clone(&remote.calls);
  let orchestrator = Orchestrator::new(
    StaticFetcher::new(png(&red_square_on_white(64))),
    remote,
    settings(),
  );

  let started = Instant::now();
  let cutout = orchestrator.process_url(URL).await.unwrap();

  assert!(started.elapsed() < Duration::from_secs(10));
  assert_eq!(
    cutout.trace,
    vec![Stage::Fetching, Stage::RemoteAttempt, Stage::LocalFallback, Stage::Done]
  );
  assert_eq!(cutout.result.origin, ResultOrigin::Local);
  assert_eq!(remote_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn remote_success_is_returned_verbatim() {
  let remote_png = png(&RgbaImage::from_pixel(32, 24, Rgba([0, 0, 0, 0])));
  let orchestrator = Orchestrator::new(
    StaticFetcher::new(png(&red_square_on_white(64))),
    MockRemote::new(Behavior::Succeed(remote_png.clone())),
    settings(),
  );

  let cutout = orchestrator.process_url(URL).await.unwrap();

  assert_eq!(cutout.result.bytes, remote_png);
  assert_eq!((cutout.result.width, cutout.result.height), (32, 24));
  assert_eq!(cutout.result.origin, ResultOrigin::Remote("mock".to_string()));
  assert_eq!(cutout.trace, vec![Stage::Fetching, Stage::RemoteAttempt, Stage::Done]);
}

#[tokio::test]
async fn undecodable_remote_response_falls_back() {
  let orchestrator = Orchestrator::new(
    StaticFetcher::new(png(&red_square_on_white(64))),
    MockRemote::new(Behavior::Garbage),
    settings(),
  );

  let cutout = orchestrator.process_url(URL).await.unwrap();

  assert_eq!(cutout.result.origin, ResultOrigin::Local);
  assert_eq!(
    cutout.trace,
    vec![Stage::Fetching, Stage::RemoteAttempt, Stage::LocalFallback, Stage::Done]
  );
}

#[tokio::test]
async fn fetch_failure_skips_removal() {
  let remote = MockRemote::new(Behavior::Fail);
  let remote_calls = Arc::clone(&remote.calls);
  let orchestrator = Orchestrator::new(MissingFetcher, remote, settings());

  let failure = orchestrator.process_url(URL).await.unwrap_err();

  assert_eq!(failure.stage, Stage::Fetching);
  assert_eq!(failure.trace, vec![Stage::Fetching, Stage::Failed]);
  assert!(failure.original.is_none());
  assert!(matches!(failure.error, CutoutError::Http { status: 404, .. }));
  assert_eq!(remote_calls.load(Ordering::SeqCst), 0);
  assert!(orchestrator.cache().is_empty());
}

#[tokio::test]
async fn local_failure_keeps_the_original() {
  let garbage = b"definitely not an image".to_vec();
  let orchestrator = Orchestrator::new(
    StaticFetcher::new(garbage.clone()),
    MockRemote::new(Behavior::Fail),
    settings(),
  );

  let failure = orchestrator.process_url(URL).await.unwrap_err();

  assert_eq!(failure.stage, Stage::LocalFallback);
  assert!(matches!(failure.error, CutoutError::Decode(_)));
  assert_eq!(failure.original, Some(garbage));
  assert_eq!(
    failure.trace,
    vec![Stage::Fetching, Stage::RemoteAttempt, Stage::LocalFallback, Stage::Failed]
  );
}

#[tokio::test]
async fn cached_url_is_not_refetched() {
  let fetcher = StaticFetcher::new(png(&red_square_on_white(64)));
  let fetch_calls = Arc::clone(&fetcher.calls);
  let remote = MockRemote::new(Behavior::Fail);
  let remote_calls = Arc::clone(&remote.calls);
  let orchestrator = Orchestrator::new(fetcher, remote, settings());

  let first = orchestrator.process_url(URL).await.unwrap();
  let second = orchestrator.process_url(URL).await.unwrap();

  assert!(Arc::ptr_eq(&first, &second));
  assert_eq!(fetch_calls.load(Ordering::SeqCst), 1);
  assert_eq!(remote_calls.load(Ordering::SeqCst), 1);

  orchestrator
    .process_url("https://images.test/other.png")
    .await
    .unwrap();
  assert_eq!(fetch_calls.load(Ordering::SeqCst), 2);
  assert_eq!(orchestrator.cache().len(), 2);
}

#[tokio::test]
async fn disabled_remote_goes_straight_to_local() {
  let remote = MockRemote::new(Behavior::Disabled);
  let remote_calls = Arc::clone(&remote.calls);
  let orchestrator = Orchestrator::new(
    StaticFetcher::new(png(&red_square_on_white(64))),
    remote,
    settings(),
  );

  let cutout = orchestrator.process_url(URL).await.unwrap();

  assert_eq!(
    cutout.trace,
    vec![Stage::Fetching, Stage::LocalFallback, Stage::Done]
  );
  assert_eq!(remote_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn held_bytes_are_processed_without_caching() {
  let fetcher = StaticFetcher::new(Vec::new());
  let fetch_calls = Arc::clone(&fetcher.calls);
  let orchestrator = Orchestrator::new(fetcher, MockRemote::new(Behavior::Fail), settings());

  let cutout = orchestrator
    .process_bytes(png(&red_square_on_white(64)))
    .await
    .unwrap();

  assert_eq!(
    cutout.trace,
    vec![Stage::RemoteAttempt, Stage::LocalFallback, Stage::Done]
  );
  assert_eq!(fetch_calls.load(Ordering::SeqCst), 0);
  assert!(orchestrator.cache().is_empty());
}

#[tokio::test]
async fn prompts_are_fetched_from_the_generation_url() {
  let fetcher = StaticFetcher::new(png(&red_square_on_white(64)));
  let urls = Arc::clone(&fetcher.urls);
  let orchestrator = Orchestrator::new(fetcher, MockRemote::new(Behavior::Disabled), settings());

  let request = GenerationRequest {
    seed: Some(7),
    ..GenerationRequest::new("a red fox")
  };
  let base = Url::parse("https://gen.test").unwrap();
  orchestrator.process_request(&request, &base).await.unwrap();

  let urls = urls.lock().unwrap();
  assert_eq!(urls.len(), 1);
  assert_eq!(urls[0], request.to_url(&base).as_str());
  assert!(urls[0].starts_with("https://gen.test/prompt/a%20red%20fox"));
  assert!(urls[0].contains("seed=7"));
}

#[tokio::test]
async fn local_fallback_renders_at_the_requested_generation_size() {
  let orchestrator = Orchestrator::new(
    StaticFetcher::new(png(&red_square_on_white(64))),
    MockRemote::new(Behavior::Fail),
    settings(),
  );

  let request = GenerationRequest {
    width: 96,
    height: 72,
    seed: Some(1),
    ..GenerationRequest::new("a lantern")
  };
  let base = Url::parse("https://gen.test").unwrap();
  let cutout = orchestrator.process_request(&request, &base).await.unwrap();

  assert_eq!(cutout.result.origin, ResultOrigin::Local);
  assert_eq!((cutout.result.width, cutout.result.height), (96, 72));
  let decoded = image::load_from_memory(&cutout.result.bytes).unwrap();
  assert_eq!((decoded.width(), decoded.height()), (96, 72));
}

#[tokio::test]
async fn urls_without_a_requested_size_keep_the_source_size() {
  let orchestrator = Orchestrator::new(
    StaticFetcher::new(png(&red_square_on_white(800))),
    MockRemote::new(Behavior::Disabled),
    settings(),
  );

  let cutout = orchestrator.process_url(URL).await.unwrap();

  assert_eq!((cutout.result.width, cutout.result.height), (800, 800));
}
