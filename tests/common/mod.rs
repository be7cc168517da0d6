#![allow(dead_code)]

use image::{Rgba, RgbaImage};
use std::io::Read;
use std::thread::{self, JoinHandle};
use tiny_http::{Header, Response, Server};

/// White canvas with a solid red square covering the center half
pub fn red_square_on_white(size: u32) -> RgbaImage {
  let mut img = RgbaImage::from_pixel(size, size, Rgba([255, 255, 255, 255]));
  let (start, end) = (size / 4, size * 3 / 4);
  for y in start..end {
    for x in start..end {
      img.put_pixel(x, y, Rgba([255, 0, 0, 255]));
    }
  }
  img
}

pub fn png(img: &RgbaImage) -> Vec<u8> {
  sprite_cutout::process::encode_png(img).expect("encode test image")
}

/// A request as seen by the fixture server
#[derive(Debug, Clone)]
pub struct Recorded {
  pub method: String,
  pub url: String,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl Recorded {
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(key, _)| key.eq_ignore_ascii_case(name))
      .map(|(_, value)| value.as_str())
  }

  pub fn body_contains(&self, needle: &str) -> bool {
    String::from_utf8_lossy(&self.body).contains(needle)
  }
}

/// A canned reply: status, content type and body
pub struct Reply {
  pub status: u16,
  pub content_type: &'static str,
  pub body: Vec<u8>,
  pub delay: Option<std::time::Duration>,
}

impl Reply {
  pub fn image(body: Vec<u8>) -> Self {
    Self {
      status: 200,
      content_type: "image/png",
      body,
      delay: None,
    }
  }

  pub fn json(status: u16, body: &str) -> Self {
    Self {
      status,
      content_type: "application/json",
      body: body.as_bytes().to_vec(),
      delay: None,
    }
  }
}

/// Serve `requests` requests on an ephemeral port, answering each with
/// `handler`. Returns the base URL and a handle yielding the recorded requests.
pub fn serve<H>(requests: usize, handler: H) -> (String, JoinHandle<Vec<Recorded>>)
where
  H: Fn(&Recorded) -> Reply + Send + 'static,
{
  let server = Server::http("127.0.0.1:0").expect("bind test server");
  let port = server
    .server_addr()
    .to_ip()
    .expect("test server listens on TCP")
    .port();

  let handle = thread::spawn(move || {
    let mut seen = Vec::new();
    for _ in 0..requests {
      let mut request = match server.recv() {
        Ok(request) => request,
        Err(_) => break,
      };

      let mut body = Vec::new();
      let _ = request.as_reader().read_to_end(&mut body);
      let recorded = Recorded {
        method: request.method().to_string(),
        url: request.url().to_string(),
        headers: request
          .headers()
          .iter()
          .map(|h| (h.field.to_string(), h.value.to_string()))
          .collect(),
        body,
      };

      let reply = handler(&recorded);
      if let Some(delay) = reply.delay {
        thread::sleep(delay);
      }
      let header = Header::from_bytes(&b"Content-Type"[..], reply.content_type.as_bytes())
        .expect("valid header");
      let response = Response::from_data(reply.body)
        .with_status_code(reply.status)
        .with_header(header);
      // The client may have given up already
      let _ = request.respond(response);

      seen.push(recorded);
    }
    seen
  });

  (format!("http://127.0.0.1:{}", port), handle)
}
