//! Read-through response cache for idempotent `GET` endpoints
//!
//! Mounted per route with `axum::middleware::from_fn_with_state`. The
//! middleware wraps `next.run(req)`: on a hit the handler never runs, on a
//! miss the handler's own `Response` is inspected and its JSON body written
//! back to the cache on a spawned task.

use axum::{
  body::{Body, Bytes, HttpBody},
  extract::{Request, State},
  http::{header, response::Parts, HeaderValue, Method},
  middleware::Next,
  response::{IntoResponse, Response},
};

use super::client::CacheClient;
use super::keys::cache_key;
use crate::types::AuthUser;

pub const CACHE_STATUS_HEADER: &str = "x-cache";

/// Per-mount cache settings.
#[derive(Clone)]
pub struct ResponseCache {
  client: CacheClient,
  base_path: &'static str,
  ttl_secs: u64,
  max_body_bytes: usize,
}

impl ResponseCache {
  pub fn new(client: CacheClient, base_path: &'static str, ttl_secs: u64) -> Self {
    Self {
      client,
      base_path,
      ttl_secs,
      max_body_bytes: 8 * 1024 * 1024,
    }
  }

  /// Responses larger than this are served but not cached.
  pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
    self.max_body_bytes = max_body_bytes;
    self
  }

  fn key_for(&self, req: &Request) -> String {
    let path = req.uri().path();
    let sub_path = path.strip_prefix(self.base_path).unwrap_or(path);
    let user_id = req
      .extensions()
      .get::<AuthUser>()
      .map(|u| u.user_id.to_string());
    cache_key(
      self.base_path,
      sub_path,
      user_id.as_deref(),
      req.uri().query().unwrap_or(""),
    )
  }
}

pub async fn response_cache(
  State(cache): State<ResponseCache>,
  req: Request,
  next: Next,
) -> Response {
  if req.method() != Method::GET || !cache.client.is_connected() {
    return next.run(req).await;
  }

  let key = cache.key_for(&req);

  if let Some(cached) = cache.client.get(&key).await {
    tracing::debug!("Cache hit for key: {}", key);
    return (
      [
        (header::CONTENT_TYPE, "application/json"),
        (header::HeaderName::from_static(CACHE_STATUS_HEADER), "HIT"),
      ],
      cached,
    )
      .into_response();
  }

  tracing::debug!("Cache miss for key: {}", key);
  let response = next.run(req).await;

  if !response.status().is_success() || !is_json(&response) {
    return response;
  }

  let (parts, body) = response.into_parts();
  let within_limit = body
    .size_hint()
    .upper()
    .is_some_and(|upper| upper <= cache.max_body_bytes as u64);
  if !within_limit {
    return Response::from_parts(parts, body);
  }

  let read = axum::body::to_bytes(body, cache.max_body_bytes).await;
  let (response, payload) = captured(parts, read, &key);

  if let Some(payload) = payload {
    let client = cache.client.clone();
    let ttl = cache.ttl_secs;
    tokio::spawn(async move {
      client.set_with_expiry(&key, &payload, ttl).await;
    });
  }

  response
}

/// Rebuild the handler's response from its buffered body and hand back the
/// text to cache, if any. A body that failed to buffer is not cached and the
/// handler's status and headers still go out.
fn captured(
  mut parts: Parts,
  read: Result<Bytes, axum::Error>,
  key: &str,
) -> (Response, Option<String>) {
  let bytes = match read {
    Ok(bytes) => bytes,
    Err(e) => {
      tracing::error!("Failed to read response body for {}: {}", key, e);
      return (Response::from_parts(parts, Body::empty()), None);
    }
  };

  let payload = std::str::from_utf8(&bytes).ok().map(str::to_owned);
  parts.headers.insert(
    header::HeaderName::from_static(CACHE_STATUS_HEADER),
    HeaderValue::from_static("MISS"),
  );
  (Response::from_parts(parts, Body::from(bytes)), payload)
}

fn is_json(response: &Response) -> bool {
  response
    .headers()
    .get(header::CONTENT_TYPE)
    .and_then(|v| v.to_str().ok())
    .is_some_and(|ct| ct.starts_with("application/json"))
}
