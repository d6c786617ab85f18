#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
  body::{Body, Bytes},
  http::{header, HeaderMap, Request, StatusCode},
  Router,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use steinway::api::{build_router, ApiState};
use steinway::cache::{CacheClient, InMemoryBackend};
use steinway::db::{RecordStore, SqliteStore};
use steinway::server::ServerConfig;
use steinway::types::{
  NewRecording, NewUser, ProfileUpdate, PublicRecording, Recording, User,
};
use tower::ServiceExt;
use uuid::Uuid;

pub const JWT_SECRET: &str = "test-secret";

// ============================================================
// Counting store
// ============================================================

/// Wraps the SQLite store and counts read queries, so tests can tell a
/// cache hit from a store read.
pub struct CountingStore {
  inner: SqliteStore,
  pub owner_lists: AtomicUsize,
  pub feed_reads: AtomicUsize,
  pub profile_reads: AtomicUsize,
}

impl CountingStore {
  pub async fn new() -> Self {
    Self {
      inner: SqliteStore::in_memory().await.unwrap(),
      owner_lists: AtomicUsize::new(0),
      feed_reads: AtomicUsize::new(0),
      profile_reads: AtomicUsize::new(0),
    }
  }

  pub fn owner_lists(&self) -> usize {
    self.owner_lists.load(Ordering::SeqCst)
  }

  pub fn feed_reads(&self) -> usize {
    self.feed_reads.load(Ordering::SeqCst)
  }

  pub fn profile_reads(&self) -> usize {
    self.profile_reads.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl RecordStore for CountingStore {
  async fn init_schema(&self) -> Result<(), anyhow::Error> {
    self.inner.init_schema().await
  }

  async fn insert_recording(&self, recording: NewRecording) -> Result<Recording, anyhow::Error> {
    self.inner.insert_recording(recording).await
  }

  async fn list_recordings_by_owner(&self, user_id: Uuid) -> Result<Vec<Recording>, anyhow::Error> {
    self.owner_lists.fetch_add(1, Ordering::SeqCst);
    self.inner.list_recordings_by_owner(user_id).await
  }

  async fn list_public_feed(&self) -> Result<Vec<PublicRecording>, anyhow::Error> {
    self.feed_reads.fetch_add(1, Ordering::SeqCst);
    self.inner.list_public_feed().await
  }

  async fn find_recording(&self, id: Uuid, user_id: Uuid) -> Result<Option<Recording>, anyhow::Error> {
    self.inner.find_recording(id, user_id).await
  }

  async fn set_recording_visibility(
    &self,
    id: Uuid,
    user_id: Uuid,
    is_public: bool,
  ) -> Result<bool, anyhow::Error> {
    self.inner.set_recording_visibility(id, user_id, is_public).await
  }

  async fn delete_recording(&self, id: Uuid, user_id: Uuid) -> Result<bool, anyhow::Error> {
    self.inner.delete_recording(id, user_id).await
  }

  async fn find_user_by_google_id(&self, google_id: &str) -> Result<Option<User>, anyhow::Error> {
    self.inner.find_user_by_google_id(google_id).await
  }

  async fn insert_user(&self, user: NewUser) -> Result<User, anyhow::Error> {
    self.inner.insert_user(user).await
  }

  async fn get_user(&self, id: Uuid) -> Result<Option<User>, anyhow::Error> {
    self.profile_reads.fetch_add(1, Ordering::SeqCst);
    self.inner.get_user(id).await
  }

  async fn username_taken_by_other(&self, username: &str, user_id: Uuid) -> Result<bool, anyhow::Error> {
    self.inner.username_taken_by_other(username, user_id).await
  }

  async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> Result<bool, anyhow::Error> {
    self.inner.update_profile(id, update).await
  }

  async fn set_profile_image(&self, id: Uuid, image_url: String) -> Result<bool, anyhow::Error> {
    self.inner.set_profile_image(id, image_url).await
  }
}

// ============================================================
// Test app
// ============================================================

pub struct TestResponse {
  pub status: StatusCode,
  pub headers: HeaderMap,
  pub body: Bytes,
}

impl TestResponse {
  pub fn json(&self) -> Value {
    serde_json::from_slice(&self.body).unwrap()
  }

  pub fn cache_status(&self) -> Option<&str> {
    self.headers.get("x-cache").and_then(|v| v.to_str().ok())
  }
}

pub struct TestApp {
  pub router: Router,
  pub store: Arc<CountingStore>,
  pub cache: CacheClient,
  /// `None` when the app runs with caching disabled.
  pub backend: Option<Arc<InMemoryBackend>>,
}

pub fn test_config() -> ServerConfig {
  let mut config = ServerConfig::default();
  config.auth.jwt_secret = JWT_SECRET.to_string();
  config
}

impl TestApp {
  /// App backed by a connected in-memory cache.
  pub async fn new() -> Self {
    let backend = Arc::new(InMemoryBackend::new());
    let mut app = Self::with_cache(CacheClient::in_memory(backend.clone())).await;
    app.backend = Some(backend);
    app
  }

  pub async fn with_cache(cache: CacheClient) -> Self {
    let store = Arc::new(CountingStore::new().await);
    let config = test_config();
    let state = ApiState::new(store.clone(), cache.clone(), &config);
    Self {
      router: build_router(state, &config),
      store,
      cache,
      backend: None,
    }
  }

  pub fn backend(&self) -> &InMemoryBackend {
    self.backend.as_deref().unwrap()
  }

  pub async fn send(&self, req: Request<Body>) -> TestResponse {
    let response = self.router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
      .await
      .unwrap();
    TestResponse {
      status,
      headers,
      body,
    }
  }

  pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
    let mut req = Request::get(uri);
    if let Some(token) = token {
      req = req.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    self.send(req.body(Body::empty()).unwrap()).await
  }

  pub async fn send_json(&self, method: &str, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
    let mut req = Request::builder()
      .method(method)
      .uri(uri)
      .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
      req = req.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    self.send(req.body(Body::from(body.to_string())).unwrap()).await
  }

  pub async fn delete(&self, uri: &str, token: &str) -> TestResponse {
    let req = Request::delete(uri)
      .header(header::AUTHORIZATION, format!("Bearer {}", token))
      .body(Body::empty())
      .unwrap();
    self.send(req).await
  }

  /// Sign in through the Google exchange endpoint; returns `(token, user_id)`.
  pub async fn sign_in(&self, google_sub: &str, name: &str) -> (String, String) {
    let credential = google_credential(google_sub, name);
    let res = self
      .send_json("POST", "/api/users/google-auth", None, json!({ "credential": credential }))
      .await;
    assert_eq!(res.status, StatusCode::OK, "sign-in failed: {:?}", res.body);
    let body = res.json();
    (
      body["token"].as_str().unwrap().to_string(),
      body["user"]["_id"].as_str().unwrap().to_string(),
    )
  }

  /// Create a recording and return its id.
  pub async fn create_recording(&self, token: &str, title: &str, is_public: bool) -> String {
    let res = self
      .send_json(
        "POST",
        "/api/recordings",
        Some(token),
        json!({
          "title": title,
          "notes": [{"key": "C4", "time": 0}, {"key": "G4", "time": 480.5}],
          "isPublic": is_public
        }),
      )
      .await;
    assert_eq!(res.status, StatusCode::CREATED);
    res.json()["insertedId"].as_str().unwrap().to_string()
  }

  /// Wait for the background cache write of a miss to land.
  pub async fn wait_cached(&self, key: &str) {
    for _ in 0..200 {
      if self.backend().live_keys().iter().any(|k| k == key) {
        return;
      }
      tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("key never cached: {}", key);
  }

  pub fn is_cached(&self, key: &str) -> bool {
    self.backend().live_keys().iter().any(|k| k == key)
  }
}

/// An unsigned-looking Google ID token; the server only reads its claims.
pub fn google_credential(sub: &str, name: &str) -> String {
  let claims = json!({
    "sub": sub,
    "email": format!("{}@example.com", sub),
    "name": name,
    "picture": "https://example.com/avatar.png",
    "aud": "steinway-web",
    "exp": 0
  });
  encode(&Header::default(), &claims, &EncodingKey::from_secret(b"google")).unwrap()
}

pub fn own_list_key(user_id: &str) -> String {
  format!("api_cache:/api/recordings/:{}:{{}}", user_id)
}

pub fn feed_key() -> String {
  "api_cache:/api/recordings/public:anonymous:{}".to_string()
}

pub fn profile_key(user_id: &str) -> String {
  format!("api_cache:/api/users/profile:{}:{{}}", user_id)
}
