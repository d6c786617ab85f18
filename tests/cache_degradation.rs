mod common;

use axum::http::StatusCode;
use common::{own_list_key, TestApp};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use steinway::cache::{
  CacheClient, ConnectionState, InMemoryBackend, InMemoryConnector, ReconnectPolicy,
};

fn fast_policy(max_retries: u32) -> ReconnectPolicy {
  ReconnectPolicy {
    max_retries,
    step: Duration::from_millis(5),
    max_delay: Duration::from_millis(20),
  }
}

async fn wait_for_state(client: &CacheClient, want: ConnectionState) {
  for _ in 0..400 {
    if client.state() == want {
      return;
    }
    tokio::time::sleep(Duration::from_millis(5)).await;
  }
  panic!("cache never reached {}, stuck at {}", want, client.state());
}

// ============================================================
// No cache at all
// ============================================================

#[tokio::test]
async fn test_disabled_cache_serves_every_request_from_store() {
  let app = TestApp::with_cache(CacheClient::disabled()).await;
  let (token, _) = app.sign_in("g-ada", "Ada").await;
  let id = app.create_recording(&token, "Offline", true).await;

  for _ in 0..2 {
    let res = app.get("/api/recordings", Some(&token)).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.cache_status(), None);
  }
  assert_eq!(app.store.owner_lists(), 2);

  let res = app
    .send_json("PUT", &format!("/api/recordings/{}", id), Some(&token), json!({"isPublic": false}))
    .await;
  assert_eq!(res.status, StatusCode::OK);
  let res = app.delete(&format!("/api/recordings/{}", id), &token).await;
  assert_eq!(res.status, StatusCode::OK);

  let health = app.get("/health", None).await;
  assert_eq!(health.json(), json!({"status": "ok", "cache": "disconnected"}));
}

// ============================================================
// Backend failing mid-flight
// ============================================================

#[tokio::test]
async fn test_failing_backend_is_absorbed_and_recovers() {
  let backend = Arc::new(InMemoryBackend::new());
  let client = CacheClient::new(
    Arc::new(InMemoryConnector::new(backend.clone())),
    fast_policy(1000),
  );
  assert_eq!(client.connect().await, ConnectionState::Connected);

  let mut app = TestApp::with_cache(client.clone()).await;
  app.backend = Some(backend.clone());
  let (token, user_id) = app.sign_in("g-ada", "Ada").await;

  backend.set_failing(true);

  let res = app.get("/api/recordings", Some(&token)).await;
  assert_eq!(res.status, StatusCode::OK);
  assert_eq!(res.json(), json!([]));
  assert_ne!(client.state(), ConnectionState::Connected);

  // Writes still succeed while the cache is down.
  app.create_recording(&token, "During outage", false).await;
  let res = app.get("/api/recordings", Some(&token)).await;
  assert_eq!(res.status, StatusCode::OK);
  assert_eq!(res.json().as_array().unwrap().len(), 1);

  backend.set_failing(false);
  wait_for_state(&client, ConnectionState::Connected).await;

  app.get("/api/recordings", Some(&token)).await;
  app.wait_cached(&own_list_key(&user_id)).await;
  let res = app.get("/api/recordings", Some(&token)).await;
  assert_eq!(res.cache_status(), Some("HIT"));
}

#[tokio::test]
async fn test_reconnect_gives_up_after_retry_ceiling() {
  let backend = Arc::new(InMemoryBackend::new());
  backend.set_failing(true);
  let client = CacheClient::new(
    Arc::new(InMemoryConnector::new(backend.clone())),
    fast_policy(3),
  );

  assert_eq!(client.connect().await, ConnectionState::Exhausted);
  assert!(!client.is_connected());

  // Exhausted is terminal even once the backend comes back.
  backend.set_failing(false);
  assert_eq!(client.connect().await, ConnectionState::Exhausted);
  assert_eq!(client.get("anything").await, None);
}

#[tokio::test]
async fn test_spawn_connect_does_not_block() {
  let backend = Arc::new(InMemoryBackend::new());
  let client = CacheClient::new(
    Arc::new(InMemoryConnector::new(backend)),
    fast_policy(3),
  );
  assert_eq!(client.state(), ConnectionState::Disconnected);
  client.spawn_connect();
  wait_for_state(&client, ConnectionState::Connected).await;
}
