//! HTTP API
//!
//! Route table:
//!
//! | Route | Auth | Cache |
//! |---|---|---|
//! | `POST /api/users/google-auth` | - | - |
//! | `GET /api/users/profile` | bearer | read-through |
//! | `PUT /api/users/profile` | bearer | invalidates profile |
//! | `POST /api/upload/profile-image` | bearer | invalidates profile |
//! | `POST /api/recordings` | bearer | invalidates owner (+ feed) |
//! | `GET /api/recordings` | bearer | read-through |
//! | `GET /api/recordings/public` | - | read-through |
//! | `PUT/DELETE /api/recordings/{id}` | bearer | invalidates owner (+ feed) |
//! | `GET /health` | - | - |

pub mod auth;
pub mod error;
pub mod recordings;
pub mod upload;
pub mod users;

use axum::{
  extract::{DefaultBodyLimit, State},
  http::{header, Method},
  middleware::from_fn_with_state,
  routing::{get, post, put},
  Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::cache::keys::{RECORDINGS_BASE, USERS_BASE};
use crate::cache::{response_cache, CacheClient, CacheInvalidator, ResponseCache};
use crate::db::RecordStore;
use crate::server::ServerConfig;

pub use auth::{require_auth, TokenIssuer};
pub use error::{ApiError, ApiResult};

/// Shared handler state.
#[derive(Clone)]
pub struct ApiState {
  pub store: Arc<dyn RecordStore>,
  pub cache: CacheClient,
  pub invalidator: CacheInvalidator,
  pub tokens: Arc<TokenIssuer>,
  pub max_image_bytes: usize,
}

impl ApiState {
  pub fn new(store: Arc<dyn RecordStore>, cache: CacheClient, config: &ServerConfig) -> Self {
    Self {
      store,
      invalidator: CacheInvalidator::new(cache.clone()),
      cache,
      tokens: Arc::new(TokenIssuer::new(
        &config.auth.jwt_secret,
        config.auth.token_ttl_hours,
      )),
      max_image_bytes: config.upload.max_image_bytes,
    }
  }
}

pub fn build_router(state: ApiState, config: &ServerConfig) -> Router {
  let ttl = config.cache.default_ttl_secs;
  let max_cached = config.cache.max_cached_body_bytes;
  let recordings_cache = from_fn_with_state(
    ResponseCache::new(state.cache.clone(), RECORDINGS_BASE, ttl).with_max_body_bytes(max_cached),
    response_cache,
  );
  let users_cache = from_fn_with_state(
    ResponseCache::new(state.cache.clone(), USERS_BASE, ttl).with_max_body_bytes(max_cached),
    response_cache,
  );

  // Authentication runs before the cache layer so cached reads are keyed by user.
  let protected = Router::new()
    .route(
      RECORDINGS_BASE,
      get(recordings::list_own)
        .layer(recordings_cache.clone())
        .post(recordings::create),
    )
    .route(
      "/api/recordings/{id}",
      put(recordings::update_visibility).delete(recordings::delete),
    )
    .route(
      "/api/users/profile",
      get(users::get_profile)
        .layer(users_cache)
        .put(users::update_profile),
    )
    .route("/api/upload/profile-image", post(upload::profile_image))
    .route_layer(from_fn_with_state(state.clone(), require_auth));

  let public = Router::new()
    .route(
      "/api/recordings/public",
      get(recordings::public_feed).layer(recordings_cache),
    )
    .route("/api/users/google-auth", post(users::google_auth))
    .route("/health", get(health));

  Router::new()
    .merge(protected)
    .merge(public)
    .layer(DefaultBodyLimit::max(config.server.max_body_bytes))
    .layer(cors_layer(&config.server.cors_origins))
    .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
  if origins.iter().any(|o| o == "*") {
    return CorsLayer::permissive();
  }
  let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
  CorsLayer::new()
    .allow_origin(origins)
    .allow_credentials(true)
    .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
    .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

async fn health(State(state): State<ApiState>) -> Json<Value> {
  Json(json!({
    "status": "ok",
    "cache": state.cache.state(),
  }))
}
