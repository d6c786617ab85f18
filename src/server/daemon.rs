use std::sync::Arc;
use tokio::sync::broadcast;

use super::config::{CacheMode, CacheSection};
use super::ServerConfig;
use crate::api::{build_router, ApiState};
use crate::cache::{redact_url, CacheClient, InMemoryBackend, RedisConnector};
use crate::db::RecordStore;

/// Build the cache client described by `cache`. The client starts
/// disconnected; call [`CacheClient::spawn_connect`] to bring it up.
pub fn cache_client(cache: &CacheSection) -> CacheClient {
  match cache.mode {
    CacheMode::Redis => {
      tracing::info!("Response cache: redis at {}", redact_url(&cache.url));
      CacheClient::new(
        Arc::new(RedisConnector::new(
          cache.url.clone(),
          cache.connect_timeout(),
          cache.operation_timeout(),
        )),
        cache.reconnect.policy(),
      )
    }
    CacheMode::Memory => {
      tracing::info!("Response cache: in-process memory");
      CacheClient::in_memory(Arc::new(InMemoryBackend::new()))
    }
    CacheMode::Disabled => {
      tracing::info!("Response cache disabled");
      CacheClient::disabled()
    }
  }
}

pub struct Daemon {
  config: ServerConfig,
  store: Arc<dyn RecordStore>,
  cache: CacheClient,
  shutdown_tx: broadcast::Sender<()>,
}

impl Daemon {
  pub fn new(config: ServerConfig, store: Arc<dyn RecordStore>) -> Self {
    let (shutdown_tx, _) = broadcast::channel(1);
    let cache = cache_client(&config.cache);
    Self {
      config,
      store,
      cache,
      shutdown_tx,
    }
  }

  /// Trigger graceful shutdown of the HTTP server
  pub fn shutdown(&self) {
    tracing::info!("Initiating graceful shutdown...");
    let _ = self.shutdown_tx.send(());
  }

  pub async fn run(&self) -> Result<(), anyhow::Error> {
    if self.config.auth.jwt_secret.is_empty() {
      anyhow::bail!("auth.jwt_secret is not set (use --jwt-secret or JWT_SECRET)");
    }

    self.store.init_schema().await?;

    // The server accepts requests while the cache is still connecting;
    // reads fall through to the store until it is up.
    self.cache.spawn_connect();

    let state = ApiState::new(self.store.clone(), self.cache.clone(), &self.config);
    let app = build_router(state, &self.config);

    let addr = self.config.address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Steinway API listening on {}", addr);

    let mut shutdown_rx = self.shutdown_tx.subscribe();
    axum::serve(listener, app)
      .with_graceful_shutdown(async move {
        let _ = shutdown_rx.recv().await;
      })
      .await?;

    tracing::info!("HTTP server stopped");
    Ok(())
  }
}
