//! Resilient cache client
//!
//! Owns the connection lifecycle to the cache backend and turns every
//! backend failure into a fallback value. A request never fails because the
//! cache did.
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──ok──▶ Connected
//!      ▲                        │                  │
//!      └──────retry (backoff)───┘     connection lost
//!                               │                  │
//!                       ceiling exceeded           ▼
//!                               ▼             Disconnected ─▶ (reconnect task)
//!                           Exhausted
//! ```

use parking_lot::RwLock;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::backend::{BackendConnector, CacheBackend, InMemoryBackend, InMemoryConnector};
use super::error::{CacheError, CacheResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
  Disconnected,
  Connecting,
  Connected,
  /// Gave up after the retry ceiling; stays here until restart.
  Exhausted,
}

impl std::fmt::Display for ConnectionState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ConnectionState::Disconnected => write!(f, "disconnected"),
      ConnectionState::Connecting => write!(f, "connecting"),
      ConnectionState::Connected => write!(f, "connected"),
      ConnectionState::Exhausted => write!(f, "exhausted"),
    }
  }
}

/// Backoff schedule for reconnection attempts.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
  /// Consecutive failed attempts allowed before giving up.
  pub max_retries: u32,
  /// Delay grows by this much per attempt.
  pub step: Duration,
  pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
  fn default() -> Self {
    Self {
      max_retries: 10,
      step: Duration::from_millis(100),
      max_delay: Duration::from_millis(3000),
    }
  }
}

impl ReconnectPolicy {
  /// Delay before attempt number `attempt` (1-based).
  pub fn delay(&self, attempt: u32) -> Duration {
    self.step.saturating_mul(attempt).min(self.max_delay)
  }
}

/// A live backend tagged with the connect attempt that produced it.
#[derive(Clone)]
struct Session {
  generation: u64,
  backend: Arc<dyn CacheBackend>,
}

struct Inner {
  connector: Arc<dyn BackendConnector>,
  policy: ReconnectPolicy,
  state: RwLock<ConnectionState>,
  session: RwLock<Option<Session>>,
  generations: AtomicU64,
  reconnecting: AtomicBool,
}

impl Inner {
  fn install(&self, backend: Arc<dyn CacheBackend>) {
    let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
    *self.session.write() = Some(Session {
      generation,
      backend,
    });
    *self.state.write() = ConnectionState::Connected;
  }
}

/// Cheaply cloneable handle shared by the middleware and the invalidator.
#[derive(Clone)]
pub struct CacheClient {
  inner: Option<Arc<Inner>>,
}

impl CacheClient {
  pub fn new(connector: Arc<dyn BackendConnector>, policy: ReconnectPolicy) -> Self {
    Self {
      inner: Some(Arc::new(Inner {
        connector,
        policy,
        state: RwLock::new(ConnectionState::Disconnected),
        session: RwLock::new(None),
        generations: AtomicU64::new(0),
        reconnecting: AtomicBool::new(false),
      })),
    }
  }

  /// A client with caching switched off. Every operation returns its fallback.
  pub fn disabled() -> Self {
    Self { inner: None }
  }

  /// A client already connected to the given in-memory backend.
  pub fn in_memory(backend: Arc<InMemoryBackend>) -> Self {
    let client = Self::new(
      Arc::new(InMemoryConnector::new(backend.clone())),
      ReconnectPolicy::default(),
    );
    if let Some(inner) = &client.inner {
      inner.install(backend);
    }
    client
  }

  pub fn state(&self) -> ConnectionState {
    match &self.inner {
      Some(inner) => *inner.state.read(),
      None => ConnectionState::Disconnected,
    }
  }

  pub fn is_connected(&self) -> bool {
    self.state() == ConnectionState::Connected
  }

  /// Connect with retries, in the background. Returns immediately.
  pub fn spawn_connect(&self) {
    if let Some(inner) = &self.inner {
      spawn_reconnect(inner.clone());
    }
  }

  /// Connect with retries and wait for the outcome. Never returns an error:
  /// a backend that cannot be reached leaves the client disconnected.
  pub async fn connect(&self) -> ConnectionState {
    let Some(inner) = &self.inner else {
      return ConnectionState::Disconnected;
    };
    if inner.reconnecting.swap(true, Ordering::SeqCst) {
      return self.state();
    }
    let state = run_connect_loop(inner).await;
    inner.reconnecting.store(false, Ordering::SeqCst);
    state
  }

  /// Run `op` against the backend if connected; otherwise, or on any error,
  /// return `fallback`. Connection-class errors flip the client to
  /// `Disconnected` and start a background reconnect.
  pub async fn safe_operation<T, F, Fut>(&self, op: F, fallback: T) -> T
  where
    F: FnOnce(Arc<dyn CacheBackend>) -> Fut,
    Fut: Future<Output = CacheResult<T>>,
  {
    let Some(inner) = &self.inner else {
      return fallback;
    };
    let session = match (self.state(), inner.session.read().clone()) {
      (ConnectionState::Connected, Some(session)) => session,
      _ => return fallback,
    };

    match op(session.backend).await {
      Ok(value) => value,
      Err(e) => {
        tracing::error!("Cache operation failed: {}", e);
        if e.is_connection_loss() {
          mark_disconnected(inner, session.generation);
        }
        fallback
      }
    }
  }

  pub async fn get(&self, key: &str) -> Option<String> {
    self
      .safe_operation(|b| async move { b.get(key).await }, None)
      .await
  }

  pub async fn set_with_expiry(&self, key: &str, value: &str, ttl_secs: u64) {
    self
      .safe_operation(|b| async move { b.set_ex(key, value, ttl_secs).await }, ())
      .await
  }

  pub async fn keys_matching(&self, pattern: &str) -> Vec<String> {
    self
      .safe_operation(|b| async move { b.keys(pattern).await }, Vec::new())
      .await
  }

  pub async fn delete_keys(&self, keys: &[String]) -> u64 {
    if keys.is_empty() {
      return 0;
    }
    self
      .safe_operation(|b| async move { b.del(keys).await }, 0)
      .await
  }
}

/// Drop the session an operation failed on. A failure on an older session
/// than the current one is stale and leaves the newer connection alone.
fn mark_disconnected(inner: &Arc<Inner>, generation: u64) {
  {
    let mut session = inner.session.write();
    if session.as_ref().map(|s| s.generation) != Some(generation) {
      return;
    }
    let mut state = inner.state.write();
    if *state != ConnectionState::Connected {
      return;
    }
    *state = ConnectionState::Disconnected;
    *session = None;
  }
  tracing::warn!("Cache backend disconnected");
  spawn_reconnect(inner.clone());
}

fn spawn_reconnect(inner: Arc<Inner>) {
  if inner.reconnecting.swap(true, Ordering::SeqCst) {
    return;
  }
  tokio::spawn(async move {
    run_connect_loop(&inner).await;
    inner.reconnecting.store(false, Ordering::SeqCst);
  });
}

async fn run_connect_loop(inner: &Inner) -> ConnectionState {
  let target = inner.connector.describe();
  let mut attempt: u32 = 0;

  loop {
    if *inner.state.read() == ConnectionState::Exhausted {
      return ConnectionState::Exhausted;
    }
    *inner.state.write() = ConnectionState::Connecting;

    match inner.connector.connect().await {
      Ok(backend) => {
        let name = backend.name();
        inner.install(backend);
        tracing::info!("Cache connected ({} at {})", name, target);
        return ConnectionState::Connected;
      }
      Err(e) => {
        attempt += 1;
        *inner.state.write() = ConnectionState::Disconnected;
        if attempt > inner.policy.max_retries {
          *inner.state.write() = ConnectionState::Exhausted;
          tracing::error!(
            "Cache: max reconnection attempts reached ({}), continuing without caching",
            inner.policy.max_retries
          );
          return ConnectionState::Exhausted;
        }
        let delay = inner.policy.delay(attempt);
        log_connect_failure(&target, attempt, delay, &e);
        tokio::time::sleep(delay).await;
      }
    }
  }
}

fn log_connect_failure(target: &str, attempt: u32, delay: Duration, e: &CacheError) {
  tracing::warn!(
    "Cache connection to {} failed (attempt {}): {}; retrying in {}ms",
    target,
    attempt,
    e,
    delay.as_millis()
  );
}
