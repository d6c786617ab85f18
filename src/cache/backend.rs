//! Key/value backend abstraction for the response cache

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::error::{CacheError, CacheResult};

/// The four commands the response cache needs from a key/value store:
/// `GET`, `SETEX`, pattern scan and `DEL`.
#[async_trait]
pub trait CacheBackend: Send + Sync {
  async fn get(&self, key: &str) -> CacheResult<Option<String>>;
  async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> CacheResult<()>;
  /// All live keys matching a glob pattern (`*` and `?` wildcards).
  async fn keys(&self, pattern: &str) -> CacheResult<Vec<String>>;
  /// Delete the given keys, returning how many existed.
  async fn del(&self, keys: &[String]) -> CacheResult<u64>;
  async fn ping(&self) -> CacheResult<()>;

  fn name(&self) -> &'static str;
}

/// Opens connections to a backend. The cache client calls this on startup
/// and again on every reconnection attempt.
#[async_trait]
pub trait BackendConnector: Send + Sync {
  async fn connect(&self) -> CacheResult<Arc<dyn CacheBackend>>;

  /// Human-readable target for logs (credentials redacted).
  fn describe(&self) -> String;
}

#[derive(Debug, Clone)]
struct Entry {
  value: String,
  expires_at: Instant,
}

impl Entry {
  fn is_expired(&self) -> bool {
    Instant::now() >= self.expires_at
  }
}

/// Process-local backend used when no Redis is configured and in tests.
///
/// Expiry is lazy: expired entries are dropped when touched or scanned.
/// `set_failing(true)` makes every command fail with a connection error,
/// which is how tests simulate a backend outage. `set_rejecting(true)`
/// instead fails each command on its own, like a `WRONGTYPE` reply.
pub struct InMemoryBackend {
  data: RwLock<HashMap<String, Entry>>,
  failing: AtomicBool,
  rejecting: AtomicBool,
}

impl InMemoryBackend {
  pub fn new() -> Self {
    Self {
      data: RwLock::new(HashMap::new()),
      failing: AtomicBool::new(false),
      rejecting: AtomicBool::new(false),
    }
  }

  pub fn set_failing(&self, failing: bool) {
    self.failing.store(failing, Ordering::SeqCst);
  }

  pub fn set_rejecting(&self, rejecting: bool) {
    self.rejecting.store(rejecting, Ordering::SeqCst);
  }

  /// Number of live entries.
  pub fn len(&self) -> usize {
    self.data.read().values().filter(|e| !e.is_expired()).count()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Snapshot of live keys, for assertions.
  pub fn live_keys(&self) -> Vec<String> {
    let mut keys: Vec<String> = self
      .data
      .read()
      .iter()
      .filter(|(_, e)| !e.is_expired())
      .map(|(k, _)| k.clone())
      .collect();
    keys.sort();
    keys
  }

  fn check(&self) -> CacheResult<()> {
    if self.failing.load(Ordering::SeqCst) {
      Err(CacheError::Connection("in-memory backend marked as failing".into()))
    } else if self.rejecting.load(Ordering::SeqCst) {
      Err(CacheError::Backend("in-memory backend rejected the command".into()))
    } else {
      Ok(())
    }
  }
}

impl Default for InMemoryBackend {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl CacheBackend for InMemoryBackend {
  async fn get(&self, key: &str) -> CacheResult<Option<String>> {
    self.check()?;
    let mut data = self.data.write();
    match data.get(key) {
      Some(entry) if entry.is_expired() => {
        data.remove(key);
        Ok(None)
      }
      Some(entry) => Ok(Some(entry.value.clone())),
      None => Ok(None),
    }
  }

  async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> CacheResult<()> {
    self.check()?;
    let entry = Entry {
      value: value.to_string(),
      expires_at: Instant::now() + Duration::from_secs(ttl_secs.max(1)),
    };
    self.data.write().insert(key.to_string(), entry);
    Ok(())
  }

  async fn keys(&self, pattern: &str) -> CacheResult<Vec<String>> {
    self.check()?;
    let mut data = self.data.write();
    data.retain(|_, e| !e.is_expired());

    if pattern == "*" {
      return Ok(data.keys().cloned().collect());
    }

    let regex = glob_to_regex(pattern)
      .map_err(|e| CacheError::Backend(format!("bad key pattern {}: {}", pattern, e)))?;
    Ok(data.keys().filter(|k| regex.is_match(k)).cloned().collect())
  }

  async fn del(&self, keys: &[String]) -> CacheResult<u64> {
    self.check()?;
    let mut data = self.data.write();
    let removed = keys.iter().filter(|k| data.remove(*k).is_some()).count();
    Ok(removed as u64)
  }

  async fn ping(&self) -> CacheResult<()> {
    self.check()
  }

  fn name(&self) -> &'static str {
    "memory"
  }
}

/// Connector that always hands out the same shared in-memory backend.
pub struct InMemoryConnector {
  backend: Arc<InMemoryBackend>,
}

impl InMemoryConnector {
  pub fn new(backend: Arc<InMemoryBackend>) -> Self {
    Self { backend }
  }
}

#[async_trait]
impl BackendConnector for InMemoryConnector {
  async fn connect(&self) -> CacheResult<Arc<dyn CacheBackend>> {
    self.backend.ping().await?;
    Ok(self.backend.clone())
  }

  fn describe(&self) -> String {
    "memory://local".to_string()
  }
}

/// Convert a Redis-style glob pattern to an anchored regex.
pub fn glob_to_regex(pattern: &str) -> Result<regex::Regex, regex::Error> {
  let mut regex_str = String::with_capacity(pattern.len() * 2);
  regex_str.push('^');

  for c in pattern.chars() {
    match c {
      '*' => regex_str.push_str(".*"),
      '?' => regex_str.push('.'),
      '.' | '+' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '^' | '$' | '\\' => {
        regex_str.push('\\');
        regex_str.push(c);
      }
      _ => regex_str.push(c),
    }
  }

  regex_str.push('$');
  regex::Regex::new(&regex_str)
}
