use thiserror::Error;

/// Failure talking to the cache backend.
///
/// These never reach an HTTP caller: [`CacheClient`](super::CacheClient)
/// absorbs them and substitutes a fallback value.
#[derive(Debug, Error)]
pub enum CacheError {
  /// The connection is gone or could not be established.
  #[error("cache connection error: {0}")]
  Connection(String),

  /// The backend answered with an error for a single command.
  #[error("cache backend error: {0}")]
  Backend(String),

  #[error("cache operation timed out after {0}ms")]
  Timeout(u64),
}

impl CacheError {
  /// Whether this error means the connection itself is unusable,
  /// as opposed to a single failed command.
  pub fn is_connection_loss(&self) -> bool {
    matches!(self, CacheError::Connection(_) | CacheError::Timeout(_))
  }
}

impl From<redis::RedisError> for CacheError {
  fn from(e: redis::RedisError) -> Self {
    if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout()
    {
      CacheError::Connection(e.to_string())
    } else {
      CacheError::Backend(e.to_string())
    }
  }
}

pub type CacheResult<T> = Result<T, CacheError>;
