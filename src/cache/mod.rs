//! Read-through HTTP response cache
//!
//! - `backend`: the key/value contract plus a process-local implementation
//! - `redis_backend`: Redis implementation (SCAN for patterns, bounded commands)
//! - `client`: connection lifecycle and the never-fail `safe_operation`
//! - `keys`: key layout and invalidation patterns
//! - `middleware`: axum middleware serving hits and capturing misses
//! - `invalidation`: write events mapped to key patterns

mod backend;
pub mod client;
mod error;
pub mod invalidation;
pub mod keys;
pub mod middleware;
mod redis_backend;

pub use backend::{glob_to_regex, BackendConnector, CacheBackend, InMemoryBackend, InMemoryConnector};
pub use client::{CacheClient, ConnectionState, ReconnectPolicy};
pub use error::{CacheError, CacheResult};
pub use invalidation::CacheInvalidator;
pub use middleware::{response_cache, ResponseCache, CACHE_STATUS_HEADER};
pub use redis_backend::{redact_url, RedisBackend, RedisConnector};
