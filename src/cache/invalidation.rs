//! Pattern-based invalidation tied to domain write events
//!
//! Purges are coarse: a write drops every cached read it could
//! have affected rather than computing exact keys. Public feed responses embed
//! the author's profile fields, so profile edits reach the feed too.

use super::client::CacheClient;
use super::keys::{public_feed_pattern, user_profile_pattern, user_recordings_pattern};

#[derive(Clone)]
pub struct CacheInvalidator {
  client: CacheClient,
}

impl CacheInvalidator {
  pub fn new(client: CacheClient) -> Self {
    Self { client }
  }

  /// Delete every live key matching any of `patterns`.
  /// Returns the number of keys removed; a disconnected cache removes none.
  pub async fn invalidate(&self, patterns: &[String]) -> u64 {
    if !self.client.is_connected() {
      tracing::info!("Cache not available - skipping cache invalidation");
      return 0;
    }

    let mut removed = 0;
    for pattern in patterns {
      let keys = self.client.keys_matching(pattern).await;
      if keys.is_empty() {
        continue;
      }
      let count = self.client.delete_keys(&keys).await;
      tracing::info!(
        "Invalidated {} cache entries for pattern: {}",
        count,
        pattern
      );
      removed += count;
    }
    removed
  }

  /// A recording owned by `user_id` was created, updated or deleted.
  pub async fn user_recordings_changed(&self, user_id: &str) -> u64 {
    self.invalidate(&[user_recordings_pattern(user_id)]).await
  }

  /// The set or content of public recordings changed.
  pub async fn public_feed_changed(&self) -> u64 {
    self.invalidate(&[public_feed_pattern()]).await
  }

  /// Profile fields or image changed for `user_id`.
  pub async fn profile_changed(&self, user_id: &str) -> u64 {
    self
      .invalidate(&[
        user_profile_pattern(user_id),
        public_feed_pattern(),
        user_recordings_pattern(user_id),
      ])
      .await
  }
}
