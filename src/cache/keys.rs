//! Cache key derivation and invalidation patterns
//!
//! Key format: `api_cache:<basePath><subPath>:<userIdOrAnonymous>:<jsonQuery>`.
//! The invalidation patterns below depend on this layout byte for byte.

use serde_json::Value;
use std::collections::BTreeMap;

pub const KEY_PREFIX: &str = "api_cache";
pub const ANONYMOUS: &str = "anonymous";

pub const RECORDINGS_BASE: &str = "/api/recordings";
pub const USERS_BASE: &str = "/api/users";

/// Build the cache key for one read request.
///
/// `sub_path` is the part of the request path after `base_path`; an empty
/// remainder is treated as `/`, so `GET /api/recordings` and
/// `GET /api/recordings/` share a key.
pub fn cache_key(base_path: &str, sub_path: &str, user_id: Option<&str>, query: &str) -> String {
  let sub_path = if sub_path.is_empty() { "/" } else { sub_path };
  format!(
    "{}:{}{}:{}:{}",
    KEY_PREFIX,
    base_path,
    sub_path,
    user_id.unwrap_or(ANONYMOUS),
    canonical_query(query)
  )
}

/// Serialize a raw query string as a JSON object with sorted keys.
///
/// Repeated parameters become arrays in arrival order; a parameter without
/// `=` maps to an empty string. No query at all serializes as `{}`.
pub fn canonical_query(raw: &str) -> String {
  let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();

  for pair in raw.split('&').filter(|p| !p.is_empty()) {
    let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
    params
      .entry(decode_component(name))
      .or_default()
      .push(decode_component(value));
  }

  let object: BTreeMap<String, Value> = params
    .into_iter()
    .map(|(name, mut values)| {
      let value = if values.len() == 1 {
        Value::String(values.remove(0))
      } else {
        Value::Array(values.into_iter().map(Value::String).collect())
      };
      (name, value)
    })
    .collect();

  serde_json::to_string(&object).unwrap_or_else(|_| "{}".to_string())
}

fn decode_component(s: &str) -> String {
  let spaced = s.replace('+', " ");
  match urlencoding::decode(&spaced) {
    Ok(decoded) => decoded.into_owned(),
    Err(_) => spaced,
  }
}

/// Every cached list read of one user's recordings, whatever the query.
pub fn user_recordings_pattern(user_id: &str) -> String {
  format!("{}:{}/:{}:*", KEY_PREFIX, RECORDINGS_BASE, user_id)
}

/// Every cached read of the public feed, for any requester and query.
pub fn public_feed_pattern() -> String {
  format!("{}:{}/public:*:*", KEY_PREFIX, RECORDINGS_BASE)
}

/// Every cached read of one user's own profile.
pub fn user_profile_pattern(user_id: &str) -> String {
  format!("{}:{}/profile:{}:*", KEY_PREFIX, USERS_BASE, user_id)
}
