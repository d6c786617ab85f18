use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::cache::ReconnectPolicy;

/// Expand environment variables in a string.
/// Supports `$VAR_NAME` and `${VAR_NAME}`; unset variables expand to "".
fn expand_env_vars(input: &str) -> String {
  let mut out = String::with_capacity(input.len());
  let mut rest = input;

  while let Some(pos) = rest.find('$') {
    out.push_str(&rest[..pos]);
    let after = &rest[pos + 1..];

    if let Some(braced) = after.strip_prefix('{') {
      match braced.find('}') {
        Some(end) => {
          out.push_str(&std::env::var(&braced[..end]).unwrap_or_default());
          rest = &braced[end + 1..];
        }
        None => {
          out.push_str(&rest[pos..]);
          rest = "";
        }
      }
      continue;
    }

    let name_len = after
      .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
      .unwrap_or(after.len());
    if name_len == 0 {
      out.push('$');
    } else {
      out.push_str(&std::env::var(&after[..name_len]).unwrap_or_default());
    }
    rest = &after[name_len..];
  }

  out.push_str(rest);
  out
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
  #[serde(default)]
  pub server: ServerSection,
  #[serde(default)]
  pub store: StoreSection,
  #[serde(default)]
  pub cache: CacheSection,
  #[serde(default)]
  pub auth: AuthSection,
  #[serde(default)]
  pub upload: UploadSection,
  #[serde(default)]
  pub logging: LoggingSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
  #[serde(default = "default_host")]
  pub host: String,
  #[serde(default = "default_port")]
  pub port: u16,
  /// Allowed CORS origins. `*` allows any origin.
  #[serde(default = "default_cors_origins")]
  pub cors_origins: Vec<String>,
  /// Upper bound on request bodies, in bytes.
  #[serde(default = "default_max_body_bytes")]
  pub max_body_bytes: usize,
}

fn default_host() -> String {
  "0.0.0.0".into()
}
fn default_port() -> u16 {
  5000
}
fn default_cors_origins() -> Vec<String> {
  vec!["http://localhost:3000".into()]
}
fn default_max_body_bytes() -> usize {
  21 * 1024 * 1024
}

impl Default for ServerSection {
  fn default() -> Self {
    Self {
      host: default_host(),
      port: default_port(),
      cors_origins: default_cors_origins(),
      max_body_bytes: default_max_body_bytes(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSection {
  #[serde(default = "default_sqlite_path")]
  pub path: String,
}

fn default_sqlite_path() -> String {
  "steinway.db".into()
}

impl Default for StoreSection {
  fn default() -> Self {
    Self {
      path: default_sqlite_path(),
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
  /// External Redis at `cache.url`.
  #[default]
  Redis,
  /// Process-local map; nothing shared between instances.
  Memory,
  Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSection {
  #[serde(default)]
  pub mode: CacheMode,
  #[serde(default = "default_redis_url")]
  pub url: String,
  #[serde(default = "default_ttl_secs")]
  pub default_ttl_secs: u64,
  #[serde(default = "default_operation_timeout_ms")]
  pub operation_timeout_ms: u64,
  #[serde(default = "default_connect_timeout_ms")]
  pub connect_timeout_ms: u64,
  #[serde(default)]
  pub reconnect: ReconnectSection,
  #[serde(default = "default_max_cached_body_bytes")]
  pub max_cached_body_bytes: usize,
}

fn default_redis_url() -> String {
  "redis://localhost:6379".into()
}
fn default_ttl_secs() -> u64 {
  600
}
fn default_operation_timeout_ms() -> u64 {
  1000
}
fn default_connect_timeout_ms() -> u64 {
  5000
}
fn default_max_cached_body_bytes() -> usize {
  8 * 1024 * 1024
}

impl Default for CacheSection {
  fn default() -> Self {
    Self {
      mode: CacheMode::default(),
      url: default_redis_url(),
      default_ttl_secs: default_ttl_secs(),
      operation_timeout_ms: default_operation_timeout_ms(),
      connect_timeout_ms: default_connect_timeout_ms(),
      reconnect: ReconnectSection::default(),
      max_cached_body_bytes: default_max_cached_body_bytes(),
    }
  }
}

impl CacheSection {
  pub fn operation_timeout(&self) -> Duration {
    Duration::from_millis(self.operation_timeout_ms)
  }

  pub fn connect_timeout(&self) -> Duration {
    Duration::from_millis(self.connect_timeout_ms)
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectSection {
  #[serde(default = "default_max_retries")]
  pub max_retries: u32,
  #[serde(default = "default_step_ms")]
  pub step_ms: u64,
  #[serde(default = "default_max_delay_ms")]
  pub max_delay_ms: u64,
}

fn default_max_retries() -> u32 {
  10
}
fn default_step_ms() -> u64 {
  100
}
fn default_max_delay_ms() -> u64 {
  3000
}

impl Default for ReconnectSection {
  fn default() -> Self {
    Self {
      max_retries: default_max_retries(),
      step_ms: default_step_ms(),
      max_delay_ms: default_max_delay_ms(),
    }
  }
}

impl ReconnectSection {
  pub fn policy(&self) -> ReconnectPolicy {
    ReconnectPolicy {
      max_retries: self.max_retries,
      step: Duration::from_millis(self.step_ms),
      max_delay: Duration::from_millis(self.max_delay_ms),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSection {
  /// HMAC secret for bearer tokens. Must be set outside development.
  #[serde(default)]
  pub jwt_secret: String,
  #[serde(default = "default_token_ttl_hours")]
  pub token_ttl_hours: i64,
}

fn default_token_ttl_hours() -> i64 {
  24
}

impl Default for AuthSection {
  fn default() -> Self {
    Self {
      jwt_secret: String::new(),
      token_ttl_hours: default_token_ttl_hours(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSection {
  #[serde(default = "default_max_image_bytes")]
  pub max_image_bytes: usize,
}

fn default_max_image_bytes() -> usize {
  5 * 1024 * 1024
}

impl Default for UploadSection {
  fn default() -> Self {
    Self {
      max_image_bytes: default_max_image_bytes(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
  #[serde(default = "default_log_level")]
  pub level: String,
}

fn default_log_level() -> String {
  "info".into()
}

impl Default for LoggingSection {
  fn default() -> Self {
    Self {
      level: default_log_level(),
    }
  }
}

impl ServerConfig {
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, anyhow::Error> {
    let content = std::fs::read_to_string(&path)?;
    Self::from_yaml(&content)
  }

  pub fn from_yaml(content: &str) -> Result<Self, anyhow::Error> {
    Ok(serde_yaml::from_str(&expand_env_vars(content))?)
  }

  pub fn find_and_load() -> Result<Option<Self>, anyhow::Error> {
    for p in ["steinway.yaml", "steinway.yml"] {
      if Path::new(p).exists() {
        tracing::info!("Loading config from {}", p);
        return Ok(Some(Self::from_file(p)?));
      }
    }
    Ok(None)
  }

  pub fn address(&self) -> String {
    format!("{}:{}", self.server.host, self.server.port)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let config = ServerConfig::default();
    assert_eq!(config.address(), "0.0.0.0:5000");
    assert_eq!(config.cache.mode, CacheMode::Redis);
    assert_eq!(config.cache.default_ttl_secs, 600);
    assert_eq!(config.auth.token_ttl_hours, 24);
    assert_eq!(config.upload.max_image_bytes, 5 * 1024 * 1024);

    let policy = config.cache.reconnect.policy();
    assert_eq!(policy.max_retries, 10);
    assert_eq!(policy.delay(2), Duration::from_millis(200));
  }

  #[test]
  fn test_partial_yaml_keeps_defaults() {
    let config = ServerConfig::from_yaml(
      r#"
server:
  port: 8080
cache:
  mode: memory
  reconnect:
    max_retries: 3
"#,
    )
    .unwrap();
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.cache.mode, CacheMode::Memory);
    assert_eq!(config.cache.reconnect.max_retries, 3);
    assert_eq!(config.cache.reconnect.step_ms, 100);
    assert_eq!(config.store.path, "steinway.db");
  }

  #[test]
  fn test_env_expansion() {
    std::env::set_var("STEINWAY_TEST_REDIS_HOST", "cache.internal");
    std::env::set_var("STEINWAY_TEST_SECRET", "s3cret");
    assert_eq!(
      expand_env_vars("redis://${STEINWAY_TEST_REDIS_HOST}:6379"),
      "redis://cache.internal:6379"
    );
    assert_eq!(expand_env_vars("key: $STEINWAY_TEST_SECRET!"), "key: s3cret!");
    assert_eq!(expand_env_vars("cost: $5"), "cost: ");
    assert_eq!(expand_env_vars("lone $ sign"), "lone $ sign");
    assert_eq!(expand_env_vars("open ${NOPE"), "open ${NOPE");
    assert_eq!(expand_env_vars("${STEINWAY_TEST_UNSET_VAR}"), "");
  }
}
