mod config;
mod daemon;

pub use config::{
  AuthSection, CacheMode, CacheSection, LoggingSection, ReconnectSection, ServerConfig,
  ServerSection, StoreSection, UploadSection,
};
pub use daemon::{cache_client, Daemon};
