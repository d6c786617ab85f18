use clap::Parser;
use std::sync::Arc;
use steinway::db::{RecordStore, SqliteStore};
use steinway::server::{CacheMode, Daemon, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "steinwayd", about = "Steinway recordings API server", version)]
struct Args {
  #[arg(long, env = "STEINWAY_SQLITE_PATH")]
  sqlite: Option<String>,
  #[arg(long, env = "REDIS_URL")]
  redis_url: Option<String>,
  /// Run without Redis, caching in process memory
  #[arg(long, conflicts_with = "no_cache")]
  memory_cache: bool,
  #[arg(long)]
  no_cache: bool,
  #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
  jwt_secret: Option<String>,
  #[arg(short, long, env = "PORT")]
  port: Option<u16>,
  #[arg(long)]
  host: Option<String>,
  #[arg(short, long)]
  config: Option<String>,
  #[arg(long)]
  log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
  let args = Args::parse();

  // Load config: explicit path > auto-detect > defaults
  let mut config = if let Some(path) = &args.config {
    ServerConfig::from_file(path)?
  } else {
    ServerConfig::find_and_load()?.unwrap_or_default()
  };

  // CLI args override config file
  if let Some(path) = args.sqlite {
    config.store.path = path;
  }
  if let Some(url) = args.redis_url {
    config.cache.url = url;
    config.cache.mode = CacheMode::Redis;
  }
  if args.memory_cache {
    config.cache.mode = CacheMode::Memory;
  }
  if args.no_cache {
    config.cache.mode = CacheMode::Disabled;
  }
  if let Some(secret) = args.jwt_secret {
    config.auth.jwt_secret = secret;
  }
  if let Some(port) = args.port {
    config.server.port = port;
  }
  if let Some(host) = args.host {
    config.server.host = host;
  }
  if let Some(level) = args.log_level {
    config.logging.level = level;
  }

  tracing_subscriber::registry()
    .with(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into()),
    )
    .with(tracing_subscriber::fmt::layer())
    .init();

  let store: Arc<dyn RecordStore> = Arc::new(SqliteStore::new(&config.store.path).await?);

  let daemon = Arc::new(Daemon::new(config, store));
  let daemon_clone = daemon.clone();

  // Handle shutdown signals (SIGINT, SIGTERM)
  tokio::spawn(async move {
    shutdown_signal().await;
    daemon_clone.shutdown();
  });

  daemon.run().await?;
  tracing::info!("Shutdown complete");
  Ok(())
}

async fn shutdown_signal() {
  let ctrl_c = async {
    if let Err(e) = tokio::signal::ctrl_c().await {
      tracing::error!("Failed to listen for Ctrl+C: {}", e);
      std::future::pending::<()>().await;
    }
  };

  #[cfg(unix)]
  let terminate = async {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
      Ok(mut sig) => {
        sig.recv().await;
      }
      Err(e) => {
        tracing::error!("Failed to install SIGTERM handler: {}", e);
        std::future::pending::<()>().await;
      }
    }
  };

  #[cfg(not(unix))]
  let terminate = std::future::pending::<()>();

  tokio::select! {
    _ = ctrl_c => tracing::info!("Received SIGINT"),
    _ = terminate => tracing::info!("Received SIGTERM"),
  }
}
