//! Meow Miles API Server Binary

use clap::Parser;
use meowmiles::api::{init_tracing, ApiServer, AppState};
use meowmiles::config::{ArcadeConfig, ConfigLoader, StorageBackend};
use meowmiles::metrics::ArcadeMetrics;
use meowmiles::oauth::{HttpIdentityProvider, MemoryStateStore, RocksStateStore, StateStore};
use meowmiles::store::{open_database, MemoryProfileStore, ProfileStore, RocksProfileStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "meowmiles-api")]
#[command(about = "Meow Miles arcade API server", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(long)]
    config: Option<String>,

    /// Start from the development preset (in-memory store, debug logs)
    #[arg(long)]
    dev: bool,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    /// Database directory
    #[arg(long)]
    db_path: Option<String>,

    /// Allowed CORS origins (comma-separated, use * for all)
    #[arg(long)]
    cors_origins: Option<String>,

    /// Request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,
}

impl Args {
    fn load_config(&self) -> Result<ArcadeConfig, Box<dyn std::error::Error>> {
        let mut config = if self.dev {
            let mut config = ArcadeConfig::development();
            ConfigLoader::apply_overrides(&mut config, |key| std::env::var(key).ok())?;
            config
        } else {
            let loader = match &self.config {
                Some(path) => ConfigLoader::new().with_path(path),
                None => ConfigLoader::new(),
            };
            loader.load()?
        };

        if let Some(host) = &self.host {
            config.api.host = host.clone();
        }
        if let Some(port) = self.port {
            config.api.port = port;
        }
        if let Some(db_path) = &self.db_path {
            config.storage.data_directory = db_path.clone();
        }
        if let Some(origins) = &self.cors_origins {
            config.api.allowed_origins = origins.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Some(timeout) = self.timeout {
            config.api.request_timeout_secs = timeout;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = args.load_config()?;
    init_tracing(&config.monitoring.log_filter);

    let (store, states): (Arc<dyn ProfileStore>, Arc<dyn StateStore>) = match config.storage.backend {
        StorageBackend::RocksDb => {
            info!("Opening profile database: {}", config.storage.data_directory);
            let db = open_database(&config.storage.data_directory, config.storage.clear_on_start)?;
            let store: Arc<dyn ProfileStore> = Arc::new(RocksProfileStore::new(db.clone()));
            let states: Arc<dyn StateStore> = Arc::new(RocksStateStore::new(db));
            (store, states)
        }
        StorageBackend::Memory => {
            warn!("Using the in-memory store; profiles are lost on exit");
            let store: Arc<dyn ProfileStore> = Arc::new(MemoryProfileStore::new());
            let states: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
            (store, states)
        }
    };

    spawn_state_purge(states.clone(), config.oauth_state_ttl());

    let identity_provider = Arc::new(HttpIdentityProvider::new(config.oauth.providers.clone()));
    let state = Arc::new(AppState::new(
        &config,
        store,
        states,
        identity_provider,
        ArcadeMetrics::new()?,
    ));

    ApiServer::new(config.api.clone(), state).run().await
}

/// Drop abandoned OAuth states once per TTL
fn spawn_state_purge(states: Arc<dyn StateStore>, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            match states.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => info!(purged, "expired oauth states removed"),
                Err(e) => warn!(error = %e, "oauth state purge failed"),
            }
        }
    });
}
