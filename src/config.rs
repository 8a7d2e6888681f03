//! Configuration management with validation and defaults
//!
//! One TOML document with a section per game and per collaborator. Every
//! section has defaults, so a partial file (or none at all) is valid.
//! `MEOWMILES_*` environment variables override the file.

use crate::errors::{ArcadeResult, ConfigurationError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::path::Path;
use std::time::Duration;

/// Top-level arcade configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArcadeConfig {
    pub minesweeper: MinesweeperConfig,
    pub slots: SlotsConfig,
    pub tetris: TetrisConfig,
    pub wheel: WheelConfig,
    pub plinko: PlinkoConfig,
    pub settlement: SettlementConfig,
    pub wallet: WalletConfig,
    pub badges: BadgeConfig,
    pub oauth: OAuthConfig,
    pub storage: StorageConfig,
    pub api: ApiConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MinesweeperConfig {
    pub width: usize,
    pub height: usize,
    pub mines: usize,
    /// Chance that a safe click also reveals a random batch of safe cells
    pub cascade_probability: f64,
    pub cascade_max_cells: usize,
}

impl Default for MinesweeperConfig {
    fn default() -> Self {
        Self {
            width: 10,
            height: 10,
            mines: 5,
            cascade_probability: 0.3,
            cascade_max_cells: 3,
        }
    }
}

/// Payline value of each regular slot symbol
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SymbolValues {
    pub cat1: u64,
    pub cat2: u64,
    pub star: u64,
    pub fish: u64,
    pub yarn: u64,
}

impl Default for SymbolValues {
    fn default() -> Self {
        Self {
            cat1: 50,
            cat2: 40,
            star: 30,
            fish: 20,
            yarn: 10,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotsConfig {
    pub wild_probability: f64,
    /// Paid for three wilds on a straight line; diagonals never pay it
    pub wild_line_bonus: u64,
    pub symbol_values: SymbolValues,
    pub spin_duration_ms: u64,
}

impl Default for SlotsConfig {
    fn default() -> Self {
        Self {
            wild_probability: 0.05,
            wild_line_bonus: 100,
            symbol_values: SymbolValues::default(),
            spin_duration_ms: 2_000,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TetrisConfig {
    pub width: usize,
    pub height: usize,
    pub points_per_row: u64,
    pub base_drop_ms: u64,
    pub min_drop_ms: u64,
    pub speedup_per_row_ms: u64,
}

impl Default for TetrisConfig {
    fn default() -> Self {
        Self {
            width: 10,
            height: 20,
            points_per_row: 100,
            base_drop_ms: 800,
            min_drop_ms: 100,
            speedup_per_row_ms: 20,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WheelConfig {
    /// Reward of each equal-width segment, clockwise from 0 degrees
    pub segments: Vec<u64>,
    pub min_turns: u32,
    pub max_turns: u32,
    pub prediction_multiplier: u64,
    pub spin_duration_ms: u64,
}

impl Default for WheelConfig {
    fn default() -> Self {
        Self {
            segments: vec![10, 20, 5, 50, 10, 100, 5, 20, 10, 0, 25, 200],
            min_turns: 5,
            max_turns: 8,
            prediction_multiplier: 3,
            spin_duration_ms: 4_000,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PlinkoConfig {
    pub rows: usize,
    /// One score per bin; there are `rows + 1` bins
    pub bin_scores: Vec<u64>,
    pub prediction_multiplier: u64,
    pub drop_duration_ms: u64,
}

impl Default for PlinkoConfig {
    fn default() -> Self {
        Self {
            rows: 8,
            bin_scores: vec![100, 50, 20, 5, 1, 5, 20, 50, 100],
            prediction_multiplier: 5,
            drop_duration_ms: 3_000,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlementConfig {
    pub enabled: bool,
    pub record_best_scores: bool,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            record_best_scores: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    pub chain_id: u64,
    /// Ceiling on the single retry of a failed balance fetch
    pub balance_retry_timeout_secs: u64,
    pub token_contract: String,
    pub redeem_function: String,
    /// Payable entry point that receives wheel and plinko stakes
    pub game_contract: String,
    pub bet_function: String,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            chain_id: 8453,
            balance_retry_timeout_secs: 10,
            token_contract: "0x0000000000000000000000000000000000000000".to_string(),
            redeem_function: "redeem".to_string(),
            game_contract: "0x0000000000000000000000000000000000000000".to_string(),
            bet_function: "placeBet".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BadgeMilestone {
    pub id: String,
    pub name: String,
    pub threshold: u64,
}

impl BadgeMilestone {
    fn new(id: &str, name: &str, threshold: u64) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            threshold,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BadgeConfig {
    pub milestones: Vec<BadgeMilestone>,
    /// Discord bot endpoint that grants the badge role; unset disables sync
    pub role_sync_webhook: Option<String>,
}

impl Default for BadgeConfig {
    fn default() -> Self {
        Self {
            milestones: vec![
                BadgeMilestone::new("kitten", "Kitten", 100),
                BadgeMilestone::new("alley-cat", "Alley Cat", 500),
                BadgeMilestone::new("tomcat", "Tomcat", 1_000),
                BadgeMilestone::new("cat-burglar", "Cat Burglar", 5_000),
                BadgeMilestone::new("lion", "Lion", 10_000),
            ],
            role_sync_webhook: None,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderCredentials {
    pub twitter: Option<ClientCredentials>,
    pub discord: Option<ClientCredentials>,
    pub google: Option<ClientCredentials>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    pub state_ttl_secs: u64,
    /// Where the browser lands after a callback
    pub app_url: String,
    /// Public base of this server, used to build redirect URIs
    pub callback_base_url: String,
    pub providers: ProviderCredentials,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            state_ttl_secs: 600,
            app_url: "http://localhost:3000/profile".to_string(),
            callback_base_url: "http://localhost:8080".to_string(),
            providers: ProviderCredentials::default(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    RocksDb,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub data_directory: String,
    /// Whether to clear the database on startup (testing only!)
    pub clear_on_start: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::RocksDb,
            data_directory: "./DB/meowmiles".to_string(),
            clear_on_start: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            allowed_origins: vec!["*".to_string()],
            request_timeout_secs: 30,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub enable_metrics: bool,
    /// Fallback `EnvFilter` directive when `RUST_LOG` is unset
    pub log_filter: String,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enable_metrics: true,
            log_filter: "meowmiles=info,tower_http=info".to_string(),
        }
    }
}

impl ArcadeConfig {
    /// In-memory store and instant animations, for local runs and tests
    pub fn development() -> Self {
        Self {
            slots: SlotsConfig {
                spin_duration_ms: 0,
                ..Default::default()
            },
            wheel: WheelConfig {
                spin_duration_ms: 0,
                ..Default::default()
            },
            plinko: PlinkoConfig {
                drop_duration_ms: 0,
                ..Default::default()
            },
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                ..Default::default()
            },
            monitoring: MonitoringConfig {
                log_filter: "meowmiles=debug,tower_http=debug".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// RocksDB persistence, restricted origins left to the operator
    pub fn production() -> Self {
        Self {
            storage: StorageConfig {
                backend: StorageBackend::RocksDb,
                data_directory: "./DB/meowmiles".to_string(),
                clear_on_start: false,
            },
            api: ApiConfig {
                request_timeout_secs: 15,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Validate configuration for logical consistency
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.minesweeper.validate()?;

        let wild = self.slots.wild_probability;
        if !(wild > 0.0 && wild < 1.0) {
            return Err(invalid("slots.wild_probability", wild, "must be strictly between 0 and 1"));
        }

        let tetris = &self.tetris;
        if tetris.width < 4 || tetris.height < 4 {
            return Err(invalid("tetris.width/height", format!("{}x{}", tetris.width, tetris.height), "board must fit a 4-cell piece"));
        }
        if tetris.min_drop_ms == 0 || tetris.min_drop_ms > tetris.base_drop_ms {
            return Err(invalid("tetris.min_drop_ms", tetris.min_drop_ms, "must be > 0 and <= base_drop_ms"));
        }

        self.wheel.validate()?;
        self.plinko.validate()?;

        let mut badge_ids = HashSet::new();
        for milestone in &self.badges.milestones {
            if milestone.threshold == 0 {
                return Err(invalid("badges.milestones.threshold", &milestone.id, "must be > 0"));
            }
            if !badge_ids.insert(milestone.id.as_str()) {
                return Err(invalid("badges.milestones.id", &milestone.id, "duplicate badge id"));
            }
        }

        if self.oauth.state_ttl_secs == 0 {
            return Err(invalid("oauth.state_ttl_secs", 0, "must be > 0"));
        }

        if self.storage.backend == StorageBackend::RocksDb && self.storage.data_directory.is_empty() {
            return Err(ConfigurationError::MissingRequired("storage.data_directory".to_string()));
        }

        if self.api.port == 0 {
            return Err(invalid("api.port", 0, "port cannot be zero"));
        }

        Ok(())
    }

    pub fn slots_spin_duration(&self) -> Duration {
        Duration::from_millis(self.slots.spin_duration_ms)
    }

    pub fn wheel_spin_duration(&self) -> Duration {
        Duration::from_millis(self.wheel.spin_duration_ms)
    }

    pub fn plinko_drop_duration(&self) -> Duration {
        Duration::from_millis(self.plinko.drop_duration_ms)
    }

    pub fn oauth_state_ttl(&self) -> Duration {
        Duration::from_secs(self.oauth.state_ttl_secs)
    }
}

// Per-game checks are also run by the game constructors
impl MinesweeperConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.width == 0 || self.height == 0 {
            return Err(invalid("minesweeper.width/height", format!("{}x{}", self.width, self.height), "board must not be empty"));
        }
        if self.mines == 0 || self.mines >= self.width * self.height {
            return Err(invalid("minesweeper.mines", self.mines, "must be between 1 and cells - 1"));
        }
        check_probability("minesweeper.cascade_probability", self.cascade_probability)?;
        if self.cascade_probability > 0.0 && self.cascade_max_cells == 0 {
            return Err(invalid("minesweeper.cascade_max_cells", 0, "must be > 0 when cascades are enabled"));
        }
        Ok(())
    }
}

impl WheelConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.segments.is_empty() {
            return Err(ConfigurationError::MissingRequired("wheel.segments".to_string()));
        }
        if self.min_turns > self.max_turns {
            return Err(ConfigurationError::ValidationFailed(
                "wheel.min_turns must not exceed wheel.max_turns".to_string(),
            ));
        }
        Ok(())
    }
}

impl PlinkoConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.rows == 0 {
            return Err(invalid("plinko.rows", 0, "must be > 0"));
        }
        if self.bin_scores.len() != self.rows + 1 {
            return Err(invalid("plinko.bin_scores", self.bin_scores.len(), "must hold exactly rows + 1 scores"));
        }
        Ok(())
    }
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> ConfigurationError {
    ConfigurationError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn check_probability(field: &str, p: f64) -> Result<(), ConfigurationError> {
    if (0.0..=1.0).contains(&p) {
        Ok(())
    } else {
        Err(invalid(field, p, "must be within [0, 1]"))
    }
}

/// Configuration loader with environment variable support
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Load configuration from file and environment variables
    pub fn load(&self) -> ArcadeResult<ArcadeConfig> {
        let mut config = match &self.config_path {
            Some(path) => Self::load_from_file(path)?,
            None => ArcadeConfig::default(),
        };

        Self::apply_overrides(&mut config, |key| env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn load_from_file(path: &str) -> ArcadeResult<ArcadeConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to read {}: {}", path, e)))?;

        toml::from_str(&content)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to parse TOML: {}", e)).into())
    }

    /// Apply `MEOWMILES_*` overrides looked up through `lookup`
    pub fn apply_overrides<F>(config: &mut ArcadeConfig, lookup: F) -> Result<(), ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("MEOWMILES_API_HOST") {
            config.api.host = host;
        }
        if let Some(port) = lookup("MEOWMILES_API_PORT") {
            config.api.port = parse_var("MEOWMILES_API_PORT", port, "Invalid port number")?;
        }
        if let Some(dir) = lookup("MEOWMILES_DATA_DIR") {
            config.storage.data_directory = dir;
        }
        if let Some(backend) = lookup("MEOWMILES_STORAGE_BACKEND") {
            config.storage.backend = match backend.to_ascii_lowercase().as_str() {
                "memory" => StorageBackend::Memory,
                "rocksdb" => StorageBackend::RocksDb,
                _ => {
                    return Err(ConfigurationError::InvalidValue {
                        field: "MEOWMILES_STORAGE_BACKEND".to_string(),
                        value: backend,
                        reason: "expected 'memory' or 'rocksdb'".to_string(),
                    })
                }
            };
        }
        if let Some(chain_id) = lookup("MEOWMILES_CHAIN_ID") {
            config.wallet.chain_id = parse_var("MEOWMILES_CHAIN_ID", chain_id, "Invalid chain id")?;
        }
        if let Some(url) = lookup("MEOWMILES_APP_URL") {
            config.oauth.app_url = url;
        }
        if let Some(url) = lookup("MEOWMILES_CALLBACK_BASE_URL") {
            config.oauth.callback_base_url = url;
        }
        if let Some(webhook) = lookup("MEOWMILES_ROLE_SYNC_WEBHOOK") {
            config.badges.role_sync_webhook = Some(webhook);
        }

        for (prefix, slot) in [
            ("TWITTER", &mut config.oauth.providers.twitter),
            ("DISCORD", &mut config.oauth.providers.discord),
            ("GOOGLE", &mut config.oauth.providers.google),
        ] {
            let id = lookup(&format!("MEOWMILES_{}_CLIENT_ID", prefix));
            let secret = lookup(&format!("MEOWMILES_{}_CLIENT_SECRET", prefix));
            if let (Some(client_id), Some(client_secret)) = (id, secret) {
                *slot = Some(ClientCredentials {
                    client_id,
                    client_secret,
                });
            }
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(config: &ArcadeConfig, path: &str) -> ArcadeResult<()> {
        let toml_string = toml::to_string_pretty(config)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, toml_string)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to write to {}: {}", path, e)).into())
    }
}

fn parse_var<T: std::str::FromStr>(field: &str, value: String, reason: &str) -> Result<T, ConfigurationError> {
    value.parse().map_err(|_| ConfigurationError::InvalidValue {
        field: field.to_string(),
        value,
        reason: reason.to_string(),
    })
}
