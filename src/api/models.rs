//! API request and response models

use crate::games::types::GameType;
use crate::rewards::{BadgeStatus, LeaderboardEntry};
use crate::store::Document;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileResponse {
    pub address: String,
    pub profile: Document,
}

/// Body of `POST /api/rewards`
#[derive(Debug, Clone, Deserialize)]
pub struct RewardRequest {
    pub address: String,
    pub game: GameType,
    pub points: u64,
    #[serde(default)]
    pub score: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeaderboardQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub game: Option<String>,
}

fn default_limit() -> usize {
    10
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardResponse {
    /// `miles` or the game whose best scores are ranked
    pub ranked_by: String,
    pub entries: Vec<LeaderboardEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BadgesResponse {
    pub address: String,
    pub badges: Vec<BadgeStatus>,
}

/// Body of `POST /api/badges/claim`
#[derive(Debug, Clone, Deserialize)]
pub struct ClaimRequest {
    pub address: String,
    pub badge_id: String,
    pub tx_hash: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OAuthStartQuery {
    pub address: String,
}

/// Providers send either `code` and `state`, or `error`
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthCallbackQuery {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}
