//! Reward settlement
//!
//! Turns a finished game's [`RewardRecord`] into profile-store writes: one
//! merge update crediting miles and counting the game, then an atomic
//! best-score max. Settlement is best effort. A failed write is logged,
//! counted and surfaced as a notice, but nothing is rolled back or retried,
//! so the player's local state can run ahead of the store.

use crate::config::SettlementConfig;
use crate::errors::ErrorCategory;
use crate::games::types::{GameType, RewardRecord};
use crate::metrics::ArcadeMetrics;
use crate::notify::{Notice, Notifier};
use crate::store::{get_i64, normalize_address, PartialUpdate, ProfileStore, StoreError};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("Settlement is disabled")]
    Disabled,

    #[error("Invalid reward recipient: {0}")]
    InvalidUser(String),

    #[error("Reward for {user} was not saved: {source}")]
    Write {
        user: String,
        #[source]
        source: StoreError,
    },

    #[error("Best score for {user} was not saved: {reason}")]
    BestScore { user: String, reason: String },
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SettlementReceipt {
    pub reward_id: String,
    pub user: String,
    pub game: GameType,
    pub points: u64,
    /// Score submitted for the best-score max, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_score: Option<u64>,
}

pub struct RewardSettlement {
    store: Arc<dyn ProfileStore>,
    config: SettlementConfig,
    notifier: Arc<dyn Notifier>,
    metrics: ArcadeMetrics,
}

impl RewardSettlement {
    pub fn new(
        store: Arc<dyn ProfileStore>,
        config: SettlementConfig,
        notifier: Arc<dyn Notifier>,
        metrics: ArcadeMetrics,
    ) -> Self {
        Self {
            store,
            config,
            notifier,
            metrics,
        }
    }

    /// Write one reward. Runs once per record; there is no idempotency key,
    /// so settling the same record twice credits it twice.
    pub async fn settle(&self, record: &RewardRecord) -> Result<SettlementReceipt, SettlementError> {
        if !self.config.enabled {
            return Err(SettlementError::Disabled);
        }

        match self.write(record).await {
            Ok(receipt) => {
                self.metrics.record_settlement(record.game, record.points);
                info!(
                    reward_id = %record.reward_id,
                    user = %receipt.user,
                    game = %record.game,
                    points = record.points,
                    "reward settled"
                );
                Ok(receipt)
            }
            Err(err) => {
                self.metrics.record_settlement_failure(record.game);
                error!(reward_id = %record.reward_id, user = %record.user, game = %record.game, error = %err, "reward settlement failed");
                self.notifier.notify(Notice::error(
                    format!("Your {} Meow Miles could not be saved: {}", record.points, err),
                    ErrorCategory::External,
                ));
                Err(err)
            }
        }
    }

    async fn write(&self, record: &RewardRecord) -> Result<SettlementReceipt, SettlementError> {
        let user = normalize_address(&record.user).map_err(|e| SettlementError::InvalidUser(e.to_string()))?;
        let game = record.game.as_str();

        let credit = PartialUpdate::new()
            .increment("miles", to_i64(record.points))
            .increment(format!("gamesPlayed.{}", game), 1)
            .set("lastPlayedAt", Utc::now().to_rfc3339());
        self.store
            .set_merge(&user, &credit)
            .await
            .map_err(|source| SettlementError::Write {
                user: user.clone(),
                source,
            })?;

        let best_score = record.score.filter(|_| self.config.record_best_scores);
        if let Some(score) = best_score {
            let path = format!("bestScores.{}", game);
            let candidate = to_i64(score);
            self.store
                .run_atomic(&user, &|doc| {
                    let current = doc.and_then(|d| get_i64(d, &path));
                    Ok(match current {
                        Some(best) if best >= candidate => PartialUpdate::new(),
                        _ => PartialUpdate::new().max(path.as_str(), candidate),
                    })
                })
                .await
                .map_err(|e| SettlementError::BestScore {
                    user: user.clone(),
                    reason: e.to_string(),
                })?;
        }

        Ok(SettlementReceipt {
            reward_id: record.reward_id.clone(),
            user,
            game: record.game,
            points: record.points,
            best_score,
        })
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
