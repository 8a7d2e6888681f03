use crate::games::types::GameType;
use crate::store::{get_i64, ProfileStore, StoreError};
use serde::Serialize;
use std::cmp::Reverse;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub address: String,
    pub value: i64,
}

/// Ranking over the profile store: total miles, or one game's best score
pub struct Leaderboard {
    store: Arc<dyn ProfileStore>,
}

impl Leaderboard {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self { store }
    }

    /// Highest first, ties by address; profiles without the field are skipped
    pub async fn top(&self, limit: usize, game: Option<GameType>) -> Result<Vec<LeaderboardEntry>, StoreError> {
        let field = match game {
            Some(game) => format!("bestScores.{}", game.as_str()),
            None => "miles".to_string(),
        };

        let mut ranked: Vec<(String, i64)> = self
            .store
            .list(usize::MAX)
            .await?
            .into_iter()
            .filter_map(|(address, doc)| get_i64(&doc, &field).map(|value| (address, value)))
            .collect();
        ranked.sort_by(|a, b| (Reverse(a.1), &a.0).cmp(&(Reverse(b.1), &b.0)));

        Ok(ranked
            .into_iter()
            .take(limit)
            .enumerate()
            .map(|(i, (address, value))| LeaderboardEntry {
                rank: i + 1,
                address,
                value,
            })
            .collect())
    }
}
