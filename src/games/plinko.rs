//! Plinko-style drop
//!
//! The ball bounces off one peg per row, left or right with equal odds, and
//! lands in the bin numbered by its right bounces.

use crate::config::{PlinkoConfig, WalletConfig};
use crate::errors::ArcadeResult;
use crate::games::session::{place_wager, prediction_bonus, rejected_config, run_timed, TimedSession};
use crate::games::types::{GameError, GameType, RewardRecord, SessionStatus, Wager};
use crate::notify::{notify_failure, Notifier};
use crate::wallet::WalletGateway;
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Bounce {
    Left,
    Right,
}

pub fn drop_path<R: Rng + ?Sized>(rows: usize, rng: &mut R) -> Vec<Bounce> {
    (0..rows)
        .map(|_| if rng.gen_bool(0.5) { Bounce::Right } else { Bounce::Left })
        .collect()
}

/// Bin index for a path: `0..=rows`
pub fn landing_bin(path: &[Bounce]) -> usize {
    path.iter().filter(|b| **b == Bounce::Right).count()
}

#[derive(Debug, Clone, Serialize)]
pub struct PlinkoDrop {
    pub path: Vec<Bounce>,
    pub bin: usize,
    pub bin_score: u64,
    pub bonus: u64,
    pub points: u64,
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward: Option<RewardRecord>,
}

pub struct Plinko {
    config: PlinkoConfig,
    wallet_config: WalletConfig,
    player: String,
    session: TimedSession,
    notifier: Arc<dyn Notifier>,
}

impl Plinko {
    pub fn new(
        config: PlinkoConfig,
        wallet_config: WalletConfig,
        player: impl Into<String>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, GameError> {
        config.validate().map_err(|e| rejected_config(GameType::Plinko, e))?;
        Ok(Self {
            config,
            wallet_config,
            player: player.into(),
            session: TimedSession::new(),
            notifier,
        })
    }

    pub fn session(&self) -> &TimedSession {
        &self.session
    }

    pub fn bins(&self) -> usize {
        self.config.rows + 1
    }

    pub async fn drop_ball<R: Rng + ?Sized>(
        &self,
        wallet: &dyn WalletGateway,
        wager: Wager,
        rng: &mut R,
    ) -> ArcadeResult<PlinkoDrop> {
        let guard = self.session.begin()?;

        if let Err(err) = place_wager(wallet, &self.wallet_config, wager, self.bins()).await {
            notify_failure(self.notifier.as_ref(), &err);
            return Err(err);
        }

        let path = drop_path(self.config.rows, rng);
        self.session.mark_playing();

        let duration = Duration::from_millis(self.config.drop_duration_ms);
        Ok(run_timed(guard, duration, || self.land(path, wager)).await)
    }

    fn land(&self, path: Vec<Bounce>, wager: Wager) -> PlinkoDrop {
        let bin = landing_bin(&path);
        let bin_score = self.config.bin_scores.get(bin).copied().unwrap_or(0);
        let bonus = prediction_bonus(wager, bin, self.config.prediction_multiplier);
        let points = bin_score.saturating_add(bonus);
        let state = self.session.finish(points);

        debug!(player = %self.player, bin, points, "plinko ball landed");

        PlinkoDrop {
            path,
            bin,
            bin_score,
            bonus,
            points,
            status: state.status,
            reward: (points > 0).then(|| RewardRecord::new(self.player.clone(), GameType::Plinko, points, None)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ArcadeError, PreconditionError};
    use crate::notify::NoticeLog;
    use crate::wallet::test_support::FakeWallet;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const ADDRESS: &str = "0x00000000000000000000000000000000000000bb";

    fn plinko() -> (Plinko, Arc<NoticeLog>) {
        let notices = Arc::new(NoticeLog::new());
        let config = PlinkoConfig {
            drop_duration_ms: 0,
            ..Default::default()
        };
        (Plinko::new(config, WalletConfig::default(), ADDRESS, notices.clone()).unwrap(), notices)
    }

    #[test]
    fn test_bin_counts_right_bounces() {
        use Bounce::*;
        assert_eq!(landing_bin(&[Left, Left, Left]), 0);
        assert_eq!(landing_bin(&[Right, Left, Right]), 2);
        assert_eq!(landing_bin(&[Right; 8]), 8);
    }

    #[test]
    fn test_path_length_and_bin_range() {
        let mut rng = StdRng::seed_from_u64(4);
        for _ in 0..200 {
            let path = drop_path(8, &mut rng);
            assert_eq!(path.len(), 8);
            assert!(landing_bin(&path) <= 8);
        }
    }

    #[tokio::test]
    async fn test_drop_pays_bin_score() {
        let (game, _) = plinko();
        let wallet = FakeWallet::disconnected();
        let scores = PlinkoConfig::default().bin_scores;

        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let drop = game.drop_ball(&wallet, Wager::none(), &mut rng).await.unwrap();
            assert_eq!(drop.bin, landing_bin(&drop.path));
            assert_eq!(drop.points, scores[drop.bin]);
            assert_eq!(drop.status, SessionStatus::Won);
            assert_eq!(drop.reward.unwrap().points, drop.points);
        }
    }

    #[tokio::test]
    async fn test_bin_prediction_bonus() {
        let (game, _) = plinko();
        let wallet = FakeWallet::connected(ADDRESS, 100);

        for seed in 0..30 {
            let mut rng = StdRng::seed_from_u64(seed);
            let drop = game.drop_ball(&wallet, Wager::on(4, 20), &mut rng).await.unwrap();
            let expected = if drop.bin == 4 { 100 } else { 0 };
            assert_eq!(drop.bonus, expected);
        }
    }

    #[tokio::test]
    async fn test_insufficient_balance_aborts_drop() {
        let (game, notices) = plinko();
        let wallet = FakeWallet::connected(ADDRESS, 5);
        let mut rng = StdRng::seed_from_u64(1);

        let err = game.drop_ball(&wallet, Wager::on(0, 50), &mut rng).await.unwrap_err();

        assert!(matches!(
            err,
            ArcadeError::Precondition(PreconditionError::InsufficientBalance { .. })
        ));
        assert_eq!(game.session().snapshot().status, SessionStatus::Idle);
        assert_eq!(notices.notices().len(), 1);
        assert!(wallet.calls().is_empty());
    }

    #[tokio::test]
    async fn test_staked_drop_places_bet() {
        let (game, _) = plinko();
        let wallet = FakeWallet::connected(ADDRESS, 100);
        let mut rng = StdRng::seed_from_u64(2);

        game.drop_ball(&wallet, Wager::on(4, 20), &mut rng).await.unwrap();

        let calls = wallet.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].function, WalletConfig::default().bet_function);
        assert_eq!(calls[0].value, 20);
    }

    #[test]
    fn test_bin_scores_must_match_rows() {
        let config = PlinkoConfig {
            rows: 4,
            ..Default::default()
        };
        let err = Plinko::new(config, WalletConfig::default(), ADDRESS, Arc::new(NoticeLog::new())).err();
        assert!(matches!(err, Some(GameError::InvalidBoard(_))));
    }
}
