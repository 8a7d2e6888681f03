//! Prize wheel
//!
//! `n` equal segments laid out clockwise from 0 degrees. A spin adds several
//! full turns plus a random offset to the wheel's rotation and pays the
//! segment the rotation ends on.

use crate::config::{WalletConfig, WheelConfig};
use crate::errors::ArcadeResult;
use crate::games::session::{place_wager, prediction_bonus, rejected_config, run_timed, TimedSession};
use crate::games::types::{GameError, GameType, RewardRecord, SessionStatus, Wager};
use crate::notify::{notify_failure, Notifier};
use crate::wallet::WalletGateway;
use rand::Rng;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

/// Segment index for an angle in degrees, over `segments` equal slices
pub fn segment_at(angle: f64, segments: usize) -> usize {
    let normalized = angle.rem_euclid(360.0);
    let width = 360.0 / segments as f64;
    ((normalized / width).floor() as usize).min(segments.saturating_sub(1))
}

#[derive(Debug, Clone, Serialize)]
pub struct WheelSpin {
    /// Accumulated rotation after this spin
    pub rotation: f64,
    pub segment: usize,
    pub segment_value: u64,
    pub bonus: u64,
    pub points: u64,
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward: Option<RewardRecord>,
}

pub struct PrizeWheel {
    config: WheelConfig,
    wallet_config: WalletConfig,
    player: String,
    session: TimedSession,
    rotation: Mutex<f64>,
    notifier: Arc<dyn Notifier>,
}

impl PrizeWheel {
    pub fn new(
        config: WheelConfig,
        wallet_config: WalletConfig,
        player: impl Into<String>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, GameError> {
        config.validate().map_err(|e| rejected_config(GameType::Wheel, e))?;
        Ok(Self {
            config,
            wallet_config,
            player: player.into(),
            session: TimedSession::new(),
            rotation: Mutex::new(0.0),
            notifier,
        })
    }

    pub fn session(&self) -> &TimedSession {
        &self.session
    }

    pub fn rotation(&self) -> f64 {
        *self.rotation.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Spin the wheel. The wager is checked and placed before anything
    /// moves; a failure leaves rotation and status untouched and raises a
    /// notice.
    pub async fn spin<R: Rng + ?Sized>(
        &self,
        wallet: &dyn WalletGateway,
        wager: Wager,
        rng: &mut R,
    ) -> ArcadeResult<WheelSpin> {
        let guard = self.session.begin()?;

        if let Err(err) = place_wager(wallet, &self.wallet_config, wager, self.config.segments.len()).await {
            notify_failure(self.notifier.as_ref(), &err);
            return Err(err);
        }

        let turns = rng.gen_range(self.config.min_turns..=self.config.max_turns);
        let offset: f64 = rng.gen_range(0.0..360.0);
        let rotation = {
            let mut current = self.rotation.lock().unwrap_or_else(|p| p.into_inner());
            *current += f64::from(turns) * 360.0 + offset;
            *current
        };
        self.session.mark_playing();

        let duration = Duration::from_millis(self.config.spin_duration_ms);
        Ok(run_timed(guard, duration, || self.land(rotation, wager)).await)
    }

    fn land(&self, rotation: f64, wager: Wager) -> WheelSpin {
        let segment = segment_at(rotation, self.config.segments.len());
        let segment_value = self.config.segments[segment];
        let bonus = prediction_bonus(wager, segment, self.config.prediction_multiplier);
        let points = segment_value.saturating_add(bonus);
        let state = self.session.finish(points);

        debug!(player = %self.player, segment, points, "wheel landed");

        WheelSpin {
            rotation,
            segment,
            segment_value,
            bonus,
            points,
            status: state.status,
            reward: (points > 0).then(|| RewardRecord::new(self.player.clone(), GameType::Wheel, points, None)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ArcadeError, PreconditionError};
    use crate::games::types::GameError;
    use crate::notify::NoticeLog;
    use crate::wallet::test_support::FakeWallet;
    use crate::wallet::WalletError;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const ADDRESS: &str = "0x00000000000000000000000000000000000000aa";

    fn wheel(spin_duration_ms: u64) -> (PrizeWheel, Arc<NoticeLog>) {
        let notices = Arc::new(NoticeLog::new());
        let config = WheelConfig {
            spin_duration_ms,
            ..Default::default()
        };
        let wheel = PrizeWheel::new(config, WalletConfig::default(), ADDRESS, notices.clone()).unwrap();
        (wheel, notices)
    }

    #[test]
    fn test_zero_degrees_is_first_segment() {
        assert_eq!(segment_at(0.0, 12), 0);
        assert_eq!(segment_at(360.0, 12), 0);
        assert_eq!(segment_at(3600.0, 12), 0);
    }

    #[test]
    fn test_segment_boundaries() {
        assert_eq!(segment_at(29.999, 12), 0);
        assert_eq!(segment_at(30.0, 12), 1);
        assert_eq!(segment_at(359.999, 12), 11);
        assert_eq!(segment_at(720.0 + 45.0, 12), 1);
        assert_eq!(segment_at(-30.0, 12), 11);
        assert_eq!(segment_at(180.0, 4), 2);
    }

    #[tokio::test]
    async fn test_spin_accumulates_rotation_and_pays_segment() {
        let (wheel, notices) = wheel(0);
        let wallet = FakeWallet::disconnected();
        let mut rng = StdRng::seed_from_u64(8);

        let first = wheel.spin(&wallet, Wager::none(), &mut rng).await.unwrap();
        assert!(first.rotation >= 5.0 * 360.0);
        assert!(first.rotation < 9.0 * 360.0);
        assert_eq!(first.segment_value, WheelConfig::default().segments[first.segment]);
        assert_eq!(first.points, first.segment_value);
        assert_eq!(first.segment, segment_at(first.rotation, 12));

        let second = wheel.spin(&wallet, Wager::none(), &mut rng).await.unwrap();
        assert!(second.rotation >= first.rotation + 5.0 * 360.0);
        assert!(notices.notices().is_empty());
    }

    #[tokio::test]
    async fn test_prediction_bonus_applies_only_on_hit() {
        let (wheel, _) = wheel(0);
        let wallet = FakeWallet::connected(ADDRESS, 1_000);

        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let spin = wheel.spin(&wallet, Wager::on(3, 10), &mut rng).await.unwrap();
            let expected = if spin.segment == 3 { 30 } else { 0 };
            assert_eq!(spin.bonus, expected);
            assert_eq!(spin.points, spin.segment_value + expected);
        }
    }

    #[tokio::test]
    async fn test_failed_precondition_leaves_state_unchanged() {
        let (wheel, notices) = wheel(0);
        let wallet = FakeWallet::disconnected();
        let mut rng = StdRng::seed_from_u64(1);

        let err = wheel.spin(&wallet, Wager::on(2, 10), &mut rng).await.unwrap_err();

        assert!(matches!(err, ArcadeError::Precondition(PreconditionError::NoWallet)));
        assert_eq!(wheel.rotation(), 0.0);
        assert_eq!(wheel.session().snapshot().status, SessionStatus::Idle);
        assert!(!wheel.session().is_busy());
        assert_eq!(notices.notices().len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_bet_leaves_state_unchanged() {
        let (wheel, notices) = wheel(0);
        let wallet = FakeWallet {
            call_result: Err(WalletError::Rejected("user declined".to_string())),
            ..FakeWallet::connected(ADDRESS, 1_000)
        };
        let mut rng = StdRng::seed_from_u64(1);

        let err = wheel.spin(&wallet, Wager::on(2, 10), &mut rng).await.unwrap_err();

        assert!(matches!(err, ArcadeError::Wallet(WalletError::Rejected(_))));
        assert_eq!(wallet.calls().len(), 1);
        assert_eq!(wallet.calls()[0].value, 10);
        assert_eq!(wheel.rotation(), 0.0);
        assert_eq!(wheel.session().snapshot().status, SessionStatus::Idle);
        assert!(!wheel.session().is_busy());
        assert_eq!(notices.notices().len(), 1);
    }

    #[test]
    fn test_unusable_config_is_rejected() {
        let notices = Arc::new(NoticeLog::new());
        let empty = WheelConfig {
            segments: Vec::new(),
            ..Default::default()
        };
        let err = PrizeWheel::new(empty, WalletConfig::default(), ADDRESS, notices.clone()).err();
        assert!(matches!(err, Some(GameError::InvalidBoard(_))));

        let inverted = WheelConfig {
            min_turns: 9,
            max_turns: 5,
            ..Default::default()
        };
        let err = PrizeWheel::new(inverted, WalletConfig::default(), ADDRESS, notices).err();
        assert!(matches!(err, Some(GameError::InvalidBoard(_))));
    }

    #[tokio::test]
    async fn test_prediction_out_of_range() {
        let (wheel, _) = wheel(0);
        let wallet = FakeWallet::connected(ADDRESS, 1_000);
        let mut rng = StdRng::seed_from_u64(1);

        let err = wheel.spin(&wallet, Wager::on(12, 0), &mut rng).await.unwrap_err();
        assert!(matches!(
            err,
            ArcadeError::Game(GameError::InvalidPrediction { prediction: 12, options: 12 })
        ));
    }

    #[tokio::test]
    async fn test_spin_while_spinning_is_ignored() {
        let (wheel, notices) = wheel(20);
        let wallet = FakeWallet::disconnected();
        let mut first_rng = StdRng::seed_from_u64(1);
        let mut second_rng = StdRng::seed_from_u64(2);

        let (first, second) = tokio::join!(wheel.spin(&wallet, Wager::none(), &mut first_rng), async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            wheel.spin(&wallet, Wager::none(), &mut second_rng).await
        });

        assert!(first.is_ok());
        let err = second.unwrap_err();
        assert!(err.is_ignorable());
        assert!(notices.notices().is_empty());
    }
}
