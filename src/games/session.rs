//! Session bookkeeping shared by the games
//!
//! A session is guarded by a busy flag: while a transition (spin, drop,
//! settlement) is in flight, further triggers fail with [`GameError::Busy`]
//! and callers drop them.

use crate::config::WalletConfig;
use crate::errors::{ArcadeResult, ConfigurationError};
use crate::games::types::{GameError, GameType, SessionStatus, Wager};
use crate::wallet::{ensure_can_bet, ContractCall, TxHash, WalletGateway};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, error};

/// Re-entrancy guard for one session
#[derive(Debug, Clone, Default)]
pub struct BusyFlag {
    busy: Arc<AtomicBool>,
}

impl BusyFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the session, or fail if a transition is already running
    pub fn try_acquire(&self) -> Result<BusyGuard, GameError> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| BusyGuard {
                busy: self.busy.clone(),
            })
            .map_err(|_| GameError::Busy)
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Releases the busy flag on drop
#[derive(Debug)]
pub struct BusyGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Waits out a fixed-duration animation, then runs the completion while the
/// guard is still held.
pub async fn run_timed<T>(guard: BusyGuard, duration: Duration, complete: impl FnOnce() -> T) -> T {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
    let output = complete();
    drop(guard);
    output
}

/// Checks a wagered round and places the stake.
///
/// The prediction must name one of `options`. A non-zero stake must be
/// covered by the connected wallet and is then sent to the game contract as
/// native value. Nothing is sent for an unstaked round. Any error leaves the
/// game untouched, so callers abort before mutating state.
pub async fn place_wager(
    wallet: &dyn WalletGateway,
    config: &WalletConfig,
    wager: Wager,
    options: usize,
) -> ArcadeResult<Option<TxHash>> {
    if let Some(prediction) = wager.prediction {
        if prediction >= options {
            return Err(GameError::InvalidPrediction { prediction, options }.into());
        }
    }
    if wager.amount == 0 {
        return Ok(None);
    }

    let address = ensure_can_bet(wallet, config, wager.amount).await?;
    let call = ContractCall::payable(&config.game_contract, &config.bet_function).value(u128::from(wager.amount));
    let tx_hash = wallet.send_contract_call(call).await?;
    debug!(%address, amount = wager.amount, %tx_hash, "wager placed");
    Ok(Some(tx_hash))
}

/// A game refuses to start on a section that failed validation
pub(crate) fn rejected_config(game: GameType, err: ConfigurationError) -> GameError {
    error!(%game, error = %err, "game configuration rejected");
    GameError::InvalidBoard(err.to_string())
}

/// Extra payout for a correct prediction
pub fn prediction_bonus(wager: Wager, landed: usize, multiplier: u64) -> u64 {
    match wager.prediction {
        Some(prediction) if prediction == landed => wager.amount.saturating_mul(multiplier),
        _ => 0,
    }
}

/// Status plus accumulated score
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionState {
    pub status: SessionStatus,
    pub score: u64,
}

impl SessionState {
    pub fn start(&mut self) {
        self.status = SessionStatus::Playing;
        self.score = 0;
    }

    pub fn add_points(&mut self, points: u64) {
        self.score = self.score.saturating_add(points);
    }

    pub fn finish(&mut self, won: bool) {
        self.status = if won {
            SessionStatus::Won
        } else {
            SessionStatus::Lost
        };
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Session of a timer-driven game (slots, wheel, plinko): each round is a
/// spin or drop that ends in `Won` when it paid something, `Lost` otherwise.
/// The score accumulates across rounds until [`TimedSession::reset`].
#[derive(Debug, Default)]
pub struct TimedSession {
    busy: BusyFlag,
    state: Mutex<SessionState>,
}

impl TimedSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the session for one round without touching its status yet
    pub fn begin(&self) -> Result<BusyGuard, GameError> {
        self.busy.try_acquire()
    }

    /// Preconditions passed: the round is now visibly in progress.
    ///
    /// `Won` and `Lost` need no reset first; a new spin or drop is the
    /// play-again step and the score carries over until [`Self::reset`].
    pub fn mark_playing(&self) {
        self.lock().status = SessionStatus::Playing;
    }

    /// Record the round's outcome and return the updated state
    pub fn finish(&self, points: u64) -> SessionState {
        let mut state = self.lock();
        state.add_points(points);
        state.finish(points > 0);
        *state
    }

    pub fn snapshot(&self) -> SessionState {
        *self.lock()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.is_busy()
    }

    pub fn reset(&self) {
        self.lock().reset();
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ArcadeError;
    use crate::wallet::test_support::FakeWallet;
    use crate::wallet::WalletError;

    const PLAYER: &str = "0x00000000000000000000000000000000000000aa";

    #[test]
    fn test_busy_flag_rejects_reentry() {
        let flag = BusyFlag::new();
        let guard = flag.try_acquire().expect("first acquire");
        assert!(flag.is_busy());
        assert_eq!(flag.try_acquire().unwrap_err(), GameError::Busy);

        drop(guard);
        assert!(!flag.is_busy());
        assert!(flag.try_acquire().is_ok());
    }

    #[tokio::test]
    async fn test_run_timed_holds_guard_until_completion() {
        let flag = BusyFlag::new();
        let guard = flag.try_acquire().unwrap();
        let observed = flag.clone();

        let busy_during = run_timed(guard, Duration::from_millis(5), move || observed.is_busy()).await;

        assert!(busy_during);
        assert!(!flag.is_busy());
    }

    #[test]
    fn test_prediction_bonus() {
        assert_eq!(prediction_bonus(Wager::on(3, 10), 3, 5), 50);
        assert_eq!(prediction_bonus(Wager::on(3, 10), 4, 5), 0);
        assert_eq!(prediction_bonus(Wager::none(), 0, 5), 0);
    }

    #[test]
    fn test_timed_session_outcomes() {
        let session = TimedSession::new();

        let state = session.finish(0);
        assert_eq!(state.status, SessionStatus::Lost);

        let state = session.finish(40);
        assert_eq!(state.status, SessionStatus::Won);
        assert_eq!(state.score, 40);

        session.reset();
        assert_eq!(session.snapshot(), SessionState::default());
    }

    #[test]
    fn test_finished_round_plays_again_and_keeps_score() {
        let session = TimedSession::new();
        session.mark_playing();
        assert_eq!(session.finish(30).status, SessionStatus::Won);

        session.mark_playing();
        let state = session.snapshot();
        assert_eq!(state.status, SessionStatus::Playing);
        assert_eq!(state.score, 30);

        let state = session.finish(0);
        assert_eq!(state.status, SessionStatus::Lost);
        assert_eq!(state.score, 30);
    }

    #[tokio::test]
    async fn test_unstaked_round_sends_nothing() {
        let wallet = FakeWallet::disconnected();
        let placed = place_wager(&wallet, &WalletConfig::default(), Wager::none(), 4).await.unwrap();

        assert_eq!(placed, None);
        assert!(wallet.calls().is_empty());
    }

    #[tokio::test]
    async fn test_stake_is_sent_as_native_value() {
        let wallet = FakeWallet::connected(PLAYER, 1_000);
        let config = WalletConfig::default();

        let placed = place_wager(&wallet, &config, Wager::on(2, 25), 4).await.unwrap();

        assert_eq!(placed.as_deref(), Some("0xtx"));
        let calls = wallet.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].contract, config.game_contract);
        assert_eq!(calls[0].function, config.bet_function);
        assert_eq!(calls[0].value, 25);
        assert!(calls[0].abi.contains("\"stateMutability\":\"payable\""));
    }

    #[tokio::test]
    async fn test_bad_prediction_or_rejection_fails_the_wager() {
        let wallet = FakeWallet {
            call_result: Err(WalletError::Rejected("user declined".to_string())),
            ..FakeWallet::connected(PLAYER, 1_000)
        };
        let config = WalletConfig::default();

        let err = place_wager(&wallet, &config, Wager::on(9, 25), 4).await.unwrap_err();
        assert!(matches!(err, ArcadeError::Game(GameError::InvalidPrediction { .. })));
        assert!(wallet.calls().is_empty());

        let err = place_wager(&wallet, &config, Wager::on(1, 25), 4).await.unwrap_err();
        assert!(matches!(err, ArcadeError::Wallet(WalletError::Rejected(_))));
    }
}
