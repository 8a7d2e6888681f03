//! End-to-end: a finished game settles into the profile store, unlocks a
//! badge and shows up on the leaderboard.

use meowmiles::config::{BadgeConfig, MinesweeperConfig, SettlementConfig};
use meowmiles::games::minesweeper::Board;
use meowmiles::games::types::{GameType, RewardRecord, SessionStatus};
use meowmiles::games::{Minesweeper, RewardSettlement};
use meowmiles::metrics::ArcadeMetrics;
use meowmiles::notify::{NoticeLevel, NoticeLog};
use meowmiles::rewards::{BadgeService, Leaderboard};
use meowmiles::store::{get_i64, MemoryProfileStore, PartialUpdate, ProfileStore};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;

const PLAYER: &str = "0x00000000000000000000000000000000000000aa";
const RIVAL: &str = "0x00000000000000000000000000000000000000bb";

fn config() -> MinesweeperConfig {
    MinesweeperConfig {
        width: 3,
        height: 1,
        mines: 1,
        cascade_probability: 0.0,
        ..Default::default()
    }
}

/// 3x1 board, mine on the right: revealing the left cell clears it
fn cleared_game() -> Minesweeper {
    let board = Board::with_mines(3, 1, &[(2, 0)]).unwrap();
    let mut game = Minesweeper::with_board(config(), PLAYER, board).unwrap();
    let mut rng = StdRng::seed_from_u64(7);

    let outcome = game.reveal(0, 0, &mut rng).unwrap();
    assert_eq!(outcome.status, SessionStatus::Won);
    game
}

fn settlement(store: Arc<MemoryProfileStore>, notices: Arc<NoticeLog>, metrics: ArcadeMetrics) -> RewardSettlement {
    RewardSettlement::new(store, SettlementConfig::default(), notices, metrics)
}

#[tokio::test]
async fn test_cleared_board_settles_and_unlocks_badge() {
    let store = Arc::new(MemoryProfileStore::new());
    let notices = Arc::new(NoticeLog::new());
    let metrics = ArcadeMetrics::new().unwrap();
    let settlement = settlement(store.clone(), notices.clone(), metrics.clone());

    // Miles from earlier sessions
    store
        .set_merge(PLAYER, &PartialUpdate::new().increment("miles", 98))
        .await
        .unwrap();
    store
        .set_merge(RIVAL, &PartialUpdate::new().increment("miles", 99))
        .await
        .unwrap();

    let board = Board::with_mines(3, 1, &[(2, 0)]).unwrap();
    let mut game = Minesweeper::with_board(config(), PLAYER, board).unwrap();
    let mut rng = StdRng::seed_from_u64(7);
    let outcome = game.reveal(0, 0, &mut rng).unwrap();
    let reward = outcome.reward.expect("cleared board yields a reward");
    assert_eq!(reward.game, GameType::Minesweeper);
    assert_eq!(reward.points, 2);

    let receipt = settlement.settle(&reward).await.unwrap();
    assert_eq!(receipt.points, 2);

    let doc = store.get(PLAYER).await.unwrap().unwrap();
    assert_eq!(get_i64(&doc, "miles"), Some(100));
    assert_eq!(get_i64(&doc, "gamesPlayed.minesweeper"), Some(1));
    assert_eq!(get_i64(&doc, "bestScores.minesweeper"), Some(2));
    assert_eq!(metrics.settled_count(GameType::Minesweeper), 1);
    assert!(notices.notices().is_empty());

    let badges = BadgeService::new(store.clone(), BadgeConfig::default(), None, metrics.clone());
    let kitten = badges
        .status(PLAYER)
        .await
        .unwrap()
        .into_iter()
        .find(|b| b.id == "kitten")
        .unwrap();
    assert!(kitten.eligible);
    badges
        .record_claim(PLAYER, "kitten", &format!("0x{}", "ab".repeat(32)))
        .await
        .unwrap();

    let top = Leaderboard::new(store.clone()).top(5, None).await.unwrap();
    assert_eq!(top[0].address, PLAYER);
    assert_eq!(top[1].address, RIVAL);

    let by_game = Leaderboard::new(store).top(5, Some(GameType::Minesweeper)).await.unwrap();
    assert_eq!(by_game.len(), 1);
}

#[tokio::test]
async fn test_failed_settlement_keeps_local_score() {
    let store = Arc::new(MemoryProfileStore::new());
    let notices = Arc::new(NoticeLog::new());
    let metrics = ArcadeMetrics::new().unwrap();
    let settlement = settlement(store.clone(), notices.clone(), metrics.clone());

    let game = cleared_game();
    let score_before = game.score();

    store.set_offline(true);
    let reward = RewardRecord::new(PLAYER, GameType::Minesweeper, game.score(), Some(game.score()));
    assert!(settlement.settle(&reward).await.is_err());

    assert_eq!(game.score(), score_before);
    assert_eq!(game.status(), SessionStatus::Won);
    assert!(store.is_empty());
    assert_eq!(metrics.failure_count(GameType::Minesweeper), 1);

    let notices = notices.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Error);
}
