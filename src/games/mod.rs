pub mod types;
pub mod session;
pub mod minesweeper;
pub mod slots;
pub mod tetris;
pub mod wheel;
pub mod plinko;
pub mod settlement;

pub use types::*;
pub use minesweeper::Minesweeper;
pub use plinko::Plinko;
pub use settlement::{RewardSettlement, SettlementError, SettlementReceipt};
pub use slots::SlotMachine;
pub use tetris::Tetris;
pub use wheel::PrizeWheel;
