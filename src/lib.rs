//! Meow Miles - cat-themed arcade with a loyalty ledger
//!
//! Five mini-games (minesweeper, slots, tetris, prize wheel, plinko) award
//! Meow Miles. Finished games settle their rewards into a per-wallet profile
//! store; miles unlock badges, can be redeemed for tokens through the
//! player's wallet, and rank players on a leaderboard. Social identities are
//! linked to a wallet through OAuth.
//!
//! Settlement is optimistic: the game shows its result first and a failed
//! store write is surfaced as a notice without rolling the game back.

pub mod api;
pub mod config;
pub mod errors;
pub mod games;
pub mod metrics;
pub mod notify;
pub mod oauth;
pub mod rewards;
pub mod store;
pub mod wallet;

pub use config::{ArcadeConfig, ConfigLoader};
pub use errors::{ArcadeError, ArcadeResult, ErrorCategory};
