use crate::errors::ErrorCategory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Supported mini-games
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GameType {
    Minesweeper,
    Slots,
    Tetris,
    Wheel,
    Plinko,
}

impl GameType {
    pub fn all() -> [GameType; 5] {
        [
            GameType::Minesweeper,
            GameType::Slots,
            GameType::Tetris,
            GameType::Wheel,
            GameType::Plinko,
        ]
    }

    /// Key used for per-game fields in the profile document
    pub fn as_str(&self) -> &'static str {
        match self {
            GameType::Minesweeper => "minesweeper",
            GameType::Slots => "slots",
            GameType::Tetris => "tetris",
            GameType::Wheel => "wheel",
            GameType::Plinko => "plinko",
        }
    }
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameType {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GameType::all()
            .into_iter()
            .find(|game| game.as_str() == s.to_ascii_lowercase())
            .ok_or_else(|| GameError::UnknownGame(s.to_string()))
    }
}

/// Session lifecycle shared by every game
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Idle,
    Playing,
    Won,
    Lost,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Won | SessionStatus::Lost)
    }
}

/// Miles delta produced by a finished game, sent once to the profile store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RewardRecord {
    /// Log correlation only; settlement does not deduplicate on it
    pub reward_id: String,
    pub user: String,
    pub game: GameType,
    pub points: u64,
    /// Candidate for the per-game best score
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u64>,
    pub created_at: DateTime<Utc>,
}

impl RewardRecord {
    pub fn new(user: impl Into<String>, game: GameType, points: u64, score: Option<u64>) -> Self {
        Self {
            reward_id: Uuid::new_v4().to_string(),
            user: user.into(),
            game,
            points,
            score,
            created_at: Utc::now(),
        }
    }
}

/// Player's guess for the wheel segment or plinko bin, with the stake
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Wager {
    /// Native token stake in wei, checked against the wallet balance and
    /// sent with the bet. A correct prediction pays `amount * multiplier`
    /// miles on top of the landing score.
    pub amount: u64,
    pub prediction: Option<usize>,
}

impl Wager {
    pub fn none() -> Self {
        Self {
            amount: 0,
            prediction: None,
        }
    }

    pub fn on(prediction: usize, amount: u64) -> Self {
        Self {
            amount,
            prediction: Some(prediction),
        }
    }
}

/// Game-level failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    #[error("Another transition is already in flight")]
    Busy,

    #[error("Game is not in progress")]
    NotPlaying,

    #[error("Game is paused")]
    Paused,

    #[error("Cell ({x}, {y}) is outside the board")]
    OutOfBounds { x: usize, y: usize },

    #[error("Prediction {prediction} is outside 0..{options}")]
    InvalidPrediction { prediction: usize, options: usize },

    #[error("Unknown game: {0}")]
    UnknownGame(String),

    #[error("Malformed tetromino shape: {0}")]
    MalformedShape(String),

    #[error("Invalid board: {0}")]
    InvalidBoard(String),
}

impl GameError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            GameError::MalformedShape(_) | GameError::InvalidBoard(_) => ErrorCategory::Defect,
            _ => ErrorCategory::Precondition,
        }
    }
}
