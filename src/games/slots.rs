//! Slot machine
//!
//! Three reels of three symbols, evaluated on five fixed paylines. Wilds
//! substitute for any symbol; three wilds pay a bonus on straight lines only.

use crate::config::{SlotsConfig, SymbolValues};
use crate::games::session::{run_timed, TimedSession};
use crate::games::types::{GameError, GameType, RewardRecord, SessionStatus};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Symbol {
    Cat1,
    Cat2,
    Star,
    Fish,
    Yarn,
    Wild,
}

impl Symbol {
    /// Regular symbols first, wild last; matches the reel weight layout
    pub const ALL: [Symbol; 6] = [
        Symbol::Cat1,
        Symbol::Cat2,
        Symbol::Star,
        Symbol::Fish,
        Symbol::Yarn,
        Symbol::Wild,
    ];
}

/// `grid[row][reel]`
pub type SlotGrid = [[Symbol; 3]; 3];

/// Draw 3 symbols per reel; wild has `wild_probability`, the rest share the
/// remaining mass evenly.
pub fn spin_reels<R: Rng + ?Sized>(wild_probability: f64, rng: &mut R) -> Result<SlotGrid, GameError> {
    let regular = (Symbol::ALL.len() - 1) as f64;
    let weights = Symbol::ALL.map(|symbol| {
        if symbol == Symbol::Wild {
            wild_probability
        } else {
            (1.0 - wild_probability) / regular
        }
    });
    let dist = WeightedIndex::new(weights)
        .map_err(|e| GameError::InvalidBoard(format!("invalid reel weights: {}", e)))?;

    let mut grid = [[Symbol::Yarn; 3]; 3];
    for reel in 0..3 {
        for row in grid.iter_mut() {
            row[reel] = Symbol::ALL[dist.sample(rng)];
        }
    }
    Ok(grid)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Payline {
    TopStraight,
    MiddleStraight,
    BottomStraight,
    DiagonalDown,
    DiagonalUp,
}

impl Payline {
    /// Evaluation order; on equal payouts the earlier line is reported
    pub const ALL: [Payline; 5] = [
        Payline::TopStraight,
        Payline::MiddleStraight,
        Payline::BottomStraight,
        Payline::DiagonalDown,
        Payline::DiagonalUp,
    ];

    /// `(row, reel)` positions
    pub fn positions(&self) -> [(usize, usize); 3] {
        match self {
            Payline::TopStraight => [(0, 0), (0, 1), (0, 2)],
            Payline::MiddleStraight => [(1, 0), (1, 1), (1, 2)],
            Payline::BottomStraight => [(2, 0), (2, 1), (2, 2)],
            Payline::DiagonalDown => [(0, 0), (1, 1), (2, 2)],
            Payline::DiagonalUp => [(2, 0), (1, 1), (0, 2)],
        }
    }

    pub fn is_straight(&self) -> bool {
        matches!(
            self,
            Payline::TopStraight | Payline::MiddleStraight | Payline::BottomStraight
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Payline::TopStraight => "Top Straight",
            Payline::MiddleStraight => "Middle Straight",
            Payline::BottomStraight => "Bottom Straight",
            Payline::DiagonalDown => "Diagonal Down",
            Payline::DiagonalUp => "Diagonal Up",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayTable {
    pub values: SymbolValues,
    pub wild_line_bonus: u64,
}

impl PayTable {
    pub fn from_config(config: &SlotsConfig) -> Self {
        Self {
            values: config.symbol_values.clone(),
            wild_line_bonus: config.wild_line_bonus,
        }
    }

    pub fn value(&self, symbol: Symbol) -> u64 {
        match symbol {
            Symbol::Cat1 => self.values.cat1,
            Symbol::Cat2 => self.values.cat2,
            Symbol::Star => self.values.star,
            Symbol::Fish => self.values.fish,
            Symbol::Yarn => self.values.yarn,
            Symbol::Wild => self.wild_line_bonus,
        }
    }
}

impl Default for PayTable {
    fn default() -> Self {
        Self::from_config(&SlotsConfig::default())
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct LineWin {
    pub payline: Payline,
    /// Matched symbol; `Wild` only for an all-wild straight
    pub symbol: Symbol,
    pub value: u64,
}

/// Evaluate one payline
pub fn evaluate_line(grid: &SlotGrid, payline: Payline, paytable: &PayTable) -> Option<LineWin> {
    let symbols = payline.positions().map(|(row, reel)| grid[row][reel]);
    let mut regular = symbols.iter().copied().filter(|s| *s != Symbol::Wild);

    let symbol = match regular.next() {
        None if payline.is_straight() => Symbol::Wild,
        None => return None,
        Some(first) if regular.all(|s| s == first) => first,
        Some(_) => return None,
    };

    Some(LineWin {
        payline,
        symbol,
        value: paytable.value(symbol),
    })
}

/// Highest-paying line across all five; ties keep the first in evaluation order
pub fn evaluate(grid: &SlotGrid, paytable: &PayTable) -> Option<LineWin> {
    Payline::ALL
        .iter()
        .filter_map(|line| evaluate_line(grid, *line, paytable))
        .fold(None, |best: Option<LineWin>, win| match best {
            Some(current) if current.value >= win.value => Some(current),
            _ => Some(win),
        })
}

#[derive(Debug, Clone, Serialize)]
pub struct SpinResult {
    pub grid: SlotGrid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub win: Option<LineWin>,
    pub points: u64,
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward: Option<RewardRecord>,
}

/// One player's slot machine
pub struct SlotMachine {
    config: SlotsConfig,
    paytable: PayTable,
    player: String,
    session: TimedSession,
}

impl SlotMachine {
    pub fn new(config: SlotsConfig, player: impl Into<String>) -> Self {
        Self {
            paytable: PayTable::from_config(&config),
            config,
            player: player.into(),
            session: TimedSession::new(),
        }
    }

    pub fn session(&self) -> &TimedSession {
        &self.session
    }

    /// Spin, wait out the reel animation, then evaluate. A spin requested
    /// while another is running fails with [`GameError::Busy`].
    pub async fn spin<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<SpinResult, GameError> {
        let guard = self.session.begin()?;
        let grid = spin_reels(self.config.wild_probability, rng)?;
        self.session.mark_playing();

        let duration = Duration::from_millis(self.config.spin_duration_ms);
        Ok(run_timed(guard, duration, || self.settle_spin(grid)).await)
    }

    fn settle_spin(&self, grid: SlotGrid) -> SpinResult {
        let win = evaluate(&grid, &self.paytable);
        let points = win.map(|w| w.value).unwrap_or(0);
        let state = self.session.finish(points);

        if let Some(win) = &win {
            debug!(player = %self.player, line = win.payline.name(), points, "slots win");
        }

        SpinResult {
            grid,
            win,
            points,
            status: state.status,
            reward: (points > 0)
                .then(|| RewardRecord::new(self.player.clone(), GameType::Slots, points, Some(points))),
        }
    }
}
