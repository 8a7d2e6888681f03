//! Tetromino engine
//!
//! Row 0 is the top of the playfield. Pieces spawn centred on row 0, fall one
//! row per gravity tick and lock when they cannot move down. Locking clears
//! every full row and spawns the next piece; a spawn that collides ends the
//! game.

use crate::config::TetrisConfig;
use crate::games::types::{GameError, GameType, RewardRecord, SessionStatus};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

/// `(rows, cols)` a tetromino may occupy
pub const ALLOWED_DIMENSIONS: [(usize, usize); 5] = [(1, 4), (4, 1), (2, 2), (2, 3), (3, 2)];

const FILLED_CELLS: usize = 4;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    I,
    O,
    T,
    S,
    Z,
    J,
    L,
}

impl ShapeKind {
    pub const ALL: [ShapeKind; 7] = [
        ShapeKind::I,
        ShapeKind::O,
        ShapeKind::T,
        ShapeKind::S,
        ShapeKind::Z,
        ShapeKind::J,
        ShapeKind::L,
    ];

    fn pattern(&self) -> &'static [&'static str] {
        match self {
            ShapeKind::I => &["####"],
            ShapeKind::O => &["##", "##"],
            ShapeKind::T => &["###", ".#."],
            ShapeKind::S => &[".##", "##."],
            ShapeKind::Z => &["##.", ".##"],
            ShapeKind::J => &["#..", "###"],
            ShapeKind::L => &["..#", "###"],
        }
    }
}

/// Validated tetromino mask
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shape {
    cells: Vec<Vec<bool>>,
}

impl Shape {
    pub fn of(kind: ShapeKind) -> Result<Self, GameError> {
        Self::from_pattern(kind.pattern())
    }

    /// Parse `#`/`.` rows into a shape, rejecting anything that is not a
    /// rectangular 4-cell tetromino of an allowed size.
    pub fn from_pattern(rows: &[&str]) -> Result<Self, GameError> {
        let cells = rows
            .iter()
            .map(|row| row.chars().map(|c| c == '#').collect())
            .collect();
        Self::from_cells(cells)
    }

    pub fn from_cells(cells: Vec<Vec<bool>>) -> Result<Self, GameError> {
        let rows = cells.len();
        let cols = cells.first().map(Vec::len).unwrap_or(0);

        if cells.iter().any(|row| row.len() != cols) {
            return Err(GameError::MalformedShape("rows differ in length".to_string()));
        }
        if !ALLOWED_DIMENSIONS.contains(&(rows, cols)) {
            return Err(GameError::MalformedShape(format!("{}x{} is not an allowed size", rows, cols)));
        }
        let filled = cells.iter().flatten().filter(|c| **c).count();
        if filled != FILLED_CELLS {
            return Err(GameError::MalformedShape(format!("{} filled cells, expected {}", filled, FILLED_CELLS)));
        }

        Ok(Self { cells })
    }

    pub fn height(&self) -> usize {
        self.cells.len()
    }

    pub fn width(&self) -> usize {
        self.cells[0].len()
    }

    /// Clockwise quarter turn: transpose, then reverse each row
    pub fn rotated(&self) -> Self {
        let (rows, cols) = (self.height(), self.width());
        let cells = (0..cols)
            .map(|c| (0..rows).rev().map(|r| self.cells[r][c]).collect())
            .collect();
        Self { cells }
    }

    /// `(dx, dy)` offsets of filled cells
    pub fn filled(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.cells.iter().enumerate().flat_map(|(dy, row)| {
            row.iter()
                .enumerate()
                .filter(|(_, filled)| **filled)
                .map(move |(dx, _)| (dx as i32, dy as i32))
        })
    }
}

/// Falling piece at a playfield offset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Piece {
    pub kind: ShapeKind,
    pub shape: Shape,
    pub x: i32,
    pub y: i32,
}

impl Piece {
    fn cells(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.shape.filled().map(move |(dx, dy)| (self.x + dx, self.y + dy))
    }

    fn shifted(&self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..self.clone()
        }
    }
}

/// Locked cells, `rows[y][x]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Playfield {
    width: usize,
    rows: Vec<Vec<Option<ShapeKind>>>,
}

impl Playfield {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            rows: vec![vec![None; width]; height],
        }
    }

    pub fn from_rows(rows: Vec<Vec<Option<ShapeKind>>>) -> Result<Self, GameError> {
        let width = rows.first().map(Vec::len).unwrap_or(0);
        if width == 0 || rows.iter().any(|row| row.len() != width) {
            return Err(GameError::InvalidBoard("playfield rows must be non-empty and equal length".to_string()));
        }
        Ok(Self { width, rows })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &[Vec<Option<ShapeKind>>] {
        &self.rows
    }

    pub fn is_occupied(&self, x: usize, y: usize) -> bool {
        self.rows[y][x].is_some()
    }

    pub fn set(&mut self, x: usize, y: usize, kind: Option<ShapeKind>) {
        self.rows[y][x] = kind;
    }

    /// Indices of rows with every cell occupied
    pub fn full_rows(&self) -> Vec<usize> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.iter().all(Option::is_some))
            .map(|(y, _)| y)
            .collect()
    }

    /// Drop full rows, shift the rest down in order, refill the top with
    /// empty rows. Returns the number cleared.
    pub fn clear_full_rows(&mut self) -> usize {
        let height = self.rows.len();
        self.rows.retain(|row| !row.iter().all(Option::is_some));
        let cleared = height - self.rows.len();

        let mut refilled = vec![vec![None; self.width]; cleared];
        refilled.append(&mut self.rows);
        self.rows = refilled;
        cleared
    }

    fn fits(&self, piece: &Piece) -> bool {
        piece.cells().all(|(x, y)| {
            x >= 0
                && y >= 0
                && (x as usize) < self.width
                && (y as usize) < self.rows.len()
                && !self.is_occupied(x as usize, y as usize)
        })
    }
}

/// Result of a piece locking into the playfield
#[derive(Debug, Clone, Serialize)]
pub struct LockOutcome {
    pub rows_cleared: usize,
    pub points: u64,
    pub game_over: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward: Option<RewardRecord>,
}

pub struct Tetris {
    config: TetrisConfig,
    player: String,
    field: Playfield,
    current: Option<Piece>,
    status: SessionStatus,
    score: u64,
    total_rows: u64,
    paused: bool,
}

impl Tetris {
    pub fn new<R: Rng + ?Sized>(config: TetrisConfig, player: impl Into<String>, rng: &mut R) -> Result<Self, GameError> {
        let field = Playfield::new(config.width, config.height);
        let first = draw_kind(rng);
        Self::with_field(config, player, field, first)
    }

    /// Start on a prepared playfield with a chosen first piece
    pub fn with_field(
        config: TetrisConfig,
        player: impl Into<String>,
        field: Playfield,
        first: ShapeKind,
    ) -> Result<Self, GameError> {
        validate_shapes()?;

        let mut game = Self {
            config,
            player: player.into(),
            field,
            current: None,
            status: SessionStatus::Playing,
            score: 0,
            total_rows: 0,
            paused: false,
        };
        game.spawn(first)?;
        Ok(game)
    }

    pub fn new_game<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<(), GameError> {
        self.field = Playfield::new(self.config.width, self.config.height);
        self.current = None;
        self.status = SessionStatus::Playing;
        self.score = 0;
        self.total_rows = 0;
        self.paused = false;
        self.spawn(draw_kind(rng))
    }

    pub fn field(&self) -> &Playfield {
        &self.field
    }

    pub fn current(&self) -> Option<&Piece> {
        self.current.as_ref()
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn score(&self) -> u64 {
        self.score
    }

    pub fn total_rows(&self) -> u64 {
        self.total_rows
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Gravity interval, shrinking with every row cleared
    pub fn drop_interval(&self) -> Duration {
        let speedup = self.config.speedup_per_row_ms.saturating_mul(self.total_rows);
        let interval = self
            .config
            .base_drop_ms
            .saturating_sub(speedup)
            .max(self.config.min_drop_ms);
        Duration::from_millis(interval)
    }

    /// Single pause key; returns the new paused state
    pub fn toggle_pause(&mut self) -> Result<bool, GameError> {
        if self.status != SessionStatus::Playing {
            return Err(GameError::NotPlaying);
        }
        self.paused = !self.paused;
        debug!(player = %self.player, paused = self.paused, "tetris pause toggled");
        Ok(self.paused)
    }

    pub fn move_left(&mut self) -> Result<bool, GameError> {
        self.try_shift(-1, 0)
    }

    pub fn move_right(&mut self) -> Result<bool, GameError> {
        self.try_shift(1, 0)
    }

    /// Rotate clockwise in place; blocked rotations leave the piece as is
    pub fn rotate(&mut self) -> Result<bool, GameError> {
        let piece = self.active_piece()?;
        let candidate = Piece {
            shape: piece.shape.rotated(),
            ..piece.clone()
        };
        Ok(self.replace_if_fits(candidate))
    }

    /// One row down, locking when blocked
    pub fn tick<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<Option<LockOutcome>, GameError> {
        if self.try_shift(0, 1)? {
            return Ok(None);
        }
        self.lock(rng).map(Some)
    }

    /// Same as a gravity tick, triggered by the player
    pub fn soft_drop<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<Option<LockOutcome>, GameError> {
        self.tick(rng)
    }

    pub fn hard_drop<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<LockOutcome, GameError> {
        while self.try_shift(0, 1)? {}
        self.lock(rng)
    }

    fn active_piece(&self) -> Result<&Piece, GameError> {
        if self.status != SessionStatus::Playing {
            return Err(GameError::NotPlaying);
        }
        if self.paused {
            return Err(GameError::Paused);
        }
        self.current.as_ref().ok_or(GameError::NotPlaying)
    }

    fn try_shift(&mut self, dx: i32, dy: i32) -> Result<bool, GameError> {
        let candidate = self.active_piece()?.shifted(dx, dy);
        Ok(self.replace_if_fits(candidate))
    }

    fn replace_if_fits(&mut self, candidate: Piece) -> bool {
        if self.field.fits(&candidate) {
            self.current = Some(candidate);
            true
        } else {
            false
        }
    }

    fn spawn(&mut self, kind: ShapeKind) -> Result<(), GameError> {
        let shape = Shape::of(kind).map_err(log_defect)?;
        let x = (self.field.width().saturating_sub(shape.width()) / 2) as i32;
        let piece = Piece { kind, shape, x, y: 0 };

        if self.field.fits(&piece) {
            self.current = Some(piece);
        } else {
            self.current = None;
            self.status = SessionStatus::Lost;
        }
        Ok(())
    }

    fn lock<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<LockOutcome, GameError> {
        let piece = self.current.take().ok_or(GameError::NotPlaying)?;
        for (x, y) in piece.cells() {
            self.field.set(x as usize, y as usize, Some(piece.kind));
        }

        let rows_cleared = self.field.clear_full_rows();
        let points = self.config.points_per_row * rows_cleared as u64;
        self.score += points;
        self.total_rows += rows_cleared as u64;
        if rows_cleared > 0 {
            debug!(player = %self.player, rows_cleared, points, "rows cleared");
        }

        self.spawn(draw_kind(rng))?;

        let game_over = self.status == SessionStatus::Lost;
        let reward = if game_over {
            info!(player = %self.player, score = self.score, rows = self.total_rows, "tetris game over");
            (self.score > 0).then(|| {
                RewardRecord::new(self.player.clone(), GameType::Tetris, self.score, Some(self.score))
            })
        } else {
            None
        };

        Ok(LockOutcome {
            rows_cleared,
            points,
            game_over,
            reward,
        })
    }
}

fn draw_kind<R: Rng + ?Sized>(rng: &mut R) -> ShapeKind {
    *ShapeKind::ALL.choose(rng).unwrap_or(&ShapeKind::I)
}

/// Reject the session if any built-in shape is malformed
fn validate_shapes() -> Result<(), GameError> {
    for kind in ShapeKind::ALL {
        Shape::of(kind).map_err(log_defect)?;
    }
    Ok(())
}

fn log_defect(err: GameError) -> GameError {
    error!(error = %err, "tetromino shape failed validation");
    err
}
