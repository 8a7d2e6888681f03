//! Minesweeper
//!
//! Mines are placed by rejection sampling. A safe click reveals the cell (and
//! flood-reveals a zero region), and with a configured probability a cascade
//! also reveals a small random batch of other safe cells. Every cell revealed
//! by a click is worth one point; clearing the board wins the accumulated
//! score, hitting a mine loses the session.

use crate::config::MinesweeperConfig;
use crate::games::session::{rejected_config, SessionState};
use crate::games::types::{GameError, GameType, RewardRecord, SessionStatus};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use std::collections::{BTreeSet, VecDeque};
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Cell {
    pub mine: bool,
    pub revealed: bool,
    pub flagged: bool,
    /// Mines among the up-to-8 neighbours; meaningless on a mine
    pub adjacent: u8,
}

/// Row-major minesweeper grid
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Board {
    width: usize,
    height: usize,
    cells: Vec<Cell>,
}

impl Board {
    /// Place exactly `mines` mines uniformly, retrying occupied draws
    pub fn generate<R: Rng + ?Sized>(
        width: usize,
        height: usize,
        mines: usize,
        rng: &mut R,
    ) -> Result<Self, GameError> {
        let total = Self::check_dimensions(width, height, mines)?;

        let mut cells = vec![Cell::default(); total];
        let mut placed = 0;
        while placed < mines {
            let idx = rng.gen_range(0..total);
            if cells[idx].mine {
                continue;
            }
            cells[idx].mine = true;
            placed += 1;
        }

        let mut board = Self { width, height, cells };
        board.compute_adjacency();
        Ok(board)
    }

    /// Board with mines at the given `(x, y)` positions
    pub fn with_mines(width: usize, height: usize, mines: &[(usize, usize)]) -> Result<Self, GameError> {
        let total = Self::check_dimensions(width, height, mines.len())?;
        let mut board = Self {
            width,
            height,
            cells: vec![Cell::default(); total],
        };

        for &(x, y) in mines {
            let idx = board.index(x, y).ok_or(GameError::OutOfBounds { x, y })?;
            if board.cells[idx].mine {
                return Err(GameError::InvalidBoard(format!("duplicate mine at ({}, {})", x, y)));
            }
            board.cells[idx].mine = true;
        }

        board.compute_adjacency();
        Ok(board)
    }

    fn check_dimensions(width: usize, height: usize, mines: usize) -> Result<usize, GameError> {
        let total = width * height;
        if total == 0 {
            return Err(GameError::InvalidBoard("board has no cells".to_string()));
        }
        if mines >= total {
            return Err(GameError::InvalidBoard(format!(
                "{} mines do not fit a {}x{} board",
                mines, width, height
            )));
        }
        Ok(total)
    }

    fn compute_adjacency(&mut self) {
        for y in 0..self.height {
            for x in 0..self.width {
                let count = self
                    .neighbors(x, y)
                    .filter(|&(nx, ny)| self.cells[ny * self.width + nx].mine)
                    .count();
                self.cells[y * self.width + x].adjacent = count as u8;
            }
        }
    }

    /// In-bounds neighbours of `(x, y)`, excluding the cell itself
    pub fn neighbors(&self, x: usize, y: usize) -> impl Iterator<Item = (usize, usize)> {
        let (w, h) = (self.width as isize, self.height as isize);
        (-1isize..=1)
            .flat_map(|dy| (-1isize..=1).map(move |dx| (dx, dy)))
            .filter(|&(dx, dy)| dx != 0 || dy != 0)
            .filter_map(move |(dx, dy)| {
                let (nx, ny) = (x as isize + dx, y as isize + dy);
                (nx >= 0 && ny >= 0 && nx < w && ny < h).then_some((nx as usize, ny as usize))
            })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn cell(&self, x: usize, y: usize) -> Option<&Cell> {
        self.index(x, y).map(|idx| &self.cells[idx])
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn mine_count(&self) -> usize {
        self.cells.iter().filter(|c| c.mine).count()
    }

    /// Safe cells still hidden; zero means the board is cleared
    pub fn hidden_safe_cells(&self) -> usize {
        self.cells.iter().filter(|c| !c.mine && !c.revealed).count()
    }

    fn index(&self, x: usize, y: usize) -> Option<usize> {
        (x < self.width && y < self.height).then(|| y * self.width + x)
    }

    fn position(&self, idx: usize) -> (usize, usize) {
        (idx % self.width, idx / self.width)
    }

    /// Cells a safe click at `(x, y)` reveals: the cell itself and, for a zero
    /// cell, its connected zero region plus that region's border. Flagged and
    /// already revealed cells are skipped. Does not touch the board.
    pub fn plan_reveal(&self, x: usize, y: usize) -> Vec<(usize, usize)> {
        let Some(start) = self.index(x, y) else {
            return Vec::new();
        };
        let origin = &self.cells[start];
        if origin.mine || origin.revealed || origin.flagged {
            return Vec::new();
        }

        let mut seen = BTreeSet::from([start]);
        let mut queue = VecDeque::from([start]);
        while let Some(idx) = queue.pop_front() {
            if self.cells[idx].adjacent != 0 {
                continue;
            }
            let (cx, cy) = self.position(idx);
            for (nx, ny) in self.neighbors(cx, cy) {
                let nidx = ny * self.width + nx;
                let cell = &self.cells[nidx];
                if cell.mine || cell.revealed || cell.flagged || !seen.insert(nidx) {
                    continue;
                }
                queue.push_back(nidx);
            }
        }

        seen.into_iter().map(|idx| self.position(idx)).collect()
    }

    /// Random cascade batch of 1..=`max_cells` hidden, safe, unflagged cells
    /// that are not already in `planned`.
    pub fn plan_cascade<R: Rng + ?Sized>(
        &self,
        planned: &[(usize, usize)],
        max_cells: usize,
        rng: &mut R,
    ) -> Vec<(usize, usize)> {
        let candidates: Vec<usize> = self
            .cells
            .iter()
            .enumerate()
            .filter(|(idx, cell)| {
                !cell.mine && !cell.revealed && !cell.flagged && !planned.contains(&self.position(*idx))
            })
            .map(|(idx, _)| idx)
            .collect();

        if candidates.is_empty() || max_cells == 0 {
            return Vec::new();
        }

        let batch = rng.gen_range(1..=max_cells.min(candidates.len()));
        let mut picked: Vec<usize> = candidates.choose_multiple(rng, batch).copied().collect();
        picked.sort_unstable();
        picked.into_iter().map(|idx| self.position(idx)).collect()
    }

    fn reveal_all_mines(&mut self) {
        for cell in self.cells.iter_mut().filter(|c| c.mine) {
            cell.revealed = true;
        }
    }
}

/// Result of one click
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevealOutcome {
    pub revealed: Vec<(usize, usize)>,
    /// How many of `revealed` came from the cascade rule
    pub cascaded: usize,
    pub points: u64,
    pub hit_mine: bool,
    pub status: SessionStatus,
    /// Present when this click cleared the board
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward: Option<RewardRecord>,
}

impl RevealOutcome {
    fn nothing(status: SessionStatus) -> Self {
        Self {
            revealed: Vec::new(),
            cascaded: 0,
            points: 0,
            hit_mine: false,
            status,
            reward: None,
        }
    }
}

/// One minesweeper session
#[derive(Debug, Clone)]
pub struct Minesweeper {
    config: MinesweeperConfig,
    player: String,
    board: Board,
    session: SessionState,
}

impl Minesweeper {
    /// Generate a board and start playing
    pub fn new<R: Rng + ?Sized>(
        config: MinesweeperConfig,
        player: impl Into<String>,
        rng: &mut R,
    ) -> Result<Self, GameError> {
        config.validate().map_err(|e| rejected_config(GameType::Minesweeper, e))?;
        let board = Board::generate(config.width, config.height, config.mines, rng)?;
        Ok(Self::start(config, player, board))
    }

    /// Start playing on a prepared board
    pub fn with_board(config: MinesweeperConfig, player: impl Into<String>, board: Board) -> Result<Self, GameError> {
        config.validate().map_err(|e| rejected_config(GameType::Minesweeper, e))?;
        Ok(Self::start(config, player, board))
    }

    fn start(config: MinesweeperConfig, player: impl Into<String>, board: Board) -> Self {
        let mut session = SessionState::default();
        session.start();
        Self {
            config,
            player: player.into(),
            board,
            session,
        }
    }

    /// Replace the board and reset the score
    pub fn new_game<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<(), GameError> {
        self.board = Board::generate(self.config.width, self.config.height, self.config.mines, rng)?;
        self.session.start();
        Ok(())
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn status(&self) -> SessionStatus {
        self.session.status
    }

    pub fn score(&self) -> u64 {
        self.session.score
    }

    /// Reveal `(x, y)`. Clicks on flagged or revealed cells do nothing.
    pub fn reveal<R: Rng + ?Sized>(&mut self, x: usize, y: usize, rng: &mut R) -> Result<RevealOutcome, GameError> {
        if self.session.status != SessionStatus::Playing {
            return Err(GameError::NotPlaying);
        }
        let cell = *self.board.cell(x, y).ok_or(GameError::OutOfBounds { x, y })?;
        if cell.flagged || cell.revealed {
            return Ok(RevealOutcome::nothing(self.session.status));
        }

        if cell.mine {
            self.board.reveal_all_mines();
            self.session.finish(false);
            debug!(player = %self.player, x, y, score = self.session.score, "mine hit");
            return Ok(RevealOutcome {
                hit_mine: true,
                ..RevealOutcome::nothing(SessionStatus::Lost)
            });
        }

        let mut revealed = self.board.plan_reveal(x, y);
        let mut cascaded = 0;
        if self.config.cascade_probability > 0.0 && rng.gen_bool(self.config.cascade_probability) {
            let batch = self.board.plan_cascade(&revealed, self.config.cascade_max_cells, rng);
            cascaded = batch.len();
            revealed.extend(batch);
        }

        for &(rx, ry) in &revealed {
            if let Some(idx) = self.board.index(rx, ry) {
                self.board.cells[idx].revealed = true;
            }
        }

        let points = revealed.len() as u64;
        self.session.add_points(points);

        let reward = if self.board.hidden_safe_cells() == 0 {
            self.session.finish(true);
            let score = self.session.score;
            debug!(player = %self.player, score, "board cleared");
            Some(RewardRecord::new(self.player.clone(), GameType::Minesweeper, score, Some(score)))
        } else {
            None
        };

        Ok(RevealOutcome {
            revealed,
            cascaded,
            points,
            hit_mine: false,
            status: self.session.status,
            reward,
        })
    }

    /// Toggle a flag on a hidden cell; returns whether it is now flagged
    pub fn toggle_flag(&mut self, x: usize, y: usize) -> Result<bool, GameError> {
        if self.session.status != SessionStatus::Playing {
            return Err(GameError::NotPlaying);
        }
        let idx = self.board.index(x, y).ok_or(GameError::OutOfBounds { x, y })?;
        let cell = &mut self.board.cells[idx];
        if cell.revealed {
            return Ok(false);
        }
        cell.flagged = !cell.flagged;
        Ok(cell.flagged)
    }
}
