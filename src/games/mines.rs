//! 5x5 mine field
//!
//! Mine positions are sampled once per round from a generator seeded with
//! SHA-256 of `"{user}:{nonce}:{unix_millis}"`. The round tracks safe reveals; after
//! [`MAX_SAFE_MOVES`] safe reveals it is cashed out automatically.

use crate::common::types::UserId;
use crate::errors::{CasinoError, CasinoResult};
use crate::games::types::FairnessOverride;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const GRID_SIZE: usize = 5;
pub const CELLS: usize = GRID_SIZE * GRID_SIZE;
pub const MINE_COUNT: usize = 6;
pub const MAX_SAFE_MOVES: u32 = 15;

pub fn field_seed(user_id: UserId, nonce: u64, unix_millis: i64) -> [u8; 32] {
    Sha256::digest(format!("{}:{}:{}", user_id, nonce, unix_millis).as_bytes()).into()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MineField {
    mines: Vec<bool>,
}

impl MineField {
    pub fn generate(seed: [u8; 32], fairness: FairnessOverride) -> Self {
        let mut mines = vec![false; CELLS];
        match fairness {
            FairnessOverride::ForceWin => {}
            FairnessOverride::ForceLoss => mines.iter_mut().for_each(|cell| *cell = true),
            FairnessOverride::None => {
                let mut rng = StdRng::from_seed(seed);
                for index in rand::seq::index::sample(&mut rng, CELLS, MINE_COUNT) {
                    mines[index] = true;
                }
            }
        }
        Self { mines }
    }

    pub fn is_mine(&self, cell: usize) -> bool {
        self.mines.get(cell).copied().unwrap_or(false)
    }

    pub fn mine_count(&self) -> usize {
        self.mines.iter().filter(|m| **m).count()
    }

    pub fn mine_cells(&self) -> Vec<usize> {
        (0..CELLS).filter(|cell| self.mines[*cell]).collect()
    }
}

pub fn cell_index(row: usize, col: usize) -> CasinoResult<usize> {
    if row >= GRID_SIZE || col >= GRID_SIZE {
        return Err(CasinoError::InvalidMove(format!(
            "cell ({}, {}) is outside the {}x{} grid",
            row, col, GRID_SIZE, GRID_SIZE
        )));
    }
    Ok(row * GRID_SIZE + col)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MinesState {
    Active,
    Exploded,
    CashedOut,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reveal {
    /// Safe cell; `forced_cashout` is set when the move cap was reached.
    Safe { moves: u32, forced_cashout: bool },
    Mine,
}

/// One round on one field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinesRound {
    field: MineField,
    revealed: Vec<bool>,
    moves: u32,
    state: MinesState,
}

impl MinesRound {
    pub fn new(field: MineField) -> Self {
        Self { field, revealed: vec![false; CELLS], moves: 0, state: MinesState::Active }
    }

    pub fn moves(&self) -> u32 {
        self.moves
    }

    pub fn state(&self) -> MinesState {
        self.state
    }

    pub fn is_revealed(&self, cell: usize) -> bool {
        self.revealed.get(cell).copied().unwrap_or(false)
    }

    pub fn field(&self) -> &MineField {
        &self.field
    }

    fn ensure_active(&self) -> CasinoResult<()> {
        if self.state != MinesState::Active {
            return Err(CasinoError::InvalidMove("the round is already over".into()));
        }
        Ok(())
    }

    pub fn reveal(&mut self, cell: usize) -> CasinoResult<Reveal> {
        self.ensure_active()?;
        if cell >= CELLS {
            return Err(CasinoError::InvalidMove(format!("cell {} is outside the grid", cell)));
        }
        if self.revealed[cell] {
            return Err(CasinoError::InvalidMove("that cell is already open".into()));
        }
        self.revealed[cell] = true;

        if self.field.is_mine(cell) {
            self.state = MinesState::Exploded;
            return Ok(Reveal::Mine);
        }

        self.moves += 1;
        let forced_cashout = self.moves >= MAX_SAFE_MOVES;
        if forced_cashout {
            self.state = MinesState::CashedOut;
        }
        Ok(Reveal::Safe { moves: self.moves, forced_cashout })
    }

    pub fn cash_out(&mut self) -> CasinoResult<u32> {
        self.ensure_active()?;
        if self.moves == 0 {
            return Err(CasinoError::InvalidMove("open at least one cell before cashing out".into()));
        }
        self.state = MinesState::CashedOut;
        Ok(self.moves)
    }

    /// Abandons a round before the first reveal.
    pub fn cancel(&mut self) -> CasinoResult<()> {
        self.ensure_active()?;
        if self.moves > 0 {
            return Err(CasinoError::InvalidMove("a round with open cells can only be cashed out".into()));
        }
        self.state = MinesState::Cancelled;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_has_fixed_mine_count() {
        for nonce in 0..50 {
            let field = MineField::generate(field_seed(1, nonce, 1_700_000_000_000), FairnessOverride::None);
            assert_eq!(field.mine_count(), MINE_COUNT);
        }
    }

    #[test]
    fn test_same_seed_same_field() {
        let seed = field_seed(42, 3, 1_700_000_000_123);
        assert_eq!(
            MineField::generate(seed, FairnessOverride::None),
            MineField::generate(seed, FairnessOverride::None)
        );
        assert_ne!(field_seed(42, 3, 1), field_seed(42, 4, 1));
    }

    #[test]
    fn test_override_fields() {
        let seed = field_seed(1, 1, 1);
        assert_eq!(MineField::generate(seed, FairnessOverride::ForceWin).mine_count(), 0);
        assert_eq!(MineField::generate(seed, FairnessOverride::ForceLoss).mine_count(), CELLS);
    }

    #[test]
    fn test_reveal_cap_forces_cashout() {
        let mut round = MinesRound::new(MineField::generate([0; 32], FairnessOverride::ForceWin));
        for cell in 0..(MAX_SAFE_MOVES as usize - 1) {
            assert_eq!(
                round.reveal(cell).unwrap(),
                Reveal::Safe { moves: cell as u32 + 1, forced_cashout: false }
            );
        }
        assert_eq!(
            round.reveal(20).unwrap(),
            Reveal::Safe { moves: MAX_SAFE_MOVES, forced_cashout: true }
        );
        assert_eq!(round.state(), MinesState::CashedOut);
        assert!(round.reveal(21).is_err());
    }

    #[test]
    fn test_mine_ends_round() {
        let mut round = MinesRound::new(MineField::generate([0; 32], FairnessOverride::ForceLoss));
        assert_eq!(round.reveal(cell_index(2, 3).unwrap()).unwrap(), Reveal::Mine);
        assert_eq!(round.state(), MinesState::Exploded);
        assert!(round.cash_out().is_err());
    }

    #[test]
    fn test_repeat_and_out_of_range_moves_rejected() {
        let mut round = MinesRound::new(MineField::generate([0; 32], FairnessOverride::ForceWin));
        round.reveal(0).unwrap();
        assert!(round.reveal(0).is_err());
        assert!(round.reveal(CELLS).is_err());
        assert!(cell_index(5, 0).is_err());
        assert_eq!(round.moves(), 1);
    }

    #[test]
    fn test_cancel_only_before_first_reveal() {
        let mut fresh = MinesRound::new(MineField::generate([0; 32], FairnessOverride::ForceWin));
        assert!(fresh.cash_out().is_err());
        fresh.cancel().unwrap();
        assert_eq!(fresh.state(), MinesState::Cancelled);

        let mut played = MinesRound::new(MineField::generate([0; 32], FairnessOverride::ForceWin));
        played.reveal(4).unwrap();
        assert!(played.cancel().is_err());
        assert_eq!(played.cash_out().unwrap(), 1);
    }
}
