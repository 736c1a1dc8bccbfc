//! Payout tables. Every payout is floored to whole cents; a push returns the stake,
//! a loss returns zero.

use crate::common::types::{scale, Cents};
use crate::games::crash::Multiplier;
use crate::games::dice::DiceRoll;
use crate::games::mines::MAX_SAFE_MOVES;
use crate::games::slots::{Symbol, REELS};
use crate::games::types::GameOutcome;
use crate::games::wheel::WheelBet;

/// Mines multipliers in hundredths for safe moves 1..=15.
pub const MINES_MULTIPLIERS: [u64; MAX_SAFE_MOVES as usize] = [
    120, 140, 180, 220, 280, 320, 400, 600, 800, 1_000, 1_200, 1_300, 1_600, 2_000, 2_700,
];

pub fn dice_payout(stake: Cents, roll: &DiceRoll) -> Cents {
    match roll.outcome() {
        GameOutcome::Win => scale(stake, 13, 10),
        GameOutcome::Push => stake,
        GameOutcome::Loss => 0,
    }
}

pub fn wheel_payout(stake: Cents, bet: WheelBet, number: u8) -> Cents {
    if !bet.matches(number) {
        return 0;
    }
    match bet {
        WheelBet::Number(_) => scale(stake, 22, 10),
        _ => scale(stake, 15, 10),
    }
}

pub fn slots_payout(stake: Cents, symbols: &[Symbol; REELS]) -> Cents {
    let [a, b, c] = *symbols;
    if a == b && b == c {
        stake.saturating_mul(a.triple_multiplier())
    } else if a == b || b == c || a == c {
        scale(stake, 1, 2)
    } else {
        0
    }
}

/// Multiplier in hundredths after `moves` safe reveals. Zero moves is 1.0x; anything
/// past the cap pays the last table entry.
pub fn mines_multiplier(moves: u32) -> u64 {
    if moves == 0 {
        return 100;
    }
    let index = moves.min(MAX_SAFE_MOVES) as usize - 1;
    MINES_MULTIPLIERS[index]
}

pub fn mines_payout(stake: Cents, moves: u32) -> Cents {
    scale(stake, mines_multiplier(moves), 100)
}

pub fn crash_payout(stake: Cents, cashed_out_at: Multiplier) -> Cents {
    scale(stake, cashed_out_at.tenths() as u64, 10)
}

/// Classifies a payout against its stake.
pub fn outcome_of(stake: Cents, payout: Cents) -> GameOutcome {
    match payout.cmp(&stake) {
        std::cmp::Ordering::Greater => GameOutcome::Win,
        std::cmp::Ordering::Equal => GameOutcome::Push,
        std::cmp::Ordering::Less => GameOutcome::Loss,
    }
}
