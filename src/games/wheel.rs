//! Ten-number wheel. Odd numbers are red, even numbers black; 1-5 is low, 6-10 high.

use crate::errors::{CasinoError, CasinoResult};
use crate::games::types::FairnessOverride;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const MIN_NUMBER: u8 = 1;
pub const MAX_NUMBER: u8 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Red,
    Black,
}

/// What the player put the stake on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WheelBet {
    Number(u8),
    Red,
    Black,
    Odd,
    Even,
    High,
    Low,
}

pub fn color_of(number: u8) -> Color {
    if number % 2 == 1 {
        Color::Red
    } else {
        Color::Black
    }
}

impl WheelBet {
    /// Rejects a straight-up bet on a number the wheel does not carry.
    pub fn validate(self) -> CasinoResult<WheelBet> {
        match self {
            WheelBet::Number(n) if !(MIN_NUMBER..=MAX_NUMBER).contains(&n) => Err(CasinoError::InvalidMove(
                format!("the wheel runs {}-{}, not {}", MIN_NUMBER, MAX_NUMBER, n),
            )),
            bet => Ok(bet),
        }
    }

    pub fn matches(&self, number: u8) -> bool {
        match self {
            WheelBet::Number(n) => *n == number,
            WheelBet::Red => color_of(number) == Color::Red,
            WheelBet::Black => color_of(number) == Color::Black,
            WheelBet::Odd => number % 2 == 1,
            WheelBet::Even => number % 2 == 0,
            WheelBet::High => number >= 6,
            WheelBet::Low => number <= 5,
        }
    }
}

impl fmt::Display for WheelBet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WheelBet::Number(n) => write!(f, "{}", n),
            WheelBet::Red => f.write_str("red"),
            WheelBet::Black => f.write_str("black"),
            WheelBet::Odd => f.write_str("odd"),
            WheelBet::Even => f.write_str("even"),
            WheelBet::High => f.write_str("high"),
            WheelBet::Low => f.write_str("low"),
        }
    }
}

impl FromStr for WheelBet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        match lowered.as_str() {
            "red" | "r" => Ok(WheelBet::Red),
            "black" | "b" => Ok(WheelBet::Black),
            "odd" => Ok(WheelBet::Odd),
            "even" => Ok(WheelBet::Even),
            "high" | "hi" => Ok(WheelBet::High),
            "low" | "lo" => Ok(WheelBet::Low),
            other => other
                .parse::<u8>()
                .ok()
                .and_then(|n| WheelBet::Number(n).validate().ok())
                .ok_or_else(|| format!("'{}' is not a wheel bet", s.trim())),
        }
    }
}

pub fn spin<R: Rng + ?Sized>(rng: &mut R, bet: WheelBet, fairness: FairnessOverride) -> CasinoResult<u8> {
    let bet = bet.validate()?;
    let want_match = match fairness {
        FairnessOverride::None => return Ok(rng.gen_range(MIN_NUMBER..=MAX_NUMBER)),
        FairnessOverride::ForceWin => true,
        FairnessOverride::ForceLoss => false,
    };
    let candidates: Vec<u8> = (MIN_NUMBER..=MAX_NUMBER)
        .filter(|n| bet.matches(*n) == want_match)
        .collect();
    candidates
        .choose(rng)
        .copied()
        .ok_or_else(|| CasinoError::InvalidMove(format!("no number satisfies {} under {:?}", bet, fairness)))
}
