use crate::games::crash::Multiplier;
use crate::games::slots::Symbol;
use crate::games::wheel::WheelBet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported game types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GameType {
    Dice,
    Wheel,
    Slots,
    Mines,
    Crash,
}

impl GameType {
    pub const ALL: [GameType; 5] = [GameType::Dice, GameType::Wheel, GameType::Slots, GameType::Mines, GameType::Crash];
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameType::Dice => write!(f, "dice"),
            GameType::Wheel => write!(f, "wheel"),
            GameType::Slots => write!(f, "slots"),
            GameType::Mines => write!(f, "mines"),
            GameType::Crash => write!(f, "crash"),
        }
    }
}

impl FromStr for GameType {
    type Err = String;

    /// Accepts the canonical names plus the trigger words players actually type.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches('/').to_ascii_lowercase().as_str() {
            "dice" | "roll" | "duel" => Ok(GameType::Dice),
            "wheel" | "roulette" => Ok(GameType::Wheel),
            "slots" | "slot" | "spin" => Ok(GameType::Slots),
            "mines" | "mine" | "minefield" => Ok(GameType::Mines),
            "crash" | "rocket" => Ok(GameType::Crash),
            other => Err(format!("unknown game '{}'", other)),
        }
    }
}

/// Game outcome from the player's point of view
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GameOutcome {
    Win,
    Push,
    Loss,
}

/// Operator forcing of a user's results, resolved before every draw.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FairnessOverride {
    #[default]
    None,
    ForceWin,
    ForceLoss,
}

/// Resolved round, per game. Its `Display` form is the outcome descriptor stored on the bet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "game", rename_all = "lowercase")]
pub enum RoundOutcome {
    Dice { player: u8, house: u8 },
    Wheel { bet: WheelBet, number: u8 },
    Slots { symbols: [Symbol; 3], client_seed: String },
    Mines { moves: u32, exploded: bool, cancelled: bool },
    Crash { crash_point: Multiplier, cashed_out_at: Option<Multiplier> },
}

impl RoundOutcome {
    pub fn game(&self) -> GameType {
        match self {
            RoundOutcome::Dice { .. } => GameType::Dice,
            RoundOutcome::Wheel { .. } => GameType::Wheel,
            RoundOutcome::Slots { .. } => GameType::Slots,
            RoundOutcome::Mines { .. } => GameType::Mines,
            RoundOutcome::Crash { .. } => GameType::Crash,
        }
    }
}

impl fmt::Display for RoundOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundOutcome::Dice { player, house } => write!(f, "dice:{}:{}", player, house),
            RoundOutcome::Wheel { bet, number } => write!(f, "wheel:{}:{}", bet, number),
            RoundOutcome::Slots { symbols, .. } => {
                write!(f, "slots:{},{},{}", symbols[0], symbols[1], symbols[2])
            }
            RoundOutcome::Mines { moves, exploded, cancelled } => {
                let end = match (exploded, cancelled) {
                    (true, _) => "mine",
                    (false, true) => "cancel",
                    (false, false) => "cashout",
                };
                write!(f, "mines:{}:{}", moves, end)
            }
            RoundOutcome::Crash { crash_point, cashed_out_at } => match cashed_out_at {
                Some(at) => write!(f, "crash:{}:{}", crash_point, at),
                None => write!(f, "crash:{}:-", crash_point),
            },
        }
    }
}
